//! # Trace Replay
//!
//! Drives a [`Detector`] over a recorded or synthetic sample stream and
//! summarises what it did: every transition with the index and timestamp of
//! the sample that caused it, how many samples were handled in each state,
//! and the features at the end of the run.
//!
//! [`replay_threaded`] runs the same replay with samples arriving through the
//! [`handoff`](crate::handoff) queue from a separate producer thread.

use crate::error::{SimError, SimResult};
use crate::handoff;
use mbsd_core::{ActivityState, Detector, Features, Sample, Transition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::thread;
use tracing::info;

/// A transition observed during replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Zero-based index of the sample that caused it
    pub index: usize,
    /// Timestamp of that sample
    pub timestamp: u32,
    pub from: ActivityState,
    pub to: ActivityState,
}

/// Summary of one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Samples dispatched
    pub samples: usize,
    pub transitions: Vec<TransitionRecord>,
    pub final_state: ActivityState,
    pub final_features: Features,
    /// Sensitivity setting in effect
    pub sensitivity: u8,
    /// Times the producer found the handoff queue full
    pub overruns: u64,
    /// Samples handled in each state, keyed by state name
    pub state_samples: BTreeMap<String, usize>,
}

impl ReplayReport {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The states entered, in order.
    pub fn path(&self) -> Vec<ActivityState> {
        self.transitions.iter().map(|t| t.to).collect()
    }
}

/// Accumulates a report while samples are dispatched.
struct Recorder {
    samples: usize,
    transitions: Vec<TransitionRecord>,
    state_samples: BTreeMap<String, usize>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            samples: 0,
            transitions: Vec::new(),
            state_samples: BTreeMap::new(),
        }
    }

    fn dispatch(&mut self, detector: &mut Detector, sample: Sample) {
        *self
            .state_samples
            .entry(detector.state().to_string())
            .or_insert(0) += 1;

        if let Some(Transition { from, to }) = detector.on_sample(sample) {
            self.transitions.push(TransitionRecord {
                index: self.samples,
                timestamp: sample.timestamp,
                from,
                to,
            });
        }
        self.samples += 1;
    }

    fn finish(self, detector: &Detector, overruns: u64) -> ReplayReport {
        let report = ReplayReport {
            samples: self.samples,
            transitions: self.transitions,
            final_state: detector.state(),
            final_features: *detector.features(),
            sensitivity: detector.sensitivity(),
            overruns,
            state_samples: self.state_samples,
        };
        info!(
            samples = report.samples,
            transitions = report.transitions.len(),
            final_state = %report.final_state,
            overruns = report.overruns,
            "replay complete"
        );
        report
    }
}

/// Replay `samples` through `detector` on the calling thread.
pub fn replay(detector: &mut Detector, samples: &[Sample]) -> ReplayReport {
    let mut recorder = Recorder::new();
    for &sample in samples {
        recorder.dispatch(detector, sample);
    }
    recorder.finish(detector, 0)
}

/// Replay `samples` with a producer thread feeding a handoff queue of
/// `capacity` slots.
///
/// The producer waits for room rather than dropping samples, so the result
/// matches [`replay`] apart from the overrun count.
pub fn replay_threaded(
    detector: &mut Detector,
    samples: Vec<Sample>,
    capacity: usize,
) -> SimResult<ReplayReport> {
    let (producer, consumer) = handoff::channel(capacity);

    let feeder = thread::Builder::new()
        .name("mbsd-feeder".into())
        .spawn(move || {
            for sample in samples {
                producer.push_blocking(sample);
            }
        })?;

    let mut recorder = Recorder::new();
    while !consumer.is_finished() {
        match consumer.pop() {
            Some(sample) => recorder.dispatch(detector, sample),
            None => thread::yield_now(),
        }
    }

    feeder.join().map_err(|_| SimError::ThreadPanicked)?;
    Ok(recorder.finish(detector, consumer.overruns()))
}
