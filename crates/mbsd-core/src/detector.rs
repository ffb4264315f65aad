//! # Activity State Machine
//!
//! Sequences the acquisition phases of the detector. Guards are evaluated on
//! elapsed ticks computed from sample timestamps, never from a hardware
//! timer, so the host may sleep between samples and recorded traces can be
//! replayed at any speed. A silent sensor never fires a guard.
//!
//! ```text
//!   (initial)
//!       │
//!       ▼
//!  ┌────────────┐ elapsed > delay ┌──────┐  stda >= high  ┌────────┐
//!  │ StartingUp │────────────────►│ Idle │───────────────►│ Active │
//!  └────────────┘                 └──────┘◄───────────────└────────┘
//!        ▲                           ▲       stda < low     │    ▲
//!        │ Restart                   │               rhythm │    │ rhythm lost
//!        │ (from any other state)    │  stda < low          ▼    │
//!                                    └─────────────────┌──────────┐
//!                                                      │ Rhythmic │
//!                                                      └──────────┘
//! ```
//!
//! | State      | Entry                        | Sample handling                        |
//! |------------|------------------------------|----------------------------------------|
//! | StartingUp | `start_tick := last_timestamp` | leave for `Idle` once settled, no features |
//! | Idle       | none                         | update features, escalate on activity  |
//! | Active     | `start_tick`, capture Z      | update, drop or declare rhythm         |
//! | Rhythmic   | `start_tick`, capture Z      | update, drop on low activity or lost rhythm |
//!
//! Guards compare against the timestamp latched by the previous dispatch;
//! the current sample's timestamp is latched once its handler returns. The
//! first sample ever seen anchors both `last_timestamp` and `start_tick`.
//!
//! With no sensitivity setting applied (index `0`) every escalation threshold
//! is out of reach and the detector settles in `Idle`.
//!
//! ## Example
//!
//! ```rust
//! use mbsd_core::{ActivityState, Detector, Sample};
//!
//! let mut detector = Detector::new();
//! let mut transitions = Vec::new();
//! for t in [0, 1000, 3001, 3500] {
//!     transitions.push(detector.on_sample(Sample::at_rest(t)));
//! }
//! assert!(transitions[..3].iter().all(Option::is_none));
//! assert_eq!(transitions[3].map(|t| t.to), Some(ActivityState::Idle));
//! ```

use crate::config::{ActivityParams, DetectorConfig, MbsdConfig, SensitivityTable};
use crate::error::{MbsdError, MbsdResult};
use crate::features::{FeaturePipeline, Features};
use crate::types::Sample;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Settling period after start-up, in timestamp ticks.
pub const STARTUP_DELAY_TICKS: u32 = 3000;

/// Activity classification states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityState {
    /// Filters settling after power-up or restart
    StartingUp,
    /// Baseline monitoring
    Idle,
    /// Sustained activity above the high threshold
    Active,
    /// Activity with a stable dominant frequency
    Rhythmic,
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityState::StartingUp => write!(f, "StartingUp"),
            ActivityState::Idle => write!(f, "Idle"),
            ActivityState::Active => write!(f, "Active"),
            ActivityState::Rhythmic => write!(f, "Rhythmic"),
        }
    }
}

/// Events accepted by [`Detector::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// New accelerometer reading
    Sample(Sample),
    /// Flush the filters and settle again
    Restart,
}

/// A state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    pub from: ActivityState,
    pub to: ActivityState,
}

/// Result of dispatching one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Recognised by the current state, no state change
    Handled,
    /// Not recognised by the current state
    Ignored,
    /// Recognised and caused a state change
    Transition(Transition),
}

impl Outcome {
    /// The transition, if one happened.
    pub fn transition(&self) -> Option<Transition> {
        match self {
            Outcome::Transition(t) => Some(*t),
            _ => None,
        }
    }
}

/// Detector status bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusFlags(u8);

impl StatusFlags {
    /// First sample seen, time base anchored to data time
    pub const TIME_ANCHORED: u8 = 0x01;
    /// An extremum candidate awaits confirmation
    pub const PEAK_PENDING: u8 = 0x02;
    /// At least one peak-peak period has been filtered
    pub const PERIOD_VALID: u8 = 0x04;
    /// A non-default sensitivity setting is active
    pub const CUSTOM_SETTING: u8 = 0x08;

    /// Raw bits.
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every bit of `mask` is set.
    pub fn contains(&self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    fn set(&mut self, mask: u8, on: bool) {
        if on {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }
}

/// Motion activity detector.
///
/// Owns every filter window and scalar of the algorithm. All memory is laid
/// out at construction; dispatch never allocates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detector {
    state: ActivityState,
    startup_delay: u32,
    params: ActivityParams,
    sensitivity: u8,
    pipeline: FeaturePipeline,
    last_timestamp: u32,
    start_tick: u32,
    z_activity: i16,
    z_rhythm: i16,
    flags: StatusFlags,
}

impl Detector {
    /// Create a detector with built-in defaults (setting `0`).
    pub fn new() -> Self {
        Self::with_config(&DetectorConfig::default())
    }

    /// Create a detector with custom timing and built-in activity defaults.
    pub fn with_config(config: &DetectorConfig) -> Self {
        let mut detector = Self {
            state: ActivityState::StartingUp,
            startup_delay: config.startup_delay_ticks,
            params: ActivityParams::default(),
            sensitivity: 0,
            pipeline: FeaturePipeline::new(),
            last_timestamp: 0,
            start_tick: 0,
            z_activity: 0,
            z_rhythm: 0,
            flags: StatusFlags::default(),
        };
        detector.enter(ActivityState::StartingUp);
        detector
    }

    /// Create a detector from a full configuration, applying its
    /// `active_setting`.
    pub fn from_config(config: &MbsdConfig) -> MbsdResult<Self> {
        let mut detector = Self::with_config(&config.detector);
        detector.apply_setting(&config.sensitivity, config.active_setting)?;
        Ok(detector)
    }

    /// Apply sensitivity setting `index` from `table`.
    ///
    /// Index `0` restores the built-in defaults. An unknown index also
    /// restores them and returns `UnknownSetting`.
    pub fn apply_setting(&mut self, table: &SensitivityTable, index: u8) -> MbsdResult<()> {
        match (index, table.get(index)) {
            (0, _) => {
                self.clear_setting();
                Ok(())
            }
            (_, Some(params)) => {
                self.params = *params;
                self.sensitivity = index;
                self.flags.set(StatusFlags::CUSTOM_SETTING, true);
                debug!(index, "sensitivity setting applied");
                Ok(())
            }
            (_, None) => {
                self.clear_setting();
                warn!(
                    index,
                    available = table.len(),
                    "unknown sensitivity setting, using defaults"
                );
                Err(MbsdError::UnknownSetting {
                    index,
                    available: table.len(),
                })
            }
        }
    }

    fn clear_setting(&mut self) {
        self.params = ActivityParams::default();
        self.sensitivity = 0;
        self.flags.set(StatusFlags::CUSTOM_SETTING, false);
    }

    /// Dispatch one sample and report any transition.
    pub fn on_sample(&mut self, sample: Sample) -> Option<Transition> {
        self.dispatch(&Event::Sample(sample)).transition()
    }

    /// Dispatch one event to completion.
    pub fn dispatch(&mut self, event: &Event) -> Outcome {
        let outcome = match *event {
            Event::Sample(sample) => {
                if !self.flags.contains(StatusFlags::TIME_ANCHORED) {
                    self.last_timestamp = sample.timestamp;
                    self.start_tick = sample.timestamp;
                    self.flags.set(StatusFlags::TIME_ANCHORED, true);
                }
                let outcome = self.handle_sample(&sample);
                self.last_timestamp = sample.timestamp;
                outcome
            }
            Event::Restart => self.handle_restart(),
        };

        if let Outcome::Transition(t) = outcome {
            debug!(
                from = %t.from,
                to = %t.to,
                timestamp = self.last_timestamp,
                "state transition"
            );
        }
        outcome
    }

    fn handle_sample(&mut self, sample: &Sample) -> Outcome {
        match self.state {
            ActivityState::StartingUp => {
                if self.elapsed() > self.startup_delay {
                    self.transition(ActivityState::Idle)
                } else {
                    Outcome::Handled
                }
            }
            ActivityState::Idle => {
                self.update_features(sample);
                if self.pipeline.is_warm() && self.stda() >= self.params.stda_high {
                    self.transition(ActivityState::Active)
                } else {
                    Outcome::Handled
                }
            }
            ActivityState::Active => {
                self.update_features(sample);
                if self.stda() < self.params.stda_low {
                    self.transition(ActivityState::Idle)
                } else if self.elapsed() > self.params.activity_ticks && self.rhythm_detected() {
                    self.transition(ActivityState::Rhythmic)
                } else {
                    Outcome::Handled
                }
            }
            ActivityState::Rhythmic => {
                self.update_features(sample);
                if self.stda() < self.params.stda_low {
                    self.transition(ActivityState::Idle)
                } else if !self.rhythm_detected() {
                    self.transition(ActivityState::Active)
                } else {
                    Outcome::Handled
                }
            }
        }
    }

    fn handle_restart(&mut self) -> Outcome {
        match self.state {
            ActivityState::StartingUp => Outcome::Ignored,
            _ => {
                self.pipeline.reset();
                self.sync_feature_flags();
                self.transition(ActivityState::StartingUp)
            }
        }
    }

    fn transition(&mut self, to: ActivityState) -> Outcome {
        let from = self.state;
        self.state = to;
        self.enter(to);
        Outcome::Transition(Transition { from, to })
    }

    fn enter(&mut self, state: ActivityState) {
        match state {
            ActivityState::StartingUp => {
                self.start_tick = self.last_timestamp;
            }
            ActivityState::Idle => {}
            ActivityState::Active => {
                self.start_tick = self.last_timestamp;
                self.z_activity = self.pipeline.features().axes[2];
            }
            ActivityState::Rhythmic => {
                self.start_tick = self.last_timestamp;
                self.z_rhythm = self.pipeline.features().axes[2];
            }
        }
    }

    fn update_features(&mut self, sample: &Sample) {
        self.pipeline.update(sample, self.params.peak_hysteresis);
        self.sync_feature_flags();
    }

    fn sync_feature_flags(&mut self) {
        self.flags
            .set(StatusFlags::PEAK_PENDING, self.pipeline.peak_pending());
        self.flags
            .set(StatusFlags::PERIOD_VALID, self.pipeline.period_valid());
    }

    fn rhythm_detected(&self) -> bool {
        let f = self.pipeline.features();
        let p = &self.params;
        self.pipeline.period_valid()
            && (p.period_low..=p.period_high).contains(&f.mean_period)
            && f.ratio_q12 <= p.ratio_high_q12
            && f.peak_count >= p.min_peaks
    }

    #[inline]
    fn stda(&self) -> i32 {
        self.pipeline.features().stda
    }

    /// Ticks since the current phase began, as of the last latched sample.
    pub fn elapsed(&self) -> u32 {
        self.last_timestamp.wrapping_sub(self.start_tick)
    }

    /// Current state.
    pub fn state(&self) -> ActivityState {
        self.state
    }

    /// Latest features.
    pub fn features(&self) -> &Features {
        self.pipeline.features()
    }

    /// Applied sensitivity setting, `0` for built-in defaults.
    pub fn sensitivity(&self) -> u8 {
        self.sensitivity
    }

    /// Parameters currently in force.
    pub fn params(&self) -> &ActivityParams {
        &self.params
    }

    /// Status bits.
    pub fn flags(&self) -> StatusFlags {
        self.flags
    }

    /// Timestamp of the last dispatched sample.
    pub fn last_timestamp(&self) -> u32 {
        self.last_timestamp
    }

    /// Timestamp the current phase started at.
    pub fn start_tick(&self) -> u32 {
        self.start_tick
    }

    /// Settling delay in ticks.
    pub fn startup_delay(&self) -> u32 {
        self.startup_delay
    }

    /// Filtered Z axis captured on entering `Active`.
    pub fn z_activity(&self) -> i16 {
        self.z_activity
    }

    /// Filtered Z axis captured on entering `Rhythmic`.
    pub fn z_rhythm(&self) -> i16 {
        self.z_rhythm
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: u32 = 20;

    fn escalating_params() -> ActivityParams {
        ActivityParams {
            stda_low: 50,
            stda_high: 100,
            activity_ticks: 2000,
            period_low: 15,
            period_high: 25,
            ratio_high_q12: 2048,
            min_peaks: 4,
            peak_hysteresis: 10,
        }
    }

    /// Feed `count` samples `STEP` ticks apart from `*t`, collecting
    /// transitions.
    fn feed(
        detector: &mut Detector,
        t: &mut u32,
        count: u32,
        mut make: impl FnMut(u32) -> (i16, i16, i16),
    ) -> Vec<Transition> {
        let mut transitions = Vec::new();
        for n in 0..count {
            let (x, y, z) = make(n);
            if let Some(tr) = detector.on_sample(Sample::new(*t, x, y, z)) {
                transitions.push(tr);
            }
            *t = t.wrapping_add(STEP);
        }
        transitions
    }

    fn wave(n: u32) -> (i16, i16, i16) {
        let phase = 2.0 * std::f64::consts::PI * (n % 20) as f64 / 20.0;
        (0, 0, 1000 + (300.0 * phase.sin()).round() as i16)
    }

    fn gravity(_: u32) -> (i16, i16, i16) {
        (0, 0, 1000)
    }

    #[test]
    fn test_end_to_end_startup() {
        let mut detector = Detector::new();
        assert_eq!(detector.state(), ActivityState::StartingUp);

        assert_eq!(detector.on_sample(Sample::at_rest(0)), None);
        assert_eq!(detector.on_sample(Sample::at_rest(1000)), None);
        assert_eq!(detector.on_sample(Sample::at_rest(3001)), None);
        assert_eq!(
            detector.on_sample(Sample::at_rest(3500)),
            Some(Transition {
                from: ActivityState::StartingUp,
                to: ActivityState::Idle,
            })
        );
        assert_eq!(detector.state(), ActivityState::Idle);
        assert_eq!(detector.last_timestamp(), 3500);
    }

    #[test]
    fn test_startup_gating_ignores_sample_values() {
        for (t0, amplitude) in [(0u32, 0i16), (12_345, 30_000), (u32::MAX - 1000, -20_000)] {
            let mut detector = Detector::new();
            let mut first_transition = None;
            for k in 0..20u32 {
                let t = t0.wrapping_add(250 * k);
                let v = if k % 2 == 0 { amplitude } else { -amplitude };
                let outcome = detector.dispatch(&Event::Sample(Sample::new(t, v, v, v)));
                if 250 * k <= STARTUP_DELAY_TICKS {
                    assert_eq!(outcome, Outcome::Handled, "t0 {} k {}", t0, k);
                }
                if outcome.transition().is_some() && first_transition.is_none() {
                    first_transition = Some(k);
                }
            }
            // The guard sees the previous sample's timestamp, 3250 ticks in.
            assert_eq!(first_transition, Some(14), "t0 {}", t0);
        }
    }

    #[test]
    fn test_construction_is_idempotent() {
        assert_eq!(Detector::new(), Detector::new());

        let config = MbsdConfig::parse(&MbsdConfig::example_yaml()).unwrap();
        let a = Detector::from_config(&config).unwrap();
        let b = Detector::from_config(&config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.sensitivity(), 1);

        let mut detector = Detector::new();
        let mut t = 0;
        let transitions = feed(&mut detector, &mut t, STARTUP_DELAY_TICKS / STEP + 1, wave);
        assert!(transitions.is_empty());
        assert_eq!(detector.state(), ActivityState::StartingUp);
    }

    #[test]
    fn test_starting_up_does_not_touch_features() {
        let mut detector = Detector::new();
        let mut t = 0;
        feed(&mut detector, &mut t, 100, wave);
        assert_eq!(detector.features(), &Features::default());
    }

    #[test]
    fn test_restart_ignored_while_starting_up() {
        let mut detector = Detector::new();
        assert_eq!(detector.dispatch(&Event::Restart), Outcome::Ignored);
        detector.on_sample(Sample::at_rest(10));
        assert_eq!(detector.dispatch(&Event::Restart), Outcome::Ignored);
        assert_eq!(detector.state(), ActivityState::StartingUp);
    }

    #[test]
    fn test_restart_from_idle_settles_again() {
        let mut detector = Detector::new();
        let mut t = 0;
        feed(&mut detector, &mut t, 200, gravity);
        assert_eq!(detector.state(), ActivityState::Idle);
        assert!(detector.features().sample_count > 0);

        let outcome = detector.dispatch(&Event::Restart);
        assert_eq!(
            outcome,
            Outcome::Transition(Transition {
                from: ActivityState::Idle,
                to: ActivityState::StartingUp,
            })
        );
        assert_eq!(detector.start_tick(), detector.last_timestamp());
        assert_eq!(detector.features().sample_count, 0);

        let transitions = feed(&mut detector, &mut t, 200, gravity);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to, ActivityState::Idle);
    }

    #[test]
    fn test_idle_handles_samples() {
        let mut detector = Detector::new();
        let mut t = 0;
        feed(&mut detector, &mut t, 200, gravity);
        let outcome = detector.dispatch(&Event::Sample(Sample::new(t, 0, 0, 1000)));
        assert_eq!(outcome, Outcome::Handled);
    }

    #[test]
    fn test_defaults_never_escalate() {
        let mut detector = Detector::new();
        let mut t = 0;
        feed(&mut detector, &mut t, 200, gravity);
        let transitions = feed(&mut detector, &mut t, 2000, |n| {
            let v = if n % 2 == 0 { 20_000 } else { -20_000 };
            (v, -v, v)
        });
        assert!(transitions.is_empty());
        assert_eq!(detector.state(), ActivityState::Idle);
        assert!(detector.features().stda > 10_000);
    }

    #[test]
    fn test_escalation_through_rhythmic_and_back() {
        let table = SensitivityTable::new(vec![escalating_params()]);
        let mut detector = Detector::new();
        detector.apply_setting(&table, 1).unwrap();

        let mut t = 0;
        let settle = feed(&mut detector, &mut t, 200, gravity);
        assert_eq!(settle.len(), 1);
        assert_eq!(detector.state(), ActivityState::Idle);

        let moving = feed(&mut detector, &mut t, 1500, wave);
        assert_eq!(
            moving.first(),
            Some(&Transition {
                from: ActivityState::Idle,
                to: ActivityState::Active,
            })
        );
        assert!(moving.contains(&Transition {
            from: ActivityState::Active,
            to: ActivityState::Rhythmic,
        }));
        assert_eq!(detector.state(), ActivityState::Rhythmic);
        assert!(detector.flags().contains(StatusFlags::PERIOD_VALID));
        assert!(detector.z_activity() > 900);
        assert!(detector.z_rhythm() > 900);

        let resting = feed(&mut detector, &mut t, 200, gravity);
        assert_eq!(resting.last().map(|tr| tr.to), Some(ActivityState::Idle));
        assert_eq!(detector.state(), ActivityState::Idle);
    }

    #[test]
    fn test_tick_wraparound_during_startup() {
        let mut detector = Detector::new();
        let mut t = u32::MAX - 1500;
        let transitions = feed(&mut detector, &mut t, 200, gravity);
        assert_eq!(transitions.len(), 1);
        assert_eq!(detector.state(), ActivityState::Idle);
    }

    #[test]
    fn test_custom_startup_delay() {
        let mut detector = Detector::with_config(&DetectorConfig {
            startup_delay_ticks: 100,
            ..Default::default()
        });
        let mut t = 0;
        // Guard passes once the latched timestamp reaches 120.
        let transitions = feed(&mut detector, &mut t, 8, gravity);
        assert_eq!(transitions.len(), 1);
        assert_eq!(detector.last_timestamp(), 140);
        assert_eq!(detector.startup_delay(), 100);
    }

    #[test]
    fn test_apply_setting() {
        let table = SensitivityTable::new(vec![escalating_params()]);
        let mut detector = Detector::new();

        detector.apply_setting(&table, 1).unwrap();
        assert_eq!(detector.sensitivity(), 1);
        assert_eq!(detector.params(), &escalating_params());
        assert!(detector.flags().contains(StatusFlags::CUSTOM_SETTING));

        let err = detector.apply_setting(&table, 2).unwrap_err();
        assert!(matches!(
            err,
            MbsdError::UnknownSetting {
                index: 2,
                available: 1
            }
        ));
        assert_eq!(detector.sensitivity(), 0);
        assert_eq!(detector.params(), &ActivityParams::default());
        assert!(!detector.flags().contains(StatusFlags::CUSTOM_SETTING));

        detector.apply_setting(&table, 1).unwrap();
        detector.apply_setting(&table, 0).unwrap();
        assert_eq!(detector.sensitivity(), 0);
    }

    #[test]
    fn test_from_config_rejects_unknown_setting() {
        let config = MbsdConfig {
            active_setting: 4,
            ..Default::default()
        };
        assert!(matches!(
            Detector::from_config(&config),
            Err(MbsdError::UnknownSetting { index: 4, .. })
        ));
    }

    #[test]
    fn test_time_anchor_flag() {
        let mut detector = Detector::new();
        assert!(!detector.flags().contains(StatusFlags::TIME_ANCHORED));
        detector.on_sample(Sample::at_rest(777));
        assert!(detector.flags().contains(StatusFlags::TIME_ANCHORED));
        assert_eq!(detector.start_tick(), 777);
        assert_eq!(detector.elapsed(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ActivityState::StartingUp.to_string(), "StartingUp");
        assert_eq!(ActivityState::Rhythmic.to_string(), "Rhythmic");
    }
}
