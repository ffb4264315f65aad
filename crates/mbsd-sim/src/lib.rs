//! # Offline Validation Harness
//!
//! Drives [`mbsd_core::Detector`] from recorded or synthetic data at
//! arbitrary speed, the same way the device drives it from its sensor.
//!
//! - **trace**: CSV and packed binary sample files
//! - **synth**: seeded rest/shake motion generator with Gaussian noise
//! - **handoff**: lock-free SPSC queue between a producer thread and dispatch
//! - **replay**: runs a detector over a stream and reports what it did
//!
//! ## Example
//!
//! ```rust
//! use mbsd_core::{ActivityState, Detector};
//! use mbsd_sim::replay::replay;
//! use mbsd_sim::synth::{MotionGenerator, Segment, SynthConfig};
//!
//! let mut gen = MotionGenerator::new(SynthConfig::default()).unwrap();
//! let samples = gen.generate(&[Segment::rest(300)]);
//!
//! let mut detector = Detector::new();
//! let report = replay(&mut detector, &samples);
//! assert_eq!(report.final_state, ActivityState::Idle);
//! ```

pub mod error;
pub mod handoff;
pub mod replay;
pub mod synth;
pub mod trace;

pub use error::{SimError, SimResult};
pub use handoff::{channel, SampleConsumer, SampleProducer};
pub use replay::{replay, replay_threaded, ReplayReport, TransitionRecord};
pub use synth::{Motion, MotionGenerator, Segment, SynthConfig};
pub use trace::{TraceFormat, RECORD_SIZE};
