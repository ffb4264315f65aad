//! # Motion-Based Activity Detection Core
//!
//! This crate classifies motion activity from a stream of timestamped 3-axis
//! accelerometer samples using integer-only arithmetic, for processors
//! without an FPU running in their lowest-power mode.
//!
//! ## Overview
//!
//! - **Fixed-point kernel**: Q-format multiply/divide with round-half-away
//!   rounding and dynamic rescaling
//! - **Ring buffer**: fixed-capacity window with independent read and write
//!   cursors
//! - **Filters**: O(1) boxcar stages and cascaded unity-gain banks
//! - **Features**: short-term dynamic activity, low-pass magnitude,
//!   derivative and peak-peak period statistics
//! - **Detector**: state machine driven by delta-time guards computed from
//!   sample timestamps
//!
//! ## Signal Flow
//!
//! ```text
//! Sample → Detector::dispatch → (processing state?) → FeaturePipeline::update
//!        → guards on Features + elapsed ticks → Option<Transition>
//! ```
//!
//! ## Example
//!
//! ```rust
//! use mbsd_core::{ActivityState, Detector, Sample};
//!
//! let mut detector = Detector::new();
//! let mut t = 0u32;
//! while detector.state() == ActivityState::StartingUp {
//!     detector.on_sample(Sample::new(t, 0, 0, 1000));
//!     t += 20;
//! }
//! assert_eq!(detector.state(), ActivityState::Idle);
//! ```

pub mod config;
pub mod detector;
pub mod error;
pub mod features;
pub mod filter;
pub mod fixed;
pub mod observe;
pub mod ring;
pub mod types;

pub use config::{ActivityParams, ConfigError, DetectorConfig, MbsdConfig, SensitivityTable};
pub use detector::{
    ActivityState, Detector, Event, Outcome, StatusFlags, Transition, STARTUP_DELAY_TICKS,
};
pub use error::{FixedPointError, MbsdError, MbsdResult, RingError};
pub use features::{FeaturePipeline, Features, PeakKind};
pub use filter::{FilterBank, FilterStage};
pub use ring::RingBuffer;
pub use types::{Axis, Sample};
