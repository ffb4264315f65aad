//! # Feature Extraction
//!
//! Turns raw 3-axis samples into the activity and frequency features that
//! the state machine's guards read.
//!
//! ```text
//!            ┌──────────────┐
//!  x, y, z ─►│ axis windows │─► per-axis mean, stda (mean |x - mean|, summed)
//!     │      │  (39 wide)   │
//!     │      └──────────────┘
//!     ▼
//!  |xyz| ─► [LF bank 4x4] ─► [Δ over 2] ─► peak tracker ─┬─► [period bank 24x2]
//!                                                        └─► [deviation bank 24x2]
//!                                      ratio = mean deviation / mean period (Q12)
//! ```
//!
//! ## Peak tracking
//!
//! A change of derivative sign from positive to non-positive marks a maximum
//! candidate, from negative to non-negative a minimum candidate. Candidates
//! of the same kind merge, keeping the more extreme one. A candidate of the
//! opposite kind confirms the pending extremum once their amplitudes differ
//! by at least the hysteresis; smaller swings are treated as noise and
//! dropped. Each confirmed extremum contributes the interval (in samples)
//! since the previous confirmed extremum of the same kind to the period
//! bank, and the change of that interval to the deviation bank.
//!
//! All values are plain integers: axis values and magnitudes in raw counts,
//! periods in samples, the ratio in Q12.

use crate::filter::{FilterBank, FilterStage};
use crate::fixed::{
    div_round, isqrt, mul_round_uu, reciprocal_q24, saturate_i16, scale_q24, MAX_FX,
};
use crate::types::Sample;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Axis window width (39 samples at 50 Hz).
pub const AXIS_WINDOW: usize = 39;
/// Width of each low-frequency magnitude stage.
pub const LF_MAG_WIDTH: usize = 4;
/// Number of cascaded low-frequency magnitude stages.
pub const LF_MAG_ORDER: usize = 4;
/// Span of the derivative estimator.
pub const DERIVATIVE_WIDTH: usize = 2;
/// Width of each peak-statistic stage.
pub const PEAK_WIDTH: usize = 24;
/// Number of cascaded peak-statistic stages.
pub const PEAK_ORDER: usize = 2;

/// Kind of signal extremum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakKind {
    Maximum,
    Minimum,
}

impl PeakKind {
    fn index(self) -> usize {
        match self {
            PeakKind::Maximum => 0,
            PeakKind::Minimum => 1,
        }
    }
}

/// Feature snapshot after the last processed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Features {
    /// Short-term dynamic activity
    pub stda: i32,
    /// Per-axis window means, X/Y/Z
    pub axes: [i16; 3],
    /// Raw vector magnitude
    pub magnitude: i16,
    /// Low-pass filtered magnitude
    pub low_freq_mag: i16,
    /// Current derivative of the filtered magnitude
    pub derivative: i32,
    /// Derivative one sample earlier
    pub previous_derivative: i32,
    /// Mean peak-peak period, samples
    pub mean_period: i16,
    /// Mean peak-peak period deviation, samples
    pub mean_deviation: i16,
    /// `mean_deviation / mean_period`, Q12
    pub ratio_q12: i16,
    /// Confirmed extrema of either kind
    pub peak_count: u16,
    /// Samples processed since construction or reset
    pub sample_count: u32,
}

/// Extremum awaiting confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    kind: PeakKind,
    value: i16,
    index: u32,
}

impl Candidate {
    fn is_more_extreme_than(&self, other: &Candidate) -> bool {
        match self.kind {
            PeakKind::Maximum => self.value > other.value,
            PeakKind::Minimum => self.value < other.value,
        }
    }
}

/// Confirmed-peak history for one extremum kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct PeakTrack {
    count: u16,
    value: i16,
    index: Option<u32>,
    period: Option<i16>,
}

/// Filter state behind [`Features`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturePipeline {
    axes: [FilterStage<AXIS_WINDOW>; 3],
    axis_recip_q24: u32,
    low_freq_mag: FilterBank<LF_MAG_WIDTH, LF_MAG_ORDER>,
    derivative: FilterStage<DERIVATIVE_WIDTH>,
    periods: FilterBank<PEAK_WIDTH, PEAK_ORDER>,
    deviations: FilterBank<PEAK_WIDTH, PEAK_ORDER>,
    peaks: [PeakTrack; 2],
    pending: Option<Candidate>,
    period_valid: bool,
    warm: bool,
    features: Features,
}

impl FeaturePipeline {
    /// Create a pipeline with every window zeroed.
    pub fn new() -> Self {
        Self {
            axes: std::array::from_fn(|_| FilterStage::new()),
            axis_recip_q24: reciprocal_q24(AXIS_WINDOW),
            low_freq_mag: FilterBank::new(),
            derivative: FilterStage::new(),
            periods: FilterBank::new(),
            deviations: FilterBank::new(),
            peaks: [PeakTrack::default(); 2],
            pending: None,
            period_valid: false,
            warm: false,
            features: Features::default(),
        }
    }

    /// Zero every window and feature.
    pub fn reset(&mut self) {
        for stage in &mut self.axes {
            stage.reset();
        }
        self.low_freq_mag.reset();
        self.derivative.reset();
        self.periods.reset();
        self.deviations.reset();
        self.peaks = [PeakTrack::default(); 2];
        self.pending = None;
        self.period_valid = false;
        self.warm = false;
        self.features = Features::default();
    }

    /// Process one sample.
    ///
    /// `hysteresis` is the minimum swing between opposite extrema for the
    /// pending one to be confirmed.
    pub fn update(&mut self, sample: &Sample, hysteresis: i16) -> &Features {
        self.features.sample_count = self.features.sample_count.wrapping_add(1);
        let index = self.features.sample_count;
        if index >= AXIS_WINDOW as u32 {
            self.warm = true;
        }

        let mut stda = 0i32;
        for (k, value) in sample.axes().into_iter().enumerate() {
            let stage = &mut self.axes[k];
            let mean = saturate_i16(stage.update_mean(value, self.axis_recip_q24));
            let spread: i32 = stage
                .window()
                .iter()
                .map(|&v| (v as i32 - mean as i32).abs())
                .sum();
            stda += scale_q24(spread, self.axis_recip_q24);
            self.features.axes[k] = mean;
        }
        self.features.stda = stda;

        let mag = magnitude(sample);
        let low = self.low_freq_mag.update(mag);
        let previous = self.features.derivative;
        let current = self.derivative.update_difference(low);
        self.features.magnitude = mag;
        self.features.low_freq_mag = low;
        self.features.previous_derivative = previous;
        self.features.derivative = current;

        self.track_peaks(previous, current, low, index, hysteresis);

        self.features.mean_period = self.periods.output();
        self.features.mean_deviation = self.deviations.output();
        self.features.ratio_q12 =
            period_ratio_q12(self.features.mean_deviation, self.features.mean_period);

        trace!(
            index,
            stda = self.features.stda,
            lf = low,
            derivative = current,
            "features updated"
        );
        &self.features
    }

    fn track_peaks(&mut self, previous: i32, current: i32, value: i16, index: u32, hysteresis: i16) {
        let kind = if previous > 0 && current <= 0 {
            PeakKind::Maximum
        } else if previous < 0 && current >= 0 {
            PeakKind::Minimum
        } else {
            return;
        };
        let candidate = Candidate { kind, value, index };

        match self.pending {
            None => self.pending = Some(candidate),
            Some(pending) if pending.kind == kind => {
                if candidate.is_more_extreme_than(&pending) {
                    self.pending = Some(candidate);
                }
            }
            Some(pending) => {
                let swing = (value as i32 - pending.value as i32).abs();
                if swing >= hysteresis as i32 {
                    self.confirm(pending);
                    self.pending = Some(candidate);
                }
            }
        }
    }

    fn confirm(&mut self, peak: Candidate) {
        let track = &mut self.peaks[peak.kind.index()];
        track.count = track.count.saturating_add(1);
        track.value = peak.value;

        if let Some(previous) = track.index {
            let interval = peak.index.wrapping_sub(previous).min(MAX_FX as u32) as i16;
            self.periods.update(interval);
            if let Some(last) = track.period {
                let change = (interval as i32 - last as i32).abs();
                self.deviations.update(saturate_i16(change));
            }
            track.period = Some(interval);
            self.period_valid = true;
        }
        track.index = Some(peak.index);
        self.features.peak_count = self.features.peak_count.saturating_add(1);

        trace!(
            kind = ?peak.kind,
            value = peak.value,
            index = peak.index,
            period = ?track.period,
            "peak confirmed"
        );
    }

    /// Latest feature snapshot.
    pub fn features(&self) -> &Features {
        &self.features
    }

    /// Whether an extremum candidate awaits confirmation.
    pub fn peak_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether at least one peak-peak period has been filtered.
    pub fn period_valid(&self) -> bool {
        self.period_valid
    }

    /// Whether the axis windows hold only real samples, so `stda` no longer
    /// reflects the zeros they were primed with.
    pub fn is_warm(&self) -> bool {
        self.warm
    }

    /// Confirmed extrema of one kind.
    pub fn peak_count(&self, kind: PeakKind) -> u16 {
        self.peaks[kind.index()].count
    }
}

impl Default for FeaturePipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Euclidean norm of the raw vector, saturated to `i16`.
pub fn magnitude(sample: &Sample) -> i16 {
    let sum_sq: u64 = sample
        .axes()
        .iter()
        .map(|v| {
            let a = v.unsigned_abs();
            mul_round_uu(a, a, 0) as u64
        })
        .sum();
    isqrt(sum_sq).min(MAX_FX as u32) as i16
}

/// Deviation-to-period ratio in Q12.
///
/// Zero while no period is available; saturates where the ratio leaves the
/// Q3.12 range.
fn period_ratio_q12(deviation: i16, period: i16) -> i16 {
    if period <= 0 {
        return 0;
    }
    if deviation as i32 >= 8 * period as i32 {
        return MAX_FX;
    }
    div_round(deviation, period, 12)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Gravity on Z plus a sinusoid of `period` samples and `amplitude` counts.
    fn wave(n: u32, period: u32, amplitude: f64) -> Sample {
        let phase = 2.0 * std::f64::consts::PI * (n % period) as f64 / period as f64;
        let z = 1000 + (amplitude * phase.sin()).round() as i16;
        Sample::new(n * 20, 0, 0, z)
    }

    #[test]
    fn test_rest_produces_no_features() {
        let mut pipeline = FeaturePipeline::new();
        for n in 0..100 {
            pipeline.update(&Sample::at_rest(n * 20), 0);
        }
        let f = pipeline.features();
        assert_eq!(f.stda, 0);
        assert_eq!(f.low_freq_mag, 0);
        assert_eq!(f.mean_period, 0);
        assert_eq!(f.ratio_q12, 0);
        assert_eq!(f.peak_count, 0);
        assert_eq!(f.sample_count, 100);
        assert!(!pipeline.peak_pending());
        assert!(pipeline.is_warm());
    }

    #[test]
    fn test_warm_after_one_axis_window() {
        let mut pipeline = FeaturePipeline::new();
        for n in 1..AXIS_WINDOW as u32 {
            pipeline.update(&Sample::new(n, 0, 0, 1000), 0);
            assert!(!pipeline.is_warm());
        }
        // Partly filled windows read as activity.
        assert!(pipeline.features().stda > 0);

        pipeline.update(&Sample::new(39, 0, 0, 1000), 0);
        assert!(pipeline.is_warm());
        assert_eq!(pipeline.features().stda, 0);
    }

    #[test]
    fn test_constant_gravity_is_quiet() {
        let mut pipeline = FeaturePipeline::new();
        for n in 0..(AXIS_WINDOW as u32 + 10) {
            pipeline.update(&Sample::new(n * 20, 0, 0, 1000), 0);
        }
        let f = pipeline.features();
        assert_eq!(f.axes, [0, 0, 1000]);
        assert_eq!(f.stda, 0);
        assert_eq!(f.magnitude, 1000);
        assert_eq!(f.low_freq_mag, 1000);
        assert_eq!(f.derivative, 0);
    }

    #[test]
    fn test_constant_full_scale_input_is_quiet() {
        for (x, y, z) in [(1001, -1023, 16_010), (-16_010, 30_001, -30_001), (i16::MIN, i16::MAX, 7)] {
            let mut pipeline = FeaturePipeline::new();
            for n in 0..100 {
                pipeline.update(&Sample::new(n * 20, x, y, z), 0);
            }
            let f = pipeline.features();
            assert_eq!(f.axes, [x, y, z]);
            assert_eq!(f.stda, 0, "({}, {}, {})", x, y, z);
        }
    }

    #[test]
    fn test_shaking_raises_activity() {
        let mut pipeline = FeaturePipeline::new();
        for n in 0..200u32 {
            let x = if n % 2 == 0 { 500 } else { -500 };
            pipeline.update(&Sample::new(n * 20, x, 0, 1000), 0);
        }
        let f = pipeline.features();
        assert!(f.stda > 400, "stda {}", f.stda);
        assert!(f.axes[0].abs() <= 13, "x mean {}", f.axes[0]);
    }

    #[test]
    fn test_periodic_motion_yields_period() {
        let mut pipeline = FeaturePipeline::new();
        for n in 0..1000 {
            pipeline.update(&wave(n, 20, 300.0), 10);
        }
        let f = *pipeline.features();
        assert!(pipeline.period_valid());
        assert!((f.mean_period - 20).abs() <= 1, "period {}", f.mean_period);
        assert_eq!(f.mean_deviation, 0);
        assert_eq!(f.ratio_q12, 0);
        assert!(pipeline.peak_count(PeakKind::Maximum) >= 45);
        assert!(pipeline.peak_count(PeakKind::Minimum) >= 45);
        assert_eq!(
            f.peak_count,
            pipeline.peak_count(PeakKind::Maximum) + pipeline.peak_count(PeakKind::Minimum)
        );
    }

    #[test]
    fn test_hysteresis_rejects_small_swings() {
        let mut pipeline = FeaturePipeline::new();
        for n in 0..400 {
            pipeline.update(&wave(n, 20, 3.0), 50);
        }
        assert_eq!(pipeline.features().peak_count, 0);
        assert!(!pipeline.period_valid());
        assert_eq!(pipeline.features().mean_period, 0);
    }

    #[test]
    fn test_reset_matches_new() {
        let mut pipeline = FeaturePipeline::new();
        for n in 0..300 {
            pipeline.update(&wave(n, 16, 200.0), 5);
        }
        assert_ne!(pipeline, FeaturePipeline::new());
        pipeline.reset();
        assert_eq!(pipeline, FeaturePipeline::new());
    }

    #[test]
    fn test_magnitude() {
        assert_eq!(magnitude(&Sample::new(0, 3, 4, 0)), 5);
        assert_eq!(magnitude(&Sample::new(0, -3, 0, -4)), 5);
        assert_eq!(magnitude(&Sample::new(0, i16::MIN, i16::MIN, i16::MIN)), MAX_FX);
    }

    #[test]
    fn test_ratio_never_divides_by_zero() {
        assert_eq!(period_ratio_q12(0, 0), 0);
        assert_eq!(period_ratio_q12(100, 0), 0);
        assert_eq!(period_ratio_q12(10, 20), 2048);
        assert_eq!(period_ratio_q12(20, 20), 4096);
        assert_eq!(period_ratio_q12(200, 10), MAX_FX);
        assert!(period_ratio_q12(32767, 4096) > 0);
    }
}
