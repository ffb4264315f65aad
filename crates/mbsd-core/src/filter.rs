//! # Boxcar Filter Stages
//!
//! O(1)-per-sample moving-window filters built on [`RingBuffer`]. The running
//! sum is updated incrementally: the value about to leave the window is read
//! through the ring's read cursor and subtracted, the incoming sample is
//! written through the write cursor and added.
//!
//! - [`FilterStage`]: one window with a running aggregate and a per-stage
//!   output transform (sum, mean or first difference)
//! - [`FilterBank`]: `O` equal-width stages in cascade, each normalised to
//!   unity DC gain, giving a multi-pole low-pass with sharper roll-off than a
//!   single boxcar
//!
//! ```text
//!  x ──► [Σ/W] ──► [Σ/W] ──► ... ──► [Σ/W] ──► y      (O stages)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use mbsd_core::filter::{FilterBank, FilterStage};
//!
//! let mut stage: FilterStage<3> = FilterStage::new();
//! stage.update(5);
//! stage.update(7);
//! assert_eq!(stage.update(1), 13);
//! assert_eq!(stage.update(0), 8); // the 5 left the window
//!
//! let mut bank: FilterBank<4, 2> = FilterBank::new();
//! let mut y = 0;
//! for _ in 0..8 {
//!     y = bank.update(1000);
//! }
//! assert_eq!(y, 1000);
//! ```

use crate::fixed::{reciprocal_q14, saturate_i16, scale_q14, scale_q24};
use crate::ring::RingBuffer;

/// Single boxcar window of width `W`.
///
/// `aggregate` always equals the sum of the `W` most recent inputs, counting
/// the zeros the window is primed with at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterStage<const W: usize> {
    /// Running sum of the window
    aggregate: i32,
    /// Last computed output
    output: i32,
    /// Sliding window
    buffer: RingBuffer<W>,
}

impl<const W: usize> FilterStage<W> {
    /// Create a stage whose window holds `W` zeros.
    pub fn new() -> Self {
        let mut buffer = RingBuffer::new();
        buffer.prime(0);
        Self {
            aggregate: 0,
            output: 0,
            buffer,
        }
    }

    /// Refill the window with zeros and clear the aggregate and output.
    pub fn reset(&mut self) {
        self.buffer.prime(0);
        self.aggregate = 0;
        self.output = 0;
    }

    /// Slide the window by one sample and return the evicted value.
    ///
    /// Only the aggregate is maintained; `output` is left untouched.
    #[inline]
    pub fn slide(&mut self, sample: i16) -> i16 {
        let evicted = self.buffer.read_forward();
        self.aggregate -= evicted as i32;
        self.buffer.write_forward(sample);
        self.aggregate += sample as i32;
        evicted
    }

    /// Slide the window and output the raw window sum.
    #[inline]
    pub fn update(&mut self, sample: i16) -> i32 {
        self.slide(sample);
        self.output = self.aggregate;
        self.output
    }

    /// Slide the window and output the sum scaled by a Q14 coefficient.
    ///
    /// With `coeff_q14 = reciprocal_q14(W)` this is the window mean.
    #[inline]
    pub fn update_scaled(&mut self, sample: i16, coeff_q14: i16) -> i32 {
        self.slide(sample);
        self.output = scale_q14(self.aggregate, coeff_q14);
        self.output
    }

    /// Slide the window and output the sum scaled by a Q24 coefficient.
    ///
    /// With `coeff_q24 = reciprocal_q24(W)` this is the window mean rounded
    /// half away from zero, exact for wide windows of full-scale input.
    #[inline]
    pub fn update_mean(&mut self, sample: i16, coeff_q24: u32) -> i32 {
        self.slide(sample);
        self.output = scale_q24(self.aggregate, coeff_q24);
        self.output
    }

    /// Slide the window and output `sample - evicted`, the change across the
    /// window.
    #[inline]
    pub fn update_difference(&mut self, sample: i16) -> i32 {
        let evicted = self.slide(sample);
        self.output = sample as i32 - evicted as i32;
        self.output
    }

    /// Running window sum.
    pub fn aggregate(&self) -> i32 {
        self.aggregate
    }

    /// Output of the last update.
    pub fn output(&self) -> i32 {
        self.output
    }

    /// Values currently in the window, in slot order.
    pub fn window(&self) -> &[i16] {
        self.buffer.as_slice()
    }

    /// Window width.
    pub fn width(&self) -> usize {
        W
    }
}

impl<const W: usize> Default for FilterStage<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// `O` cascaded boxcar stages of width `W` with unity DC gain.
///
/// Each stage's sum is multiplied by the Q14 reciprocal of `W` (after dynamic
/// rescaling, see [`scale_q14`]) and saturated to `i16` before feeding the
/// next stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterBank<const W: usize, const O: usize> {
    stages: [FilterStage<W>; O],
    recip_q14: i16,
}

impl<const W: usize, const O: usize> FilterBank<W, O> {
    /// Create a bank with every stage primed with zeros.
    pub fn new() -> Self {
        const { assert!(O >= 1, "filter bank needs at least one stage") };
        Self {
            stages: std::array::from_fn(|_| FilterStage::new()),
            recip_q14: reciprocal_q14(W),
        }
    }

    /// Reset every stage.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    /// Push one sample through the cascade and return the last stage output.
    pub fn update(&mut self, sample: i16) -> i16 {
        let mut value = sample;
        for stage in &mut self.stages {
            value = saturate_i16(stage.update_scaled(value, self.recip_q14));
        }
        value
    }

    /// Output of the last stage.
    pub fn output(&self) -> i16 {
        self.stages
            .last()
            .map(|stage| saturate_i16(stage.output()))
            .unwrap_or(0)
    }

    /// Stage `k` of the cascade, `0` being the input side.
    pub fn stage(&self, k: usize) -> Option<&FilterStage<W>> {
        self.stages.get(k)
    }

    /// Number of cascaded stages.
    pub fn order(&self) -> usize {
        O
    }

    /// Samples needed for a step at the input to fully reach the output.
    pub fn settling_samples(&self) -> usize {
        O * (W - 1) + 1
    }

    /// Q14 reciprocal applied at each stage.
    pub fn recip_q14(&self) -> i16 {
        self.recip_q14
    }
}

impl<const W: usize, const O: usize> Default for FilterBank<W, O> {
    fn default() -> Self {
        Self::new()
    }
}
