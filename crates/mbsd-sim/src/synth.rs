//! # Synthetic Motion
//!
//! Seeded generator of accelerometer streams: gravity on one axis, optional
//! sinusoidal shaking on any axis, Gaussian sensor noise, and a fixed tick
//! step derived from the sample rate. A run is a list of [`Segment`]s, each
//! a number of samples of one kind of motion.
//!
//! ## Example
//!
//! ```rust
//! use mbsd_core::Axis;
//! use mbsd_sim::synth::{MotionGenerator, Segment, SynthConfig};
//!
//! let mut gen = MotionGenerator::new(SynthConfig { seed: 7, ..Default::default() }).unwrap();
//! let samples = gen.generate(&[
//!     Segment::rest(200),
//!     Segment::shake(500, Axis::X, 2.5, 400.0),
//! ]);
//! assert_eq!(samples.len(), 700);
//! assert_eq!(samples[1].timestamp - samples[0].timestamp, 20);
//! ```

use crate::error::{SimError, SimResult};
use mbsd_core::{Axis, Sample};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Kind of motion within a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Motion {
    /// Gravity and noise only
    Rest,
    /// Sinusoidal shaking added on one axis
    Shake {
        axis: Axis,
        frequency_hz: f64,
        amplitude: f64,
    },
}

/// A run of samples with the same motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Number of samples
    pub samples: u32,
    /// Motion during the segment
    pub motion: Motion,
}

impl Segment {
    /// `samples` at rest.
    pub fn rest(samples: u32) -> Self {
        Self {
            samples,
            motion: Motion::Rest,
        }
    }

    /// `samples` of shaking on `axis`.
    pub fn shake(samples: u32, axis: Axis, frequency_hz: f64, amplitude: f64) -> Self {
        Self {
            samples,
            motion: Motion::Shake {
                axis,
                frequency_hz,
                amplitude,
            },
        }
    }
}

/// Generator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// RNG seed
    pub seed: u64,
    /// Sample rate
    pub sample_rate_hz: u32,
    /// Timestamp ticks per second
    pub ticks_per_second: u32,
    /// Timestamp of the first sample
    pub start_timestamp: u32,
    /// Gravity in raw counts
    pub gravity: i16,
    /// Axis carrying gravity
    pub gravity_axis: Axis,
    /// Noise standard deviation in raw counts
    pub noise_std: f64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            sample_rate_hz: 50,
            ticks_per_second: 1000,
            start_timestamp: 0,
            gravity: 1000,
            gravity_axis: Axis::Z,
            noise_std: 2.0,
        }
    }
}

/// Seeded accelerometer stream generator.
#[derive(Debug)]
pub struct MotionGenerator {
    config: SynthConfig,
    rng: StdRng,
    noise: Normal<f64>,
    tick_step: u32,
    timestamp: u32,
    phase: f64,
}

impl MotionGenerator {
    /// Create a generator.
    ///
    /// Fails when the sample rate is zero or above the tick rate, or the
    /// noise deviation is negative or not finite.
    pub fn new(config: SynthConfig) -> SimResult<Self> {
        if config.sample_rate_hz == 0 || config.sample_rate_hz > config.ticks_per_second {
            return Err(SimError::InvalidGenerator(format!(
                "sample rate {} Hz with {} ticks/s",
                config.sample_rate_hz, config.ticks_per_second
            )));
        }
        let noise = Normal::new(0.0, config.noise_std)
            .map_err(|e| SimError::InvalidGenerator(format!("noise: {}", e)))?;

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            noise,
            tick_step: config.ticks_per_second / config.sample_rate_hz,
            timestamp: config.start_timestamp,
            phase: 0.0,
            config,
        })
    }

    /// Timestamp increment between samples.
    pub fn tick_step(&self) -> u32 {
        self.tick_step
    }

    /// Generator settings.
    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Produce the next sample with the given motion.
    pub fn next_sample(&mut self, motion: &Motion) -> Sample {
        let mut axes = [0.0f64; 3];
        axes[self.config.gravity_axis.index()] += self.config.gravity as f64;

        if let Motion::Shake {
            axis,
            frequency_hz,
            amplitude,
        } = *motion
        {
            axes[axis.index()] += amplitude * self.phase.sin();
            let step = TAU * frequency_hz / self.config.sample_rate_hz as f64;
            self.phase = (self.phase + step) % TAU;
        }

        for value in &mut axes {
            *value += self.noise.sample(&mut self.rng);
        }

        let sample = Sample::new(
            self.timestamp,
            to_counts(axes[0]),
            to_counts(axes[1]),
            to_counts(axes[2]),
        );
        self.timestamp = self.timestamp.wrapping_add(self.tick_step);
        sample
    }

    /// Produce every sample of `segments` in order. Shaking restarts at zero
    /// phase at each segment boundary.
    pub fn generate(&mut self, segments: &[Segment]) -> Vec<Sample> {
        let total: usize = segments.iter().map(|s| s.samples as usize).sum();
        let mut samples = Vec::with_capacity(total);
        for segment in segments {
            self.phase = 0.0;
            for _ in 0..segment.samples {
                samples.push(self.next_sample(&segment.motion));
            }
        }
        samples
    }
}

fn to_counts(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> SynthConfig {
        SynthConfig {
            noise_std: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_rest_without_noise_is_exact() {
        let mut gen = MotionGenerator::new(quiet()).unwrap();
        let samples = gen.generate(&[Segment::rest(10)]);
        for (n, s) in samples.iter().enumerate() {
            assert_eq!(*s, Sample::new(n as u32 * 20, 0, 0, 1000));
        }
    }

    #[test]
    fn test_same_seed_same_stream() {
        let segments = [Segment::rest(50), Segment::shake(100, Axis::Y, 3.0, 250.0)];
        let config = SynthConfig {
            seed: 42,
            ..Default::default()
        };
        let a = MotionGenerator::new(config.clone()).unwrap().generate(&segments);
        let b = MotionGenerator::new(config).unwrap().generate(&segments);
        assert_eq!(a, b);

        let c = MotionGenerator::new(SynthConfig {
            seed: 43,
            ..Default::default()
        })
        .unwrap()
        .generate(&segments);
        assert_ne!(a, c);
    }

    #[test]
    fn test_shake_amplitude_and_period() {
        let mut gen = MotionGenerator::new(quiet()).unwrap();
        // 2.5 Hz at 50 Hz: 20 samples per cycle.
        let samples = gen.generate(&[Segment::shake(40, Axis::X, 2.5, 300.0)]);
        let peak = samples.iter().map(|s| s.x).max().unwrap();
        let trough = samples.iter().map(|s| s.x).min().unwrap();
        assert_eq!(peak, 300);
        assert_eq!(trough, -300);
        assert_eq!(samples[0].x, 0);
        assert_eq!(samples[5].x, 300);
        assert_eq!(samples[25].x, 300);
        assert!(samples.iter().all(|s| s.z == 1000 && s.y == 0));
    }

    #[test]
    fn test_noise_statistics() {
        let mut gen = MotionGenerator::new(SynthConfig {
            seed: 1,
            noise_std: 10.0,
            ..Default::default()
        })
        .unwrap();
        let samples = gen.generate(&[Segment::rest(5000)]);
        let mean: f64 = samples.iter().map(|s| s.z as f64).sum::<f64>() / samples.len() as f64;
        let var: f64 = samples
            .iter()
            .map(|s| (s.z as f64 - mean).powi(2))
            .sum::<f64>()
            / samples.len() as f64;
        assert!((mean - 1000.0).abs() < 1.0, "mean {}", mean);
        assert!((var.sqrt() - 10.0).abs() < 1.0, "std {}", var.sqrt());
    }

    #[test]
    fn test_timestamps_wrap() {
        let mut gen = MotionGenerator::new(SynthConfig {
            start_timestamp: u32::MAX - 30,
            ..quiet()
        })
        .unwrap();
        let samples = gen.generate(&[Segment::rest(3)]);
        assert_eq!(samples[1].timestamp, u32::MAX - 10);
        assert_eq!(samples[2].timestamp, 9);
    }

    #[test]
    fn test_clamps_to_i16() {
        let mut gen = MotionGenerator::new(SynthConfig {
            gravity: 30_000,
            ..quiet()
        })
        .unwrap();
        let samples = gen.generate(&[Segment::shake(20, Axis::Z, 2.5, 10_000.0)]);
        assert_eq!(samples.iter().map(|s| s.z).max(), Some(i16::MAX));
    }

    #[test]
    fn test_invalid_settings() {
        let bad_rate = SynthConfig {
            sample_rate_hz: 0,
            ..Default::default()
        };
        assert!(matches!(
            MotionGenerator::new(bad_rate),
            Err(SimError::InvalidGenerator(_))
        ));

        let bad_noise = SynthConfig {
            noise_std: -1.0,
            ..Default::default()
        };
        assert!(MotionGenerator::new(bad_noise).is_err());
    }

    #[test]
    fn test_segments_serde() {
        let segment = Segment::shake(10, Axis::X, 1.5, 200.0);
        let json = serde_json::to_string(&segment).unwrap();
        assert!(json.contains("\"kind\":\"shake\""), "{}", json);
        let back: Segment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, segment);
    }
}
