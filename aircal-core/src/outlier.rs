//! Statistical Outlier Gate for Feedback Samples
//!
//! ## Overview
//!
//! Single bad readings happen: a power meter glitches during a brown-out, a
//! temperature sensor reports a spike while the AC blows directly on it.
//! The engine gates every feedback sample through an [`OutlierGate`] before
//! it reaches the learners so one poisoned reading cannot drag the model.
//!
//! The gate is pluggable. [`RollingZScore`] is the default: a rolling
//! window of accepted values, with new values flagged when they sit more
//! than `threshold` standard deviations from the window mean.
//!
//! ## Bootstrap Leniency
//!
//! With fewer than `min_samples` accepted values there is no meaningful
//! distribution to test against, so nothing is flagged. The learners'
//! own calibration phase covers that window.

use crate::buffer::CircularBuffer;

/// Default number of samples required before the gate starts flagging
pub const DEFAULT_MIN_SAMPLES: usize = 10;

/// Default z-score threshold
pub const DEFAULT_THRESHOLD: f32 = 3.0;

/// Absolute deviation tolerated against a zero-variance history
const FLATLINE_TOLERANCE: f32 = 0.5;

/// Pluggable outlier gate consulted before a sample reaches a learner
pub trait OutlierGate {
    /// Whether `value` is a statistical outlier against recorded history
    fn is_outlier(&mut self, value: f32) -> bool;

    /// Record an accepted value into the history
    fn record(&mut self, value: f32);

    /// Drop all recorded history
    fn reset(&mut self);
}

/// Rolling z-score outlier detector over a bounded window
#[derive(Debug, Clone)]
pub struct RollingZScore<const N: usize> {
    history: CircularBuffer<f32, N>,
    threshold: f32,
    min_samples: usize,
}

impl<const N: usize> RollingZScore<N> {
    /// Create a detector with the default threshold and minimum
    pub fn new() -> Self {
        Self {
            history: CircularBuffer::new(),
            threshold: DEFAULT_THRESHOLD,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }

    /// Override the z-score threshold
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.abs().max(0.1);
        self
    }

    /// Override the minimum sample count before flagging starts
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(2);
        self
    }

    fn mean_and_stddev(&self) -> Option<(f32, f32)> {
        if self.history.is_empty() {
            return None;
        }

        let n = self.history.len() as f32;
        let mean: f32 = self.history.iter().sum::<f32>() / n;
        let variance: f32 = self
            .history
            .iter()
            .map(|v| {
                let d = v - mean;
                d * d
            })
            .sum::<f32>()
            / n;

        Some((mean, variance.sqrt()))
    }
}

impl<const N: usize> OutlierGate for RollingZScore<N> {
    fn is_outlier(&mut self, value: f32) -> bool {
        if !value.is_finite() {
            return true;
        }

        if self.history.len() < self.min_samples {
            return false;
        }

        let Some((mean, stddev)) = self.mean_and_stddev() else {
            return false;
        };

        if stddev < f32::EPSILON {
            // Constant history: only a real departure counts
            return (value - mean).abs() > FLATLINE_TOLERANCE;
        }

        let z = (value - mean).abs() / stddev;
        if z > self.threshold {
            log::debug!("outlier flagged: value {} at z-score {:.2}", value, z);
            return true;
        }
        false
    }

    fn record(&mut self, value: f32) {
        if value.is_finite() {
            self.history.push(value);
        }
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}

impl<const N: usize> Default for RollingZScore<N> {
    fn default() -> Self {
        Self::new()
    }
}
