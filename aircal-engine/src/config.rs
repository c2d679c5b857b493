//! Engine configuration
//!
//! The original control loop read its options out of a loosely-typed map;
//! here every recognized option is a named, typed, defaulted field,
//! validated once at construction. Invalid values are clamped with a
//! warning rather than rejected, so a bad options entry degrades the
//! entity instead of killing it.

/// Configuration for one [`OffsetEngine`](crate::engine::OffsetEngine)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Symmetric clamp applied to every computed offset, in Celsius
    pub max_offset: f32,

    /// Whether the learned model contributes to calculations
    pub enable_learning: bool,

    /// Entity id of the power sensor; presence enables hysteresis learning
    pub power_sensor: Option<String>,

    /// Below this draw the AC counts as idle (watts)
    pub power_idle_threshold: f32,

    /// Below this draw the AC counts as low (watts)
    pub power_min_threshold: f32,

    /// Below this draw the AC counts as moderate, at or above as high
    pub power_max_threshold: f32,

    /// Seconds between periodic persistence saves
    pub save_interval_secs: u64,

    /// Lower bound accepted for feedback offsets, Celsius
    pub validation_offset_min: f32,
    /// Upper bound accepted for feedback offsets, Celsius
    pub validation_offset_max: f32,

    /// Lower bound accepted for feedback room temperatures, Celsius
    pub validation_temp_min: f32,
    /// Upper bound accepted for feedback room temperatures, Celsius
    pub validation_temp_max: f32,

    /// Minimum seconds between accepted feedback samples
    pub validation_rate_limit_secs: u64,

    /// Entity id of the outdoor sensor; presence enables seasonal delegation
    pub outdoor_sensor: Option<String>,

    /// AC/room convergence delta that marks a stable calibration reading
    ///
    /// Hardware-coupled default (evaporator-coil sensors converge within
    /// ~2 degrees at rest); configurable, not structural.
    pub calibration_stable_delta: f32,

    /// Power-closeness window used by the learner's similarity match, watts
    pub power_similarity_window: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_offset: 5.0,
            enable_learning: false,
            power_sensor: None,
            // Typical mini-split draw bands: <50W standby, <100W fan,
            // <250W partial duty, above that full cooling
            power_idle_threshold: 50.0,
            power_min_threshold: 100.0,
            power_max_threshold: 250.0,
            save_interval_secs: 3600,
            validation_offset_min: -10.0,
            validation_offset_max: 10.0,
            validation_temp_min: 10.0,
            validation_temp_max: 40.0,
            validation_rate_limit_secs: 60,
            outdoor_sensor: None,
            calibration_stable_delta: 2.0,
            power_similarity_window: 150.0,
        }
    }
}

impl EngineConfig {
    /// Clamp interval for `save_interval_secs`, seconds
    pub const SAVE_INTERVAL_BOUNDS: (u64, u64) = (300, 86_400);

    /// Clamp interval for `max_offset`, Celsius
    pub const MAX_OFFSET_BOUNDS: (f32, f32) = (0.1, 10.0);

    /// Apply the clamp-and-warn policy and return the cleaned config
    ///
    /// Out-of-bounds numeric options are clamped, power thresholds are
    /// reordered ascending if misconfigured, and each correction logs a
    /// warning. Never fails.
    pub fn validated(mut self) -> Self {
        let (lo, hi) = Self::MAX_OFFSET_BOUNDS;
        if !self.max_offset.is_finite() || self.max_offset < lo || self.max_offset > hi {
            let clamped = if self.max_offset.is_finite() {
                self.max_offset.clamp(lo, hi)
            } else {
                5.0
            };
            log::warn!(
                "max_offset {} out of bounds, clamping to {}",
                self.max_offset,
                clamped
            );
            self.max_offset = clamped;
        }

        let (lo, hi) = Self::SAVE_INTERVAL_BOUNDS;
        if self.save_interval_secs < lo || self.save_interval_secs > hi {
            let clamped = self.save_interval_secs.clamp(lo, hi);
            log::warn!(
                "save_interval {}s out of bounds, clamping to {}s",
                self.save_interval_secs,
                clamped
            );
            self.save_interval_secs = clamped;
        }

        let mut thresholds = [
            self.power_idle_threshold,
            self.power_min_threshold,
            self.power_max_threshold,
        ];
        if thresholds.windows(2).any(|w| w[0] > w[1]) {
            thresholds.sort_by(|a, b| a.partial_cmp(b).unwrap_or(core::cmp::Ordering::Equal));
            log::warn!(
                "power thresholds not ascending, reordering to {:?}",
                thresholds
            );
            self.power_idle_threshold = thresholds[0];
            self.power_min_threshold = thresholds[1];
            self.power_max_threshold = thresholds[2];
        }

        if self.validation_offset_min > self.validation_offset_max {
            log::warn!("validation offset bounds inverted, swapping");
            core::mem::swap(
                &mut self.validation_offset_min,
                &mut self.validation_offset_max,
            );
        }
        if self.validation_temp_min > self.validation_temp_max {
            log::warn!("validation temperature bounds inverted, swapping");
            core::mem::swap(&mut self.validation_temp_min, &mut self.validation_temp_max);
        }

        self
    }
}
