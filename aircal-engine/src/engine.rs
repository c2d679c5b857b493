//! The Offset Engine
//!
//! ## Overview
//!
//! Orchestrates everything the crates around it provide: rule-based offset
//! calculation, the calibration bootstrap, power-transition detection,
//! hysteresis classification, learned-offset blending, confidence scoring,
//! feedback validation and the dashboard metric cache.
//!
//! ## Calibration
//!
//! Until the learner holds [`MIN_SAMPLES_FOR_ACTIVE_CONTROL`] samples the
//! engine is in the calibration phase: it trusts the raw AC/room
//! difference only when the AC is demonstrably at rest (idle power, both
//! sensors converged) and otherwise reuses the last such stable reading.
//! Exiting calibration is purely a function of sample count and is
//! irreversible until an explicit [`reset`](OffsetEngine::reset).
//!
//! ## Failure Semantics
//!
//! `calculate_offset` never fails: any error inside the normal pipeline is
//! converted to the safe fallback result (offset 0.0, confidence 0.0).
//! `record_actual_performance` never fails: every rejection is a logged
//! early return. The reason string on the result is the primary
//! diagnostic channel an operator sees; confidence is the trust signal.

use aircal_core::outlier::{OutlierGate, RollingZScore};
use aircal_core::sanitize;
use aircal_core::time::{SystemClock, TimeSource, Timestamp};
use aircal_core::errors::{EngineError, EngineResult};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::hysteresis::{HysteresisLearner, TransitionKind};
use crate::learner::{LearnedSample, LearnerStatistics, OffsetLearner, PredictQuery};
use crate::metrics::{MetricsCache, MEMORY_TTL_MS, PERFORMANCE_TTL_MS, TREND_TTL_MS};
use crate::types::{
    AdjustmentSource, HysteresisState, Mode, OffsetInput, OffsetResult, PowerState,
};

/// Learning samples required before the engine leaves calibration
pub const MIN_SAMPLES_FOR_ACTIVE_CONTROL: usize = 10;

/// Fixed weight given to a learned prediction when blending
const LEARNING_PREDICTION_WEIGHT: f32 = 0.8;

/// Blending only happens above this weight
const MIN_PREDICTION_WEIGHT: f32 = 0.1;

/// Humidity contribution below this magnitude is reported without a number
const HUMIDITY_REPORT_THRESHOLD_C: f32 = 0.05;

/// Outdoor differential beyond which contextual multipliers kick in
const OUTDOOR_DIFFERENTIAL_C: f32 = 10.0;

/// Window size of the default feedback outlier gate
const OUTLIER_WINDOW: usize = 32;

/// Seasonal adjustment collaborator
///
/// Implemented outside this crate; the engine delegates the rule-based
/// base offset to it when an outdoor sensor is configured and degrades to
/// the raw difference when the call fails.
pub trait SeasonalAdjuster {
    /// Adjust the base offset for the current season/outdoor conditions
    fn adjust(
        &self,
        base_offset: f32,
        input: &OffsetInput,
        thermal_window: Option<(f32, f32)>,
    ) -> EngineResult<f32>;

    /// Additional confidence contributed by seasonal data
    fn confidence_boost(&self) -> f32 {
        0.0
    }

    /// Optional reason-string phrase describing the adjustment
    fn describe(&self) -> Option<String> {
        None
    }
}

/// Callback yielding the thermal subsystem's opaque persisted payload
pub type ThermalDataCb = Box<dyn Fn() -> Option<Value>>;

/// Callback restoring the thermal subsystem's opaque persisted payload
pub type RestoreThermalCb = Box<dyn Fn(Value)>;

/// Snapshot of engine + sub-learner state handed to persistence
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    /// Whether learning was enabled at snapshot time
    pub enable_learning: bool,
    /// Learner sample buffer, JSON-safe
    pub learner_data: Value,
    /// Hysteresis buffers, present when a power sensor is configured
    pub hysteresis_data: Option<Value>,
    /// Opaque seasonal payload carried through without interpretation
    pub seasonal_data: Option<Value>,
}

/// State restored from a persisted file
#[derive(Debug, Clone, Default)]
pub struct PersistedState {
    /// Persisted learning-enabled flag
    pub enable_learning: Option<bool>,
    /// Learner sample buffer
    pub learner_data: Option<Value>,
    /// Hysteresis buffers
    pub hysteresis_data: Option<Value>,
    /// Opaque seasonal payload
    pub seasonal_data: Option<Value>,
    /// Opaque thermal payload
    pub thermal_data: Option<Value>,
}

/// Aggregated dashboard metrics
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardMetrics {
    /// Samples currently held by the learner
    pub samples_collected: usize,
    /// Mean prediction accuracy over recent samples
    pub avg_accuracy: f64,
    /// Confidence the engine places in predictions
    pub prediction_confidence: f64,
    /// Drift of recent actual offsets against the overall mean
    pub offset_trend: f64,
    /// Approximate learner memory footprint
    pub memory_usage_kb: f64,
    /// Duration of the last persistence save, if any
    pub persistence_latency_ms: Option<f64>,
}

/// Adaptive offset engine for one climate entity
pub struct OffsetEngine {
    config: EngineConfig,
    learner: OffsetLearner,
    hysteresis: HysteresisLearner,
    outlier_gate: Box<dyn OutlierGate>,
    seasonal: Option<Box<dyn SeasonalAdjuster>>,
    time: Box<dyn TimeSource>,

    stable_calibration_offset: Option<f32>,
    last_power_state: Option<PowerState>,
    adjustment_source: AdjustmentSource,
    learning_paused: bool,
    last_feedback_ts: Option<Timestamp>,
    seasonal_snapshot: Option<Value>,

    metrics: MetricsCache,
    last_save_latency_ms: Option<u64>,

    get_thermal_data: Option<ThermalDataCb>,
    restore_thermal_data: Option<RestoreThermalCb>,
}

impl OffsetEngine {
    /// Engine with the given configuration, system clock and default gate
    pub fn new(config: EngineConfig) -> Self {
        let config = config.validated();
        let learner = OffsetLearner::new(config.power_similarity_window);

        Self {
            learner,
            hysteresis: HysteresisLearner::new(),
            outlier_gate: Box::new(RollingZScore::<OUTLIER_WINDOW>::new()),
            seasonal: None,
            time: Box::new(SystemClock),
            stable_calibration_offset: None,
            last_power_state: None,
            adjustment_source: AdjustmentSource::None,
            learning_paused: false,
            last_feedback_ts: None,
            seasonal_snapshot: None,
            metrics: MetricsCache::new(),
            last_save_latency_ms: None,
            get_thermal_data: None,
            restore_thermal_data: None,
            config,
        }
    }

    /// Replace the time source (tests use a fixed clock)
    pub fn with_time_source(mut self, time: Box<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    /// Replace the feedback outlier gate
    pub fn with_outlier_gate(mut self, gate: Box<dyn OutlierGate>) -> Self {
        self.outlier_gate = gate;
        self
    }

    /// Attach a seasonal adjustment collaborator
    pub fn with_seasonal_adjuster(mut self, adjuster: Box<dyn SeasonalAdjuster>) -> Self {
        self.seasonal = Some(adjuster);
        self
    }

    /// Register the thermal subsystem's passthrough callbacks
    pub fn with_thermal_callbacks(
        mut self,
        get: ThermalDataCb,
        restore: RestoreThermalCb,
    ) -> Self {
        self.get_thermal_data = Some(get);
        self.restore_thermal_data = Some(restore);
        self
    }

    /// Current configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the engine is still bootstrapping
    pub fn is_in_calibration(&self) -> bool {
        self.learner.sample_count() < MIN_SAMPLES_FOR_ACTIVE_CONTROL
    }

    /// Learner statistics passthrough
    pub fn learner_statistics(&self) -> LearnerStatistics {
        self.learner.get_statistics()
    }

    /// Mark the origin of the next setpoint adjustment
    pub fn set_adjustment_source(&mut self, source: AdjustmentSource) {
        self.adjustment_source = source;
    }

    /// Pause feedback recording without discarding state
    pub fn pause_learning(&mut self) {
        self.learning_paused = true;
    }

    /// Resume feedback recording
    pub fn resume_learning(&mut self) {
        self.learning_paused = false;
    }

    /// Toggle learning; the caller is expected to trigger a save after
    pub fn set_learning_enabled(&mut self, enabled: bool) {
        self.config.enable_learning = enabled;
    }

    /// Discard all learned state and return to calibration
    ///
    /// Learners are replaced wholesale rather than mutated in place, so a
    /// half-finished reset cannot exist.
    pub fn reset(&mut self) {
        self.learner = OffsetLearner::new(self.config.power_similarity_window);
        self.hysteresis = HysteresisLearner::new();
        self.outlier_gate.reset();
        self.stable_calibration_offset = None;
        self.last_power_state = None;
        self.last_feedback_ts = None;
        self.adjustment_source = AdjustmentSource::None;
        self.metrics.clear();
    }

    // ------------------------------------------------------------------
    // Offset calculation
    // ------------------------------------------------------------------

    /// Compute the corrected offset for one sensor snapshot
    ///
    /// Never fails; every failure path degrades to a safe fallback result.
    /// `thermal_window` is the host thermostat's comfort window, forwarded
    /// to the seasonal collaborator when one is attached.
    pub fn calculate_offset(
        &mut self,
        input: &OffsetInput,
        thermal_window: Option<(f32, f32)>,
    ) -> OffsetResult {
        let (Some(ac), Some(room)) = (input.ac_internal_temp, input.room_temp) else {
            log::warn!("critical sensor unavailable, returning safe fallback");
            return OffsetResult::safe_fallback("Critical sensor unavailable, using safe fallback");
        };

        if self.is_in_calibration() {
            return self.calibration_offset(ac, room, input);
        }

        match self.normal_pipeline(ac, room, input, thermal_window) {
            Ok(result) => result,
            Err(err) => {
                log::error!("offset calculation failed: {}", err);
                OffsetResult::safe_fallback("Error in calculation, using safe fallback")
            }
        }
    }

    fn calibration_offset(&mut self, ac: f32, room: f32, input: &OffsetInput) -> OffsetResult {
        let samples = self.learner.sample_count();
        let no_power_sensor = self.config.power_sensor.is_none();
        let idle = input
            .power_consumption
            .map(|p| p < self.config.power_idle_threshold)
            .unwrap_or(false);
        let converged = (ac - room).abs() < self.config.calibration_stable_delta;

        if no_power_sensor || (idle && converged) {
            let (offset, clamped) = self.clamp_offset(ac - room);
            self.stable_calibration_offset = Some(offset);
            return OffsetResult {
                offset,
                clamped,
                reason: format!(
                    "Calibration (Stable): Updated offset to {:.1}°C. ({}/{} samples)",
                    offset, samples, MIN_SAMPLES_FOR_ACTIVE_CONTROL
                ),
                confidence: 0.2,
            };
        }

        if let Some(cached) = self.stable_calibration_offset {
            return OffsetResult {
                offset: cached,
                clamped: false,
                reason: format!(
                    "Calibration (Active): Using cached stable offset of {:.1}°C.",
                    cached
                ),
                confidence: 0.2,
            };
        }

        // AC already running on first ever calculation: no cache to lean on
        let (offset, clamped) = self.clamp_offset(ac - room);
        OffsetResult {
            offset,
            clamped,
            reason: format!(
                "Calibration (Initial): No cached offset, using raw difference of {:.1}°C.",
                offset
            ),
            confidence: 0.2,
        }
    }

    fn normal_pipeline(
        &mut self,
        ac: f32,
        room: f32,
        input: &OffsetInput,
        thermal_window: Option<(f32, f32)>,
    ) -> EngineResult<OffsetResult> {
        let raw_difference = ac - room;

        // Rule-based base, optionally via the seasonal collaborator
        let mut seasonal_phrase: Option<String> = None;
        let base = match (&self.seasonal, &self.config.outdoor_sensor) {
            (Some(seasonal), Some(_)) => match seasonal.adjust(raw_difference, input, thermal_window)
            {
                Ok(adjusted) => {
                    seasonal_phrase = seasonal.describe();
                    adjusted
                }
                Err(err) => {
                    log::warn!("seasonal adjustment failed, using raw difference: {}", err);
                    raw_difference
                }
            },
            _ => raw_difference,
        };

        // Mode multiplier, then contextual multipliers, in this fixed order
        let mode_adjusted = base * input.mode.multiplier();

        let mut contextual = mode_adjusted;
        let outdoor_diff = input.outdoor_temp.map(|o| o - room);
        if let Some(diff) = outdoor_diff {
            if diff > OUTDOOR_DIFFERENTIAL_C {
                contextual *= 1.1;
            } else if diff < -OUTDOOR_DIFFERENTIAL_C {
                contextual *= 0.9;
            }
        }

        let power_state = self.classify_power(input.power_consumption);
        if let Some(state) = power_state {
            match state {
                PowerState::High => contextual *= 0.9,
                PowerState::Idle | PowerState::Low => contextual *= 1.1,
                PowerState::Moderate => {}
            }
        }

        // Transition detection always runs, whether or not the
        // classification below ends up being used
        self.detect_power_transition(power_state, room);

        let hysteresis_state = self.classify_hysteresis(power_state, room);

        // Learned blend
        let stats = self.learner.get_statistics();
        let mut used_learning = false;
        let mut learning_phrase: Option<String> = None;
        let mut final_offset = contextual;

        let query = self.build_query(ac, room, input, hysteresis_state);

        if self.config.enable_learning && stats.samples_collected >= 1 {
            match self.learner.predict(&query) {
                Some(predicted) if LEARNING_PREDICTION_WEIGHT > MIN_PREDICTION_WEIGHT => {
                    final_offset = (1.0 - LEARNING_PREDICTION_WEIGHT) * contextual
                        + LEARNING_PREDICTION_WEIGHT * predicted;
                    used_learning = true;
                    learning_phrase = Some(format!(
                        "learned correction applied (weight {:.1})",
                        LEARNING_PREDICTION_WEIGHT
                    ));
                }
                Some(_) => {}
                None => {
                    learning_phrase = Some("no similar learned samples".to_string());
                }
            }
        }

        // Humidity contribution is diagnostic only: failures zero it out
        let humidity_present = input.indoor_humidity.is_some() || input.outdoor_humidity.is_some();
        let humidity_contribution = if humidity_present && used_learning {
            let with_humidity = self.learner.predict(&query);
            let without_humidity = self.learner.predict(&query.without_humidity());
            match (with_humidity, without_humidity) {
                (Some(w), Some(wo)) => w - wo,
                _ => 0.0,
            }
        } else {
            0.0
        };

        let (offset, clamped) = self.clamp_offset(final_offset);

        let confidence = self.score_confidence(input, used_learning);

        let reason = self.build_reason(
            raw_difference,
            seasonal_phrase,
            learning_phrase,
            humidity_present,
            humidity_contribution,
            input,
            power_state,
            outdoor_diff,
            clamped,
        );

        Ok(OffsetResult {
            offset,
            clamped,
            reason,
            confidence,
        })
    }

    /// Clamp an offset to the symmetric configured limit
    pub fn clamp_offset(&self, offset: f32) -> (f32, bool) {
        let max = self.config.max_offset;
        if offset > max {
            (max, true)
        } else if offset < -max {
            (-max, true)
        } else {
            (offset, false)
        }
    }

    fn classify_power(&self, power: Option<f32>) -> Option<PowerState> {
        self.config.power_sensor.as_ref()?;
        let watts = power?;

        Some(if watts < self.config.power_idle_threshold {
            PowerState::Idle
        } else if watts < self.config.power_min_threshold {
            PowerState::Low
        } else if watts < self.config.power_max_threshold {
            PowerState::Moderate
        } else {
            PowerState::High
        })
    }

    /// Record hysteresis transitions on idle boundary crossings
    ///
    /// Only the idle boundary matters: idle -> any active bucket records a
    /// start, any active bucket -> idle records a stop. Transitions inside
    /// the active range record nothing.
    fn detect_power_transition(&mut self, power_state: Option<PowerState>, room_temp: f32) {
        let Some(current) = power_state else {
            return;
        };

        if let Some(previous) = self.last_power_state {
            let was_idle = previous == PowerState::Idle;
            let is_idle = current == PowerState::Idle;
            if was_idle && !is_idle {
                self.hysteresis
                    .record_transition(TransitionKind::Start, room_temp);
            } else if !was_idle && is_idle {
                self.hysteresis
                    .record_transition(TransitionKind::Stop, room_temp);
            }
        }

        self.last_power_state = Some(current);
    }

    fn classify_hysteresis(
        &self,
        power_state: Option<PowerState>,
        room_temp: f32,
    ) -> HysteresisState {
        if self.config.power_sensor.is_none() {
            return HysteresisState::NoPowerSensor;
        }
        if !self.config.enable_learning {
            return HysteresisState::Disabled;
        }

        // Missing power reading is treated as idle, same as unknown states
        let state = power_state.unwrap_or(PowerState::Idle);
        self.hysteresis.get_hysteresis_state(state, room_temp)
    }

    fn build_query(
        &self,
        ac: f32,
        room: f32,
        input: &OffsetInput,
        hysteresis_state: HysteresisState,
    ) -> PredictQuery {
        PredictQuery {
            ac_temp: ac,
            room_temp: room,
            outdoor_temp: input.outdoor_temp,
            mode: input.mode,
            power: input.power_consumption,
            hysteresis_state,
            indoor_humidity: input.indoor_humidity,
            outdoor_humidity: input.outdoor_humidity,
            time_of_day_hours: input.time_of_day_hours,
        }
    }

    fn score_confidence(&self, input: &OffsetInput, used_learning: bool) -> f32 {
        let mut confidence = 0.5;
        if input.outdoor_temp.is_some() {
            confidence += 0.2;
        }
        if input.power_consumption.is_some() {
            confidence += 0.2;
        }
        if input.mode != Mode::None {
            confidence += 0.1;
        }
        if let (Some(seasonal), Some(_)) = (&self.seasonal, &self.config.outdoor_sensor) {
            confidence += seasonal.confidence_boost();
        }

        if used_learning {
            let learning_confidence = self.learner.prediction_confidence();
            confidence = 0.6 * confidence + 0.4 * learning_confidence;
        }

        confidence.clamp(0.0, 1.0)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_reason(
        &self,
        raw_difference: f32,
        seasonal_phrase: Option<String>,
        learning_phrase: Option<String>,
        humidity_present: bool,
        humidity_contribution: f32,
        input: &OffsetInput,
        power_state: Option<PowerState>,
        outdoor_diff: Option<f32>,
        clamped: bool,
    ) -> String {
        let mut phrases: Vec<String> = Vec::new();

        if raw_difference > 0.05 {
            phrases.push(format!(
                "AC sensor reads {:.1}°C warmer than room",
                raw_difference
            ));
        } else if raw_difference < -0.05 {
            phrases.push(format!(
                "AC sensor reads {:.1}°C cooler than room",
                -raw_difference
            ));
        } else {
            phrases.push("AC and room sensors in agreement".to_string());
        }

        if let Some(phrase) = seasonal_phrase {
            phrases.push(phrase);
        }
        if let Some(phrase) = learning_phrase {
            phrases.push(phrase);
        }

        if humidity_present {
            if humidity_contribution.abs() >= HUMIDITY_REPORT_THRESHOLD_C {
                phrases.push(format!(
                    "humidity-adjusted ({:+.2}°C from humidity)",
                    humidity_contribution
                ));
            } else {
                phrases.push("humidity-adjusted".to_string());
            }
        }

        if input.mode != Mode::None {
            phrases.push(format!("{} mode active", input.mode));
        }

        if let Some(state) = power_state {
            phrases.push(format!("power state {}", state));
        }

        if let Some(diff) = outdoor_diff {
            if diff.abs() > OUTDOOR_DIFFERENTIAL_C {
                phrases.push(format!("large outdoor differential ({:+.1}°C)", diff));
            }
        }

        if clamped {
            phrases.push(format!("clamped to ±{:.1}°C limit", self.config.max_offset));
        }

        phrases.join(", ")
    }

    // ------------------------------------------------------------------
    // Feedback
    // ------------------------------------------------------------------

    /// Record the offset that actually turned out to be needed
    ///
    /// Every rejection is a silent (logged) early return; nothing here can
    /// fail the caller. See the guard ladder in order: learning off,
    /// paused, prediction-sourced (feedback-loop prevention), missing
    /// critical sensors, ineligible HVAC mode, validation, outlier gate.
    pub fn record_actual_performance(&mut self, predicted: f32, actual: f32, input: &OffsetInput) {
        if !self.config.enable_learning {
            return;
        }
        if self.learning_paused {
            log::debug!("feedback ignored: learning paused");
            return;
        }
        if self.adjustment_source == AdjustmentSource::Prediction {
            // Feeding a correction derived from our own prediction back in
            // as ground truth would oscillate the model
            log::debug!("feedback ignored: adjustment originated from prediction");
            return;
        }

        let (Some(ac), Some(room)) = (input.ac_internal_temp, input.room_temp) else {
            log::debug!("feedback ignored: critical sensors unavailable");
            return;
        };

        if let Some(hvac_mode) = input.hvac_mode {
            if !hvac_mode.is_learning_eligible() {
                log::debug!("feedback ignored: hvac mode not learning-eligible");
                return;
            }
        }

        let timestamp = self.time.now();
        if let Err(err) = self.validate_feedback(actual, room, timestamp) {
            log::warn!("feedback rejected: {}", err);
            return;
        }

        if self.outlier_gate.is_outlier(actual) {
            log::warn!("feedback rejected: statistical outlier ({})", actual);
            return;
        }
        self.outlier_gate.record(actual);

        let power = input.power_consumption.and_then(sanitize::sanitize_power);
        let power_state = self.classify_power(power);
        let hysteresis_state = self.classify_hysteresis(power_state, room);

        self.learner.add_sample(LearnedSample {
            predicted_offset: predicted,
            actual_offset: actual,
            ac_temp: ac,
            room_temp: room,
            outdoor_temp: input.outdoor_temp.and_then(sanitize::sanitize_temperature),
            mode: input.mode,
            power,
            hysteresis_state,
            indoor_humidity: input.indoor_humidity.and_then(sanitize::sanitize_humidity),
            outdoor_humidity: input.outdoor_humidity.and_then(sanitize::sanitize_humidity),
            timestamp,
        });
    }

    /// Validate one feedback triple against configured bounds
    ///
    /// Rate limiting only applies to chronologically advancing timestamps;
    /// out-of-order feedback bypasses it (deliberate leniency for replay).
    /// The acceptance watermark only ever moves forward.
    fn validate_feedback(
        &mut self,
        offset: f32,
        room_temp: f32,
        timestamp: Timestamp,
    ) -> EngineResult<()> {
        if !offset.is_finite() || !room_temp.is_finite() {
            return Err(EngineError::NotFinite);
        }

        if offset < self.config.validation_offset_min || offset > self.config.validation_offset_max
        {
            return Err(EngineError::OutOfRange {
                value: offset,
                min: self.config.validation_offset_min,
                max: self.config.validation_offset_max,
            });
        }

        if room_temp < self.config.validation_temp_min
            || room_temp > self.config.validation_temp_max
        {
            return Err(EngineError::OutOfRange {
                value: room_temp,
                min: self.config.validation_temp_min,
                max: self.config.validation_temp_max,
            });
        }

        if timestamp > self.time.now() {
            return Err(EngineError::FutureTimestamp);
        }

        if let Some(last) = self.last_feedback_ts {
            if timestamp > last {
                let elapsed_ms = timestamp - last;
                let limit_ms = self.config.validation_rate_limit_secs * 1000;
                if elapsed_ms < limit_ms {
                    return Err(EngineError::RateLimited {
                        elapsed_ms,
                        limit_ms,
                    });
                }
            }
        }

        if self.last_feedback_ts.map_or(true, |last| timestamp > last) {
            self.last_feedback_ts = Some(timestamp);
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Snapshot engine + sub-learner state for persistence
    pub fn serialize_for_persistence(&self) -> EngineSnapshot {
        EngineSnapshot {
            enable_learning: self.config.enable_learning,
            learner_data: self.learner.serialize_for_persistence(),
            hysteresis_data: self
                .config
                .power_sensor
                .as_ref()
                .map(|_| self.hysteresis.serialize_for_persistence()),
            seasonal_data: self.seasonal_snapshot.clone(),
        }
    }

    /// Opaque thermal payload from the registered callback, if any
    pub fn thermal_data(&self) -> Option<Value> {
        self.get_thermal_data.as_ref().and_then(|cb| cb())
    }

    /// Note how long the last persistence save took
    pub fn record_save_latency(&mut self, latency_ms: u64) {
        let now = self.time.now();
        self.last_save_latency_ms = Some(latency_ms);
        // Explicit invalidation: this metric has no TTL
        self.metrics.invalidate("persistence_latency_ms");
        self.metrics.put("persistence_latency_ms", latency_ms as f64, now);
    }

    /// Apply persisted state, isolating component failures
    ///
    /// A failed learner restore does not block the hysteresis restore and
    /// vice versa; the thermal payload goes straight to its callback.
    /// Returns whether any component restored successfully.
    pub fn restore_from_persistence(&mut self, state: PersistedState) -> bool {
        let mut any = false;

        if let Some(enabled) = state.enable_learning {
            self.config.enable_learning = enabled;
            any = true;
        }

        if let Some(data) = &state.learner_data {
            if self.learner.restore_from_persistence(data) {
                any = true;
            } else {
                log::warn!("learner state failed to restore, keeping empty learner");
            }
        }

        if let Some(data) = &state.hysteresis_data {
            self.hysteresis.restore_from_persistence(data);
            any = true;
        }

        self.seasonal_snapshot = state.seasonal_data;

        if let (Some(callback), Some(data)) = (&self.restore_thermal_data, state.thermal_data) {
            callback(data);
        }

        any
    }

    // ------------------------------------------------------------------
    // Dashboard
    // ------------------------------------------------------------------

    /// Aggregate dashboard metrics through the TTL cache
    pub fn dashboard_metrics(&mut self) -> DashboardMetrics {
        let now = self.time.now();
        let stats = self.learner.get_statistics();
        let learner = &self.learner;

        let avg_accuracy = self.metrics.get_or_compute(
            "avg_accuracy",
            Some(PERFORMANCE_TTL_MS),
            now,
            0.0,
            || Ok(stats.avg_accuracy as f64),
        );
        let prediction_confidence = self.metrics.get_or_compute(
            "prediction_confidence",
            Some(PERFORMANCE_TTL_MS),
            now,
            0.0,
            || Ok(learner.prediction_confidence() as f64),
        );
        let offset_trend = self.metrics.get_or_compute(
            "offset_trend",
            Some(TREND_TTL_MS),
            now,
            0.0,
            || Ok(learner.offset_trend().unwrap_or(0.0) as f64),
        );
        let hysteresis_counts = self.hysteresis.sample_counts();
        let memory_usage_kb = self.metrics.get_or_compute(
            "memory_usage_kb",
            Some(MEMORY_TTL_MS),
            now,
            0.0,
            || {
                let sample_bytes =
                    core::mem::size_of::<LearnedSample>() * stats.samples_collected;
                let hysteresis_bytes = core::mem::size_of::<f32>()
                    * (hysteresis_counts.0 + hysteresis_counts.1);
                Ok((sample_bytes + hysteresis_bytes) as f64 / 1024.0)
            },
        );

        DashboardMetrics {
            samples_collected: stats.samples_collected,
            avg_accuracy,
            prediction_confidence,
            offset_trend,
            memory_usage_kb,
            persistence_latency_ms: self.last_save_latency_ms.map(|v| v as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircal_core::time::FixedClock;

    fn engine_with_power_sensor() -> (OffsetEngine, FixedClock) {
        let clock = FixedClock::new(1_000_000_000);
        let engine = OffsetEngine::new(EngineConfig {
            power_sensor: Some("sensor.ac_power".into()),
            enable_learning: true,
            ..Default::default()
        })
        .with_time_source(Box::new(clock.clone()));
        (engine, clock)
    }

    #[test]
    fn clamp_within_limit_passes_through() {
        let (engine, _) = engine_with_power_sensor();
        assert_eq!(engine.clamp_offset(3.0), (3.0, false));
        assert_eq!(engine.clamp_offset(-5.0), (-5.0, false));
    }

    #[test]
    fn clamp_saturates_symmetrically() {
        let (engine, _) = engine_with_power_sensor();
        assert_eq!(engine.clamp_offset(7.5), (5.0, true));
        assert_eq!(engine.clamp_offset(-12.0), (-5.0, true));
    }

    #[test]
    fn power_bucketing_uses_thresholds() {
        let (engine, _) = engine_with_power_sensor();
        assert_eq!(engine.classify_power(Some(10.0)), Some(PowerState::Idle));
        assert_eq!(engine.classify_power(Some(75.0)), Some(PowerState::Low));
        assert_eq!(
            engine.classify_power(Some(150.0)),
            Some(PowerState::Moderate)
        );
        assert_eq!(engine.classify_power(Some(250.0)), Some(PowerState::High));
        assert_eq!(engine.classify_power(None), None);
    }

    #[test]
    fn power_bucketing_requires_configured_sensor() {
        let engine = OffsetEngine::new(EngineConfig::default());
        assert_eq!(engine.classify_power(Some(300.0)), None);
    }

    #[test]
    fn transitions_recorded_only_across_idle_boundary() {
        let (mut engine, _) = engine_with_power_sensor();

        engine.detect_power_transition(Some(PowerState::Idle), 24.0);
        engine.detect_power_transition(Some(PowerState::Moderate), 24.5);
        engine.detect_power_transition(Some(PowerState::High), 24.2);
        engine.detect_power_transition(Some(PowerState::Idle), 22.8);

        // idle -> moderate recorded a start, high -> idle a stop;
        // moderate -> high recorded nothing
        assert_eq!(engine.hysteresis.sample_counts(), (1, 1));
    }

    #[test]
    fn feedback_validation_bounds() {
        let (mut engine, clock) = engine_with_power_sensor();
        let now = clock.now();

        assert!(engine.validate_feedback(-1.0, 25.0, now).is_ok());

        clock.advance(120_000);
        let now = clock.now();
        assert!(matches!(
            engine.validate_feedback(15.0, 25.0, now),
            Err(EngineError::OutOfRange { .. })
        ));
        assert!(matches!(
            engine.validate_feedback(-1.0, 45.0, now),
            Err(EngineError::OutOfRange { .. })
        ));
        assert!(matches!(
            engine.validate_feedback(f32::NAN, 25.0, now),
            Err(EngineError::NotFinite)
        ));
        assert!(matches!(
            engine.validate_feedback(-1.0, 25.0, now + 1),
            Err(EngineError::FutureTimestamp)
        ));
    }

    #[test]
    fn feedback_rate_limit_applies_forward_only() {
        let (mut engine, clock) = engine_with_power_sensor();

        let first = clock.now();
        assert!(engine.validate_feedback(-1.0, 25.0, first).is_ok());

        // 30s later: too soon
        clock.advance(30_000);
        assert!(matches!(
            engine.validate_feedback(-1.0, 25.0, clock.now()),
            Err(EngineError::RateLimited { .. })
        ));

        // Out-of-order timestamp bypasses the rate limit entirely
        assert!(engine.validate_feedback(-1.0, 25.0, first - 5_000).is_ok());

        // Watermark did not move backward: 61s after the first acceptance
        // is past the limit again
        clock.advance(31_000);
        assert!(engine.validate_feedback(-1.0, 25.0, clock.now()).is_ok());
    }
}
