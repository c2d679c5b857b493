//! Online Offset Learning
//!
//! ## Overview
//!
//! The learner keeps a bounded history of corrections: for each feedback
//! event it stores the context the engine saw, the offset it predicted and
//! the offset that actually turned out to be needed. Prediction is
//! instance-based: a query context is compared against every stored sample
//! with an exponentially weighted similarity, and the similar samples'
//! actual offsets are averaged by weight.
//!
//! Instance-based learning was chosen over a parametric model for the same
//! reasons the rest of this system prefers medians over means: it is
//! robust to a handful of bad samples and it degrades predictably: too
//! little data simply means no similar samples and no prediction, never
//! an extrapolated one.
//!
//! ## Similarity
//!
//! The composite weighs temperature closeness, power closeness (inside a
//! configurable window), mode equality, hysteresis-state equality,
//! time-of-day closeness (cyclic) and humidity closeness. Optional fields
//! score neutrally when absent on both sides and penalize presence
//! mismatches, so a sensor appearing or disappearing shifts similarity
//! instead of crashing it.
//!
//! ## Failure Semantics
//!
//! `predict` returns `None` when no stored sample is similar enough; the
//! engine layer decides the fallback. Persistence restore skips invalid
//! samples individually and only fails wholesale when the document itself
//! is not shaped like learner data.

use aircal_core::buffer::CircularBuffer;
use aircal_core::time::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{HysteresisState, Mode};

/// Capacity of the sample ring buffer
pub const MAX_SAMPLES: usize = 1000;

/// Samples considered when computing average accuracy
const ACCURACY_WINDOW: usize = 50;

/// Error span (Celsius) that maps to zero accuracy
const ACCURACY_NORM_SPAN: f32 = 5.0;

/// Minimum composite similarity for a sample to contribute to a prediction
const MIN_SIMILARITY: f32 = 0.3;

/// Sample count at which prediction confidence stops growing
const CONFIDENCE_MATURITY_SAMPLES: f32 = 100.0;

/// Similarity weights; sum to 1.0
const WEIGHT_TEMP: f32 = 0.30;
const WEIGHT_POWER: f32 = 0.20;
const WEIGHT_MODE: f32 = 0.15;
const WEIGHT_HYSTERESIS: f32 = 0.15;
const WEIGHT_TIME: f32 = 0.10;
const WEIGHT_HUMIDITY: f32 = 0.10;

/// One recorded feedback event with its full context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedSample {
    /// Offset the engine predicted at the time
    pub predicted_offset: f32,
    /// Offset that was actually needed
    pub actual_offset: f32,
    /// AC internal temperature at the time
    pub ac_temp: f32,
    /// Room temperature at the time
    pub room_temp: f32,
    /// Outdoor temperature, if available
    pub outdoor_temp: Option<f32>,
    /// Comfort mode at the time
    pub mode: Mode,
    /// Power draw in watts, if available
    pub power: Option<f32>,
    /// Hysteresis classification at the time
    pub hysteresis_state: HysteresisState,
    /// Indoor relative humidity, if available
    pub indoor_humidity: Option<f32>,
    /// Outdoor relative humidity, if available
    pub outdoor_humidity: Option<f32>,
    /// When the feedback was recorded, Unix milliseconds
    pub timestamp: Timestamp,
}

impl LearnedSample {
    /// Hour of day in [0, 24) derived from the timestamp (UTC)
    fn hour_of_day(&self) -> f32 {
        ((self.timestamp / 3_600_000) % 24) as f32
    }
}

/// Query context for a prediction
#[derive(Debug, Clone)]
pub struct PredictQuery {
    /// AC internal temperature
    pub ac_temp: f32,
    /// Room temperature
    pub room_temp: f32,
    /// Outdoor temperature, if available
    pub outdoor_temp: Option<f32>,
    /// Comfort mode
    pub mode: Mode,
    /// Power draw in watts, if available
    pub power: Option<f32>,
    /// Current hysteresis classification
    pub hysteresis_state: HysteresisState,
    /// Indoor relative humidity, if available
    pub indoor_humidity: Option<f32>,
    /// Outdoor relative humidity, if available
    pub outdoor_humidity: Option<f32>,
    /// Hour of day in [0, 24)
    pub time_of_day_hours: f32,
}

impl PredictQuery {
    /// Copy of the query with humidity fields stripped
    ///
    /// Used by the engine's humidity-contribution diagnostic, which
    /// predicts twice and reports the delta.
    pub fn without_humidity(&self) -> Self {
        Self {
            indoor_humidity: None,
            outdoor_humidity: None,
            ..self.clone()
        }
    }
}

/// Summary statistics over the sample buffer
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerStatistics {
    /// Number of samples currently stored
    pub samples_collected: usize,
    /// Mean accuracy over recent samples, [0, 1]
    pub avg_accuracy: f32,
    /// Timestamp of the newest sample
    pub last_sample_time: Option<Timestamp>,
}

/// Instance-based offset predictor over a bounded sample history
#[derive(Debug, Clone)]
pub struct OffsetLearner {
    samples: CircularBuffer<LearnedSample, MAX_SAMPLES>,
    power_window: f32,
}

impl OffsetLearner {
    /// New learner with the given power-similarity window (watts)
    pub fn new(power_window: f32) -> Self {
        Self {
            samples: CircularBuffer::new(),
            power_window: power_window.abs().max(1.0),
        }
    }

    /// Append a feedback sample, evicting the oldest beyond capacity
    pub fn add_sample(&mut self, sample: LearnedSample) {
        self.samples.push(sample);
    }

    /// Number of stored samples
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Predict an offset for `query`, or `None` without similar samples
    pub fn predict(&self, query: &PredictQuery) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }

        let mut weighted_sum = 0.0f32;
        let mut weight_total = 0.0f32;

        for sample in self.samples.iter() {
            let similarity = self.similarity(query, sample);
            if similarity >= MIN_SIMILARITY {
                weighted_sum += similarity * sample.actual_offset;
                weight_total += similarity;
            }
        }

        if weight_total <= f32::EPSILON {
            return None;
        }

        Some(weighted_sum / weight_total)
    }

    /// Composite similarity in [0, 1]
    fn similarity(&self, query: &PredictQuery, sample: &LearnedSample) -> f32 {
        let temp_distance =
            (query.ac_temp - sample.ac_temp).abs() + (query.room_temp - sample.room_temp).abs();
        let temp_sim = (-temp_distance / 2.0).exp();

        let power_sim = match (query.power, sample.power) {
            (Some(a), Some(b)) => {
                let delta = (a - b).abs();
                if delta <= self.power_window {
                    (-delta / 100.0).exp()
                } else {
                    0.0
                }
            }
            (None, None) => 1.0,
            _ => 0.3, // presence mismatch
        };

        let mode_sim = if query.mode == sample.mode { 1.0 } else { 0.0 };

        let hysteresis_sim = if query.hysteresis_state == sample.hysteresis_state {
            1.0
        } else {
            0.0
        };

        let hour_delta = (query.time_of_day_hours - sample.hour_of_day()).abs();
        let cyclic_hours = hour_delta.min(24.0 - hour_delta);
        let time_sim = (-cyclic_hours / 6.0).exp();

        let humidity_sim = match (query.indoor_humidity, sample.indoor_humidity) {
            (Some(a), Some(b)) => (-(a - b).abs() / 20.0).exp(),
            (None, None) => 1.0,
            _ => 0.5,
        };

        WEIGHT_TEMP * temp_sim
            + WEIGHT_POWER * power_sim
            + WEIGHT_MODE * mode_sim
            + WEIGHT_HYSTERESIS * hysteresis_sim
            + WEIGHT_TIME * time_sim
            + WEIGHT_HUMIDITY * humidity_sim
    }

    /// Statistics over the stored samples
    ///
    /// Accuracy is `1 - |predicted - actual| / span` per sample, floored
    /// at zero and averaged over the most recent [`ACCURACY_WINDOW`]
    /// samples.
    pub fn get_statistics(&self) -> LearnerStatistics {
        let count = self.samples.len();

        let window_start = count.saturating_sub(ACCURACY_WINDOW);
        let mut accuracy_sum = 0.0f32;
        let mut accuracy_n = 0usize;
        for (i, sample) in self.samples.iter().enumerate() {
            if i < window_start {
                continue;
            }
            let error = (sample.predicted_offset - sample.actual_offset).abs();
            accuracy_sum += (1.0 - error / ACCURACY_NORM_SPAN).max(0.0);
            accuracy_n += 1;
        }

        LearnerStatistics {
            samples_collected: count,
            avg_accuracy: if accuracy_n > 0 {
                accuracy_sum / accuracy_n as f32
            } else {
                0.0
            },
            last_sample_time: self.samples.last().map(|s| s.timestamp),
        }
    }

    /// Confidence in predictions: accuracy tempered by sample maturity
    pub fn prediction_confidence(&self) -> f32 {
        let stats = self.get_statistics();
        let maturity = (stats.samples_collected as f32 / CONFIDENCE_MATURITY_SAMPLES).min(1.0);
        (stats.avg_accuracy * maturity).clamp(0.0, 1.0)
    }

    /// Recent drift of actual offsets: mean of the last 10 minus the
    /// overall mean. `None` with fewer than 10 samples.
    pub fn offset_trend(&self) -> Option<f32> {
        const TREND_WINDOW: usize = 10;

        let count = self.samples.len();
        if count < TREND_WINDOW {
            return None;
        }

        let overall: f32 =
            self.samples.iter().map(|s| s.actual_offset).sum::<f32>() / count as f32;
        let recent: f32 = self
            .samples
            .iter()
            .skip(count - TREND_WINDOW)
            .map(|s| s.actual_offset)
            .sum::<f32>()
            / TREND_WINDOW as f32;

        Some(recent - overall)
    }

    /// Drop all samples
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// JSON-safe snapshot of the sample buffer
    pub fn serialize_for_persistence(&self) -> Value {
        let samples: Vec<Value> = self
            .samples
            .iter()
            .filter_map(|s| serde_json::to_value(s).ok())
            .collect();
        json!({ "samples": samples })
    }

    /// Restore samples from persisted data
    ///
    /// Individually invalid entries are skipped; a top level that is not
    /// an object carrying a `samples` list fails the whole restore.
    /// Returns whether the restore succeeded; never panics.
    pub fn restore_from_persistence(&mut self, data: &Value) -> bool {
        let Some(map) = data.as_object() else {
            log::warn!("learner restore: top level is not an object");
            return false;
        };

        let Some(list) = map.get("samples").and_then(Value::as_array) else {
            log::warn!("learner restore: samples missing or not a list");
            return false;
        };

        self.samples.clear();

        let mut skipped = 0usize;
        for entry in list {
            match serde_json::from_value::<LearnedSample>(entry.clone()) {
                Ok(sample) => self.samples.push(sample),
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            log::warn!("learner restore: skipped {} invalid samples", skipped);
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ac: f32, room: f32, actual: f32, timestamp: Timestamp) -> LearnedSample {
        LearnedSample {
            predicted_offset: actual,
            actual_offset: actual,
            ac_temp: ac,
            room_temp: room,
            outdoor_temp: None,
            mode: Mode::None,
            power: Some(200.0),
            hysteresis_state: HysteresisState::ActivePhase,
            indoor_humidity: None,
            outdoor_humidity: None,
            timestamp,
        }
    }

    fn query(ac: f32, room: f32) -> PredictQuery {
        PredictQuery {
            ac_temp: ac,
            room_temp: room,
            outdoor_temp: None,
            mode: Mode::None,
            power: Some(200.0),
            hysteresis_state: HysteresisState::ActivePhase,
            indoor_humidity: None,
            outdoor_humidity: None,
            time_of_day_hours: 0.0,
        }
    }

    #[test]
    fn empty_learner_predicts_nothing() {
        let learner = OffsetLearner::new(150.0);
        assert_eq!(learner.predict(&query(24.0, 25.0)), None);
    }

    #[test]
    fn predicts_from_similar_context() {
        let mut learner = OffsetLearner::new(150.0);
        for i in 0..5 {
            learner.add_sample(sample(24.0, 25.0, -1.2, i * 1000));
        }

        let predicted = learner.predict(&query(24.0, 25.0)).unwrap();
        assert!((predicted - (-1.2)).abs() < 0.01);
    }

    #[test]
    fn dissimilar_context_gives_no_prediction() {
        let mut learner = OffsetLearner::new(150.0);
        learner.add_sample(sample(24.0, 25.0, -1.0, 0));

        // Far away in temperature, different mode and hysteresis state
        let mut q = query(40.0, 10.0);
        q.mode = Mode::Boost;
        q.hysteresis_state = HysteresisState::IdleStableZone;
        q.power = None;

        assert_eq!(learner.predict(&q), None);
    }

    #[test]
    fn closer_samples_dominate_the_average() {
        let mut learner = OffsetLearner::new(500.0);
        // Matching temperature context, offset -1.0
        for i in 0..10 {
            learner.add_sample(sample(24.0, 25.0, -1.0, i * 1000));
        }
        // Distant temperature context, offset -3.0
        for i in 0..10 {
            learner.add_sample(sample(28.0, 31.0, -3.0, 100_000 + i * 1000));
        }

        let predicted = learner.predict(&query(24.0, 25.0)).unwrap();
        assert!(predicted > -2.0, "expected near -1.0, got {}", predicted);
    }

    #[test]
    fn humidity_changes_prediction() {
        let mut learner = OffsetLearner::new(150.0);
        let mut humid = sample(24.0, 25.0, -2.0, 0);
        humid.indoor_humidity = Some(70.0);
        let dry = sample(24.0, 25.0, -1.0, 1000);

        for i in 0..5 {
            let mut s = humid.clone();
            s.timestamp = i * 2000;
            learner.add_sample(s);
            let mut s = dry.clone();
            s.timestamp = i * 2000 + 1000;
            learner.add_sample(s);
        }

        let mut q = query(24.0, 25.0);
        q.indoor_humidity = Some(70.0);

        let with_humidity = learner.predict(&q).unwrap();
        let without_humidity = learner.predict(&q.without_humidity()).unwrap();
        assert!((with_humidity - without_humidity).abs() > 0.01);
    }

    #[test]
    fn ring_buffer_caps_samples() {
        let mut learner = OffsetLearner::new(150.0);
        for i in 0..(MAX_SAMPLES + 100) {
            learner.add_sample(sample(24.0, 25.0, -1.0, i as Timestamp));
        }
        assert_eq!(learner.sample_count(), MAX_SAMPLES);
    }

    #[test]
    fn statistics_reflect_accuracy() {
        let mut learner = OffsetLearner::new(150.0);
        let mut s = sample(24.0, 25.0, -1.0, 5000);
        s.predicted_offset = -1.0;
        learner.add_sample(s.clone());

        let stats = learner.get_statistics();
        assert_eq!(stats.samples_collected, 1);
        assert_eq!(stats.avg_accuracy, 1.0);
        assert_eq!(stats.last_sample_time, Some(5000));

        // A sample that missed by the whole span drags accuracy to 0.5
        let mut bad = sample(24.0, 25.0, -1.0, 6000);
        bad.predicted_offset = -1.0 + ACCURACY_NORM_SPAN;
        learner.add_sample(bad);

        let stats = learner.get_statistics();
        assert!((stats.avg_accuracy - 0.5).abs() < 0.01);
    }

    #[test]
    fn confidence_grows_with_samples() {
        let mut learner = OffsetLearner::new(150.0);
        learner.add_sample(sample(24.0, 25.0, -1.0, 0));
        let early = learner.prediction_confidence();

        for i in 1..100 {
            learner.add_sample(sample(24.0, 25.0, -1.0, i * 1000));
        }
        let mature = learner.prediction_confidence();

        assert!(mature > early);
        assert!(mature <= 1.0);
    }

    #[test]
    fn persistence_round_trip() {
        let mut learner = OffsetLearner::new(150.0);
        for i in 0..20 {
            let mut s = sample(24.0 + i as f32 * 0.1, 25.0, -1.0 - i as f32 * 0.05, i * 1000);
            s.indoor_humidity = Some(50.0);
            learner.add_sample(s);
        }

        let snapshot = learner.serialize_for_persistence();

        let mut restored = OffsetLearner::new(150.0);
        assert!(restored.restore_from_persistence(&snapshot));

        assert_eq!(restored.sample_count(), learner.sample_count());
        let a: Vec<LearnedSample> = learner.samples.iter().cloned().collect();
        let b: Vec<LearnedSample> = restored.samples.iter().cloned().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn restore_skips_invalid_entries() {
        let mut learner = OffsetLearner::new(150.0);
        let good = serde_json::to_value(sample(24.0, 25.0, -1.0, 0)).unwrap();

        let ok = learner.restore_from_persistence(&json!({
            "samples": [good, "garbage", {"half": "a sample"}, null],
        }));

        assert!(ok);
        assert_eq!(learner.sample_count(), 1);
    }

    #[test]
    fn restore_fails_on_malformed_top_level() {
        let mut learner = OffsetLearner::new(150.0);

        assert!(!learner.restore_from_persistence(&json!(null)));
        assert!(!learner.restore_from_persistence(&json!([1, 2])));
        assert!(!learner.restore_from_persistence(&json!({"samples": "nope"})));
        assert!(!learner.restore_from_persistence(&json!({"other": []})));
    }

    #[test]
    fn trend_detects_drift() {
        let mut learner = OffsetLearner::new(150.0);
        for i in 0..20 {
            learner.add_sample(sample(24.0, 25.0, -1.0, i * 1000));
        }
        for i in 20..30 {
            learner.add_sample(sample(24.0, 25.0, -2.0, i * 1000));
        }

        let trend = learner.offset_trend().unwrap();
        assert!(trend < -0.1, "expected downward trend, got {}", trend);
    }
}
