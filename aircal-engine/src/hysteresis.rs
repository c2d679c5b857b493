//! Hysteresis Learning from Power Transitions
//!
//! ## Overview
//!
//! An AC does not chase its setpoint exactly: it starts cooling when the
//! room drifts some way above target and stops once it has pushed the room
//! some way below. That spread is the hysteresis band, and knowing it tells
//! the engine whether the AC is about to act on its own, which changes how
//! a temperature discrepancy should be interpreted.
//!
//! The band is learned passively. Every time power consumption crosses the
//! idle boundary the room temperature at that instant is recorded:
//! idle -> active transitions sample the *start-cooling* threshold,
//! active -> idle transitions sample the *stop-cooling* threshold. The
//! learned thresholds are the medians of the two bounded sample buffers:
//! single mis-timed transitions (a defrost cycle, a power blip) should
//! not move the band.
//!
//! ## Classification
//!
//! With both thresholds learned, `(power_state, room_temp)` classifies into
//! one of five states; boundary temperatures belong to the stable zone, a
//! deliberate tie-break so a room sitting exactly on a threshold is not
//! reported as out of band.
//!
//! ## Failure Semantics
//!
//! No operation here returns an error or panics. Malformed persisted data
//! degrades to the insufficient-data state rather than crashing a restore.

use aircal_core::buffer::CircularBuffer;
use serde_json::{json, Value};

use crate::types::{HysteresisState, PowerState};

/// Capacity of each transition-temperature buffer
pub const MAX_SAMPLES: usize = 50;

/// Samples each buffer needs before thresholds are considered reliable
pub const DEFAULT_MIN_SAMPLES: usize = 5;

/// Which side of the control band a power transition samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Idle -> active: the room temperature that triggered cooling
    Start,
    /// Active -> idle: the room temperature where cooling stopped
    Stop,
}

/// Learns the AC's start/stop temperature thresholds from transitions
#[derive(Debug, Clone)]
pub struct HysteresisLearner {
    start_temps: CircularBuffer<f32, MAX_SAMPLES>,
    stop_temps: CircularBuffer<f32, MAX_SAMPLES>,
    min_samples: usize,
    learned_start_threshold: Option<f32>,
    learned_stop_threshold: Option<f32>,
}

impl HysteresisLearner {
    /// New learner with the default reliability minimum
    pub fn new() -> Self {
        Self::with_min_samples(DEFAULT_MIN_SAMPLES)
    }

    /// New learner with a custom reliability minimum
    pub fn with_min_samples(min_samples: usize) -> Self {
        Self {
            start_temps: CircularBuffer::new(),
            stop_temps: CircularBuffer::new(),
            min_samples: min_samples.max(1),
            learned_start_threshold: None,
            learned_stop_threshold: None,
        }
    }

    /// Record a power transition observed at `room_temp`
    ///
    /// Non-finite temperatures are ignored. Thresholds are recomputed
    /// after every accepted sample.
    pub fn record_transition(&mut self, kind: TransitionKind, room_temp: f32) {
        if !room_temp.is_finite() {
            log::warn!("ignoring non-finite transition temperature");
            return;
        }

        match kind {
            TransitionKind::Start => self.start_temps.push(room_temp),
            TransitionKind::Stop => self.stop_temps.push(room_temp),
        }

        self.update_thresholds();
    }

    /// Whether both buffers have reached the reliability minimum
    pub fn has_sufficient_data(&self) -> bool {
        self.start_temps.len() >= self.min_samples && self.stop_temps.len() >= self.min_samples
    }

    /// Learned start-cooling threshold, if reliable
    pub fn learned_start_threshold(&self) -> Option<f32> {
        self.learned_start_threshold
    }

    /// Learned stop-cooling threshold, if reliable
    pub fn learned_stop_threshold(&self) -> Option<f32> {
        self.learned_stop_threshold
    }

    /// Number of recorded (start, stop) samples
    pub fn sample_counts(&self) -> (usize, usize) {
        (self.start_temps.len(), self.stop_temps.len())
    }

    /// Classify the AC's position in its control band
    ///
    /// Pure function of `(power_state, room_temp)` for fixed learned
    /// thresholds. Returns `LearningHysteresis` whenever thresholds are
    /// unavailable, including the defensive case where buffers are full
    /// but a threshold is still `None`.
    pub fn get_hysteresis_state(&self, power_state: PowerState, room_temp: f32) -> HysteresisState {
        let (Some(start), Some(stop)) = (self.learned_start_threshold, self.learned_stop_threshold)
        else {
            return HysteresisState::LearningHysteresis;
        };

        if !power_state.is_idle_class() {
            return HysteresisState::ActivePhase;
        }

        if room_temp > start {
            HysteresisState::IdleAboveStartThreshold
        } else if room_temp < stop {
            HysteresisState::IdleBelowStopThreshold
        } else {
            // stop <= room_temp <= start: boundaries belong to the stable zone
            HysteresisState::IdleStableZone
        }
    }

    /// Drop all samples and thresholds
    pub fn reset(&mut self) {
        self.start_temps.clear();
        self.stop_temps.clear();
        self.learned_start_threshold = None;
        self.learned_stop_threshold = None;
    }

    fn update_thresholds(&mut self) {
        if self.has_sufficient_data() {
            self.learned_start_threshold = self.start_temps.median();
            self.learned_stop_threshold = self.stop_temps.median();
        } else {
            self.learned_start_threshold = None;
            self.learned_stop_threshold = None;
        }
    }

    /// JSON-safe snapshot of the sample buffers
    pub fn serialize_for_persistence(&self) -> Value {
        json!({
            "start_temps": self.start_temps.iter().copied().collect::<Vec<f32>>(),
            "stop_temps": self.stop_temps.iter().copied().collect::<Vec<f32>>(),
        })
    }

    /// Restore buffers from persisted data, tolerating damage
    ///
    /// Missing keys leave a buffer empty, non-list values clear it,
    /// non-numeric entries are skipped individually and a non-object top
    /// level is a no-op. Thresholds are recomputed from whatever restored.
    /// Never fails.
    pub fn restore_from_persistence(&mut self, data: &Value) {
        let Some(map) = data.as_object() else {
            log::warn!("hysteresis restore: top level is not an object, keeping current state");
            return;
        };

        Self::restore_buffer(&mut self.start_temps, map.get("start_temps"), "start_temps");
        Self::restore_buffer(&mut self.stop_temps, map.get("stop_temps"), "stop_temps");

        self.update_thresholds();
    }

    fn restore_buffer(
        buffer: &mut CircularBuffer<f32, MAX_SAMPLES>,
        entry: Option<&Value>,
        name: &str,
    ) {
        buffer.clear();

        let Some(value) = entry else {
            return; // missing key: empty buffer
        };

        let Some(list) = value.as_array() else {
            log::warn!("hysteresis restore: {} is not a list, cleared", name);
            return;
        };

        let mut skipped = 0usize;
        for item in list {
            match item.as_f64() {
                Some(v) if (v as f32).is_finite() => buffer.push(v as f32),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            log::warn!(
                "hysteresis restore: skipped {} non-numeric entries in {}",
                skipped,
                name
            );
        }
    }
}

impl Default for HysteresisLearner {
    fn default() -> Self {
        Self::new()
    }
}
