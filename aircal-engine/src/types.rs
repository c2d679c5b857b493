//! Domain value objects for the offset engine
//!
//! Every state the original control loop passed around as a free-form
//! string is a tagged enum here: power buckets, hysteresis classification,
//! operating modes and the feedback-source marker. Enums serialize to
//! stable snake_case strings so persisted files stay readable and
//! compatible across versions.

use aircal_core::sanitize;
use serde::{Deserialize, Serialize};

/// Comfort/occupancy mode selected on the climate entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Normal operation
    #[default]
    None,
    /// Occupants away, corrections halved
    Away,
    /// Night mode, gentler corrections
    Sleep,
    /// Aggressive cooling requested
    Boost,
}

impl Mode {
    /// Multiplier applied to the rule-based offset for this mode
    pub fn multiplier(self) -> f32 {
        match self {
            Mode::None => 1.0,
            Mode::Away => 0.5,
            Mode::Sleep => 0.8,
            Mode::Boost => 1.2,
        }
    }

    /// Stable lowercase name, matches the serde form
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::None => "none",
            Mode::Away => "away",
            Mode::Sleep => "sleep",
            Mode::Boost => "boost",
        }
    }
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HVAC operating mode reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    /// Cooling
    Cool,
    /// Heating
    Heat,
    /// Dehumidify
    Dry,
    /// Fan only, no conditioning
    FanOnly,
    /// Automatic heat/cool
    HeatCool,
    /// Device off
    Off,
}

impl HvacMode {
    /// Whether feedback collected in this mode may train the learner
    ///
    /// Offsets observed while heating or idling describe a different
    /// thermal regime than the cooling behavior the learner models.
    pub fn is_learning_eligible(self) -> bool {
        matches!(self, HvacMode::Cool | HvacMode::Dry | HvacMode::HeatCool)
    }
}

/// Bucketed power-consumption level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    /// Compressor off, standby draw only
    Idle,
    /// Fan or very light duty
    Low,
    /// Normal cooling
    Moderate,
    /// Full-tilt cooling
    High,
}

impl PowerState {
    /// Parse a persisted/legacy power-state string
    ///
    /// Unknown strings map to `Idle`: a defensive fallback, not an error.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => PowerState::Low,
            "moderate" => PowerState::Moderate,
            "high" => PowerState::High,
            _ => PowerState::Idle,
        }
    }

    /// Stable lowercase name, matches the serde form
    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::Idle => "idle",
            PowerState::Low => "low",
            PowerState::Moderate => "moderate",
            PowerState::High => "high",
        }
    }

    /// Idle and Low sit below the hysteresis "active" boundary
    pub fn is_idle_class(self) -> bool {
        matches!(self, PowerState::Idle | PowerState::Low)
    }
}

impl core::fmt::Display for PowerState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of the AC's position within its learned control band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HysteresisState {
    /// Thresholds not yet learned; classification unavailable
    LearningHysteresis,
    /// Compressor actively cooling (moderate/high power)
    ActivePhase,
    /// Idle with room temperature above the start-cooling threshold
    IdleAboveStartThreshold,
    /// Idle with room temperature below the stop-cooling threshold
    IdleBelowStopThreshold,
    /// Idle inside the control band (boundaries inclusive)
    IdleStableZone,
    /// No power sensor configured; hysteresis not applicable
    NoPowerSensor,
    /// Learning disabled; hysteresis not applicable
    Disabled,
}

impl HysteresisState {
    /// Stable lowercase name, matches the serde form
    pub fn as_str(self) -> &'static str {
        match self {
            HysteresisState::LearningHysteresis => "learning_hysteresis",
            HysteresisState::ActivePhase => "active_phase",
            HysteresisState::IdleAboveStartThreshold => "idle_above_start_threshold",
            HysteresisState::IdleBelowStopThreshold => "idle_below_stop_threshold",
            HysteresisState::IdleStableZone => "idle_stable_zone",
            HysteresisState::NoPowerSensor => "no_power_sensor",
            HysteresisState::Disabled => "disabled",
        }
    }
}

impl core::fmt::Display for HysteresisState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a setpoint adjustment, used by the feedback-loop guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdjustmentSource {
    /// No adjustment in flight
    #[default]
    None,
    /// Adjustment came from the engine's own prediction; feedback derived
    /// from it must never re-enter the learner
    Prediction,
    /// User changed the setpoint by hand
    Manual,
    /// An external automation changed the setpoint
    External,
}

/// One immutable sensor snapshot handed to `calculate_offset`
///
/// The two critical temperatures are `Option` because the host can lose
/// either sensor at any time; everything else is optional by nature.
/// Derived comfort fields (dew points, heat index, humidity differential)
/// are populated by an external enrichment step before the snapshot
/// reaches the engine.
#[derive(Debug, Clone, Default)]
pub struct OffsetInput {
    /// Temperature the AC's internal (evaporator-side) sensor reports
    pub ac_internal_temp: Option<f32>,
    /// Trusted room temperature
    pub room_temp: Option<f32>,
    /// Outdoor temperature, if an outdoor sensor is configured
    pub outdoor_temp: Option<f32>,
    /// Comfort/occupancy mode
    pub mode: Mode,
    /// Instantaneous power draw in watts
    pub power_consumption: Option<f32>,
    /// Hour of day in [0, 24)
    pub time_of_day_hours: f32,
    /// Day of week, 0 = Monday
    pub day_of_week: u8,
    /// HVAC operating mode, if known
    pub hvac_mode: Option<HvacMode>,
    /// Indoor relative humidity, percent
    pub indoor_humidity: Option<f32>,
    /// Outdoor relative humidity, percent
    pub outdoor_humidity: Option<f32>,
    /// Indoor minus outdoor humidity, pre-derived
    pub humidity_differential: Option<f32>,
    /// Indoor dew point in Celsius, pre-derived
    pub indoor_dew_point: Option<f32>,
    /// Outdoor dew point in Celsius, pre-derived
    pub outdoor_dew_point: Option<f32>,
    /// Heat index in Celsius, pre-derived
    pub heat_index: Option<f32>,
}

impl OffsetInput {
    /// Snapshot with the two critical temperatures set
    pub fn new(ac_internal_temp: f32, room_temp: f32) -> Self {
        Self {
            ac_internal_temp: sanitize::sanitize_temperature(ac_internal_temp),
            room_temp: sanitize::sanitize_temperature(room_temp),
            ..Self::default()
        }
    }

    /// Attach a power reading
    pub fn with_power(mut self, watts: f32) -> Self {
        self.power_consumption = sanitize::sanitize_power(watts);
        self
    }

    /// Attach an outdoor temperature
    pub fn with_outdoor_temp(mut self, celsius: f32) -> Self {
        self.outdoor_temp = sanitize::sanitize_temperature(celsius);
        self
    }

    /// Attach humidity readings; out-of-range values become absent
    pub fn with_humidity(mut self, indoor: Option<f32>, outdoor: Option<f32>) -> Self {
        self.indoor_humidity = indoor.and_then(sanitize::sanitize_humidity);
        self.outdoor_humidity = outdoor.and_then(sanitize::sanitize_humidity);
        self
    }

    /// Set the comfort mode
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the HVAC operating mode
    pub fn with_hvac_mode(mut self, hvac_mode: HvacMode) -> Self {
        self.hvac_mode = Some(hvac_mode);
        self
    }

    /// Set the time-of-day context
    pub fn with_time(mut self, hours: f32, day_of_week: u8) -> Self {
        self.time_of_day_hours = hours.rem_euclid(24.0);
        self.day_of_week = day_of_week % 7;
        self
    }
}

/// Outcome of one offset calculation
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetResult {
    /// Correction in Celsius, already clamped to the configured limit
    pub offset: f32,
    /// Whether clamping changed the computed value
    pub clamped: bool,
    /// Human-readable explanation; the primary diagnostic channel
    pub reason: String,
    /// Trust signal in [0, 1]
    pub confidence: f32,
}

impl OffsetResult {
    /// The all-safe result used whenever a calculation cannot proceed
    pub fn safe_fallback(reason: &str) -> Self {
        Self {
            offset: 0.0,
            clamped: false,
            reason: reason.to_string(),
            confidence: 0.0,
        }
    }
}
