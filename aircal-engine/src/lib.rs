//! Adaptive offset and hysteresis learning engine
//!
//! Corrects the discrepancy between an air-conditioner's internal sensor
//! and a trusted room sensor, learning over time how much offset to apply
//! so the AC targets the true room temperature.
//!
//! The pipeline per sensor snapshot: sanitized input -> outlier gate ->
//! hysteresis transition detection and classification -> learned-offset
//! prediction -> rule/learned blend, clamp and confidence scoring.
//! Feedback flows backward through a guarded validation ladder into the
//! learner. All state persists to a versioned JSON file per entity.
//!
//! ```no_run
//! use aircal_engine::{EngineConfig, OffsetEngine, OffsetInput};
//!
//! let mut engine = OffsetEngine::new(EngineConfig {
//!     power_sensor: Some("sensor.ac_power".into()),
//!     enable_learning: true,
//!     ..Default::default()
//! });
//!
//! let input = OffsetInput::new(24.0, 25.0).with_power(30.0);
//! let result = engine.calculate_offset(&input, None);
//! println!("offset {:.1}°C because {}", result.offset, result.reason);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod hysteresis;
pub mod learner;
pub mod metrics;
pub mod persistence;
pub mod types;

// Public API
pub use config::EngineConfig;
pub use engine::{
    DashboardMetrics, EngineSnapshot, OffsetEngine, PersistedState, SeasonalAdjuster,
    MIN_SAMPLES_FOR_ACTIVE_CONTROL,
};
pub use hysteresis::{HysteresisLearner, TransitionKind};
pub use learner::{LearnedSample, LearnerStatistics, OffsetLearner, PredictQuery};
pub use persistence::{PersistenceCoordinator, PersistenceError, SCHEMA_VERSION};
pub use types::{
    AdjustmentSource, HvacMode, HysteresisState, Mode, OffsetInput, OffsetResult, PowerState,
};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
