//! Integration tests for engine state persistence
//!
//! Full save/restore cycles through the coordinator, schema migration
//! from legacy files, thermal-data passthrough and partial-failure
//! isolation.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use aircal_core::time::FixedClock;
use aircal_engine::{
    EngineConfig, OffsetEngine, OffsetInput, PersistedState, PersistenceCoordinator,
    SCHEMA_VERSION,
};
use serde_json::{json, Value};

fn powered_config() -> EngineConfig {
    EngineConfig {
        power_sensor: Some("sensor.ac_power".into()),
        enable_learning: true,
        ..Default::default()
    }
}

fn trained_engine() -> (OffsetEngine, FixedClock) {
    let clock = FixedClock::new(1_000_000_000);
    let mut engine =
        OffsetEngine::new(powered_config()).with_time_source(Box::new(clock.clone()));

    let input = OffsetInput::new(24.0, 25.0)
        .with_power(30.0)
        .with_humidity(Some(55.0), Some(60.0));
    for _ in 0..12 {
        clock.advance(61_000);
        engine.record_actual_performance(-1.0, -1.1, &input);
    }

    // Cycle power a few times so the hysteresis buffers hold data
    for _ in 0..6 {
        engine.calculate_offset(&OffsetInput::new(24.0, 24.5).with_power(30.0), None);
        engine.calculate_offset(&OffsetInput::new(24.0, 24.5).with_power(200.0), None);
        engine.calculate_offset(&OffsetInput::new(23.0, 23.0).with_power(30.0), None);
    }

    (engine, clock)
}

#[test]
fn engine_round_trip_through_coordinator() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("climate.living_room.json");
    let mut coordinator = PersistenceCoordinator::new(&path, "climate.living_room");

    let (mut engine, _clock) = trained_engine();
    let before = engine.learner_statistics();

    let latency = coordinator
        .save(&engine.serialize_for_persistence(), engine.thermal_data())
        .unwrap();
    engine.record_save_latency(latency);

    // A fresh engine picks the state back up
    let mut restored = OffsetEngine::new(powered_config());
    assert!(restored.restore_from_persistence(coordinator.load().unwrap()));

    let after = restored.learner_statistics();
    assert_eq!(after.samples_collected, before.samples_collected);
    assert_eq!(after.avg_accuracy, before.avg_accuracy);
    assert_eq!(after.last_sample_time, before.last_sample_time);
    assert!(!restored.is_in_calibration());

    // Hysteresis buffers survived too
    let snapshot = restored.serialize_for_persistence();
    let hysteresis = snapshot.hysteresis_data.unwrap();
    assert_eq!(hysteresis["start_temps"].as_array().unwrap().len(), 6);
    assert_eq!(hysteresis["stop_temps"].as_array().unwrap().len(), 6);
}

#[test]
fn thermal_data_passes_through_opaquely() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let mut coordinator = PersistenceCoordinator::new(&path, "climate.office");

    let thermal_payload = json!({ "tau_cooling": 92.5, "samples": [1, 2, 3] });

    let payload = thermal_payload.clone();
    let engine = OffsetEngine::new(powered_config()).with_thermal_callbacks(
        Box::new(move || Some(payload.clone())),
        Box::new(|_| {}),
    );

    coordinator
        .save(&engine.serialize_for_persistence(), engine.thermal_data())
        .unwrap();

    // The payload comes back byte-identical, uninterpreted
    let restored_payload: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
    let capture = restored_payload.clone();
    let mut restored = OffsetEngine::new(powered_config()).with_thermal_callbacks(
        Box::new(|| None),
        Box::new(move |data| {
            *capture.borrow_mut() = Some(data);
        }),
    );
    restored.restore_from_persistence(coordinator.load().unwrap());

    assert_eq!(restored_payload.borrow().as_ref(), Some(&thermal_payload));
}

#[test]
fn legacy_file_migrates_to_current_schema_on_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    // A v1-style file: the payload is the learning data itself
    fs::write(
        &path,
        serde_json::to_string(&json!({
            "engine_state": { "enable_learning": true },
            "learner_data": { "samples": [] },
            "hysteresis_data": { "start_temps": [24.0], "stop_temps": [23.0] },
        }))
        .unwrap(),
    )
    .unwrap();

    let mut coordinator = PersistenceCoordinator::new(&path, "climate.office");
    let mut engine = OffsetEngine::new(EngineConfig {
        enable_learning: false,
        ..powered_config()
    });
    assert!(engine.restore_from_persistence(coordinator.load().unwrap()));

    // The persisted flag was applied
    assert!(engine.config().enable_learning);

    // Next save rewrites in the current shape
    coordinator
        .save(&engine.serialize_for_persistence(), None)
        .unwrap();
    let document: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(document["version"], json!(SCHEMA_VERSION));
    assert!(document["learning_data"]["hysteresis_data"]["start_temps"].is_array());
}

#[test]
fn corrupt_learner_data_does_not_block_hysteresis_restore() {
    let mut engine = OffsetEngine::new(powered_config());

    let restored = engine.restore_from_persistence(PersistedState {
        enable_learning: None,
        learner_data: Some(json!("completely wrong shape")),
        hysteresis_data: Some(json!({
            "start_temps": [24.0, 24.5, 24.0, 24.2, 24.1],
            "stop_temps": [23.0, 23.1, 22.9, 23.0, 23.0],
        })),
        seasonal_data: None,
        thermal_data: None,
    });

    // Hysteresis made it even though the learner payload was garbage
    assert!(restored);
    assert_eq!(engine.learner_statistics().samples_collected, 0);
    let snapshot = engine.serialize_for_persistence();
    assert_eq!(
        snapshot.hysteresis_data.unwrap()["start_temps"]
            .as_array()
            .unwrap()
            .len(),
        5
    );
}

#[test]
fn restore_with_nothing_usable_reports_false() {
    let mut engine = OffsetEngine::new(powered_config());

    let restored = engine.restore_from_persistence(PersistedState {
        enable_learning: None,
        learner_data: Some(json!(null)),
        hysteresis_data: None,
        seasonal_data: None,
        thermal_data: None,
    });

    assert!(!restored);
    assert_eq!(engine.learner_statistics().samples_collected, 0);
}

#[test]
fn seasonal_payload_survives_round_trip_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let mut coordinator = PersistenceCoordinator::new(&path, "climate.office");

    let seasonal = json!({ "patterns": { "summer": 1.2 } });
    let mut engine = OffsetEngine::new(powered_config());
    engine.restore_from_persistence(PersistedState {
        seasonal_data: Some(seasonal.clone()),
        ..Default::default()
    });

    coordinator
        .save(&engine.serialize_for_persistence(), None)
        .unwrap();

    let state = coordinator.load().unwrap();
    assert_eq!(state.seasonal_data, Some(seasonal));
}
