//! Ingestion pipeline tests against an in-memory store.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use utm_core::models::{AlertKind, CreateZoneRequest, Severity};
use utm_core::{DroneStatus, TelemetryRecord, UtmError};
use utm_server::{config::Config, loops, persistence, state::AppState};

async fn test_state(configure: impl FnOnce(&mut Config)) -> Arc<AppState> {
    let mut config = Config::default();
    config.database_path = ":memory:".to_string();
    config.database_max_connections = 1;
    configure(&mut config);

    let db = persistence::init_database(&config.database_path, config.database_max_connections)
        .await
        .expect("init db");
    Arc::new(AppState::new(db, config))
}

async fn airport_zone(state: &AppState) {
    state
        .create_zone(
            CreateZoneRequest {
                name: "Almaty Airport".to_string(),
                description: Some("Control zone".to_string()),
                center_lat: 43.2,
                center_lon: 76.9,
                radius_m: 5_000.0,
                max_altitude_m: 100.0,
            },
            Utc::now(),
        )
        .await
        .expect("create zone");
}

#[tokio::test]
async fn altitude_violation_is_deduplicated_within_window() {
    let state = test_state(|_| {}).await;
    airport_zone(&state).await;
    let t0 = Utc::now();
    let record = TelemetryRecord::new(7, 43.21, 76.91, 150.0);

    let first = state.ingest(record.clone(), t0).await.unwrap();
    assert_eq!(first.alerts.len(), 1);
    assert_eq!(first.alerts[0].kind, AlertKind::AltitudeViolation);
    assert_eq!(first.alerts[0].severity, Severity::High);

    let repeat = state
        .ingest(record.clone(), t0 + Duration::seconds(10))
        .await
        .unwrap();
    assert!(repeat.alerts.is_empty());

    let later = state
        .ingest(record, t0 + Duration::minutes(6))
        .await
        .unwrap();
    assert_eq!(later.alerts.len(), 1);

    let open = state
        .list_alerts(Some(false), t0 - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(open.len(), 2);
}

#[tokio::test]
async fn route_check_flags_only_nearby_routes() {
    let state = test_state(|_| {}).await;
    airport_zone(&state).await;
    let now = Utc::now();

    let near = [
        utm_core::models::Waypoint { lat: 43.18, lon: 76.88, altitude_m: 60.0 },
        utm_core::models::Waypoint { lat: 43.22, lon: 76.92, altitude_m: 60.0 },
    ];
    let check = state.check_route(&near, now).await.unwrap();
    assert!(!check.approved);
    assert_eq!(check.violations[0].kind, AlertKind::GeofenceViolation);

    // Roughly 50 km north of the zone
    let far = [
        utm_core::models::Waypoint { lat: 43.65, lon: 76.88, altitude_m: 60.0 },
        utm_core::models::Waypoint { lat: 43.66, lon: 76.92, altitude_m: 60.0 },
    ];
    let check = state.check_route(&far, now).await.unwrap();
    assert!(check.approved);
    assert!(check.violations.is_empty());
}

#[tokio::test]
async fn sweep_evicts_landed_but_keeps_airborne() {
    let state = test_state(|_| {}).await;
    let t0 = Utc::now();

    state
        .ingest(
            TelemetryRecord::new(1, 51.1, 71.4, 0.0).with_status(DroneStatus::Landed),
            t0,
        )
        .await
        .unwrap();
    state
        .ingest(TelemetryRecord::new(2, 51.2, 71.5, 80.0), t0)
        .await
        .unwrap();

    let report = state.sweep(t0 + Duration::minutes(2));
    assert!(report.evicted.is_empty());

    let report = state.sweep(t0 + Duration::minutes(10));
    assert_eq!(report.evicted.len(), 1);
    assert_eq!(report.evicted[0].drone_id, 1);
    assert_eq!(report.silent.len(), 1);
    assert_eq!(report.silent[0].drone_id, 2);

    assert!(matches!(state.current_position(1), Err(UtmError::UnknownDrone(1))));
    assert!(state.current_position(2).is_ok());
    assert_eq!(state.cell_at(51.1, 71.4).unwrap().cell.drones_count, 0);
    assert_eq!(state.ingest_lock_count(), 1);
}

#[tokio::test]
async fn sweep_survives_oversized_ages() {
    let state = test_state(|config| {
        config.retention = std::time::Duration::from_secs(u64::MAX);
        config.silent_airborne = std::time::Duration::from_secs(u64::MAX);
        config.live_window = std::time::Duration::from_secs(u64::MAX);
    })
    .await;
    let t0 = Utc::now();
    state
        .ingest(
            TelemetryRecord::new(1, 51.1, 71.4, 0.0).with_status(DroneStatus::Landed),
            t0,
        )
        .await
        .unwrap();

    let report = state.sweep(t0 + Duration::days(1));
    assert!(report.evicted.is_empty());
    assert!(report.silent.is_empty());
    assert_eq!(state.live_snapshot(t0 + Duration::days(1)).await.len(), 1);

    let report = state.sweep(t0 + Duration::days(31));
    assert_eq!(report.evicted.len(), 1);
}

#[tokio::test]
async fn moving_drone_changes_cell_membership() {
    let state = test_state(|_| {}).await;
    let t0 = Utc::now();

    let first = state
        .ingest(TelemetryRecord::new(5, 51.10, 71.40, 50.0), t0)
        .await
        .unwrap();
    assert!(first.previous_cell.is_none());

    let second = state
        .ingest(
            TelemetryRecord::new(5, 51.30, 71.70, 50.0),
            t0 + Duration::seconds(1),
        )
        .await
        .unwrap();
    assert_eq!(second.previous_cell.as_ref(), Some(&first.cell));
    assert_ne!(second.cell, first.cell);

    let old_cell = state.cell_by_key(&first.cell).unwrap();
    assert_eq!(old_cell.cell.drones_count, 0);
    let new_cell = state.cell_by_key(&second.cell).unwrap();
    assert_eq!(new_cell.cell.drone_ids, vec![5]);
    assert_eq!(new_cell.positions[0].latitude, 51.30);
}

#[tokio::test]
async fn revisiting_a_cell_keeps_neighbour_counts_exact() {
    let state = test_state(|_| {}).await;
    let t0 = Utc::now();
    let a = (51.10, 71.40);
    let b = (51.30, 71.70);
    let c = (51.50, 72.00);

    // Residents: two in A, one in B, three in C
    let residents = [(10, a), (11, a), (20, b), (30, c), (31, c), (32, c)];
    for (drone_id, (lat, lon)) in residents {
        state
            .ingest(TelemetryRecord::new(drone_id, lat, lon, 40.0), t0)
            .await
            .unwrap();
    }

    let mut cells = Vec::new();
    for (step, (lat, lon)) in [a, b, c, b].into_iter().enumerate() {
        let outcome = state
            .ingest(
                TelemetryRecord::new(99, lat, lon, 40.0),
                t0 + Duration::seconds(step as i64 + 1),
            )
            .await
            .unwrap();
        cells.push(outcome.cell);
    }
    assert_ne!(cells[0], cells[1]);
    assert_ne!(cells[1], cells[2]);
    assert_eq!(cells[1], cells[3]);

    let cell_a = state.cell_by_key(&cells[0]).unwrap().cell;
    let cell_b = state.cell_by_key(&cells[1]).unwrap().cell;
    let cell_c = state.cell_by_key(&cells[2]).unwrap().cell;
    assert_eq!(cell_a.drones_count, 2);
    assert_eq!(cell_b.drones_count, 2);
    assert_eq!(cell_c.drones_count, 3);

    let mut in_b = cell_b.drone_ids.clone();
    in_b.sort_unstable();
    assert_eq!(in_b, vec![20, 99]);
    assert!(!cell_a.drone_ids.contains(&99));
    assert!(!cell_c.drone_ids.contains(&99));
}

#[tokio::test]
async fn concurrent_drones_keep_cells_consistent() {
    let state = test_state(|_| {}).await;
    let now = Utc::now();

    let mut handles = Vec::new();
    for drone_id in 1..=20_i64 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            for step in 0..5 {
                let lat = 51.0 + drone_id as f64 * 0.01 + step as f64 * 0.02;
                state
                    .ingest(
                        TelemetryRecord::new(drone_id, lat, 71.4, 40.0),
                        now + Duration::seconds(step),
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(state.tracker().len(), 20);
    for position in state.tracker().all() {
        let cell = state.cell_by_key(&position.cell_id).unwrap();
        assert!(cell.cell.drone_ids.contains(&position.drone_id));
    }
}

#[tokio::test]
async fn store_failure_leaves_tracker_untouched() {
    let state = test_state(|_| {}).await;
    state.db().pool().close().await;

    let err = state
        .ingest(TelemetryRecord::new(9, 51.1, 71.4, 50.0), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, UtmError::StoreUnavailable(_)));
    assert!(err.is_retryable());
    assert!(state.tracker().is_empty());
    assert_eq!(state.ingest_lock_count(), 0);
}

#[tokio::test]
async fn sweep_prunes_locks_of_untracked_drones() {
    let state = test_state(|_| {}).await;
    let t0 = Utc::now();
    state
        .ingest(
            TelemetryRecord::new(1, 51.1, 71.4, 0.0).with_status(DroneStatus::Landed),
            t0,
        )
        .await
        .unwrap();
    state
        .ingest(TelemetryRecord::new(2, 51.2, 71.5, 80.0), t0)
        .await
        .unwrap();
    assert_eq!(state.ingest_lock_count(), 2);

    state.sweep(t0 + Duration::minutes(10));
    assert_eq!(state.ingest_lock_count(), 1);

    // A rejected sample never creates a lock
    assert!(state
        .ingest(TelemetryRecord::new(3, 95.0, 71.4, 10.0), t0)
        .await
        .is_err());
    assert_eq!(state.ingest_lock_count(), 1);
}

#[tokio::test]
async fn subscribers_receive_alerts_and_batched_updates() {
    let state = test_state(|config| {
        config.tick_interval = std::time::Duration::from_millis(20);
    })
    .await;
    airport_zone(&state).await;

    let mut subscription = state.broadcaster().subscribe();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let live = tokio::spawn(loops::live_update_loop::run_live_update_loop(
        state.clone(),
        shutdown_rx,
    ));

    state
        .ingest(TelemetryRecord::new(7, 43.2, 76.9, 50.0), Utc::now())
        .await
        .unwrap();

    let mut seen_alert = false;
    let mut seen_update = false;
    while !(seen_alert && seen_update) {
        let payload = tokio::time::timeout(std::time::Duration::from_secs(2), subscription.rx.recv())
            .await
            .expect("live event")
            .expect("subscription open");
        let event: serde_json::Value = serde_json::from_str(&payload).unwrap();
        match event["type"].as_str() {
            Some("restricted_zone_alert") => {
                assert_eq!(event["data"][0]["drone_id"], 7);
                assert_eq!(event["data"][0]["kind"], "geofence_violation");
                seen_alert = true;
            }
            Some("telemetry_update") => {
                assert_eq!(event["data"][0]["drone_id"], 7);
                assert_eq!(event["data"][0]["zone_id"], 1);
                seen_update = true;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    shutdown_tx.send(()).unwrap();
    live.await.unwrap();
}
