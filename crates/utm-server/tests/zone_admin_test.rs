//! Zone administration against stored flight routes.

use chrono::{Duration, Utc};
use std::sync::Arc;
use utm_core::models::{
    CreateZoneRequest, FlightRoute, RestrictedZone, RouteStatus, UpdateZoneRequest, Waypoint,
};
use utm_core::{TelemetryRecord, UtmError};
use utm_server::{config::Config, persistence, state::AppState};

async fn test_state() -> Arc<AppState> {
    let mut config = Config::default();
    config.database_path = ":memory:".to_string();
    config.database_max_connections = 1;

    let db = persistence::init_database(&config.database_path, config.database_max_connections)
        .await
        .expect("init db");
    Arc::new(AppState::new(db, config))
}

async fn stadium(state: &AppState) -> RestrictedZone {
    state
        .create_zone(
            CreateZoneRequest {
                name: "Stadium".to_string(),
                description: None,
                center_lat: 51.07,
                center_lon: 71.42,
                radius_m: 1_000.0,
                max_altitude_m: 120.0,
            },
            Utc::now(),
        )
        .await
        .expect("create zone")
}

/// A route passing about 2.2 km south of the stadium.
async fn store_route(state: &AppState, status: RouteStatus) {
    let now = Utc::now();
    persistence::routes::upsert_flight_route(
        state.db().pool(),
        &FlightRoute {
            id: 5,
            drone_id: 9,
            status,
            planned_start: now - Duration::minutes(10),
            planned_end: now + Duration::hours(1),
            waypoints: vec![
                Waypoint { lat: 51.05, lon: 71.38, altitude_m: 80.0 },
                Waypoint { lat: 51.05, lon: 71.46, altitude_m: 80.0 },
            ],
        },
    )
    .await
    .expect("store route");
}

fn grow(radius_m: f64) -> UpdateZoneRequest {
    UpdateZoneRequest {
        radius_m: Some(radius_m),
        max_altitude_m: None,
        active: None,
    }
}

#[tokio::test]
async fn growing_zone_onto_approved_route_is_rejected() {
    let state = test_state().await;
    let zone = stadium(&state).await;
    store_route(&state, RouteStatus::Approved).await;

    let err = state
        .update_zone(zone.id, grow(3_000.0), Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err, UtmError::ConflictingRoute { zone_id: zone.id, route_id: 5 });

    // The stored zone is unchanged
    let zones = state.list_zones(Utc::now()).await.unwrap();
    assert_eq!(zones[0].radius_m, 1_000.0);

    let updated = state
        .update_zone(zone.id, grow(1_500.0), Utc::now())
        .await
        .unwrap();
    assert_eq!(updated.radius_m, 1_500.0);
    assert_eq!(state.list_zones(Utc::now()).await.unwrap()[0].radius_m, 1_500.0);
}

#[tokio::test]
async fn completed_routes_do_not_block_changes() {
    let state = test_state().await;
    let zone = stadium(&state).await;
    store_route(&state, RouteStatus::Completed).await;

    let updated = state
        .update_zone(zone.id, grow(3_000.0), Utc::now())
        .await
        .unwrap();
    assert_eq!(updated.radius_m, 3_000.0);

    state.delete_zone(zone.id, Utc::now()).await.unwrap();
    assert!(state.list_zones(Utc::now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_zone_under_active_route_is_rejected() {
    let state = test_state().await;
    let zone = stadium(&state).await;
    state
        .update_zone(zone.id, grow(3_000.0), Utc::now())
        .await
        .unwrap();
    store_route(&state, RouteStatus::Active).await;

    let err = state.delete_zone(zone.id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, UtmError::ConflictingRoute { route_id: 5, .. }));
    assert_eq!(state.list_zones(Utc::now()).await.unwrap().len(), 1);

    assert!(matches!(
        state.delete_zone(999, Utc::now()).await,
        Err(UtmError::UnknownZone(999))
    ));
}

#[tokio::test]
async fn zone_changes_apply_to_next_sample() {
    let state = test_state().await;
    let zone = stadium(&state).await;
    let now = Utc::now();

    let inside = state
        .ingest(TelemetryRecord::new(3, 51.07, 71.42, 50.0), now)
        .await
        .unwrap();
    assert_eq!(inside.alerts.len(), 1);

    state
        .update_zone(
            zone.id,
            UpdateZoneRequest {
                radius_m: None,
                max_altitude_m: None,
                active: Some(false),
            },
            now,
        )
        .await
        .unwrap();

    let after = state
        .ingest(
            TelemetryRecord::new(4, 51.07, 71.42, 50.0),
            now + Duration::seconds(1),
        )
        .await
        .unwrap();
    assert!(after.alerts.is_empty());
}

#[tokio::test]
async fn invalid_zone_geometry_is_rejected() {
    let state = test_state().await;

    let err = state
        .create_zone(
            CreateZoneRequest {
                name: "Broken".to_string(),
                description: None,
                center_lat: 51.07,
                center_lon: 71.42,
                radius_m: -5.0,
                max_altitude_m: 120.0,
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UtmError::InvalidCoordinate { .. }));
}
