//! Flight-route persistence operations.
//!
//! Routes are written by the flight-request layer; this service only reads them to vet
//! administrative zone changes.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use utm_core::models::{FlightRoute, RouteStatus, Waypoint};

use super::{format_ts, parse_ts};

/// Upsert a flight route into the database.
pub async fn upsert_flight_route(pool: &SqlitePool, route: &FlightRoute) -> Result<()> {
    let waypoints_json = serde_json::to_string(&route.waypoints)?;

    sqlx::query(
        r#"
        INSERT INTO flight_routes (id, drone_id, status, planned_start, planned_end, waypoints)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(id) DO UPDATE SET
            drone_id = ?2, status = ?3, planned_start = ?4,
            planned_end = ?5, waypoints = ?6
        "#,
    )
    .bind(route.id)
    .bind(route.drone_id)
    .bind(route.status.as_str())
    .bind(format_ts(&route.planned_start))
    .bind(format_ts(&route.planned_end))
    .bind(&waypoints_json)
    .execute(pool)
    .await?;

    Ok(())
}

/// Routes that are approved or active and whose window has not yet elapsed.
pub async fn load_active_routes(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<FlightRoute>> {
    let rows = sqlx::query_as::<_, RouteRow>(
        r#"
        SELECT id, drone_id, status, planned_start, planned_end, waypoints
        FROM flight_routes
        WHERE status IN ('approved', 'active') AND planned_end > ?1
        ORDER BY id
        "#,
    )
    .bind(format_ts(&now))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

#[derive(sqlx::FromRow)]
struct RouteRow {
    id: i64,
    drone_id: i64,
    status: String,
    planned_start: String,
    planned_end: String,
    waypoints: String,
}

impl TryFrom<RouteRow> for FlightRoute {
    type Error = anyhow::Error;

    fn try_from(row: RouteRow) -> Result<Self> {
        let status = RouteStatus::parse(&row.status)
            .ok_or_else(|| anyhow!("unknown route status '{}'", row.status))?;
        let waypoints: Vec<Waypoint> = serde_json::from_str(&row.waypoints)?;

        Ok(FlightRoute {
            id: row.id,
            drone_id: row.drone_id,
            status,
            planned_start: parse_ts(&row.planned_start)?,
            planned_end: parse_ts(&row.planned_end)?,
            waypoints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;
    use chrono::Duration;

    fn route(id: i64, status: RouteStatus, end: DateTime<Utc>) -> FlightRoute {
        FlightRoute {
            id,
            drone_id: 1,
            status,
            planned_start: end - Duration::hours(1),
            planned_end: end,
            waypoints: vec![
                Waypoint { lat: 51.05, lon: 71.40, altitude_m: 80.0 },
                Waypoint { lat: 51.10, lon: 71.45, altitude_m: 80.0 },
            ],
        }
    }

    #[tokio::test]
    async fn only_unfinished_approved_or_active_routes_load() {
        let db = init_database(":memory:", 1).await.unwrap();
        let now = Utc::now();

        upsert_flight_route(db.pool(), &route(1, RouteStatus::Approved, now + Duration::hours(1)))
            .await
            .unwrap();
        upsert_flight_route(db.pool(), &route(2, RouteStatus::Active, now - Duration::minutes(1)))
            .await
            .unwrap();
        upsert_flight_route(db.pool(), &route(3, RouteStatus::Pending, now + Duration::hours(1)))
            .await
            .unwrap();
        upsert_flight_route(db.pool(), &route(4, RouteStatus::Active, now + Duration::hours(2)))
            .await
            .unwrap();

        let loaded = load_active_routes(db.pool(), now).await.unwrap();
        let ids: Vec<i64> = loaded.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(loaded[0].waypoints.len(), 2);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_route() {
        let db = init_database(":memory:", 1).await.unwrap();
        let now = Utc::now();
        let mut r = route(1, RouteStatus::Approved, now + Duration::hours(1));
        upsert_flight_route(db.pool(), &r).await.unwrap();

        r.status = RouteStatus::Cancelled;
        upsert_flight_route(db.pool(), &r).await.unwrap();

        assert!(load_active_routes(db.pool(), now).await.unwrap().is_empty());
    }
}
