//! Telemetry sample persistence (append-only).

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use utm_core::models::{DroneId, DroneStatus, TelemetryData, TelemetryRecord};

use super::{format_ts, parse_ts};

/// Append a normalised sample and return the stored record.
pub async fn insert_telemetry(
    pool: &SqlitePool,
    record: &TelemetryRecord,
    now: DateTime<Utc>,
) -> Result<TelemetryData> {
    let result = sqlx::query(
        r#"
        INSERT INTO telemetry_data (drone_id, flight_request_id, latitude, longitude, altitude, speed, heading, battery_level, status, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(record.drone_id)
    .bind(record.flight_request_id)
    .bind(record.latitude)
    .bind(record.longitude)
    .bind(record.altitude)
    .bind(record.speed)
    .bind(record.heading)
    .bind(record.battery_level)
    .bind(record.status.as_str())
    .bind(format_ts(&now))
    .execute(pool)
    .await?;

    Ok(TelemetryData {
        id: result.last_insert_rowid(),
        drone_id: record.drone_id,
        flight_request_id: record.flight_request_id,
        latitude: record.latitude,
        longitude: record.longitude,
        altitude: record.altitude,
        speed: record.speed,
        heading: record.heading,
        battery_level: record.battery_level,
        status: record.status,
        timestamp: now,
    })
}

/// Samples for one drone recorded after `since`, newest first.
pub async fn load_drone_telemetry(
    pool: &SqlitePool,
    drone_id: DroneId,
    since: DateTime<Utc>,
) -> Result<Vec<TelemetryData>> {
    let rows = sqlx::query_as::<_, TelemetryRow>(
        r#"
        SELECT id, drone_id, flight_request_id, latitude, longitude, altitude, speed, heading, battery_level, status, timestamp
        FROM telemetry_data
        WHERE drone_id = ?1 AND timestamp >= ?2
        ORDER BY timestamp DESC, id DESC
        "#,
    )
    .bind(drone_id)
    .bind(format_ts(&since))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

#[derive(sqlx::FromRow)]
struct TelemetryRow {
    id: i64,
    drone_id: i64,
    flight_request_id: Option<i64>,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    speed: f64,
    heading: f64,
    battery_level: f64,
    status: String,
    timestamp: String,
}

impl TryFrom<TelemetryRow> for TelemetryData {
    type Error = anyhow::Error;

    fn try_from(row: TelemetryRow) -> Result<Self> {
        let status = DroneStatus::parse(&row.status)
            .ok_or_else(|| anyhow!("unknown drone status '{}'", row.status))?;

        Ok(TelemetryData {
            id: row.id,
            drone_id: row.drone_id,
            flight_request_id: row.flight_request_id,
            latitude: row.latitude,
            longitude: row.longitude,
            altitude: row.altitude,
            speed: row.speed,
            heading: row.heading,
            battery_level: row.battery_level,
            status,
            timestamp: parse_ts(&row.timestamp)?,
        })
    }
}
