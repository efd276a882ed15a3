//! Restricted-zone persistence operations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use utm_core::models::{CreateZoneRequest, RestrictedZone, ZoneId};

use super::{format_ts, parse_ts};

const ZONE_COLUMNS: &str =
    "id, name, description, center_lat, center_lon, radius_m, max_altitude_m, active, created_at";

/// Insert a new zone and return it with its assigned id.
pub async fn insert_zone(
    pool: &SqlitePool,
    request: &CreateZoneRequest,
    now: DateTime<Utc>,
) -> Result<RestrictedZone> {
    let result = sqlx::query(
        r#"
        INSERT INTO restricted_zones (name, description, center_lat, center_lon, radius_m, max_altitude_m, active, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)
        "#,
    )
    .bind(&request.name)
    .bind(&request.description)
    .bind(request.center_lat)
    .bind(request.center_lon)
    .bind(request.radius_m)
    .bind(request.max_altitude_m)
    .bind(format_ts(&now))
    .execute(pool)
    .await?;

    Ok(RestrictedZone {
        id: result.last_insert_rowid(),
        name: request.name.clone(),
        description: request.description.clone(),
        center_lat: request.center_lat,
        center_lon: request.center_lon,
        radius_m: request.radius_m,
        max_altitude_m: request.max_altitude_m,
        active: true,
        created_at: now,
    })
}

/// Load all active zones, oldest first so "first matching zone" is stable.
pub async fn load_active_zones(pool: &SqlitePool) -> Result<Vec<RestrictedZone>> {
    let rows = sqlx::query_as::<_, ZoneRow>(&format!(
        "SELECT {} FROM restricted_zones WHERE active = 1 ORDER BY id",
        ZONE_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

pub async fn get_zone(pool: &SqlitePool, id: ZoneId) -> Result<Option<RestrictedZone>> {
    let row = sqlx::query_as::<_, ZoneRow>(&format!(
        "SELECT {} FROM restricted_zones WHERE id = ?1",
        ZONE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| r.try_into()).transpose()
}

/// Write back the mutable fields of a zone. Returns false if it no longer exists.
pub async fn update_zone(pool: &SqlitePool, zone: &RestrictedZone) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE restricted_zones SET radius_m = ?1, max_altitude_m = ?2, active = ?3 WHERE id = ?4",
    )
    .bind(zone.radius_m)
    .bind(zone.max_altitude_m)
    .bind(zone.active)
    .bind(zone.id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_zone(pool: &SqlitePool, id: ZoneId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM restricted_zones WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[derive(sqlx::FromRow)]
struct ZoneRow {
    id: i64,
    name: String,
    description: Option<String>,
    center_lat: f64,
    center_lon: f64,
    radius_m: f64,
    max_altitude_m: f64,
    active: bool,
    created_at: String,
}

impl TryFrom<ZoneRow> for RestrictedZone {
    type Error = anyhow::Error;

    fn try_from(row: ZoneRow) -> Result<Self> {
        Ok(RestrictedZone {
            id: row.id,
            name: row.name,
            description: row.description,
            center_lat: row.center_lat,
            center_lon: row.center_lon,
            radius_m: row.radius_m,
            max_altitude_m: row.max_altitude_m,
            active: row.active,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}
