//! Alert persistence operations.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use utm_core::models::{Alert, AlertId, AlertKind, DroneId, NewAlert, Severity, ZoneId};

use super::{format_ts, parse_ts};

const ALERT_COLUMNS: &str = "id, drone_id, flight_request_id, alert_type, severity, message, zone_id, \
     latitude, longitude, altitude, resolved, resolved_at, resolved_by, created_at";

pub async fn insert_alert(pool: &SqlitePool, alert: NewAlert) -> Result<Alert> {
    let result = sqlx::query(
        r#"
        INSERT INTO alerts (drone_id, flight_request_id, alert_type, severity, message, zone_id, latitude, longitude, altitude, resolved, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)
        "#,
    )
    .bind(alert.drone_id)
    .bind(alert.flight_request_id)
    .bind(alert.kind.as_str())
    .bind(alert.severity.as_str())
    .bind(&alert.message)
    .bind(alert.zone_id)
    .bind(alert.latitude)
    .bind(alert.longitude)
    .bind(alert.altitude)
    .bind(format_ts(&alert.created_at))
    .execute(pool)
    .await?;

    Ok(Alert::from_new(result.last_insert_rowid(), alert))
}

/// Most recent unresolved alert for (drone, kind, zone) created at or after `since`.
///
/// `zone_id = None` matches alerts with no zone (battery, emergency).
pub async fn find_recent_unresolved(
    pool: &SqlitePool,
    drone_id: DroneId,
    kind: AlertKind,
    zone_id: Option<ZoneId>,
    since: DateTime<Utc>,
) -> Result<Option<Alert>> {
    let row = sqlx::query_as::<_, AlertRow>(&format!(
        r#"
        SELECT {}
        FROM alerts
        WHERE drone_id = ?1 AND alert_type = ?2 AND zone_id IS ?3
          AND resolved = 0 AND created_at >= ?4
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
        ALERT_COLUMNS
    ))
    .bind(drone_id)
    .bind(kind.as_str())
    .bind(zone_id)
    .bind(format_ts(&since))
    .fetch_optional(pool)
    .await?;

    row.map(|r| r.try_into()).transpose()
}

pub async fn get_alert(pool: &SqlitePool, id: AlertId) -> Result<Option<Alert>> {
    let row = sqlx::query_as::<_, AlertRow>(&format!(
        "SELECT {} FROM alerts WHERE id = ?1",
        ALERT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| r.try_into()).transpose()
}

/// Mark an alert resolved. Already-resolved alerts keep their original resolution.
///
/// Returns the stored alert and whether this call resolved it, or `None` if no such
/// alert exists.
pub async fn resolve_alert(
    pool: &SqlitePool,
    id: AlertId,
    resolved_by: &str,
    now: DateTime<Utc>,
) -> Result<Option<(Alert, bool)>> {
    let result = sqlx::query(
        "UPDATE alerts SET resolved = 1, resolved_at = ?1, resolved_by = ?2 WHERE id = ?3 AND resolved = 0",
    )
    .bind(format_ts(&now))
    .bind(resolved_by)
    .bind(id)
    .execute(pool)
    .await?;
    let changed = result.rows_affected() > 0;

    Ok(get_alert(pool, id).await?.map(|alert| (alert, changed)))
}

/// Alerts created at or after `since`, newest first, optionally filtered by resolution.
pub async fn list_alerts(
    pool: &SqlitePool,
    resolved: Option<bool>,
    since: DateTime<Utc>,
) -> Result<Vec<Alert>> {
    let rows = sqlx::query_as::<_, AlertRow>(&format!(
        r#"
        SELECT {}
        FROM alerts
        WHERE created_at >= ?1 AND (?2 IS NULL OR resolved = ?2)
        ORDER BY created_at DESC, id DESC
        "#,
        ALERT_COLUMNS
    ))
    .bind(format_ts(&since))
    .bind(resolved)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

pub async fn count_unresolved(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM alerts WHERE resolved = 0")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn load_unresolved_for_drone(pool: &SqlitePool, drone_id: DroneId) -> Result<Vec<Alert>> {
    let rows = sqlx::query_as::<_, AlertRow>(&format!(
        "SELECT {} FROM alerts WHERE drone_id = ?1 AND resolved = 0 ORDER BY created_at DESC, id DESC",
        ALERT_COLUMNS
    ))
    .bind(drone_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: i64,
    drone_id: i64,
    flight_request_id: Option<i64>,
    alert_type: String,
    severity: String,
    message: String,
    zone_id: Option<i64>,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    resolved: bool,
    resolved_at: Option<String>,
    resolved_by: Option<String>,
    created_at: String,
}

impl TryFrom<AlertRow> for Alert {
    type Error = anyhow::Error;

    fn try_from(row: AlertRow) -> Result<Self> {
        let kind = AlertKind::parse(&row.alert_type)
            .ok_or_else(|| anyhow!("unknown alert type '{}'", row.alert_type))?;
        let severity = Severity::parse(&row.severity)
            .ok_or_else(|| anyhow!("unknown severity '{}'", row.severity))?;
        let resolved_at = row.resolved_at.as_deref().map(parse_ts).transpose()?;

        Ok(Alert {
            id: row.id,
            drone_id: row.drone_id,
            flight_request_id: row.flight_request_id,
            kind,
            severity,
            message: row.message,
            zone_id: row.zone_id,
            latitude: row.latitude,
            longitude: row.longitude,
            altitude: row.altitude,
            resolved: row.resolved,
            resolved_at,
            resolved_by: row.resolved_by,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;
    use chrono::Duration;

    fn new_alert(drone_id: DroneId, kind: AlertKind, zone_id: Option<ZoneId>, at: DateTime<Utc>) -> NewAlert {
        NewAlert {
            drone_id,
            flight_request_id: None,
            kind,
            severity: Severity::Medium,
            message: "test".to_string(),
            zone_id,
            latitude: 43.2,
            longitude: 76.9,
            altitude: 50.0,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn find_recent_unresolved_respects_zone_and_window() {
        let db = init_database(":memory:", 1).await.unwrap();
        let now = Utc::now();

        let stored = insert_alert(db.pool(), new_alert(7, AlertKind::GeofenceViolation, Some(1), now))
            .await
            .unwrap();
        insert_alert(db.pool(), new_alert(7, AlertKind::LowBattery, None, now))
            .await
            .unwrap();

        let since = now - Duration::minutes(5);
        let hit = find_recent_unresolved(db.pool(), 7, AlertKind::GeofenceViolation, Some(1), since)
            .await
            .unwrap();
        assert_eq!(hit.map(|a| a.id), Some(stored.id));

        let other_zone = find_recent_unresolved(db.pool(), 7, AlertKind::GeofenceViolation, Some(2), since)
            .await
            .unwrap();
        assert!(other_zone.is_none());

        let battery = find_recent_unresolved(db.pool(), 7, AlertKind::LowBattery, None, since)
            .await
            .unwrap();
        assert!(battery.is_some());

        let later = find_recent_unresolved(
            db.pool(),
            7,
            AlertKind::GeofenceViolation,
            Some(1),
            now + Duration::seconds(1),
        )
        .await
        .unwrap();
        assert!(later.is_none());
    }

    #[tokio::test]
    async fn resolution_is_one_way() {
        let db = init_database(":memory:", 1).await.unwrap();
        let now = Utc::now();
        let alert = insert_alert(db.pool(), new_alert(7, AlertKind::Emergency, None, now))
            .await
            .unwrap();
        assert_eq!(count_unresolved(db.pool()).await.unwrap(), 1);

        let (resolved, changed) = resolve_alert(db.pool(), alert.id, "ops", now).await.unwrap().unwrap();
        assert!(changed);
        assert!(resolved.resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("ops"));

        let (again, changed) =
            resolve_alert(db.pool(), alert.id, "someone-else", now + Duration::minutes(1))
                .await
                .unwrap()
                .unwrap();
        assert!(!changed);
        assert_eq!(again.resolved_by.as_deref(), Some("ops"));
        assert_eq!(count_unresolved(db.pool()).await.unwrap(), 0);

        assert!(resolve_alert(db.pool(), 999, "ops", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_resolution_and_age() {
        let db = init_database(":memory:", 1).await.unwrap();
        let now = Utc::now();
        let old = insert_alert(db.pool(), new_alert(1, AlertKind::Emergency, None, now - Duration::hours(30)))
            .await
            .unwrap();
        let a = insert_alert(db.pool(), new_alert(1, AlertKind::Emergency, None, now - Duration::minutes(2)))
            .await
            .unwrap();
        let b = insert_alert(db.pool(), new_alert(2, AlertKind::Emergency, None, now))
            .await
            .unwrap();
        resolve_alert(db.pool(), a.id, "ops", now).await.unwrap();

        let since = now - Duration::hours(24);
        let all = list_alerts(db.pool(), None, since).await.unwrap();
        assert_eq!(all.iter().map(|x| x.id).collect::<Vec<_>>(), vec![b.id, a.id]);

        let open = list_alerts(db.pool(), Some(false), since).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, b.id);

        let for_drone = load_unresolved_for_drone(db.pool(), 1).await.unwrap();
        assert_eq!(for_drone.len(), 1);
        assert_eq!(for_drone[0].id, old.id);
    }
}
