//! Alert deduplication.
//!
//! An alert is created only when no unresolved alert of the same (drone, kind, zone) exists
//! inside the kind's window. A drone moving into a different zone, or back into a zone after
//! leaving it, always re-alerts.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};
use utm_core::models::{
    Alert, AlertKind, DroneId, NewAlert, Severity, TelemetryRecord, Violation, ZoneId,
};
use utm_core::{AlertRules, UtmError};

use crate::persistence::{alerts, Database};
use crate::state::store_err;

pub struct AlertDeduplicator {
    rules: AlertRules,
    /// Last known zone per drone. Absent means unknown (e.g. after restart), in which case
    /// the persisted alerts decide.
    last_zone: DashMap<DroneId, Option<ZoneId>>,
}

impl AlertDeduplicator {
    pub fn new(rules: AlertRules) -> Self {
        Self {
            rules,
            last_zone: DashMap::new(),
        }
    }

    pub fn rules(&self) -> &AlertRules {
        &self.rules
    }

    /// Persist a new alert for `violation` unless it repeats a recent one.
    pub async fn on_violation(
        &self,
        db: &Database,
        record: &TelemetryRecord,
        violation: &Violation,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, UtmError> {
        let drone_id = record.drone_id;
        let previous = self.last_zone.get(&drone_id).map(|z| *z.value());
        let transition = match previous {
            Some(previous) => previous != Some(violation.zone_id),
            None => false,
        };

        if !transition {
            let since = now - self.rules.window_for(violation.kind);
            let existing = alerts::find_recent_unresolved(
                db.pool(),
                drone_id,
                violation.kind,
                Some(violation.zone_id),
                since,
            )
            .await
            .map_err(store_err)?;

            if let Some(existing) = existing {
                debug!(
                    drone_id,
                    zone_id = violation.zone_id,
                    alert_id = existing.id,
                    kind = violation.kind.as_str(),
                    "Violation suppressed"
                );
                self.last_zone.insert(drone_id, Some(violation.zone_id));
                return Ok(None);
            }
        }

        let alert = alerts::insert_alert(
            db.pool(),
            NewAlert {
                drone_id,
                flight_request_id: record.flight_request_id,
                kind: violation.kind,
                severity: violation.severity,
                message: violation.message.clone(),
                zone_id: Some(violation.zone_id),
                latitude: record.latitude,
                longitude: record.longitude,
                altitude: record.altitude,
                created_at: now,
            },
        )
        .await
        .map_err(store_err)?;

        self.last_zone.insert(drone_id, Some(violation.zone_id));
        info!(
            drone_id,
            zone_id = violation.zone_id,
            alert_id = alert.id,
            severity = alert.severity.as_str(),
            "{}",
            alert.message
        );
        Ok(Some(alert))
    }

    /// Record that the drone's latest sample matched no zone.
    pub fn clear(&self, drone_id: DroneId) {
        self.last_zone.insert(drone_id, None);
    }

    /// Drop everything known about a drone that is no longer tracked.
    pub fn forget(&self, drone_id: DroneId) {
        self.last_zone.remove(&drone_id);
    }

    /// Raise a low-battery alert, escalating from medium to high inside the window.
    pub async fn on_low_battery(
        &self,
        db: &Database,
        record: &TelemetryRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, UtmError> {
        let Some(severity) = self.rules.battery_severity(record.battery_level) else {
            return Ok(None);
        };

        let message = format!(
            "Low battery on drone {}: {:.1}% remaining",
            record.drone_id, record.battery_level
        );
        self.raise_unzoned(db, record, AlertKind::LowBattery, severity, message, now)
            .await
    }

    /// Raise an emergency alert for a drone reporting `emergency` status.
    pub async fn on_emergency(
        &self,
        db: &Database,
        record: &TelemetryRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, UtmError> {
        let message = format!("Drone {} declared an emergency", record.drone_id);
        self.raise_unzoned(db, record, AlertKind::Emergency, Severity::High, message, now)
            .await
    }

    async fn raise_unzoned(
        &self,
        db: &Database,
        record: &TelemetryRecord,
        kind: AlertKind,
        severity: Severity,
        message: String,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, UtmError> {
        let since = now - self.rules.window_for(kind);
        let existing =
            alerts::find_recent_unresolved(db.pool(), record.drone_id, kind, None, since)
                .await
                .map_err(store_err)?;

        if let Some(existing) = existing {
            if existing.severity >= severity {
                debug!(
                    drone_id = record.drone_id,
                    alert_id = existing.id,
                    kind = kind.as_str(),
                    "Alert suppressed"
                );
                return Ok(None);
            }
        }

        let alert = alerts::insert_alert(
            db.pool(),
            NewAlert {
                drone_id: record.drone_id,
                flight_request_id: record.flight_request_id,
                kind,
                severity,
                message,
                zone_id: None,
                latitude: record.latitude,
                longitude: record.longitude,
                altitude: record.altitude,
                created_at: now,
            },
        )
        .await
        .map_err(store_err)?;

        info!(
            drone_id = record.drone_id,
            alert_id = alert.id,
            severity = alert.severity.as_str(),
            "{}",
            alert.message
        );
        Ok(Some(alert))
    }
}
