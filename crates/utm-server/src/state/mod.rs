//! Shared application state and the telemetry ingestion pipeline.

pub mod broadcaster;
pub mod dedup;
pub mod single_flight;
pub mod tracker;
pub mod zone_admin;
pub mod zone_cache;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};
use utm_core::models::{
    Alert, AlertId, AlertResolution, CellKey, DroneId, LiveEvent, Position, PositionSnapshot,
    TelemetryData, TelemetryRecord, Violation, Waypoint,
};
use utm_core::{check_point, check_route, GeoPoint, UtmError};

use crate::config::{bounded_age, Config};
use crate::persistence::{alerts, telemetry, Database};

pub use broadcaster::{Broadcaster, Subscription};
pub use dedup::AlertDeduplicator;
pub use tracker::{HexCell, PositionTracker};
pub use zone_cache::{ZoneCache, ZoneList, ZoneSource};

/// Result of one accepted telemetry sample.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub telemetry: TelemetryData,
    pub alerts: Vec<Alert>,
    pub previous_cell: Option<CellKey>,
    pub cell: CellKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct DroneOverview {
    #[serde(flatten)]
    pub position: Position,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub tracked_drones: usize,
    pub unresolved_alerts: i64,
    pub active_zones: usize,
    pub drones: Vec<DroneOverview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteCheck {
    pub approved: bool,
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CellDetail {
    #[serde(flatten)]
    pub cell: HexCell,
    pub positions: Vec<Position>,
}

/// Outcome of one staleness sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub evicted: Vec<Position>,
    pub silent: Vec<Position>,
}

pub(crate) fn store_err(err: anyhow::Error) -> UtmError {
    UtmError::StoreUnavailable(err.to_string())
}

pub struct AppState {
    config: Config,
    db: Database,
    tracker: PositionTracker,
    zone_cache: ZoneCache<Database>,
    dedup: AlertDeduplicator,
    broadcaster: Broadcaster,
    /// Serializes the whole pipeline per drone; different drones never contend.
    ingest_locks: DashMap<DroneId, Arc<AsyncMutex<()>>>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            tracker: PositionTracker::new(config.hex_resolution),
            zone_cache: ZoneCache::new(db.clone(), config.zone_cache_ttl, config.zone_retry_max),
            dedup: AlertDeduplicator::new(config.alert_rules.clone()),
            broadcaster: Broadcaster::new(config.subscriber_buffer),
            ingest_locks: DashMap::new(),
            db,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn zone_cache(&self) -> &ZoneCache<Database> {
        &self.zone_cache
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Run a read under the configured query timeout.
    pub async fn with_timeout<T, F>(&self, fut: F) -> Result<T, UtmError>
    where
        F: Future<Output = Result<T, UtmError>>,
    {
        let limit = self.config.query_timeout;
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| UtmError::Timeout(limit))?
    }

    fn ingest_lock(&self, drone_id: DroneId) -> Arc<AsyncMutex<()>> {
        self.ingest_locks
            .entry(drone_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .value()
            .clone()
    }

    /// Drop a drone's ingest lock once nobody holds it and the drone is not tracked.
    fn release_ingest_lock(&self, drone_id: DroneId) {
        self.ingest_locks.remove_if(&drone_id, |_, lock| {
            Arc::strong_count(lock) == 1 && self.tracker.current(drone_id).is_none()
        });
    }

    /// Number of per-drone ingest locks currently held in memory.
    pub fn ingest_lock_count(&self) -> usize {
        self.ingest_locks.len()
    }

    /// Accept one telemetry sample.
    ///
    /// Invalid coordinates are rejected before anything is touched. The sample is stored
    /// before the live position moves, so a store failure leaves the tracker unchanged.
    /// Zone-check and alerting failures are logged and do not fail the sample.
    pub async fn ingest(
        &self,
        mut record: TelemetryRecord,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, UtmError> {
        record.normalize();
        let point = GeoPoint::new(record.latitude, record.longitude).map_err(|err| {
            warn!(drone_id = record.drone_id, error = %err, "Rejected telemetry");
            err
        })?;

        let lock = self.ingest_lock(record.drone_id);
        let guard = lock.lock().await;

        let placed = match telemetry::insert_telemetry(self.db.pool(), &record, now).await {
            Ok(stored) => self
                .tracker
                .ingest(&record, now)
                .map(|(previous_cell, cell)| (stored, previous_cell, cell)),
            Err(err) => {
                warn!(drone_id = record.drone_id, error = %err, "Failed to persist telemetry");
                Err(store_err(err))
            }
        };
        let (stored, previous_cell, cell) = match placed {
            Ok(placed) => placed,
            Err(err) => {
                drop(guard);
                drop(lock);
                self.release_ingest_lock(record.drone_id);
                return Err(err);
            }
        };
        let _guard = guard;
        if previous_cell.as_ref() != Some(&cell) {
            debug!(
                drone_id = record.drone_id,
                from = ?previous_cell.as_ref().map(|c| c.as_str()),
                to = cell.as_str(),
                "Drone changed cell"
            );
        }

        let mut raised = Vec::new();
        match self.zone_cache.active_zones(now).await {
            Ok(zones) => match check_point(point, record.altitude, &zones) {
                Some(violation) => {
                    self.collect(
                        &mut raised,
                        record.drone_id,
                        self.dedup.on_violation(&self.db, &record, &violation, now).await,
                    );
                }
                None => self.dedup.clear(record.drone_id),
            },
            Err(err) => {
                warn!(drone_id = record.drone_id, error = %err, "Zone check skipped");
            }
        }

        self.collect(
            &mut raised,
            record.drone_id,
            self.dedup.on_low_battery(&self.db, &record, now).await,
        );
        if record.status == utm_core::DroneStatus::Emergency {
            self.collect(
                &mut raised,
                record.drone_id,
                self.dedup.on_emergency(&self.db, &record, now).await,
            );
        }

        if !raised.is_empty() {
            self.broadcaster
                .publish(&LiveEvent::RestrictedZoneAlert(raised.clone()));
        }

        Ok(IngestOutcome {
            telemetry: stored,
            alerts: raised,
            previous_cell,
            cell,
        })
    }

    fn collect(
        &self,
        raised: &mut Vec<Alert>,
        drone_id: DroneId,
        result: Result<Option<Alert>, UtmError>,
    ) {
        match result {
            Ok(Some(alert)) => raised.push(alert),
            Ok(None) => {}
            Err(err) => warn!(drone_id, error = %err, "Alert evaluation failed"),
        }
    }

    /// Positions updated within the live window, each tagged with the zone it is in.
    ///
    /// A drone that fails to classify is logged and sent without a zone.
    pub async fn live_snapshot(&self, now: DateTime<Utc>) -> Vec<PositionSnapshot> {
        let window = bounded_age(self.config.live_window);
        let positions = self.tracker.updated_since(now - window);
        if positions.is_empty() {
            return Vec::new();
        }

        let zones = match self.zone_cache.active_zones(now).await {
            Ok(zones) => Some(zones),
            Err(err) => {
                warn!(error = %err, "Live tick without zone data");
                None
            }
        };

        positions
            .into_iter()
            .map(|position| {
                let zone_id = zones.as_ref().and_then(|zones| {
                    match GeoPoint::new(position.latitude, position.longitude) {
                        Ok(point) => check_point(point, position.altitude, zones).map(|v| v.zone_id),
                        Err(err) => {
                            warn!(drone_id = position.drone_id, error = %err, "Skipping zone check");
                            None
                        }
                    }
                });
                PositionSnapshot { position, zone_id }
            })
            .collect()
    }

    /// Evict stale terminal drones and report silent in-flight ones.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let retention = bounded_age(self.config.retention);
        let silent_after = bounded_age(self.config.silent_airborne);

        let evicted = self
            .tracker
            .evict_stale(now, retention, &utm_core::DroneStatus::TERMINAL);
        for position in &evicted {
            self.dedup.forget(position.drone_id);
        }
        self.ingest_locks.retain(|drone_id, lock| {
            Arc::strong_count(lock) > 1 || self.tracker.current(*drone_id).is_some()
        });

        SweepReport {
            evicted,
            silent: self.tracker.silent(now, silent_after),
        }
    }

    pub async fn telemetry_history(
        &self,
        drone_id: DroneId,
        since: DateTime<Utc>,
    ) -> Result<Vec<TelemetryData>, UtmError> {
        self.with_timeout(async {
            telemetry::load_drone_telemetry(self.db.pool(), drone_id, since)
                .await
                .map_err(store_err)
        })
        .await
    }

    pub async fn list_alerts(
        &self,
        resolved: Option<bool>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Alert>, UtmError> {
        self.with_timeout(async {
            alerts::list_alerts(self.db.pool(), resolved, since)
                .await
                .map_err(store_err)
        })
        .await
    }

    /// Resolve an alert and tell subscribers. Resolving twice is a no-op.
    pub async fn resolve_alert(
        &self,
        alert_id: AlertId,
        resolved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Alert, UtmError> {
        let (alert, changed) = alerts::resolve_alert(self.db.pool(), alert_id, resolved_by, now)
            .await
            .map_err(store_err)?
            .ok_or(UtmError::UnknownAlert(alert_id))?;

        if changed {
            tracing::info!(alert_id, drone_id = alert.drone_id, resolved_by, "Alert resolved");
            self.broadcaster
                .publish(&LiveEvent::AlertResolved(AlertResolution {
                    alert_id,
                    drone_id: alert.drone_id,
                    resolved_by: resolved_by.to_string(),
                }));
        }
        Ok(alert)
    }

    pub async fn dashboard(&self, now: DateTime<Utc>) -> Result<Dashboard, UtmError> {
        self.with_timeout(async {
            let zones = self.zone_cache.active_zones(now).await?;
            let unresolved_alerts = alerts::count_unresolved(self.db.pool())
                .await
                .map_err(store_err)?;

            let positions = self.tracker.all();
            let mut drones = Vec::with_capacity(positions.len());
            for position in positions {
                let alerts = alerts::load_unresolved_for_drone(self.db.pool(), position.drone_id)
                    .await
                    .map_err(store_err)?;
                drones.push(DroneOverview { position, alerts });
            }

            Ok(Dashboard {
                tracked_drones: drones.len(),
                unresolved_alerts,
                active_zones: zones.len(),
                drones,
            })
        })
        .await
    }

    /// Pre-flight check of a planned route against the active zones.
    pub async fn check_route(
        &self,
        waypoints: &[Waypoint],
        now: DateTime<Utc>,
    ) -> Result<RouteCheck, UtmError> {
        for wp in waypoints {
            GeoPoint::new(wp.lat, wp.lon)?;
        }
        let zones = self
            .with_timeout(self.zone_cache.active_zones(now))
            .await?;
        let violations = check_route(waypoints, &zones);
        Ok(RouteCheck {
            approved: violations.is_empty(),
            violations,
        })
    }

    pub fn current_position(&self, drone_id: DroneId) -> Result<Position, UtmError> {
        self.tracker
            .current(drone_id)
            .ok_or(UtmError::UnknownDrone(drone_id))
    }

    pub fn cell_by_key(&self, key: &CellKey) -> Result<CellDetail, UtmError> {
        let cell = self.tracker.cell(key)?;
        let positions = self.tracker.members(&cell);
        Ok(CellDetail { cell, positions })
    }

    pub fn cell_at(&self, lat: f64, lon: f64) -> Result<CellDetail, UtmError> {
        let key = self.tracker.cell_key_at(lat, lon)?;
        self.cell_by_key(&key)
    }
}
