//! Live position table and hex-cell membership.
//!
//! One `Position` per drone in a `DashMap`, plus a lazily grown table of hex cells. Each
//! cell's geometry is immutable; its membership set sits behind its own mutex.
//!
//! Lock order: the drone's position entry first, then cell mutexes in `CellKey` order.
//! Nothing takes a position entry while holding a cell mutex.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use utm_core::hexgrid::{cell_for, CellGeometry, Resolution};
use utm_core::models::{CellKey, DroneId, DroneStatus, Position, TelemetryRecord};
use utm_core::{GeoPoint, UtmError};

#[derive(Debug)]
struct Membership {
    drone_ids: BTreeSet<DroneId>,
    last_change: DateTime<Utc>,
}

/// A hex cell: fixed geometry plus mutable membership.
#[derive(Debug)]
pub struct CellSlot {
    geometry: CellGeometry,
    membership: Mutex<Membership>,
}

impl CellSlot {
    fn new(geometry: CellGeometry, now: DateTime<Utc>) -> Self {
        Self {
            geometry,
            membership: Mutex::new(Membership {
                drone_ids: BTreeSet::new(),
                last_change: now,
            }),
        }
    }

    pub fn geometry(&self) -> &CellGeometry {
        &self.geometry
    }

    pub fn drones_count(&self) -> usize {
        self.membership.lock().drone_ids.len()
    }

    fn view(&self) -> HexCell {
        let membership = self.membership.lock();
        HexCell {
            cell_id: self.geometry.cell_id.clone(),
            center: self.geometry.center,
            boundary: self.geometry.boundary.clone(),
            drones_count: membership.drone_ids.len(),
            drone_ids: membership.drone_ids.iter().copied().collect(),
            last_change: Some(membership.last_change),
        }
    }
}

/// Point-in-time copy of a cell's metadata.
#[derive(Debug, Clone, Serialize)]
pub struct HexCell {
    pub cell_id: CellKey,
    pub center: GeoPoint,
    pub boundary: Vec<GeoPoint>,
    pub drones_count: usize,
    pub drone_ids: Vec<DroneId>,
    /// `None` for a cell that has never been referenced
    pub last_change: Option<DateTime<Utc>>,
}

pub struct PositionTracker {
    resolution: Resolution,
    positions: DashMap<DroneId, Position>,
    cells: DashMap<CellKey, Arc<CellSlot>>,
}

impl PositionTracker {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            positions: DashMap::new(),
            cells: DashMap::new(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Existing cell, or a new one with zero members. Concurrent callers for the same key
    /// all receive the same slot.
    pub fn get_or_create(&self, key: &CellKey, now: DateTime<Utc>) -> Result<Arc<CellSlot>, UtmError> {
        if let Some(slot) = self.cells.get(key) {
            return Ok(slot.value().clone());
        }

        let geometry = CellGeometry::compute(key)?;
        let slot = self
            .cells
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CellSlot::new(geometry, now)));
        Ok(slot.value().clone())
    }

    /// Upsert the drone's position and move its cell membership.
    ///
    /// The record must already be normalised. Returns `(previous_cell, new_cell)`.
    pub fn ingest(
        &self,
        record: &TelemetryRecord,
        now: DateTime<Utc>,
    ) -> Result<(Option<CellKey>, CellKey), UtmError> {
        let point = GeoPoint::new(record.latitude, record.longitude)?;
        let cell_id = cell_for(point, self.resolution)?;
        let new_slot = self.get_or_create(&cell_id, now)?;

        let position = Position {
            drone_id: record.drone_id,
            latitude: record.latitude,
            longitude: record.longitude,
            altitude: record.altitude,
            speed: record.speed,
            heading: record.heading,
            battery_level: record.battery_level,
            status: record.status,
            cell_id: cell_id.clone(),
            last_update: now,
            flight_request_id: record.flight_request_id,
        };

        match self.positions.entry(record.drone_id) {
            Entry::Occupied(mut entry) => {
                let previous = entry.get().cell_id.clone();
                if previous != cell_id {
                    let old_slot = self.cells.get(&previous).map(|slot| slot.value().clone());
                    match old_slot {
                        Some(old_slot) => {
                            move_member(record.drone_id, &old_slot, &new_slot, now);
                        }
                        None => {
                            add_member(record.drone_id, &new_slot, now);
                        }
                    }
                }
                entry.insert(position);
                Ok((Some(previous), cell_id))
            }
            Entry::Vacant(entry) => {
                add_member(record.drone_id, &new_slot, now);
                entry.insert(position);
                Ok((None, cell_id))
            }
        }
    }

    pub fn current(&self, drone_id: DroneId) -> Option<Position> {
        self.positions.get(&drone_id).map(|p| p.value().clone())
    }

    pub fn all(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.iter().map(|p| p.value().clone()).collect();
        positions.sort_by_key(|p| p.drone_id);
        positions
    }

    /// Positions refreshed at or after `since`.
    pub fn updated_since(&self, since: DateTime<Utc>) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .positions
            .iter()
            .filter(|p| p.last_update >= since)
            .map(|p| p.value().clone())
            .collect();
        positions.sort_by_key(|p| p.drone_id);
        positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Remove positions older than `max_age` whose status is in `eligible`, releasing their
    /// cell membership. In-flight drones are never evicted.
    pub fn evict_stale(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
        eligible: &[DroneStatus],
    ) -> Vec<Position> {
        let cutoff = now - max_age;
        let is_stale = |p: &Position| {
            !p.status.is_in_flight() && eligible.contains(&p.status) && p.last_update < cutoff
        };

        let candidates: Vec<DroneId> = self
            .positions
            .iter()
            .filter(|p| is_stale(p.value()))
            .map(|p| *p.key())
            .collect();

        let mut evicted = Vec::new();
        for drone_id in candidates {
            // Re-check under the entry lock; the drone may have reported since
            if let Entry::Occupied(entry) = self.positions.entry(drone_id) {
                if !is_stale(entry.get()) {
                    continue;
                }
                if let Some(slot) = self.cells.get(&entry.get().cell_id).map(|s| s.value().clone()) {
                    remove_member(drone_id, &slot, now);
                }
                evicted.push(entry.remove());
            }
        }
        evicted
    }

    /// Airborne or hovering drones that have not reported for longer than `max_age`.
    pub fn silent(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<Position> {
        let cutoff = now - max_age;
        self.positions
            .iter()
            .filter(|p| p.status.is_in_flight() && p.last_update < cutoff)
            .map(|p| p.value().clone())
            .collect()
    }

    /// Cell metadata. A valid key that no drone has referenced yet reports zero members
    /// without creating the cell.
    pub fn cell(&self, key: &CellKey) -> Result<HexCell, UtmError> {
        if let Some(slot) = self.cells.get(key).map(|s| s.value().clone()) {
            return Ok(slot.view());
        }

        let geometry = CellGeometry::compute(key)?;
        Ok(HexCell {
            cell_id: geometry.cell_id,
            center: geometry.center,
            boundary: geometry.boundary,
            drones_count: 0,
            drone_ids: Vec::new(),
            last_change: None,
        })
    }

    /// Cell key for a raw coordinate at the tracker's resolution.
    pub fn cell_key_at(&self, lat: f64, lon: f64) -> Result<CellKey, UtmError> {
        cell_for(GeoPoint::new(lat, lon)?, self.resolution)
    }

    /// Current positions of a cell's members.
    pub fn members(&self, cell: &HexCell) -> Vec<Position> {
        cell.drone_ids
            .iter()
            .filter_map(|id| self.current(*id))
            .filter(|p| p.cell_id == cell.cell_id)
            .collect()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

fn add_member(drone_id: DroneId, slot: &CellSlot, now: DateTime<Utc>) {
    let mut membership = slot.membership.lock();
    if membership.drone_ids.insert(drone_id) {
        membership.last_change = now;
    }
}

fn remove_member(drone_id: DroneId, slot: &CellSlot, now: DateTime<Utc>) {
    let mut membership = slot.membership.lock();
    if membership.drone_ids.remove(&drone_id) {
        membership.last_change = now;
    }
}

/// Move a drone between two distinct cells while holding both cell locks, so no reader
/// sees it in neither or both.
fn move_member(drone_id: DroneId, from: &CellSlot, to: &CellSlot, now: DateTime<Utc>) {
    let (mut from_guard, mut to_guard) = lock_pair(from, to);
    if from_guard.drone_ids.remove(&drone_id) {
        from_guard.last_change = now;
    }
    if to_guard.drone_ids.insert(drone_id) {
        to_guard.last_change = now;
    }
}

fn lock_pair<'a>(
    a: &'a CellSlot,
    b: &'a CellSlot,
) -> (MutexGuard<'a, Membership>, MutexGuard<'a, Membership>) {
    if a.geometry.cell_id <= b.geometry.cell_id {
        let first = a.membership.lock();
        let second = b.membership.lock();
        (first, second)
    } else {
        let second = b.membership.lock();
        let first = a.membership.lock();
        (first, second)
    }
}
