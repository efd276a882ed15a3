//! Core data models for drone monitoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geodesy::GeoPoint;

pub type DroneId = i64;
pub type ZoneId = i64;
pub type RouteId = i64;
pub type AlertId = i64;

/// Stable hex-cell identifier (H3 index rendered as lowercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellKey(pub String);

impl CellKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ========== TELEMETRY ==========

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DroneStatus {
    #[default]
    Airborne,
    Hovering,
    Landing,
    Landed,
    Emergency,
    Disconnected,
}

impl DroneStatus {
    /// Statuses whose stale records may be evicted by the staleness sweep.
    pub const TERMINAL: [DroneStatus; 3] = [
        DroneStatus::Landed,
        DroneStatus::Emergency,
        DroneStatus::Disconnected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DroneStatus::Airborne => "airborne",
            DroneStatus::Hovering => "hovering",
            DroneStatus::Landing => "landing",
            DroneStatus::Landed => "landed",
            DroneStatus::Emergency => "emergency",
            DroneStatus::Disconnected => "disconnected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "airborne" => Some(DroneStatus::Airborne),
            "hovering" => Some(DroneStatus::Hovering),
            "landing" => Some(DroneStatus::Landing),
            "landed" => Some(DroneStatus::Landed),
            "emergency" => Some(DroneStatus::Emergency),
            "disconnected" => Some(DroneStatus::Disconnected),
            _ => None,
        }
    }

    /// Airborne and hovering drones are never evicted, however old.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DroneStatus::Airborne | DroneStatus::Hovering)
    }
}

fn default_battery() -> f64 {
    100.0
}

/// One telemetry sample as delivered to the ingestion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub drone_id: DroneId,
    #[serde(default)]
    pub flight_request_id: Option<RouteId>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Ground speed in m/s
    #[serde(default)]
    pub speed: f64,
    /// Degrees clockwise from north
    #[serde(default)]
    pub heading: f64,
    #[serde(default = "default_battery")]
    pub battery_level: f64,
    #[serde(default)]
    pub status: DroneStatus,
}

impl TelemetryRecord {
    pub fn new(drone_id: DroneId, latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            drone_id,
            flight_request_id: None,
            latitude,
            longitude,
            altitude,
            speed: 0.0,
            heading: 0.0,
            battery_level: default_battery(),
            status: DroneStatus::Airborne,
        }
    }

    pub fn with_status(mut self, status: DroneStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_battery(mut self, battery_level: f64) -> Self {
        self.battery_level = battery_level;
        self
    }

    pub fn with_flight(mut self, flight_request_id: RouteId) -> Self {
        self.flight_request_id = Some(flight_request_id);
        self
    }

    /// Clamp and normalise the non-positional fields in place.
    ///
    /// Non-finite values fall back to the field default; latitude and
    /// longitude are left untouched for [`GeoPoint::new`] to reject.
    pub fn normalize(&mut self) {
        self.altitude = finite_or(self.altitude, 0.0).max(0.0);
        self.speed = finite_or(self.speed, 0.0).max(0.0);
        self.heading = finite_or(self.heading, 0.0).rem_euclid(360.0);
        self.battery_level = finite_or(self.battery_level, default_battery()).clamp(0.0, 100.0);
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// A telemetry sample after it has been written to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryData {
    pub id: i64,
    pub drone_id: DroneId,
    pub flight_request_id: Option<RouteId>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub heading: f64,
    pub battery_level: f64,
    pub status: DroneStatus,
    pub timestamp: DateTime<Utc>,
}

/// The single live position record kept per drone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub drone_id: DroneId,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub heading: f64,
    pub battery_level: f64,
    pub status: DroneStatus,
    pub cell_id: CellKey,
    pub last_update: DateTime<Utc>,
    pub flight_request_id: Option<RouteId>,
}

impl Position {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.latitude,
            lon: self.longitude,
        }
    }
}

// ========== RESTRICTED ZONES ==========

/// A circular restricted-airspace zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestrictedZone {
    pub id: ZoneId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_m: f64,
    /// Altitude ceiling in meters; 0 means no air traffic at any altitude.
    pub max_altitude_m: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl RestrictedZone {
    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: self.center_lat,
            lon: self.center_lon,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateZoneRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_m: f64,
    #[serde(default)]
    pub max_altitude_m: f64,
}

/// Administrative change to an existing zone; absent fields are unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateZoneRequest {
    pub radius_m: Option<f64>,
    pub max_altitude_m: Option<f64>,
    pub active: Option<bool>,
}

// ========== FLIGHT ROUTES ==========

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    Pending,
    Approved,
    Active,
    Completed,
    Rejected,
    Cancelled,
}

impl RouteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStatus::Pending => "pending",
            RouteStatus::Approved => "approved",
            RouteStatus::Active => "active",
            RouteStatus::Completed => "completed",
            RouteStatus::Rejected => "rejected",
            RouteStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RouteStatus::Pending),
            "approved" => Some(RouteStatus::Approved),
            "active" => Some(RouteStatus::Active),
            "completed" => Some(RouteStatus::Completed),
            "rejected" => Some(RouteStatus::Rejected),
            "cancelled" => Some(RouteStatus::Cancelled),
            _ => None,
        }
    }
}

/// An approved or planned route, owned by the flight-request layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightRoute {
    pub id: RouteId,
    pub drone_id: DroneId,
    pub status: RouteStatus,
    pub planned_start: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    pub waypoints: Vec<Waypoint>,
}

impl FlightRoute {
    /// Routes that administrative zone changes must not break.
    pub fn is_protected(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, RouteStatus::Approved | RouteStatus::Active) && self.planned_end > now
    }
}

// ========== VIOLATIONS & ALERTS ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Drone inside a zone, at or below its ceiling
    GeofenceViolation,
    /// Drone inside a zone, above its ceiling
    AltitudeViolation,
    LowBattery,
    Emergency,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::GeofenceViolation => "geofence_violation",
            AlertKind::AltitudeViolation => "altitude_violation",
            AlertKind::LowBattery => "low_battery",
            AlertKind::Emergency => "emergency",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "geofence_violation" => Some(AlertKind::GeofenceViolation),
            "altitude_violation" => Some(AlertKind::AltitudeViolation),
            "low_battery" => Some(AlertKind::LowBattery),
            "emergency" => Some(AlertKind::Emergency),
            _ => None,
        }
    }
}

/// Transient result of a zone check; never persisted by itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub zone_id: ZoneId,
    pub zone_name: String,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub point: GeoPoint,
    pub altitude_m: f64,
}

/// Alert fields known before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub drone_id: DroneId,
    pub flight_request_id: Option<RouteId>,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub zone_id: Option<ZoneId>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub created_at: DateTime<Utc>,
}

/// A persisted alert. Resolution is one-way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub drone_id: DroneId,
    pub flight_request_id: Option<RouteId>,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub zone_id: Option<ZoneId>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn from_new(id: AlertId, alert: NewAlert) -> Self {
        Self {
            id,
            drone_id: alert.drone_id,
            flight_request_id: alert.flight_request_id,
            kind: alert.kind,
            severity: alert.severity,
            message: alert.message,
            zone_id: alert.zone_id,
            latitude: alert.latitude,
            longitude: alert.longitude,
            altitude: alert.altitude,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
            created_at: alert.created_at,
        }
    }
}

// ========== LIVE UPDATES ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertResolution {
    pub alert_id: AlertId,
    pub drone_id: DroneId,
    pub resolved_by: String,
}

/// One entry of a batched telemetry push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    #[serde(flatten)]
    pub position: Position,
    /// Zone the drone is currently inside, if any
    pub zone_id: Option<ZoneId>,
}

/// Messages pushed to live-update subscribers as `{type, data}` JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LiveEvent {
    TelemetryUpdate(Vec<PositionSnapshot>),
    RestrictedZoneAlert(Vec<Alert>),
    AlertResolved(AlertResolution),
}

impl LiveEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::TelemetryUpdate(_) => "telemetry_update",
            LiveEvent::RestrictedZoneAlert(_) => "restricted_zone_alert",
            LiveEvent::AlertResolved(_) => "alert_resolved",
        }
    }
}
