pub mod conflict;
pub mod error;
pub mod geodesy;
pub mod hexgrid;
pub mod models;
pub mod rules;

pub use conflict::{check_point, check_route};
pub use error::{Result, UtmError};
pub use geodesy::{distance, point_in_circle, segment_intersects_circle, GeoPoint};
pub use hexgrid::{cell_for, CellGeometry};
pub use models::{
    Alert, AlertId, AlertKind, AlertResolution, CellKey, CreateZoneRequest, DroneId, DroneStatus,
    FlightRoute, LiveEvent, NewAlert, Position, PositionSnapshot, RestrictedZone, RouteId,
    RouteStatus, Severity, TelemetryData, TelemetryRecord, UpdateZoneRequest, Violation,
    Waypoint, ZoneId,
};
pub use rules::AlertRules;
