//! Error taxonomy shared by the core and the server.

use std::time::Duration;

use thiserror::Error;

use crate::models::{AlertId, DroneId, RouteId, ZoneId};

/// Failures surfaced by the monitoring core.
///
/// The enum is `Clone` so one failed zone refresh can be handed to every
/// caller that waited on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UtmError {
    #[error("invalid coordinate: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("invalid hex cell key '{0}'")]
    InvalidCell(String),

    #[error("unknown drone {0}")]
    UnknownDrone(DroneId),

    #[error("unknown restricted zone {0}")]
    UnknownZone(ZoneId),

    #[error("unknown alert {0}")]
    UnknownAlert(AlertId),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("subscriber {0} unreachable")]
    SubscriberUnreachable(u64),

    #[error("restricted zone {zone_id} change conflicts with active flight route {route_id}")]
    ConflictingRoute { zone_id: ZoneId, route_id: RouteId },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl UtmError {
    /// Stable snake_case tag used in API error bodies and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            UtmError::InvalidCoordinate { .. } => "invalid_coordinate",
            UtmError::InvalidCell(_) => "invalid_cell",
            UtmError::UnknownDrone(_) => "unknown_drone",
            UtmError::UnknownZone(_) => "unknown_zone",
            UtmError::UnknownAlert(_) => "unknown_alert",
            UtmError::StoreUnavailable(_) => "store_unavailable",
            UtmError::SubscriberUnreachable(_) => "subscriber_unreachable",
            UtmError::ConflictingRoute { .. } => "conflicting_route",
            UtmError::Timeout(_) => "timeout",
        }
    }

    /// Whether a caller may simply retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UtmError::StoreUnavailable(_) | UtmError::Timeout(_))
    }
}

pub type Result<T, E = UtmError> = std::result::Result<T, E>;
