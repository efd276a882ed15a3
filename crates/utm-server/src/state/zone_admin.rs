//! Administrative zone changes, guarded by a route pre-check.
//!
//! A change is rejected when an approved or active route whose window has not elapsed
//! would newly violate the zone: it violates the proposed zone and either did not violate
//! the current one or now violates it with a higher severity. Deleting a zone is rejected
//! while any such route intersects it.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use utm_core::models::{CreateZoneRequest, FlightRoute, RestrictedZone, UpdateZoneRequest, ZoneId};
use utm_core::{check_route, GeoPoint, UtmError};

use super::{store_err, AppState, ZoneList};
use crate::persistence::{routes, zones};

/// Pre-check for updating `current` to `proposed`.
pub fn check_zone_update(
    current: &RestrictedZone,
    proposed: &RestrictedZone,
    routes: &[FlightRoute],
    now: DateTime<Utc>,
) -> Result<(), UtmError> {
    for route in routes.iter().filter(|r| r.is_protected(now)) {
        let Some(after) = check_route(&route.waypoints, std::slice::from_ref(proposed)).pop() else {
            continue;
        };
        let newly_violates = match check_route(&route.waypoints, std::slice::from_ref(current)).pop() {
            None => true,
            Some(before) => after.severity > before.severity,
        };
        if newly_violates {
            return Err(UtmError::ConflictingRoute {
                zone_id: current.id,
                route_id: route.id,
            });
        }
    }
    Ok(())
}

/// Pre-check for deleting `zone`.
pub fn check_zone_delete(
    zone: &RestrictedZone,
    routes: &[FlightRoute],
    now: DateTime<Utc>,
) -> Result<(), UtmError> {
    match routes
        .iter()
        .filter(|r| r.is_protected(now))
        .find(|r| !check_route(&r.waypoints, std::slice::from_ref(zone)).is_empty())
    {
        Some(route) => Err(UtmError::ConflictingRoute {
            zone_id: zone.id,
            route_id: route.id,
        }),
        None => Ok(()),
    }
}

fn validate_geometry(lat: f64, lon: f64, radius_m: f64, max_altitude_m: f64) -> Result<(), UtmError> {
    GeoPoint::new(lat, lon)?;
    if !(radius_m.is_finite() && radius_m > 0.0 && max_altitude_m.is_finite() && max_altitude_m >= 0.0) {
        return Err(UtmError::InvalidCoordinate { lat, lon });
    }
    Ok(())
}

impl AppState {
    /// Active zones through the cache.
    pub async fn list_zones(&self, now: DateTime<Utc>) -> Result<ZoneList, UtmError> {
        self.with_timeout(self.zone_cache.active_zones(now)).await
    }

    pub async fn create_zone(
        &self,
        request: CreateZoneRequest,
        now: DateTime<Utc>,
    ) -> Result<RestrictedZone, UtmError> {
        validate_geometry(
            request.center_lat,
            request.center_lon,
            request.radius_m,
            request.max_altitude_m,
        )?;

        let zone = zones::insert_zone(self.db.pool(), &request, now)
            .await
            .map_err(store_err)?;
        self.zone_cache.invalidate();
        info!(zone_id = zone.id, name = %zone.name, "Restricted zone created");
        Ok(zone)
    }

    pub async fn update_zone(
        &self,
        zone_id: ZoneId,
        update: UpdateZoneRequest,
        now: DateTime<Utc>,
    ) -> Result<RestrictedZone, UtmError> {
        let current = zones::get_zone(self.db.pool(), zone_id)
            .await
            .map_err(store_err)?
            .ok_or(UtmError::UnknownZone(zone_id))?;

        let mut proposed = current.clone();
        if let Some(radius_m) = update.radius_m {
            proposed.radius_m = radius_m;
        }
        if let Some(max_altitude_m) = update.max_altitude_m {
            proposed.max_altitude_m = max_altitude_m;
        }
        if let Some(active) = update.active {
            proposed.active = active;
        }
        validate_geometry(
            proposed.center_lat,
            proposed.center_lon,
            proposed.radius_m,
            proposed.max_altitude_m,
        )?;

        let active_routes = routes::load_active_routes(self.db.pool(), now)
            .await
            .map_err(store_err)?;
        if let Err(err) = check_zone_update(&current, &proposed, &active_routes, now) {
            warn!(zone_id, error = %err, "Zone update rejected");
            return Err(err);
        }

        if !zones::update_zone(self.db.pool(), &proposed)
            .await
            .map_err(store_err)?
        {
            return Err(UtmError::UnknownZone(zone_id));
        }
        self.zone_cache.invalidate();
        info!(
            zone_id,
            radius_m = proposed.radius_m,
            max_altitude_m = proposed.max_altitude_m,
            active = proposed.active,
            "Restricted zone updated"
        );
        Ok(proposed)
    }

    pub async fn delete_zone(&self, zone_id: ZoneId, now: DateTime<Utc>) -> Result<(), UtmError> {
        let zone = zones::get_zone(self.db.pool(), zone_id)
            .await
            .map_err(store_err)?
            .ok_or(UtmError::UnknownZone(zone_id))?;

        let active_routes = routes::load_active_routes(self.db.pool(), now)
            .await
            .map_err(store_err)?;
        if let Err(err) = check_zone_delete(&zone, &active_routes, now) {
            warn!(zone_id, error = %err, "Zone deletion rejected");
            return Err(err);
        }

        if !zones::delete_zone(self.db.pool(), zone_id)
            .await
            .map_err(store_err)?
        {
            return Err(UtmError::UnknownZone(zone_id));
        }
        self.zone_cache.invalidate();
        info!(zone_id, "Restricted zone deleted");
        Ok(())
    }
}
