//! Restricted-zone conflict detection.
//!
//! `check_point` classifies a live telemetry sample; `check_route` vets a
//! planned route before approval. Both work on raw circles; zone counts are
//! small (tens) so a linear scan per call is fine.

use crate::geodesy::{point_in_circle, segment_intersects_circle, GeoPoint};
use crate::models::{AlertKind, RestrictedZone, Severity, Violation, Waypoint};

/// Classify a single point against the zone list.
///
/// Only the first matching active zone (in iteration order) is reported.
/// Above the zone ceiling is `High`, otherwise `Medium`.
pub fn check_point(point: GeoPoint, altitude_m: f64, zones: &[RestrictedZone]) -> Option<Violation> {
    zones
        .iter()
        .filter(|zone| zone.active)
        .find(|zone| point_in_circle(point, zone.center(), zone.radius_m))
        .map(|zone| classify_point(zone, point, altitude_m))
}

fn classify_point(zone: &RestrictedZone, point: GeoPoint, altitude_m: f64) -> Violation {
    if altitude_m > zone.max_altitude_m {
        Violation {
            zone_id: zone.id,
            zone_name: zone.name.clone(),
            kind: AlertKind::AltitudeViolation,
            severity: Severity::High,
            message: format!(
                "Altitude violation in {}: {:.1}m > {:.1}m",
                zone.name, altitude_m, zone.max_altitude_m
            ),
            point,
            altitude_m,
        }
    } else {
        Violation {
            zone_id: zone.id,
            zone_name: zone.name.clone(),
            kind: AlertKind::GeofenceViolation,
            severity: Severity::Medium,
            message: format!("Entered restricted zone: {}", zone.name),
            point,
            altitude_m,
        }
    }
}

/// Check a planned route against every active zone.
///
/// Each zone contributes at most one violation, whose message lists the
/// waypoints inside the zone and the legs crossing it. Waypoints with
/// invalid coordinates are skipped; validate upstream.
pub fn check_route(waypoints: &[Waypoint], zones: &[RestrictedZone]) -> Vec<Violation> {
    let points: Vec<(usize, GeoPoint, f64)> = waypoints
        .iter()
        .enumerate()
        .filter_map(|(idx, wp)| {
            GeoPoint::new(wp.lat, wp.lon)
                .ok()
                .map(|point| (idx, point, wp.altitude_m))
        })
        .collect();

    zones
        .iter()
        .filter(|zone| zone.active)
        .filter_map(|zone| route_violation(&points, zone))
        .collect()
}

fn route_violation(points: &[(usize, GeoPoint, f64)], zone: &RestrictedZone) -> Option<Violation> {
    let center = zone.center();

    let inside: Vec<&(usize, GeoPoint, f64)> = points
        .iter()
        .filter(|(_, point, _)| point_in_circle(*point, center, zone.radius_m))
        .collect();

    let crossing: Vec<(&(usize, GeoPoint, f64), &(usize, GeoPoint, f64))> = points
        .windows(2)
        .filter(|pair| segment_intersects_circle(pair[0].1, pair[1].1, center, zone.radius_m))
        .map(|pair| (&pair[0], &pair[1]))
        .collect();

    if inside.is_empty() && crossing.is_empty() {
        return None;
    }

    // Altitude along a crossing leg is unknown between its endpoints, so the
    // higher endpoint counts.
    let peak_altitude = inside
        .iter()
        .map(|(_, _, alt)| *alt)
        .chain(crossing.iter().map(|(a, b)| a.2.max(b.2)))
        .fold(f64::MIN, f64::max);

    let first_point = inside
        .first()
        .map(|(_, point, _)| *point)
        .or_else(|| crossing.first().map(|(a, _)| a.1))
        .unwrap_or(center);

    let mut parts = Vec::new();
    if !inside.is_empty() {
        let ids: Vec<String> = inside.iter().map(|(idx, _, _)| idx.to_string()).collect();
        parts.push(format!("waypoints [{}] inside", ids.join(", ")));
    }
    if !crossing.is_empty() {
        let legs: Vec<String> = crossing
            .iter()
            .map(|(a, b)| format!("{}->{}", a.0, b.0))
            .collect();
        parts.push(format!("legs [{}] cross", legs.join(", ")));
    }

    let (kind, severity) = if peak_altitude > zone.max_altitude_m {
        parts.push(format!(
            "altitude {:.1}m exceeds limit {:.1}m",
            peak_altitude, zone.max_altitude_m
        ));
        (AlertKind::AltitudeViolation, Severity::High)
    } else {
        (AlertKind::GeofenceViolation, Severity::Medium)
    };

    Some(Violation {
        zone_id: zone.id,
        zone_name: zone.name.clone(),
        kind,
        severity,
        message: format!(
            "Route intersects with restricted zone {}: {}",
            zone.name,
            parts.join("; ")
        ),
        point: first_point,
        altitude_m: peak_altitude,
    })
}
