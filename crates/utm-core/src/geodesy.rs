//! Geodesic math for restricted-zone checks.
//!
//! Distances are great-circle (haversine) on a spherical earth. Segment tests
//! project into a local east/north plane centred on the circle, which is
//! accurate to well under a metre for the zone radii and route legs involved.

use serde::{Deserialize, Serialize};

use crate::error::{Result, UtmError};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A validated WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Build a point, rejecting out-of-range or non-finite coordinates.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
            return Err(UtmError::InvalidCoordinate { lat, lon });
        }
        Ok(Self { lat, lon })
    }
}

/// Great-circle distance between two points in meters.
pub fn distance(p1: GeoPoint, p2: GeoPoint) -> f64 {
    haversine_distance(p1.lat, p1.lon, p2.lat, p2.lon)
}

/// Haversine distance on raw degrees. Callers are expected to have validated
/// the inputs; see [`GeoPoint::new`].
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// True iff `point` lies within `radius_m` of `center` (boundary inclusive).
pub fn point_in_circle(point: GeoPoint, center: GeoPoint, radius_m: f64) -> bool {
    distance(point, center) <= radius_m
}

/// True if either endpoint is inside the circle or the closest point of the
/// segment `a -> b` to `center` is within `radius_m`.
///
/// Tangent segments (closest distance == radius) count as intersecting.
pub fn segment_intersects_circle(a: GeoPoint, b: GeoPoint, center: GeoPoint, radius_m: f64) -> bool {
    if point_in_circle(a, center, radius_m) || point_in_circle(b, center, radius_m) {
        return true;
    }
    let a_xy = to_local_xy(a, center);
    let b_xy = to_local_xy(b, center);
    distance_to_segment_xy((0.0, 0.0), a_xy, b_xy) <= radius_m
}

/// Minimum distance in meters from `point` to the segment `a -> b`.
pub fn distance_to_segment_m(point: GeoPoint, a: GeoPoint, b: GeoPoint) -> f64 {
    let a_xy = to_local_xy(a, point);
    let b_xy = to_local_xy(b, point);
    distance_to_segment_xy((0.0, 0.0), a_xy, b_xy)
}

fn distance_to_segment_xy(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let sx = b.0 - a.0;
    let sy = b.1 - a.1;
    let seg_len_sq = sx * sx + sy * sy;

    if seg_len_sq < 1e-4 {
        // Degenerate segment
        let dx = p.0 - a.0;
        let dy = p.1 - a.1;
        return (dx * dx + dy * dy).sqrt();
    }

    // Project onto the segment: t = ((P-A) . (B-A)) / |B-A|^2
    let t = (((p.0 - a.0) * sx + (p.1 - a.1) * sy) / seg_len_sq).clamp(0.0, 1.0);
    let dx = p.0 - (a.0 + t * sx);
    let dy = p.1 - (a.1 + t * sy);
    (dx * dx + dy * dy).sqrt()
}

// ==== Local planar (east/north) conversion ====

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// Longitude difference `to - from` wrapped into [-180, 180).
pub fn lon_delta(from: f64, to: f64) -> f64 {
    (to - from + 540.0).rem_euclid(360.0) - 180.0
}

/// Longitude folded into [-180, 180); exactly 180 is kept as is.
pub fn normalize_lon(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 540.0).rem_euclid(360.0) - 180.0
    }
}

/// Offset of `point` from `origin` as (east_m, north_m), taking the short way across 180.
pub fn to_local_xy(point: GeoPoint, origin: GeoPoint) -> (f64, f64) {
    let east = lon_delta(origin.lon, point.lon) * meters_per_deg_lon(origin.lat);
    let north = (point.lat - origin.lat) * meters_per_deg_lat(origin.lat);
    (east, north)
}

/// Inverse of [`to_local_xy`]. Fails if the offset leaves the valid range.
pub fn from_local_xy(origin: GeoPoint, east_m: f64, north_m: f64) -> Result<GeoPoint> {
    let lat = origin.lat + north_m / meters_per_deg_lat(origin.lat).max(1e-9);
    let lon = normalize_lon(origin.lon + east_m / meters_per_deg_lon(origin.lat).max(1e-9));
    GeoPoint::new(lat, lon)
}

/// Destination reached from `origin` after `distance_m` along `bearing_deg`
/// (0 = north, clockwise).
pub fn offset_by_bearing(origin: GeoPoint, distance_m: f64, bearing_deg: f64) -> GeoPoint {
    if distance_m.abs() <= f64::EPSILON {
        return origin;
    }

    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lon.to_radians();
    let bearing_rad = bearing_deg.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let lon2 = (lon1 + y.atan2(x) + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI)
        - std::f64::consts::PI;

    GeoPoint {
        lat: lat2.to_degrees(),
        lon: lon2.to_degrees(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(matches!(
            GeoPoint::new(90.5, 0.0),
            Err(UtmError::InvalidCoordinate { .. })
        ));
        assert!(GeoPoint::new(0.0, -180.01).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn haversine_known_distance() {
        // ~111km between these points (1 degree latitude)
        let dist = distance(pt(0.0, 0.0), pt(1.0, 0.0));
        assert!((dist - 111_194.0).abs() < 100.0);
    }

    #[test]
    fn distance_is_zero_for_same_point_and_symmetric() {
        let a = pt(43.2, 76.9);
        let b = pt(51.1, 71.4);
        assert_eq!(distance(a, a), 0.0);
        assert!((distance(a, b) - distance(b, a)).abs() < 1e-6);
    }

    #[test]
    fn distance_satisfies_triangle_inequality() {
        let a = pt(43.2, 76.9);
        let b = pt(43.5, 77.3);
        let c = pt(44.0, 76.0);
        assert!(distance(a, c) <= distance(a, b) + distance(b, c) + 1e-6);
    }

    #[test]
    fn point_in_circle_respects_radius() {
        let center = pt(43.2, 76.9);
        let inside = offset_by_bearing(center, 4_000.0, 45.0);
        let outside = offset_by_bearing(center, 5_001.0, 45.0);
        assert!(point_in_circle(inside, center, 5_000.0));
        assert!(!point_in_circle(outside, center, 5_000.0));
        assert!(point_in_circle(center, center, 0.0));
    }

    #[test]
    fn segment_with_endpoint_inside_intersects() {
        let center = pt(43.2, 76.9);
        let a = offset_by_bearing(center, 100.0, 0.0);
        let b = offset_by_bearing(center, 20_000.0, 0.0);
        assert!(segment_intersects_circle(a, b, center, 500.0));
    }

    #[test]
    fn segment_fully_contained_intersects() {
        let center = pt(43.2, 76.9);
        let a = offset_by_bearing(center, 50.0, 90.0);
        let b = offset_by_bearing(center, 60.0, 270.0);
        assert!(segment_intersects_circle(a, b, center, 1_000.0));
    }

    #[test]
    fn segment_passing_through_intersects() {
        // Both endpoints 2km out on opposite sides; the chord passes the center.
        let center = pt(51.07, 71.42);
        let a = offset_by_bearing(center, 2_000.0, 300.0);
        let b = offset_by_bearing(center, 2_000.0, 120.0);
        assert!(segment_intersects_circle(a, b, center, 300.0));
    }

    #[test]
    fn segment_outside_and_not_tangent_does_not_intersect() {
        let center = pt(51.07, 71.42);
        let west = offset_by_bearing(center, 1_000.0, 270.0);
        let a = offset_by_bearing(west, 5_000.0, 0.0);
        let b = offset_by_bearing(west, 5_000.0, 180.0);
        // Closest approach is ~1000m
        assert!(!segment_intersects_circle(a, b, center, 900.0));
        assert!(segment_intersects_circle(a, b, center, 1_050.0));
    }

    #[test]
    fn distance_to_segment_matches_perpendicular_offset() {
        let center = pt(33.0, -117.0);
        let west = offset_by_bearing(center, 250.0, 270.0);
        let a = offset_by_bearing(west, 1_000.0, 0.0);
        let b = offset_by_bearing(west, 1_000.0, 180.0);
        let d = distance_to_segment_m(center, a, b);
        assert!((d - 250.0).abs() < 2.0, "expected ~250m, got {d}");
    }

    #[test]
    fn local_xy_round_trips_near_origin() {
        let origin = pt(43.2, 76.9);
        let p = pt(43.21, 76.93);
        let (east, north) = to_local_xy(p, origin);
        let back = from_local_xy(origin, east, north).unwrap();
        assert!((back.lat - p.lat).abs() < 1e-9);
        assert!((back.lon - p.lon).abs() < 1e-9);
        assert!(from_local_xy(pt(89.99, 0.0), 0.0, 10_000.0).is_err());
    }

    #[test]
    fn segment_across_antimeridian_intersects() {
        // Endpoints ~5.6km either side of 180, leg passes straight through the centre
        let center = pt(0.0, 180.0);
        let a = pt(0.0, 179.95);
        let b = pt(0.0, -179.95);
        assert!(distance(a, center) > 5_000.0);
        assert!(segment_intersects_circle(a, b, center, 1_000.0));
        assert!(distance_to_segment_m(center, a, b) < 1.0);

        // Same leg shifted 0.1 degrees north (~11km) misses
        let a = pt(0.1, 179.95);
        let b = pt(0.1, -179.95);
        assert!(!segment_intersects_circle(a, b, center, 1_000.0));
    }

    #[test]
    fn local_xy_wraps_across_antimeridian() {
        let origin = pt(10.0, 179.99);
        let east_of = pt(10.0, -179.99);
        let (east, _) = to_local_xy(east_of, origin);
        assert!(east > 0.0 && east < 3_000.0, "expected a short eastward hop, got {east}");

        let back = from_local_xy(origin, east, 0.0).unwrap();
        assert!((back.lon - east_of.lon).abs() < 1e-9);
        assert!((lon_delta(170.0, -170.0) - 20.0).abs() < 1e-9);
        assert!((lon_delta(-170.0, 170.0) + 20.0).abs() < 1e-9);
    }
}
