//! Hexagonal cell math on top of H3.
//!
//! Cell keys are a pure function of coordinates and resolution, so the same
//! point always lands in the same cell across restarts.

use h3o::{CellIndex, LatLng};
pub use h3o::Resolution;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Result, UtmError};
use crate::geodesy::GeoPoint;
use crate::models::CellKey;

/// Resolution used when none is configured (~0.7 km^2 cells).
pub const DEFAULT_RESOLUTION: Resolution = Resolution::Eight;

/// Parse a numeric resolution (0-15).
pub fn resolution_from_u8(value: u8) -> Option<Resolution> {
    Resolution::try_from(value).ok()
}

/// Cell containing `point` at `resolution`.
pub fn cell_for(point: GeoPoint, resolution: Resolution) -> Result<CellKey> {
    let latlng = LatLng::new(point.lat, point.lon).map_err(|_| UtmError::InvalidCoordinate {
        lat: point.lat,
        lon: point.lon,
    })?;
    Ok(CellKey(latlng.to_cell(resolution).to_string()))
}

fn parse_cell(key: &CellKey) -> Result<CellIndex> {
    CellIndex::from_str(key.as_str()).map_err(|_| UtmError::InvalidCell(key.0.clone()))
}

fn to_point(latlng: LatLng) -> GeoPoint {
    GeoPoint {
        lat: latlng.lat(),
        lon: latlng.lng(),
    }
}

/// Centre of a cell.
pub fn center_of(key: &CellKey) -> Result<GeoPoint> {
    Ok(to_point(LatLng::from(parse_cell(key)?)))
}

/// Fixed hexagonal (or pentagonal) boundary of a cell, counter-clockwise.
pub fn boundary_of(key: &CellKey) -> Result<Vec<GeoPoint>> {
    let cell = parse_cell(key)?;
    Ok(cell.boundary().iter().copied().map(to_point).collect())
}

/// Immutable geometry of a cell, computed once when the cell is first seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellGeometry {
    pub cell_id: CellKey,
    pub center: GeoPoint,
    pub boundary: Vec<GeoPoint>,
}

impl CellGeometry {
    pub fn compute(key: &CellKey) -> Result<Self> {
        let cell = parse_cell(key)?;
        Ok(Self {
            cell_id: key.clone(),
            center: to_point(LatLng::from(cell)),
            boundary: cell.boundary().iter().copied().map(to_point).collect(),
        })
    }
}
