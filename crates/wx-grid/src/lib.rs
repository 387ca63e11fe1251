//! The immutable lattice descriptor: `(lat,lon) <-> location index`, with
//! optional elevation-aware nearest-point selection.
//!
//! ```text
//!   Grid
//!   +-- GridShape::RegularLatLon { nx, ny, lat0, lon0, dlat, dlon }
//!   +-- GridShape::Projected(LambertConformal)
//!   +-- elevation: Option<Vec<f32>>   (one f32 per location, NaN = sea)
//! ```

pub mod lambert;

use lambert::LambertConformal;
use serde::{Deserialize, Serialize};
use wx_common::geo::{clamp_lat, haversine_distance_m, normalize_lon_180, normalize_lon_360};

/// Longitude convention a grid's coordinates are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LonRange {
    /// `[-180, 180)`
    SignedDegrees,
    /// `[0, 360)`
    Positive360,
}

/// The lattice shape: regular lat-lon or a projected conic grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GridShape {
    RegularLatLon {
        nx: usize,
        ny: usize,
        lat0: f64,
        lon0: f64,
        dlat: f64,
        dlon: f64,
        lon_range: LonRange,
    },
    Projected(LambertConformal),
}

impl GridShape {
    pub fn nx(&self) -> usize {
        match self {
            GridShape::RegularLatLon { nx, .. } => *nx,
            GridShape::Projected(p) => p.nx,
        }
    }

    pub fn ny(&self) -> usize {
        match self {
            GridShape::RegularLatLon { ny, .. } => *ny,
            GridShape::Projected(p) => p.ny,
        }
    }

    pub fn lon_range(&self) -> LonRange {
        match self {
            GridShape::RegularLatLon { lon_range, .. } => *lon_range,
            GridShape::Projected(_) => LonRange::SignedDegrees,
        }
    }

    /// Fractional grid indices for a geographic point, in the grid's own
    /// longitude convention.
    fn geo_to_ij(&self, lat: f64, lon: f64) -> (f64, f64) {
        match self {
            GridShape::RegularLatLon {
                lat0, lon0, dlat, dlon, ..
            } => ((lon - lon0) / dlon, (lat - lat0) / dlat),
            GridShape::Projected(p) => p.geo_to_grid(lat, lon),
        }
    }

    fn ij_to_geo(&self, i: f64, j: f64) -> (f64, f64) {
        match self {
            GridShape::RegularLatLon {
                lat0, lon0, dlat, dlon, ..
            } => (lat0 + j * dlat, lon0 + i * dlon),
            GridShape::Projected(p) => p.grid_to_geo(i, j),
        }
    }
}

/// Point-selection strategy for [`Grid::find_point`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointMode {
    /// Nearest cell to the query point, bounded by the grid's extent.
    Nearest,
    /// Nearest cell by elevation match within the 3x3 neighborhood of the
    /// geometric nearest cell, falling back to geometric nearest over sea.
    TerrainOptimised,
}

/// Result of a successful [`Grid::find_point`] lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoundPoint {
    pub index: u64,
    pub grid_elevation: f32,
}

/// Sentinel marking a sea point in an elevation map. Shares the NaN
/// missing-sentinel convention used throughout this workspace rather than
/// introducing a second "no elevation" representation.
pub const SEA_SENTINEL: f32 = f32::NAN;

/// An immutable 2-D lattice descriptor, with an optional companion
/// elevation map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    shape: GridShape,
    #[serde(skip_serializing_if = "Option::is_none")]
    elevation: Option<Vec<f32>>,
}

impl Grid {
    pub fn new(shape: GridShape) -> Self {
        Self {
            shape,
            elevation: None,
        }
    }

    pub fn with_elevation(shape: GridShape, elevation: Vec<f32>) -> Self {
        assert_eq!(
            elevation.len(),
            shape.nx() * shape.ny(),
            "elevation map must have nx*ny entries"
        );
        Self {
            shape,
            elevation: Some(elevation),
        }
    }

    pub fn count(&self) -> u64 {
        (self.shape.nx() * self.shape.ny()) as u64
    }

    pub fn nx(&self) -> usize {
        self.shape.nx()
    }

    pub fn ny(&self) -> usize {
        self.shape.ny()
    }

    fn flat_index(&self, i: usize, j: usize) -> u64 {
        (j * self.shape.nx() + i) as u64
    }

    fn unflatten(&self, index: u64) -> (usize, usize) {
        let nx = self.shape.nx();
        let idx = index as usize;
        (idx % nx, idx / nx)
    }

    /// `index -> (lat, lon)`, in degrees.
    pub fn coordinates(&self, index: u64) -> Option<(f64, f64)> {
        if index >= self.count() {
            return None;
        }
        let (i, j) = self.unflatten(index);
        Some(self.shape.ij_to_geo(i as f64, j as f64))
    }

    fn elevation_at(&self, i: usize, j: usize) -> f32 {
        match &self.elevation {
            None => 0.0,
            Some(e) => e[j * self.shape.nx() + i],
        }
    }

    fn normalize_query_lon(&self, lon: f64) -> f64 {
        match self.shape.lon_range() {
            LonRange::SignedDegrees => normalize_lon_180(lon),
            LonRange::Positive360 => normalize_lon_360(lon),
        }
    }

    /// `(lat, lon, elevation) -> (index, gridElevation)`, or `None` if the
    /// point falls outside the grid's bounding box.
    pub fn find_point(&self, lat: f64, lon: f64, elevation: f64, mode: PointMode) -> Option<FoundPoint> {
        let lat = clamp_lat(lat);
        let lon = self.normalize_query_lon(lon);

        let (fi, fj) = self.shape.geo_to_ij(lat, lon);
        let nx = self.shape.nx() as f64;
        let ny = self.shape.ny() as f64;

        let i0 = fi.round();
        let j0 = fj.round();
        if i0 < 0.0 || i0 >= nx || j0 < 0.0 || j0 >= ny {
            return None;
        }
        let (i0, j0) = (i0 as usize, j0 as usize);

        match mode {
            PointMode::Nearest => Some(FoundPoint {
                index: self.flat_index(i0, j0),
                grid_elevation: self.elevation_at(i0, j0),
            }),
            PointMode::TerrainOptimised => {
                self.find_terrain_optimised(i0, j0, lat, lon, elevation)
            }
        }
    }

    fn find_terrain_optimised(
        &self,
        i0: usize,
        j0: usize,
        lat: f64,
        lon: f64,
        elevation: f64,
    ) -> Option<FoundPoint> {
        let nx = self.shape.nx() as isize;
        let ny = self.shape.ny() as isize;

        let mut best: Option<(f64, f64, usize, usize)> = None; // (elev_diff, dist, i, j)

        for dj in -1..=1 {
            for di in -1..=1 {
                let i = i0 as isize + di;
                let j = j0 as isize + dj;
                if i < 0 || j < 0 || i >= nx || j >= ny {
                    continue;
                }
                let (i, j) = (i as usize, j as usize);
                let grid_elev = self.elevation_at(i, j);
                if grid_elev.is_nan() {
                    continue; // sea
                }
                let elev_diff = (grid_elev as f64 - elevation).abs();
                let (clat, clon) = self.shape.ij_to_geo(i as f64, j as f64);
                let dist = haversine_distance_m(lat, lon, clat, clon);

                let better = match &best {
                    None => true,
                    Some((be, bd, _, _)) => {
                        if (elev_diff - be).abs() <= 1e-9 {
                            dist < *bd
                        } else {
                            elev_diff < *be
                        }
                    }
                };
                if better {
                    best = Some((elev_diff, dist, i, j));
                }
            }
        }

        match best {
            Some((_, _, i, j)) => Some(FoundPoint {
                index: self.flat_index(i, j),
                grid_elevation: self.elevation_at(i, j),
            }),
            // every neighbor is sea: fall back to the raw nearest cell
            None => Some(FoundPoint {
                index: self.flat_index(i0, j0),
                grid_elevation: self.elevation_at(i0, j0),
            }),
        }
    }
}
