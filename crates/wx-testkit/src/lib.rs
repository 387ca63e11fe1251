//! Shared test fixtures: predictable synthetic series, synthetic grids
//! with elevation, and on-disk column-file builders.
//!
//! Modeled on `crates/test-utils/src/generators.rs`: deterministic,
//! easily-verified value patterns rather than random data, so a failing
//! assertion points at a specific formula instead of a seed.

use std::path::Path;
use std::sync::Arc;

use wx_column::write_dense;
use wx_common::WxResult;
use wx_grid::{Grid, GridShape, LonRange};

/// A ramp series: `v[loc, t] = loc + t / ramp_divisor`, the pattern used by
/// the column-file end-to-end scenarios (§8 scenario 1-3).
pub fn ramp_series(n_locations: u64, n_time: u64, ramp_divisor: f32) -> Vec<f32> {
    let mut data = Vec::with_capacity((n_locations * n_time) as usize);
    for loc in 0..n_locations {
        for t in 0..n_time {
            data.push(loc as f32 + t as f32 / ramp_divisor);
        }
    }
    data
}

/// Same as [`ramp_series`] but with one cell forced to `NaN`, for
/// missing-data round-trip tests.
pub fn ramp_series_with_missing(n_locations: u64, n_time: u64, ramp_divisor: f32, missing_loc: u64, missing_t: u64) -> Vec<f32> {
    let mut data = ramp_series(n_locations, n_time, ramp_divisor);
    data[(missing_loc * n_time + missing_t) as usize] = f32::NAN;
    data
}

/// A small regular lat-lon grid, 1-degree spacing, origin at `(0,0)`.
pub fn small_regular_grid(nx: usize, ny: usize) -> Grid {
    Grid::new(GridShape::RegularLatLon {
        nx,
        ny,
        lat0: 0.0,
        lon0: 0.0,
        dlat: 1.0,
        dlon: 1.0,
        lon_range: LonRange::SignedDegrees,
    })
}

/// A grid with a synthetic elevation map: land rises away from a "coastal"
/// edge at `i == 0`, which stays at [`wx_grid::SEA_SENTINEL`].
pub fn grid_with_elevation(nx: usize, ny: usize) -> Arc<Grid> {
    let mut elevation = vec![0.0f32; nx * ny];
    for j in 0..ny {
        for i in 0..nx {
            elevation[j * nx + i] = if i == 0 {
                wx_grid::SEA_SENTINEL
            } else {
                (i * 200) as f32
            };
        }
    }
    Arc::new(Grid::with_elevation(
        GridShape::RegularLatLon {
            nx,
            ny,
            lat0: 0.0,
            lon0: 0.0,
            dlat: 1.0,
            dlon: 1.0,
            lon_range: LonRange::SignedDegrees,
        },
        elevation,
    ))
}

/// Write a ramp-filled column file at `path` with the given chunking and
/// scalefactor, returning the dense values that were written (so callers
/// can assert against them directly).
pub fn write_ramp_column_file(
    path: &Path,
    n_locations: u64,
    n_time: u64,
    chunk_loc: u32,
    chunk_time: u32,
    scalefactor: f32,
    ramp_divisor: f32,
) -> WxResult<Vec<f32>> {
    let values = ramp_series(n_locations, n_time, ramp_divisor);
    write_dense(path, n_locations, n_time, chunk_loc, chunk_time, scalefactor, &values)?;
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ramp_series_matches_formula() {
        let data = ramp_series(10, 24, 24.0);
        assert_eq!(data[0], 0.0);
        assert_eq!(data[24], 1.0); // loc=1, t=0
        assert_eq!(data[24 + 12], 1.0 + 12.0 / 24.0);
    }

    #[test]
    fn ramp_series_with_missing_injects_single_nan() {
        let data = ramp_series_with_missing(10, 24, 24.0, 3, 5);
        assert!(data[3 * 24 + 5].is_nan());
        assert!(!data[3 * 24 + 4].is_nan());
    }

    #[test]
    fn grid_with_elevation_marks_coast_as_sea() {
        let grid = grid_with_elevation(4, 4);
        for j in 0..4 {
            let (lat, lon) = grid.coordinates((j * 4) as u64).unwrap();
            let found = grid.find_point(lat, lon, 0.0, wx_grid::PointMode::Nearest).unwrap();
            assert!(found.grid_elevation.is_nan());
        }
    }

    #[test]
    fn write_ramp_column_file_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v_0.om");
        let values = write_ramp_column_file(&path, 20, 48, 4, 12, 20.0, 24.0).unwrap();
        let file = wx_column::ColumnFile::open(&path).unwrap();
        let read = file.read(5, 0, 48).unwrap();
        for (t, (&expected, &got)) in values[5 * 48..6 * 48].iter().zip(read.iter()).enumerate() {
            assert!((expected - got).abs() <= 0.025, "t={t} expected={expected} got={got}");
        }
    }
}
