//! The Splitter (§4.2): presents an infinite per-(Domain, Variable) time
//! series over fixed-length column files, with a rolling window plus an
//! optional yearly archive.
//!
//! Grounded in `grid-processor::service`'s dataset/time-range routing and
//! `grid-processor::factory`'s shared-cache-handle wiring, generalized from
//! one Zarr store to a chunk of rolling + archived local files.

pub mod cache;
pub mod lock;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, TimeZone, Utc};
use tracing::{info, instrument};
use wx_column::ColumnFile;
use wx_common::{Timestamp, WxError, WxResult};
use wx_domain::Domain;

use cache::ColumnFileCache;

/// Where a given shard's data physically lives.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ShardLocation {
    Rolling { shard: i64 },
    Archive { year: i32 },
}

/// Splits one Variable's time series across rolling shard files and an
/// optional yearly archive, for one Domain.
pub struct Splitter {
    domain: Arc<Domain>,
    variable_stem: String,
    /// This Variable's on-disk quantization multiplier (§3): threaded
    /// through from `wx_domain::Variable::scalefactor` so each shard is
    /// written with the scale its own Variable declares, not a shared
    /// default.
    scalefactor: f32,
    cache: Arc<ColumnFileCache>,
}

impl Splitter {
    pub fn new(domain: Arc<Domain>, variable_stem: impl Into<String>, scalefactor: f32, cache: Arc<ColumnFileCache>) -> Self {
        Self {
            domain,
            variable_stem: variable_stem.into(),
            scalefactor,
            cache,
        }
    }

    fn rolling_path(&self, shard: i64) -> PathBuf {
        self.domain
            .rolling_directory
            .join(format!("{}_{}.om", self.variable_stem, shard))
    }

    fn archive_path(&self, year: i32) -> Option<PathBuf> {
        self.domain
            .archive_directory
            .as_ref()
            .map(|dir| dir.join(format!("{}_{}.om", self.variable_stem, year)))
    }

    /// The oldest shard index still present as a rolling file, by scanning
    /// the rolling directory. `None` if no rolling files exist yet (every
    /// shard is either archived or not yet written).
    fn oldest_rolling_shard(&self) -> Option<i64> {
        let prefix = format!("{}_", self.variable_stem);
        let entries = std::fs::read_dir(&self.domain.rolling_directory).ok()?;
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter_map(|name| {
                let stem = name.strip_prefix(&prefix)?.strip_suffix(".om")?;
                stem.parse::<i64>().ok()
            })
            .min()
    }

    fn locate_shard(&self, shard: i64) -> ShardLocation {
        if self.domain.archive_directory.is_some() {
            if let Some(oldest) = self.oldest_rolling_shard() {
                if shard < oldest {
                    let (start, _) = self.domain.shard_bounds(shard);
                    let year = Utc.timestamp_opt(start, 0).single().map(|d| d.year()).unwrap_or(1970);
                    return ShardLocation::Archive { year };
                }
            }
        }
        ShardLocation::Rolling { shard }
    }

    fn path_for(&self, location: &ShardLocation) -> Option<PathBuf> {
        match location {
            ShardLocation::Rolling { shard } => Some(self.rolling_path(*shard)),
            ShardLocation::Archive { year } => self.archive_path(*year),
        }
    }

    /// `read(v, location, timeRange)`: stitches every overlapping shard's
    /// contribution into one dense output vector, filling any gap (missing
    /// file, truncated file, missing chunk) with `NaN`.
    #[instrument(skip(self), fields(domain = %self.domain.name, variable = %self.variable_stem))]
    pub fn read(&self, location: u64, start: Timestamp, count: usize, dt_seconds: u64) -> WxResult<Vec<f32>> {
        let mut out = vec![f32::NAN; count];
        let span = dt_seconds as i64 * self.domain.om_file_length as i64;

        let mut i = 0usize;
        while i < count {
            let t = start + i as i64 * dt_seconds as i64;
            let shard = t.div_euclid(span);
            let shard_start = shard * span;
            let location_kind = self.locate_shard(shard);
            let path = self.path_for(&location_kind);

            // how many consecutive output slots this shard covers
            let shard_end_t = shard_start + span;
            let remaining_in_shard = ((shard_end_t - t) / dt_seconds as i64).max(1) as usize;
            let take = remaining_in_shard.min(count - i);

            if let Some(path) = path {
                match self.cache.get_or_open(&path) {
                    Ok(file) => {
                        let local_start = (t - shard_start) / dt_seconds as i64;
                        let values = file.read(location, local_start, take)?;
                        out[i..i + take].copy_from_slice(&values);
                    }
                    Err(e) if e.is_retryable_open() => {
                        // no file / unreadable: leave this span as NaN
                    }
                    Err(e) => return Err(e),
                }
            }

            i += take;
        }

        Ok(out)
    }

    /// Advisory prefetch over a point/time window; never fails.
    #[instrument(skip(self), fields(domain = %self.domain.name, variable = %self.variable_stem))]
    pub fn prefetch(&self, location: u64, start: Timestamp, count: usize, dt_seconds: u64) {
        let span = dt_seconds as i64 * self.domain.om_file_length as i64;
        let mut i = 0usize;
        while i < count {
            let t = start + i as i64 * dt_seconds as i64;
            let shard = t.div_euclid(span);
            let shard_start = shard * span;
            let shard_end_t = shard_start + span;
            let remaining_in_shard = ((shard_end_t - t) / dt_seconds as i64).max(1) as usize;
            let take = remaining_in_shard.min(count - i);

            if let Some(path) = self.path_for(&self.locate_shard(shard)) {
                if let Ok(file) = self.cache.get_or_open(&path) {
                    let local_start = (t - shard_start) / dt_seconds as i64;
                    file.will_need(location, 1, local_start, take);
                }
            }
            i += take;
        }
    }

    /// `write(v, locRange, timeRange, values)`: groups by shard, merges
    /// with any existing shard content, and publishes atomically. `values`
    /// is `[locCount x timeCount]`, location-major. A short-write or
    /// disk-full abort inside `wx_column::write_dense` surfaces as
    /// `IoError` and leaves the previous shard file untouched, since
    /// rename is the only publication point.
    #[instrument(skip(self, values), fields(domain = %self.domain.name, variable = %self.variable_stem))]
    pub fn write(
        &self,
        n_locations: u64,
        loc_start: u64,
        loc_count: u64,
        start: Timestamp,
        count: usize,
        dt_seconds: u64,
        values: &[f32],
    ) -> WxResult<()> {
        assert_eq!(values.len() as u64, loc_count * count as u64);
        let span = dt_seconds as i64 * self.domain.om_file_length as i64;
        let om_file_length = self.domain.om_file_length;

        let mut i = 0usize;
        while i < count {
            let t = start + i as i64 * dt_seconds as i64;
            let shard = t.div_euclid(span);
            let shard_start = shard * span;
            let shard_end_t = shard_start + span;
            let remaining_in_shard = ((shard_end_t - t) / dt_seconds as i64).max(1) as usize;
            let take = remaining_in_shard.min(count - i);
            let local_start = ((t - shard_start) / dt_seconds as i64) as usize;

            let path = self.rolling_path(shard);
            lock::with_shard_lock(&path, || {
                self.write_one_shard(
                    &path,
                    n_locations,
                    om_file_length,
                    loc_start,
                    loc_count,
                    local_start,
                    take,
                    count,
                    i,
                    values,
                )
            })?;

            i += take;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_one_shard(
        &self,
        path: &Path,
        n_locations: u64,
        om_file_length: u64,
        loc_start: u64,
        loc_count: u64,
        local_time_start: usize,
        take: usize,
        input_time_count: usize,
        input_time_offset: usize,
        values: &[f32],
    ) -> WxResult<()> {
        let mut dense = match ColumnFile::open(path) {
            Ok(existing) => {
                let mut d = vec![f32::NAN; (n_locations * om_file_length) as usize];
                for loc in 0..n_locations {
                    let row = existing.read(loc, 0, om_file_length as usize)?;
                    d[(loc * om_file_length) as usize..(loc * om_file_length) as usize + om_file_length as usize]
                        .copy_from_slice(&row);
                }
                d
            }
            Err(_) => vec![f32::NAN; (n_locations * om_file_length) as usize],
        };

        for r in 0..loc_count {
            let loc = loc_start + r;
            for c in 0..take {
                let v = values[(r as usize) * input_time_count + input_time_offset + c];
                let dst = (loc * om_file_length) as usize + local_time_start + c;
                dense[dst] = v;
            }
        }

        wx_column::write_dense(
            path,
            n_locations,
            om_file_length,
            self.default_chunk_loc(n_locations),
            self.default_chunk_time(om_file_length),
            self.scalefactor,
            &dense,
        )?;
        info!(path = %path.display(), "published shard");
        Ok(())
    }

    fn default_chunk_loc(&self, n_locations: u64) -> u32 {
        n_locations.min(6) as u32
    }

    fn default_chunk_time(&self, om_file_length: u64) -> u32 {
        om_file_length.min(183) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;
    use wx_domain::DomainKind;
    use wx_grid::{Grid, GridShape, LonRange};

    fn test_domain(rolling_dir: PathBuf, archive_dir: Option<PathBuf>) -> Arc<Domain> {
        let grid = Arc::new(Grid::new(GridShape::RegularLatLon {
            nx: 4,
            ny: 4,
            lat0: 0.0,
            lon0: 0.0,
            dlat: 1.0,
            dlon: 1.0,
            lon_range: LonRange::SignedDegrees,
        }));
        let mut domain = Domain::new("test", DomainKind::GlobalCoarse, grid, 3600, 24, rolling_dir);
        if let Some(dir) = archive_dir {
            domain = domain.with_archive(dir);
        }
        Arc::new(domain)
    }

    #[test]
    fn write_then_read_single_shard_roundtrip() {
        let dir = tempdir().unwrap();
        let domain = test_domain(dir.path().to_path_buf(), None);
        let cache = Arc::new(ColumnFileCache::new(8));
        let splitter = Splitter::new(Arc::clone(&domain), "temperature_2m", 20.0, cache);

        let n_locations = domain.grid.count();
        let values: Vec<f32> = (0..24).map(|t| 10.0 + t as f32).collect();
        splitter
            .write(n_locations, 2, 1, 0, 24, 3600, &values)
            .unwrap();

        let read = splitter.read(2, 0, 24, 3600).unwrap();
        assert_eq!(read, values);
    }

    #[test]
    fn read_across_shard_boundary_stitches_and_fills_gaps() {
        let dir = tempdir().unwrap();
        let domain = test_domain(dir.path().to_path_buf(), None);
        let cache = Arc::new(ColumnFileCache::new(8));
        let splitter = Splitter::new(Arc::clone(&domain), "temperature_2m", 20.0, cache);
        let n_locations = domain.grid.count();

        // only write shard 0 (timesteps 0..24); shard 1 has no file at all
        let values: Vec<f32> = (0..24).map(|t| t as f32).collect();
        splitter.write(n_locations, 0, 1, 0, 24, 3600, &values).unwrap();

        let read = splitter.read(0, 20 * 3600, 8, 3600).unwrap();
        // steps 20..24 come from shard 0, steps 24..28 fall in missing shard 1
        for (i, v) in read.iter().enumerate().take(4) {
            assert_eq!(*v, (20 + i) as f32);
        }
        for v in &read[4..] {
            assert!(v.is_nan());
        }
    }

    #[test]
    fn archive_shard_is_preferred_over_absent_rolling() {
        let dir = tempdir().unwrap();
        let rolling = dir.path().join("rolling");
        let archive = dir.path().join("archive");
        std::fs::create_dir_all(&rolling).unwrap();
        std::fs::create_dir_all(&archive).unwrap();

        let domain = test_domain(rolling.clone(), Some(archive.clone()));
        let n_locations = domain.grid.count();

        // shard 100 written directly into rolling to establish "oldest rolling = 100"
        let cache = Arc::new(ColumnFileCache::new(8));
        let splitter = Splitter::new(Arc::clone(&domain), "temperature_2m", 20.0, cache);
        let span = 3600i64 * 24;
        splitter
            .write(n_locations, 0, n_locations, 100 * span, 24, 3600, &vec![1.0f32; (n_locations * 24) as usize])
            .unwrap();

        // manually place an archive file for the year covering shard 0
        let (start, _) = domain.shard_bounds(0);
        let year = chrono::Utc.timestamp_opt(start, 0).single().unwrap().year();
        let archive_values = vec![42.0f32; (n_locations * 24) as usize];
        wx_column::write_dense(
            &archive.join(format!("temperature_2m_{year}.om")),
            n_locations,
            24,
            4,
            24,
            20.0,
            &archive_values,
        )
        .unwrap();

        let read = splitter.read(0, 0, 4, 3600).unwrap();
        assert_eq!(read, vec![42.0, 42.0, 42.0, 42.0]);
    }
}
