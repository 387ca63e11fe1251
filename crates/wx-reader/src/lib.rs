//! The Reader (§4.5): bound to one `(Domain, point)`, fetches a Variable's
//! raw series through the Splitter, synthesizes missing pressure levels,
//! normalizes units, applies elevation correction, and resamples to the
//! requested time step.
//!
//! Grounded in `grid-processor::service::GridDataService::read_point`'s
//! lookup-then-fetch-then-package shape, generalized from one dataset to a
//! Domain/Variable/point triple.

pub mod atmosphere;

use std::sync::Arc;
use std::time::Instant;

use tracing::instrument;
use wx_common::{Timestamp, TimerangeDt, WxError, WxResult};
use wx_domain::{Domain, InterpolationKind, Unit, Variable};
use wx_interp::{kernels, solar};
use wx_splitter::cache::ColumnFileCache;
use wx_splitter::Splitter;

/// How a synthesized pressure-level value is derived from its two
/// bracketing levels (§4.5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLevelKind {
    /// Linear interpolation of the raw value itself (most variables).
    Generic,
    /// Mean of the two bracketing levels (relative humidity).
    RelativeHumidityMean,
    /// Interpolated in pressure-space via the standard atmosphere.
    GeopotentialHeight,
}

/// A Reader bound to one `(Domain, point)`.
pub struct Reader {
    domain: Arc<Domain>,
    cache: Arc<ColumnFileCache>,
    location: u64,
    grid_elevation: f32,
    target_elevation: f64,
    lat: f64,
    lon: f64,
    deadline: Option<Instant>,
}

impl Reader {
    pub fn new(
        domain: Arc<Domain>,
        cache: Arc<ColumnFileCache>,
        location: u64,
        grid_elevation: f32,
        target_elevation: f64,
        lat: f64,
        lon: f64,
    ) -> Self {
        Self {
            domain,
            cache,
            location,
            grid_elevation,
            target_elevation,
            lat,
            lon,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn check_deadline(&self) -> WxResult<()> {
        match self.deadline {
            Some(d) if Instant::now() > d => Err(WxError::Cancelled),
            _ => Ok(()),
        }
    }

    fn splitter_for(&self, stem: &str, variable: &Variable) -> Splitter {
        Splitter::new(Arc::clone(&self.domain), stem, variable.scalefactor, Arc::clone(&self.cache))
    }

    /// Forwards `willNeed` through the Splitter for `v`'s own stem.
    pub fn prefetch(&self, variable: &Variable, time_range: TimerangeDt) {
        let padded = time_range.padded(variable.padding());
        let splitter = self.splitter_for(&variable.name, variable);
        splitter.prefetch(self.location, padded.start, padded.count(), self.domain.dt_seconds);
    }

    /// Fetch variable `stem` over a domain-dt-aligned window that covers
    /// `time_range` (at whatever step it's expressed in) plus `padding`
    /// native steps of stencil context on each side.
    fn fetch_raw_padded(&self, stem: &str, variable: &Variable, time_range: TimerangeDt) -> WxResult<(Vec<f32>, TimerangeDt)> {
        let domain_dt = self.domain.dt_seconds as i64;
        let pad = variable.padding() as i64;
        let first_k = time_range.start.div_euclid(domain_dt);
        let last_k = (time_range.end - 1).div_euclid(domain_dt);
        let padded = TimerangeDt::new((first_k - pad) * domain_dt, (last_k + 1 + pad) * domain_dt, self.domain.dt_seconds)
            .map_err(|_| WxError::format_invalid("reader", "invalid padded window"))?;

        let splitter = self.splitter_for(stem, variable);
        let raw = splitter.read(self.location, padded.start, padded.count(), self.domain.dt_seconds)?;
        Ok((raw, padded))
    }

    /// Fetch + normalize + correct + resample a surface (non-pressure-level)
    /// Variable.
    #[instrument(skip(self), fields(domain = %self.domain.name, variable = %variable.name))]
    pub fn get(&self, variable: &Variable, time_range: TimerangeDt) -> WxResult<(Vec<f32>, Unit)> {
        self.check_deadline()?;
        let (raw, padded) = self.fetch_raw_padded(&variable.name, variable, time_range)?;
        self.finish(raw, padded, variable, time_range)
    }

    /// Fetch a pressure-level Variable at `level_hpa`, synthesizing by
    /// linear interpolation between bracketing levels if the Domain
    /// doesn't physically carry this one (§4.5 step 1).
    #[instrument(skip(self), fields(domain = %self.domain.name, variable = %variable.name, level_hpa))]
    pub fn get_pressure_level(
        &self,
        variable: &Variable,
        level_hpa: u32,
        kind: PressureLevelKind,
        time_range: TimerangeDt,
    ) -> WxResult<(Vec<f32>, Unit)> {
        self.check_deadline()?;
        match self.domain.bracketing_levels(level_hpa) {
            None => {
                let stem = variable.pressure_level_stem(level_hpa);
                let (raw, padded) = self.fetch_raw_padded(&stem, variable, time_range)?;
                self.finish(raw, padded, variable, time_range)
            }
            Some((lo, hi)) => {
                let stem_lo = variable.pressure_level_stem(lo);
                let stem_hi = variable.pressure_level_stem(hi);
                let (raw_lo, padded) = self.fetch_raw_padded(&stem_lo, variable, time_range)?;
                let (raw_hi, _) = self.fetch_raw_padded(&stem_hi, variable, time_range)?;

                let synthesized: Vec<f32> = raw_lo
                    .iter()
                    .zip(raw_hi.iter())
                    .map(|(&v_lo, &v_hi)| synthesize_one(kind, lo as f64, hi as f64, level_hpa as f64, v_lo, v_hi))
                    .collect();

                self.finish(synthesized, padded, variable, time_range)
            }
        }
    }

    fn finish(
        &self,
        raw: Vec<f32>,
        raw_range: TimerangeDt,
        variable: &Variable,
        time_range: TimerangeDt,
    ) -> WxResult<(Vec<f32>, Unit)> {
        let (normalized, unit) = normalize_unit(raw, variable.unit);
        let corrected = self.apply_elevation_correction(normalized, variable);

        if time_range.dt_seconds == self.domain.dt_seconds {
            let start_idx = raw_range
                .index_of(time_range.start)
                .ok_or_else(|| WxError::format_invalid("reader", "resampled window not covered by fetched range"))?;
            Ok((corrected[start_idx..start_idx + time_range.count()].to_vec(), unit))
        } else if time_range.dt_seconds < self.domain.dt_seconds {
            Ok((self.resample(&corrected, raw_range, time_range, variable), unit))
        } else {
            Err(WxError::UpsamplingForbidden {
                requested: time_range.dt_seconds,
                domain: self.domain.dt_seconds,
            })
        }
    }

    fn apply_elevation_correction(&self, values: Vec<f32>, variable: &Variable) -> Vec<f32> {
        if !variable.wants_elevation_correction()
            || !self.grid_elevation.is_finite()
            || !self.target_elevation.is_finite()
        {
            return values;
        }
        let delta = (self.grid_elevation as f64 - self.target_elevation) * 0.0065;
        values
            .into_iter()
            .map(|v| if v.is_nan() { v } else { (v as f64 + delta) as f32 })
            .collect()
    }

    fn resample(&self, corrected: &[f32], raw_range: TimerangeDt, time_range: TimerangeDt, variable: &Variable) -> Vec<f32> {
        let dt_src = raw_range.dt_seconds as i64;
        let get = |j: i64| -> f32 {
            if j < 0 || j as usize >= corrected.len() {
                f32::NAN
            } else {
                corrected[j as usize]
            }
        };

        let mut out = Vec::with_capacity(time_range.count());
        for i in 0..time_range.count() {
            let dst_t = time_range.step(i);
            let k = (dst_t - raw_range.start).div_euclid(dt_src);
            let ta = raw_range.start + k * dt_src;
            let f = (dst_t - ta) as f64 / dt_src as f64;

            let value = match variable.interpolation {
                InterpolationKind::Linear => kernels::linear(get(k), get(k + 1), f),
                InterpolationKind::Hermite { clamp } => kernels::hermite(get(k - 1), get(k), get(k + 1), get(k + 2), f, clamp),
                InterpolationKind::SolarBackwardsAveraged => {
                    let tb = ta + dt_src;
                    solar::solar_backwards_averaged(
                        self.lat,
                        self.lon,
                        ta,
                        get(k),
                        tb,
                        get(k + 1),
                        dt_src as u64,
                        dst_t,
                        time_range.dt_seconds,
                    )
                }
            };
            out.push(value);
        }
        out
    }
}

/// A meteorological derivation formula, supplied by the caller: the formula
/// library itself (dewpoint, cloud-cover-from-humidity, diffuse-separation
/// models, …) is an external collaborator per this workspace's scope (§1);
/// the core's job is only to decide *when* to reach for one and to feed it
/// an already-resampled sibling series. Implementations must preserve NaN.
pub trait DerivationFormula: Send + Sync {
    fn derive(&self, sibling: &[f32]) -> Vec<f32>;
}

impl Reader {
    /// Fetches `variable`, deriving it from `sibling` via `formula` when the
    /// bound Domain is known to lack `variable` outright (§4.5 step 2,
    /// `Domain::lacks_variable`); falls back to a direct fetch otherwise, so
    /// a Domain that later starts producing the field needs no call-site
    /// change.
    #[instrument(skip(self, formula), fields(domain = %self.domain.name, variable = %variable.name, sibling = %sibling.name))]
    pub fn get_or_derive(
        &self,
        variable: &Variable,
        sibling: &Variable,
        formula: &dyn DerivationFormula,
        time_range: TimerangeDt,
    ) -> WxResult<(Vec<f32>, Unit)> {
        self.check_deadline()?;
        if !self.domain.lacks_variable(&variable.name) {
            return self.get(variable, time_range);
        }
        let (sibling_values, _) = self.get(sibling, time_range)?;
        Ok((formula.derive(&sibling_values), variable.unit))
    }
}

fn synthesize_one(kind: PressureLevelKind, lo_hpa: f64, hi_hpa: f64, target_hpa: f64, v_lo: f32, v_hi: f32) -> f32 {
    if v_lo.is_nan() || v_hi.is_nan() {
        return f32::NAN;
    }
    match kind {
        PressureLevelKind::Generic => {
            let f = (target_hpa - lo_hpa) / (hi_hpa - lo_hpa);
            (v_lo as f64 + f * (v_hi as f64 - v_lo as f64)) as f32
        }
        PressureLevelKind::RelativeHumidityMean => ((v_lo as f64 + v_hi as f64) / 2.0) as f32,
        PressureLevelKind::GeopotentialHeight => {
            let p_lo = atmosphere::height_to_pressure_pa(v_lo as f64);
            let p_hi = atmosphere::height_to_pressure_pa(v_hi as f64);
            let f = (target_hpa - lo_hpa) / (hi_hpa - lo_hpa);
            let p_target = p_lo + f * (p_hi - p_lo);
            atmosphere::pressure_to_height_m(p_target) as f32
        }
    }
}

fn normalize_unit(raw: Vec<f32>, unit: Unit) -> (Vec<f32>, Unit) {
    if unit == Unit::Pascal {
        (raw.into_iter().map(|v| v / 100.0).collect(), Unit::Hectopascal)
    } else {
        (raw, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wx_domain::DomainKind;
    use wx_grid::{Grid, GridShape, LonRange};

    fn test_domain(dir: std::path::PathBuf, dt_seconds: u64, om_file_length: u64) -> Arc<Domain> {
        let grid = Arc::new(Grid::new(GridShape::RegularLatLon {
            nx: 4,
            ny: 4,
            lat0: 0.0,
            lon0: 0.0,
            dlat: 1.0,
            dlon: 1.0,
            lon_range: LonRange::SignedDegrees,
        }));
        Arc::new(
            Domain::new("test", DomainKind::GlobalCoarse, grid, dt_seconds, om_file_length, dir)
                .with_pressure_levels([850, 1000]),
        )
    }

    #[test]
    fn pressure_level_synthesis_matches_scenario_formula() {
        let dir = tempdir().unwrap();
        let domain = test_domain(dir.path().to_path_buf(), 3600, 24);
        let cache = Arc::new(ColumnFileCache::new(8));

        let temp = Variable::new("temperature", 20.0, Unit::Celsius);
        let splitter_850 = Splitter::new(Arc::clone(&domain), temp.pressure_level_stem(850), temp.scalefactor, Arc::clone(&cache));
        let splitter_1000 = Splitter::new(Arc::clone(&domain), temp.pressure_level_stem(1000), temp.scalefactor, Arc::clone(&cache));

        let n_locations = domain.grid.count();
        splitter_850.write(n_locations, 0, n_locations, 0, 24, 3600, &vec![10.0f32; (n_locations * 24) as usize]).unwrap();
        splitter_1000.write(n_locations, 0, n_locations, 0, 24, 3600, &vec![20.0f32; (n_locations * 24) as usize]).unwrap();

        let reader = Reader::new(Arc::clone(&domain), cache, 0, f32::NAN, f64::NAN, 0.0, 0.0);
        let time_range = TimerangeDt::new(0, 3 * 3600, 3600).unwrap();
        let (values, unit) = reader
            .get_pressure_level(&temp, 950, PressureLevelKind::Generic, time_range)
            .unwrap();

        let expected = 10.0 + (950.0 - 850.0) / (1000.0 - 850.0) * (20.0 - 10.0);
        assert_eq!(unit, Unit::Celsius);
        for v in values {
            assert!((v - expected as f32).abs() < 0.1, "v={v} expected={expected}");
        }
    }

    #[test]
    fn temporal_upsample_matches_source_at_boundaries() {
        let dir = tempdir().unwrap();
        let domain = test_domain(dir.path().to_path_buf(), 10800, 24);
        let cache = Arc::new(ColumnFileCache::new(8));
        let variable = Variable::new("temperature_2m", 20.0, Unit::Celsius);
        let splitter = Splitter::new(Arc::clone(&domain), "temperature_2m", variable.scalefactor, Arc::clone(&cache));

        let n_locations = domain.grid.count();
        let values: Vec<f32> = (0..24).map(|t| t as f32 * 2.0).collect();
        splitter.write(n_locations, 0, n_locations, 0, 24, 10800, &values).unwrap();

        let reader = Reader::new(Arc::clone(&domain), cache, 0, f32::NAN, f64::NAN, 0.0, 0.0);
        let dst_range = TimerangeDt::new(0, 3 * 10800, 3600).unwrap();
        let (resampled, _) = reader.get(&variable, dst_range).unwrap();

        // every source boundary (every 3rd destination step) equals the source
        assert_eq!(resampled[0], values[0]);
        assert_eq!(resampled[3], values[1]);
        assert_eq!(resampled[6], values[2]);
        // monotone between boundaries since the source ramp is monotone
        assert!(resampled[1] <= resampled[2] && resampled[2] <= resampled[3]);
    }

    #[test]
    fn elevation_correction_is_linear_in_delta() {
        let dir = tempdir().unwrap();
        let domain = test_domain(dir.path().to_path_buf(), 3600, 24);
        let cache = Arc::new(ColumnFileCache::new(8));
        let variable = Variable::new("temperature_2m", 20.0, Unit::Celsius).elevation_correctable();
        let splitter = Splitter::new(Arc::clone(&domain), "temperature_2m", variable.scalefactor, Arc::clone(&cache));

        let n_locations = domain.grid.count();
        splitter.write(n_locations, 0, n_locations, 0, 4, 3600, &vec![15.0f32; (n_locations * 4) as usize]).unwrap();

        let time_range = TimerangeDt::new(0, 4 * 3600, 3600).unwrap();
        let reader_a = Reader::new(Arc::clone(&domain), Arc::clone(&cache), 0, 100.0, 100.0, 0.0, 0.0);
        let reader_b = Reader::new(Arc::clone(&domain), Arc::clone(&cache), 0, 100.0, 200.0, 0.0, 0.0);

        let (va, _) = reader_a.get(&variable, time_range).unwrap();
        let (vb, _) = reader_b.get(&variable, time_range).unwrap();

        for (a, b) in va.iter().zip(vb.iter()) {
            assert!((a - b - 0.0065 * 100.0).abs() < 0.1);
        }
    }

    #[test]
    fn upsampling_beyond_domain_step_is_forbidden() {
        let dir = tempdir().unwrap();
        let domain = test_domain(dir.path().to_path_buf(), 3600, 24);
        let cache = Arc::new(ColumnFileCache::new(8));
        let variable = Variable::new("temperature_2m", 20.0, Unit::Celsius);
        let splitter = Splitter::new(Arc::clone(&domain), "temperature_2m", variable.scalefactor, Arc::clone(&cache));
        let n_locations = domain.grid.count();
        splitter.write(n_locations, 0, n_locations, 0, 4, 3600, &vec![1.0f32; (n_locations * 4) as usize]).unwrap();

        let reader = Reader::new(Arc::clone(&domain), cache, 0, f32::NAN, f64::NAN, 0.0, 0.0);
        let coarse_range = TimerangeDt::new(0, 2 * 7200, 7200).unwrap();
        let err = reader.get(&variable, coarse_range).unwrap_err();
        assert!(matches!(err, WxError::UpsamplingForbidden { .. }));
    }

    #[test]
    fn pascal_normalizes_to_hectopascal() {
        let dir = tempdir().unwrap();
        let domain = test_domain(dir.path().to_path_buf(), 3600, 24);
        let cache = Arc::new(ColumnFileCache::new(8));
        let variable = Variable::new("surface_pressure", 1.0, Unit::Pascal);
        let splitter = Splitter::new(Arc::clone(&domain), "surface_pressure", variable.scalefactor, Arc::clone(&cache));
        let n_locations = domain.grid.count();
        splitter.write(n_locations, 0, n_locations, 0, 4, 3600, &vec![101300.0f32; (n_locations * 4) as usize]).unwrap();

        let reader = Reader::new(Arc::clone(&domain), cache, 0, f32::NAN, f64::NAN, 0.0, 0.0);
        let time_range = TimerangeDt::new(0, 4 * 3600, 3600).unwrap();
        let (values, unit) = reader.get(&variable, time_range).unwrap();
        assert_eq!(unit, Unit::Hectopascal);
        assert!((values[0] - 1013.0).abs() < 0.1);
    }

    struct HalvingFormula;
    impl DerivationFormula for HalvingFormula {
        fn derive(&self, sibling: &[f32]) -> Vec<f32> {
            sibling.iter().map(|v| if v.is_nan() { *v } else { v / 2.0 }).collect()
        }
    }

    #[test]
    fn get_or_derive_uses_sibling_when_domain_lacks_variable() {
        let dir = tempdir().unwrap();
        let domain = Arc::new(
            Arc::try_unwrap(test_domain(dir.path().to_path_buf(), 3600, 24))
                .unwrap()
                .with_missing_variables(["diffuse_radiation"]),
        );
        let cache = Arc::new(ColumnFileCache::new(8));

        let shortwave = Variable::new("shortwave_radiation", 1.0, Unit::WattsPerSquareMeter);
        let diffuse = Variable::new("diffuse_radiation", 1.0, Unit::WattsPerSquareMeter);
        let splitter = Splitter::new(Arc::clone(&domain), "shortwave_radiation", shortwave.scalefactor, Arc::clone(&cache));
        let n_locations = domain.grid.count();
        splitter.write(n_locations, 0, n_locations, 0, 4, 3600, &vec![200.0f32; (n_locations * 4) as usize]).unwrap();

        let reader = Reader::new(Arc::clone(&domain), cache, 0, f32::NAN, f64::NAN, 0.0, 0.0);
        let time_range = TimerangeDt::new(0, 4 * 3600, 3600).unwrap();
        let (values, unit) = reader
            .get_or_derive(&diffuse, &shortwave, &HalvingFormula, time_range)
            .unwrap();
        assert_eq!(unit, Unit::WattsPerSquareMeter);
        assert!(values.iter().all(|v| (*v - 100.0).abs() < 1e-6));
    }

    #[test]
    fn get_or_derive_fetches_directly_when_domain_carries_variable() {
        let dir = tempdir().unwrap();
        let domain = test_domain(dir.path().to_path_buf(), 3600, 24);
        let cache = Arc::new(ColumnFileCache::new(8));

        let shortwave = Variable::new("shortwave_radiation", 1.0, Unit::WattsPerSquareMeter);
        let diffuse = Variable::new("diffuse_radiation", 1.0, Unit::WattsPerSquareMeter);
        let splitter = Splitter::new(Arc::clone(&domain), "diffuse_radiation", diffuse.scalefactor, Arc::clone(&cache));
        let n_locations = domain.grid.count();
        splitter.write(n_locations, 0, n_locations, 0, 4, 3600, &vec![50.0f32; (n_locations * 4) as usize]).unwrap();

        let reader = Reader::new(Arc::clone(&domain), cache, 0, f32::NAN, f64::NAN, 0.0, 0.0);
        let time_range = TimerangeDt::new(0, 4 * 3600, 3600).unwrap();
        let (values, _) = reader
            .get_or_derive(&diffuse, &shortwave, &HalvingFormula, time_range)
            .unwrap();
        // domain carries diffuse_radiation directly, so the halving formula
        // must not be applied
        assert!(values.iter().all(|v| (*v - 50.0).abs() < 1e-6));
    }
}
