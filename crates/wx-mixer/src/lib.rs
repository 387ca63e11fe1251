//! The Mixer (§4.6): overlays an ordered stack of Readers, later entries
//! taking priority, reducing position-wise by last-non-NaN.
//!
//! Grounded in `grid-processor::service::GridDataService`'s multi-dataset
//! overlay pattern, generalized from "one dataset" to "ordered reader
//! stack".

use tracing::instrument;
use wx_common::{TimerangeDt, WxError, WxResult};
use wx_domain::{Unit, Variable};
use wx_reader::{DerivationFormula, PressureLevelKind, Reader};

/// Anything that can answer `get`/`prefetch` for one `(Domain, point)` and
/// Variable — implemented directly by [`Reader`] for surface variables, and
/// by [`PressureLevelPoint`] for a pinned pressure level.
pub trait PointSource {
    fn get(&self, variable: &Variable, time_range: TimerangeDt) -> WxResult<(Vec<f32>, Unit)>;
    fn prefetch(&self, variable: &Variable, time_range: TimerangeDt);
}

impl PointSource for Reader {
    fn get(&self, variable: &Variable, time_range: TimerangeDt) -> WxResult<(Vec<f32>, Unit)> {
        Reader::get(self, variable, time_range)
    }

    fn prefetch(&self, variable: &Variable, time_range: TimerangeDt) {
        Reader::prefetch(self, variable, time_range)
    }
}

/// Adapts a [`Reader`] pinned to one pressure level into a [`PointSource`].
pub struct PressureLevelPoint<'a> {
    pub reader: &'a Reader,
    pub level_hpa: u32,
    pub kind: PressureLevelKind,
}

impl PointSource for PressureLevelPoint<'_> {
    fn get(&self, variable: &Variable, time_range: TimerangeDt) -> WxResult<(Vec<f32>, Unit)> {
        self.reader.get_pressure_level(variable, self.level_hpa, self.kind, time_range)
    }

    fn prefetch(&self, variable: &Variable, time_range: TimerangeDt) {
        self.reader.prefetch(variable, time_range)
    }
}

/// Adapts a [`Reader`] into a [`PointSource`] that derives its Variable
/// from `sibling` via `formula` whenever the bound Domain is known to lack
/// it outright (§4.5 step 2), falling back to a direct fetch otherwise.
pub struct DerivedPoint<'a> {
    pub reader: &'a Reader,
    pub sibling: Variable,
    pub formula: &'a dyn DerivationFormula,
}

impl PointSource for DerivedPoint<'_> {
    fn get(&self, variable: &Variable, time_range: TimerangeDt) -> WxResult<(Vec<f32>, Unit)> {
        self.reader.get_or_derive(variable, &self.sibling, self.formula, time_range)
    }

    fn prefetch(&self, variable: &Variable, time_range: TimerangeDt) {
        self.reader.prefetch(variable, time_range);
        self.reader.prefetch(&self.sibling, time_range);
    }
}

/// An ordered stack of [`PointSource`]s, later entries higher priority.
pub struct Mixer<'a> {
    sources: Vec<&'a dyn PointSource>,
}

impl<'a> Mixer<'a> {
    pub fn new(sources: Vec<&'a dyn PointSource>) -> Self {
        Self { sources }
    }

    /// Prefetch fans out to every underlying source.
    pub fn prefetch(&self, variable: &Variable, time_range: TimerangeDt) {
        for source in &self.sources {
            source.prefetch(variable, time_range);
        }
    }

    /// Calls `get` on every source that has data for this point, reduces
    /// position-wise by last-non-NaN, and fails fast on a unit mismatch
    /// between the contributing sources.
    #[instrument(skip_all, fields(variable = %variable.name))]
    pub fn get(&self, variable: &Variable, time_range: TimerangeDt) -> WxResult<(Vec<f32>, Unit)> {
        let count = time_range.count();
        let mut out = vec![f32::NAN; count];
        let mut agreed_unit: Option<Unit> = None;

        for source in &self.sources {
            let (values, unit) = match source.get(variable, time_range) {
                Ok(v) => v,
                Err(WxError::GridMiss) => continue,
                Err(e) => return Err(e),
            };
            debug_assert_eq!(values.len(), count);

            if values.iter().any(|v| !v.is_nan()) {
                match agreed_unit {
                    None => agreed_unit = Some(unit),
                    Some(existing) if existing != unit => {
                        return Err(WxError::unit_mismatch(existing.as_str(), unit.as_str()));
                    }
                    Some(_) => {}
                }
            }

            for (slot, v) in out.iter_mut().zip(values.into_iter()) {
                if !v.is_nan() {
                    *slot = v;
                }
            }
        }

        Ok((out, agreed_unit.unwrap_or(variable.unit)))
    }
}
