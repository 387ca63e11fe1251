//! The Domain: one NWP source's grid, time step, and storage roots.
//!
//! `DomainKind` is the tagged variant called for in the redesign notes: a
//! Reader matches on it to decide model-specific quirks (e.g. which
//! pressure levels are physically present) instead of downcasting a trait
//! object.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wx_grid::Grid;

/// Which concrete NWP model a Domain represents. Kept as a closed,
/// exhaustively-matched tag rather than an open string so the Reader's
/// per-model quirks are checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainKind {
    /// Coarse global model, typically missing some derived fields.
    GlobalCoarse,
    /// Fine regional model, typically complete but smaller footprint.
    RegionalFine,
}

impl DomainKind {
    /// Coarse-to-fine ordering key. The Mixer (§4.6) treats later sources
    /// as higher priority, so an overlay stack must be built ascending by
    /// this rank — coarsest Domain first, finest last — for "highest
    /// resolution wins" to hold regardless of registration order.
    pub fn resolution_rank(&self) -> u8 {
        match self {
            DomainKind::GlobalCoarse => 0,
            DomainKind::RegionalFine => 1,
        }
    }
}

/// A named NWP source: grid, time step, storage roots, and which pressure
/// levels it physically carries.
#[derive(Debug, Clone)]
pub struct Domain {
    pub name: String,
    pub kind: DomainKind,
    pub grid: Arc<Grid>,
    pub dt_seconds: u64,
    pub om_file_length: u64,
    pub rolling_directory: PathBuf,
    pub archive_directory: Option<PathBuf>,
    /// Pressure levels (hPa) this Domain physically stores, ascending.
    pub pressure_levels_hpa: BTreeSet<u32>,
    /// Variable stems this Domain is known not to physically produce (e.g.
    /// a coarse global model with no diffuse-radiation output). The Reader
    /// consults this, alongside a Variable's capability table, to decide
    /// whether to derive the field from a sibling instead of fetching it
    /// directly (§4.5 step 2).
    pub missing_variables: BTreeSet<String>,
}

impl Domain {
    pub fn new(
        name: impl Into<String>,
        kind: DomainKind,
        grid: Arc<Grid>,
        dt_seconds: u64,
        om_file_length: u64,
        rolling_directory: PathBuf,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            grid,
            dt_seconds,
            om_file_length,
            rolling_directory,
            archive_directory: None,
            pressure_levels_hpa: BTreeSet::new(),
            missing_variables: BTreeSet::new(),
        }
    }

    pub fn with_archive(mut self, archive_directory: PathBuf) -> Self {
        self.archive_directory = Some(archive_directory);
        self
    }

    pub fn with_pressure_levels(mut self, levels_hpa: impl IntoIterator<Item = u32>) -> Self {
        self.pressure_levels_hpa = levels_hpa.into_iter().collect();
        self
    }

    pub fn with_missing_variables(mut self, stems: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.missing_variables = stems.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this Domain is known ahead of time not to produce `stem`
    /// directly, meaning the Reader should derive it from a sibling instead
    /// of reading (and silently getting back all-`NaN`) from the Splitter.
    pub fn lacks_variable(&self, stem: &str) -> bool {
        self.missing_variables.contains(stem)
    }

    /// Find the two levels in `pressure_levels_hpa` that bracket `level_hpa`,
    /// for linear pressure-level synthesis (§4.5.1). Returns `None` if
    /// `level_hpa` is already present, or if it falls outside the Domain's
    /// stored range (no bracket available).
    pub fn bracketing_levels(&self, level_hpa: u32) -> Option<(u32, u32)> {
        if self.pressure_levels_hpa.contains(&level_hpa) {
            return None;
        }
        let lower = self
            .pressure_levels_hpa
            .iter()
            .filter(|&&l| l > level_hpa)
            .min()
            .copied();
        let upper = self
            .pressure_levels_hpa
            .iter()
            .filter(|&&l| l < level_hpa)
            .max()
            .copied();
        match (lower, upper) {
            (Some(lo), Some(hi)) => Some((hi, lo)),
            _ => None,
        }
    }

    /// Shard index covering `timestamp`, anchored at `T0 = 0` (epoch).
    pub fn shard_index(&self, timestamp: wx_common::Timestamp) -> i64 {
        let span = self.dt_seconds as i64 * self.om_file_length as i64;
        timestamp.div_euclid(span)
    }

    /// `[start, end)` covered by shard `k`.
    pub fn shard_bounds(&self, shard: i64) -> (wx_common::Timestamp, wx_common::Timestamp) {
        let span = self.dt_seconds as i64 * self.om_file_length as i64;
        (shard * span, (shard + 1) * span)
    }
}
