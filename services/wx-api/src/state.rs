//! Application state: the Domain/Variable registry and the shared
//! column-file cache, wired once at startup and handed to every handler.
//!
//! Grounded in `edr-api::state::AppState`'s "load once, share via
//! `Arc`/`Extension`" shape. The teacher backs its registry with
//! `storage::Catalog` (a Postgres-backed metadata store); that dependency
//! is dropped here (no database in this workspace's stack, see
//! DESIGN.md), so the registry is built in-process from [`Config`]
//! instead of loaded from a catalog database.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use wx_domain::{Domain, DomainKind, InterpolationKind, Unit, Variable, VariableCapability};
use wx_grid::{Grid, GridShape, LonRange};
use wx_splitter::cache::ColumnFileCache;

use crate::config::Config;

/// One registered Domain plus the Variables it serves.
pub struct ModelEntry {
    pub domain: Arc<Domain>,
    pub variables: HashMap<String, Variable>,
}

/// Registry of every Domain this server can answer queries for, keyed by
/// model name (the `{model}` path segment, §6).
pub struct DomainRegistry {
    pub models: HashMap<String, ModelEntry>,
}

impl DomainRegistry {
    fn empty() -> Self {
        Self { models: HashMap::new() }
    }

    pub fn get(&self, model: &str) -> Option<&ModelEntry> {
        self.models.get(model)
    }

    fn insert(&mut self, model: impl Into<String>, domain: Domain, variables: Vec<Variable>) {
        let variables = variables.into_iter().map(|v| (v.name.clone(), v)).collect();
        self.models.insert(model.into(), ModelEntry { domain: Arc::new(domain), variables });
    }
}

fn demo_grid(nx: usize, ny: usize) -> Arc<Grid> {
    Arc::new(Grid::new(GridShape::RegularLatLon {
        nx,
        ny,
        lat0: -90.0,
        lon0: -180.0,
        dlat: 180.0 / (ny as f64 - 1.0),
        dlon: 360.0 / (nx as f64 - 1.0),
        lon_range: LonRange::SignedDegrees,
    }))
}

fn surface_variables() -> Vec<Variable> {
    vec![
        Variable::new("temperature_2m", 20.0, Unit::Celsius).elevation_correctable(),
        Variable::new("relative_humidity_2m", 1.0, Unit::Percent)
            .with_interpolation(InterpolationKind::Hermite { clamp: Some((0.0, 100.0)) }),
        Variable::new("wind_speed_10m", 10.0, Unit::MetersPerSecond)
            .with_interpolation(InterpolationKind::Hermite { clamp: Some((0.0, f32::INFINITY)) }),
        Variable::new("shortwave_radiation", 1.0, Unit::WattsPerSquareMeter)
            .with_interpolation(InterpolationKind::SolarBackwardsAveraged)
            .with_capability(VariableCapability { derives_diffuse_from_shortwave: true, ..Default::default() }),
    ]
}

fn pressure_level_variables() -> Vec<Variable> {
    vec![Variable::new("temperature", 20.0, Unit::Celsius)
        .with_capability(VariableCapability { can_interpolate_pressure: true, ..Default::default() })]
}

/// Builds the registry this server exposes. Two demo Domains (a coarse
/// global model and a finer regional one, overlaid by the Mixer) rather
/// than a catalog lookup — see the module doc comment.
fn build_registry(domain_root: &Path) -> anyhow::Result<DomainRegistry> {
    let mut registry = DomainRegistry::empty();

    let global_dir = domain_root.join("global-coarse");
    std::fs::create_dir_all(&global_dir)?;
    let global = Domain::new("global-coarse", DomainKind::GlobalCoarse, demo_grid(360, 181), 10800, 280, global_dir)
        .with_pressure_levels([850, 925, 1000]);
    let mut global_vars = surface_variables();
    global_vars.extend(pressure_level_variables());
    registry.insert("global-coarse", global, global_vars);

    let regional_dir = domain_root.join("regional-fine");
    std::fs::create_dir_all(&regional_dir)?;
    let regional = Domain::new("regional-fine", DomainKind::RegionalFine, demo_grid(181, 91), 3600, 168, regional_dir)
        .with_pressure_levels([850, 900, 950, 1000]);
    let mut regional_vars = surface_variables();
    regional_vars.extend(pressure_level_variables());
    registry.insert("regional-fine", regional, regional_vars);

    Ok(registry)
}

/// Shared application state, handed to handlers via `Extension<Arc<AppState>>`.
pub struct AppState {
    pub registry: DomainRegistry,
    pub cache: Arc<ColumnFileCache>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let registry = build_registry(Path::new(&config.domain_root))?;
        let cache = Arc::new(ColumnFileCache::new(config.column_cache_capacity));
        Ok(Self { registry, cache, config })
    }
}
