//! Variable identity, units, and the per-Variable capability table.
//!
//! The capability table replaces a downcast ladder: instead of the Reader
//! asking "is this a `CloudCoverVariable`?" at runtime, a Variable simply
//! declares what it's capable of, and the Reader consults the flags.

use serde::{Deserialize, Serialize};

/// SI (or near-SI) unit a Variable's raw values are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Celsius,
    Kelvin,
    Pascal,
    Hectopascal,
    Percent,
    WattsPerSquareMeter,
    MetersPerSecond,
    Millimeter,
    Meter,
    Dimensionless,
}

impl Unit {
    /// Whether this is a temperature unit (gates elevation correction).
    pub fn is_temperature(self) -> bool {
        matches!(self, Unit::Celsius | Unit::Kelvin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Celsius => "°C",
            Unit::Kelvin => "K",
            Unit::Pascal => "Pa",
            Unit::Hectopascal => "hPa",
            Unit::Percent => "%",
            Unit::WattsPerSquareMeter => "W/m²",
            Unit::MetersPerSecond => "m/s",
            Unit::Millimeter => "mm",
            Unit::Meter => "m",
            Unit::Dimensionless => "",
        }
    }
}

/// Temporal interpolation kind declared by a Variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InterpolationKind {
    Linear,
    /// Catmull-Rom, optionally clamped to `[lo, hi]`.
    Hermite { clamp: Option<(f32, f32)> },
    SolarBackwardsAveraged,
}

/// Declares what the Reader may do to fill gaps for this Variable instead
/// of dispatching on a concrete Domain/Variable type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariableCapability {
    /// May be linearly synthesized between bracketing pressure levels when
    /// absent at the requested level.
    pub can_interpolate_pressure: bool,
    /// May be derived from relative humidity when missing.
    pub derives_cloud_cover_from_rh: bool,
    /// May be derived from shortwave radiation via a separation model when
    /// missing.
    pub derives_diffuse_from_shortwave: bool,
}

/// A named NWP output field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// File-name stem, e.g. `"temperature_2m"` or `"temperature"` for a
    /// pressure-level family (the level is appended by the Domain/Splitter).
    pub name: String,
    pub scalefactor: f32,
    pub interpolation: InterpolationKind,
    pub unit: Unit,
    pub is_elevation_correctable: bool,
    pub capability: VariableCapability,
}

impl Variable {
    pub fn new(name: impl Into<String>, scalefactor: f32, unit: Unit) -> Self {
        Self {
            name: name.into(),
            scalefactor,
            interpolation: InterpolationKind::Linear,
            unit,
            is_elevation_correctable: false,
            capability: VariableCapability::default(),
        }
    }

    pub fn with_interpolation(mut self, kind: InterpolationKind) -> Self {
        self.interpolation = kind;
        self
    }

    pub fn elevation_correctable(mut self) -> Self {
        self.is_elevation_correctable = true;
        self
    }

    pub fn with_capability(mut self, capability: VariableCapability) -> Self {
        self.capability = capability;
        self
    }

    /// File stem for a pressure-level instance of this Variable, e.g.
    /// `"temperature_850hPa"`.
    pub fn pressure_level_stem(&self, level_hpa: u32) -> String {
        format!("{}_{}hPa", self.name, level_hpa)
    }

    /// Whether elevation correction applies: elevation-correctable,
    /// temperature-typed, both elevations must still be checked finite by
    /// the caller.
    pub fn wants_elevation_correction(&self) -> bool {
        self.is_elevation_correctable && self.unit.is_temperature()
    }

    /// Interpolation padding in source steps, per §4.4.
    pub fn padding(&self) -> usize {
        match self.interpolation {
            InterpolationKind::Linear => 1,
            InterpolationKind::Hermite { .. } => 2,
            InterpolationKind::SolarBackwardsAveraged => 2,
        }
    }
}
