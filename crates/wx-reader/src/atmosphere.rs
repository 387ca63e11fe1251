//! ICAO standard atmosphere, troposphere only (`<= 11 km`): height<->pressure
//! conversion for synthesizing geopotential height across pressure levels in
//! pressure-space (§4.5, Open Question resolved in SPEC_FULL.md §9).

const SEA_LEVEL_PRESSURE_PA: f64 = 101_325.0;
const SEA_LEVEL_TEMPERATURE_K: f64 = 288.15;
const LAPSE_RATE_K_PER_M: f64 = 0.0065;
const GRAVITY_M_S2: f64 = 9.80665;
const MOLAR_MASS_AIR_KG_MOL: f64 = 0.0289644;
const GAS_CONSTANT_J_MOL_K: f64 = 8.3144598;

fn exponent() -> f64 {
    GRAVITY_M_S2 * MOLAR_MASS_AIR_KG_MOL / (GAS_CONSTANT_J_MOL_K * LAPSE_RATE_K_PER_M)
}

/// Geopotential height (m) -> pressure (Pa).
pub fn height_to_pressure_pa(height_m: f64) -> f64 {
    let base = 1.0 - LAPSE_RATE_K_PER_M * height_m / SEA_LEVEL_TEMPERATURE_K;
    SEA_LEVEL_PRESSURE_PA * base.powf(exponent())
}

/// Pressure (Pa) -> geopotential height (m).
pub fn pressure_to_height_m(pressure_pa: f64) -> f64 {
    let ratio = pressure_pa / SEA_LEVEL_PRESSURE_PA;
    (SEA_LEVEL_TEMPERATURE_K / LAPSE_RATE_K_PER_M) * (1.0 - ratio.powf(1.0 / exponent()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sea_level_roundtrips() {
        let p = height_to_pressure_pa(0.0);
        assert!((p - SEA_LEVEL_PRESSURE_PA).abs() < 1e-6);
        let h = pressure_to_height_m(p);
        assert!((h - 0.0).abs() < 1e-6);
    }

    #[test]
    fn height_pressure_roundtrip_within_troposphere() {
        for h in [0.0, 500.0, 1500.0, 5000.0, 10_000.0] {
            let p = height_to_pressure_pa(h);
            let back = pressure_to_height_m(p);
            assert!((back - h).abs() < 1e-6, "h={h} back={back}");
        }
    }

    #[test]
    fn pressure_decreases_with_height() {
        assert!(height_to_pressure_pa(1000.0) < height_to_pressure_pa(0.0));
    }
}
