//! Non-solar temporal interpolation kernels (§4.4). Every kernel preserves
//! `NaN`: any `NaN` in the stencil makes the output `NaN`.

/// `y = (1-f)*a + f*b`, `f` in `[0,1]`.
pub fn linear(a: f32, b: f32, f: f64) -> f32 {
    if a.is_nan() || b.is_nan() {
        return f32::NAN;
    }
    ((1.0 - f) * a as f64 + f * b as f64) as f32
}

/// Catmull-Rom Hermite spline through four bracketing samples `p0,p1,p2,p3`,
/// interpolating between `p1` and `p2` at fraction `f` in `[0,1]`. Clamped
/// to `clamp` if given (e.g. humidity in `[0,100]`).
pub fn hermite(p0: f32, p1: f32, p2: f32, p3: f32, f: f64, clamp: Option<(f32, f32)>) -> f32 {
    if p0.is_nan() || p1.is_nan() || p2.is_nan() || p3.is_nan() {
        return f32::NAN;
    }
    let (p0, p1, p2, p3) = (p0 as f64, p1 as f64, p2 as f64, p3 as f64);
    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;
    let mut result = ((a * f + b) * f + c) * f + d;
    if let Some((lo, hi)) = clamp {
        result = result.clamp(lo as f64, hi as f64);
    }
    result as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_at_endpoints() {
        assert_eq!(linear(10.0, 20.0, 0.0), 10.0);
        assert_eq!(linear(10.0, 20.0, 1.0), 20.0);
        assert_eq!(linear(10.0, 20.0, 0.5), 15.0);
    }

    #[test]
    fn linear_preserves_nan() {
        assert!(linear(f32::NAN, 20.0, 0.5).is_nan());
        assert!(linear(10.0, f32::NAN, 0.5).is_nan());
    }

    #[test]
    fn hermite_passes_through_samples_at_endpoints() {
        let v = hermite(0.0, 10.0, 20.0, 30.0, 0.0, None);
        assert!((v - 10.0).abs() < 1e-4);
        let v = hermite(0.0, 10.0, 20.0, 30.0, 1.0, None);
        assert!((v - 20.0).abs() < 1e-4);
    }

    #[test]
    fn hermite_clamps_to_bounds() {
        let v = hermite(0.0, 95.0, 100.0, 90.0, 0.9, Some((0.0, 100.0)));
        assert!(v <= 100.0);
    }

    #[test]
    fn hermite_preserves_nan() {
        assert!(hermite(0.0, f32::NAN, 20.0, 30.0, 0.5, None).is_nan());
    }
}
