//! Solar-backwards-averaged deaveraging (§4.4): the source sample is the
//! average irradiance over the trailing `dtSrc` interval. This module
//! deaverages to instantaneous using an analytic extraterrestrial-radiation
//! (ETR) profile for the point's `(lat,lon)`, interpolates instantaneous in
//! time between the two bracketing source samples, then re-averages over
//! the destination interval.
//!
//! Near the poles the integrated ETR over an interval can be ~0 for
//! extended windows; below `ETR_EPSILON` (Ws/m²) this falls back to
//! treating the source average as already-instantaneous rather than
//! dividing by a near-zero denominator (decided in SPEC_FULL.md §10).

use chrono::{Datelike, TimeZone, Timelike, Utc};
use wx_common::Timestamp;

use crate::kernels;

const SOLAR_CONSTANT_W_M2: f64 = 1361.0;
pub const ETR_EPSILON_WS_M2: f64 = 1e-6;

fn day_of_year_fractional(t: Timestamp) -> f64 {
    let dt = Utc.timestamp_opt(t, 0).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
    let ordinal = dt.ordinal() as f64;
    let day_fraction = (dt.hour() as f64 * 3600.0 + dt.minute() as f64 * 60.0 + dt.second() as f64) / 86400.0;
    ordinal - 1.0 + day_fraction
}

fn declination_rad(doy: f64) -> f64 {
    23.44_f64.to_radians() * (std::f64::consts::TAU * (284.0 + doy) / 365.0).sin()
}

fn eccentricity_factor(doy: f64) -> f64 {
    1.0 + 0.033 * (std::f64::consts::TAU * doy / 365.0).cos()
}

fn hour_angle_rad(t: Timestamp, lon_deg: f64) -> f64 {
    let dt = Utc.timestamp_opt(t, 0).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
    let utc_hour = dt.hour() as f64 + dt.minute() as f64 / 60.0 + dt.second() as f64 / 3600.0;
    let solar_time = utc_hour + lon_deg / 15.0;
    (solar_time - 12.0) * 15.0_f64.to_radians()
}

/// Instantaneous top-of-atmosphere irradiance on a horizontal surface,
/// clamped to `>= 0` (night).
pub fn instantaneous_etr(lat_deg: f64, lon_deg: f64, t: Timestamp) -> f64 {
    let doy = day_of_year_fractional(t);
    let decl = declination_rad(doy);
    let ecc = eccentricity_factor(doy);
    let ha = hour_angle_rad(t, lon_deg);
    let lat = lat_deg.to_radians();
    let cos_zenith = lat.sin() * decl.sin() + lat.cos() * decl.cos() * ha.cos();
    (SOLAR_CONSTANT_W_M2 * ecc * cos_zenith).max(0.0)
}

/// Integrated ETR over `[t0, t1)` (Ws/m²), via midpoint quadrature — the
/// instantaneous profile is analytic but its clamped-at-zero integral has
/// no closed form once a sunrise/sunset crossing falls inside the window.
pub fn integrated_etr(lat_deg: f64, lon_deg: f64, t0: Timestamp, t1: Timestamp, n_samples: u32) -> f64 {
    let span = (t1 - t0) as f64;
    if span <= 0.0 {
        return 0.0;
    }
    let n = n_samples.max(1);
    let mut sum = 0.0;
    for i in 0..n {
        let frac = (i as f64 + 0.5) / n as f64;
        let t = t0 + (frac * span) as i64;
        sum += instantaneous_etr(lat_deg, lon_deg, t);
    }
    (sum / n as f64) * span
}

/// Deaverage one backwards-averaged source sample `p` (average over
/// `[interval_end - dt_src, interval_end)`) to an instantaneous estimate at
/// `query_t`. Falls back to `p` itself when the interval's integrated ETR
/// is below [`ETR_EPSILON_WS_M2`].
fn deaveraged_instantaneous(
    p: f32,
    interval_end: Timestamp,
    dt_src: u64,
    query_t: Timestamp,
    lat_deg: f64,
    lon_deg: f64,
) -> f32 {
    let interval_start = interval_end - dt_src as i64;
    let integrated = integrated_etr(lat_deg, lon_deg, interval_start, interval_end, 6);
    if integrated < ETR_EPSILON_WS_M2 {
        return p;
    }
    let avg_etr = integrated / dt_src as f64;
    let inst_etr = instantaneous_etr(lat_deg, lon_deg, query_t);
    (p as f64 * inst_etr / avg_etr) as f32
}

/// Full kernel (§4.4): deaverage `pa`/`pb`, interpolate instantaneous
/// between them, re-average over the destination window, clamp `>= 0`.
/// `ta`/`tb` are the end-of-interval timestamps of the two bracketing
/// source samples (`tb == ta + dt_src`).
#[allow(clippy::too_many_arguments)]
pub fn solar_backwards_averaged(
    lat_deg: f64,
    lon_deg: f64,
    ta: Timestamp,
    pa: f32,
    tb: Timestamp,
    pb: f32,
    dt_src: u64,
    dest_start: Timestamp,
    dest_dt: u64,
) -> f32 {
    if pa.is_nan() || pb.is_nan() {
        return f32::NAN;
    }

    let n_samples = 6u32;
    let mut sum = 0.0f64;
    for i in 0..n_samples {
        let frac = (i as f64 + 0.5) / n_samples as f64;
        let t = dest_start + (frac * dest_dt as f64) as i64;
        let da = deaveraged_instantaneous(pa, ta, dt_src, t, lat_deg, lon_deg);
        let db = deaveraged_instantaneous(pb, tb, dt_src, t, lat_deg, lon_deg);
        let f = (t - ta) as f64 / dt_src as f64;
        sum += kernels::linear(da, db, f) as f64;
    }
    (sum / n_samples as f64).max(0.0) as f32
}
