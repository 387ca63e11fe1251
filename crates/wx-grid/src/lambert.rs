//! Lambert Conformal Conic projection for projected Domains (e.g. a
//! continental-scale regional model on a 3 km conic grid).
//!
//! Parameters and formulas follow the standard GRIB2 Lambert Conformal
//! definition (tangent or secant cone, central meridian `LoV`, one or two
//! standard parallels).

use std::f64::consts::PI;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambertConformal {
    pub lon0: f64,
    pub lat0: f64,
    pub latin1: f64,
    pub latin2: f64,
    pub lat1: f64,
    pub lon1: f64,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
    pub earth_radius: f64,
    n: f64,
    f: f64,
    rho0: f64,
}

use serde::{Deserialize, Serialize};

impl LambertConformal {
    /// Build from GRIB2-style degree parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn from_grib2(
        lat1_deg: f64,
        lon1_deg: f64,
        lov_deg: f64,
        latin1_deg: f64,
        latin2_deg: f64,
        dx: f64,
        dy: f64,
        nx: usize,
        ny: usize,
    ) -> Self {
        let to_rad = PI / 180.0;

        let lat1 = lat1_deg * to_rad;
        let lon1 = lon1_deg * to_rad;
        let lon0 = lov_deg * to_rad;
        let latin1 = latin1_deg * to_rad;
        let latin2 = latin2_deg * to_rad;

        let earth_radius = 6_371_229.0;

        let n = if (latin1 - latin2).abs() < 1e-10 {
            latin1.sin()
        } else {
            let ln_ratio = (latin1.cos() / latin2.cos()).ln();
            let tan_ratio =
                ((PI / 4.0 + latin2 / 2.0).tan() / (PI / 4.0 + latin1 / 2.0).tan()).ln();
            ln_ratio / tan_ratio
        };

        let f = (latin1.cos() * (PI / 4.0 + latin1 / 2.0).tan().powf(n)) / n;
        let rho0 = earth_radius * f / (PI / 4.0 + lat1 / 2.0).tan().powf(n);
        let lat0 = lat1;

        Self {
            lon0,
            lat0,
            latin1,
            latin2,
            lat1,
            lon1,
            dx,
            dy,
            nx,
            ny,
            earth_radius,
            n,
            f,
            rho0,
        }
    }

    /// Geographic (degrees) to fractional grid indices `(i, j)`.
    pub fn geo_to_grid(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let to_rad = PI / 180.0;
        let lat = lat_deg * to_rad;
        let lon = lon_deg * to_rad;

        let dlon = wrap_pi(lon - self.lon0);
        let rho = self.earth_radius * self.f / (PI / 4.0 + lat / 2.0).tan().powf(self.n);
        let theta = self.n * dlon;
        let x = rho * theta.sin();
        let y = self.rho0 - rho * theta.cos();

        let dlon0 = wrap_pi(self.lon1 - self.lon0);
        let theta0 = self.n * dlon0;
        let x0 = self.rho0 * theta0.sin();
        let y0 = self.rho0 - self.rho0 * theta0.cos();

        ((x - x0) / self.dx, (y - y0) / self.dy)
    }

    /// Fractional grid indices to geographic (degrees).
    pub fn grid_to_geo(&self, i: f64, j: f64) -> (f64, f64) {
        let to_deg = 180.0 / PI;

        let dlon0 = wrap_pi(self.lon1 - self.lon0);
        let theta0 = self.n * dlon0;
        let x0 = self.rho0 * theta0.sin();
        let y0 = self.rho0 - self.rho0 * theta0.cos();

        let x = x0 + i * self.dx;
        let y = y0 + j * self.dy;

        let rho = ((x * x) + (self.rho0 - y) * (self.rho0 - y)).sqrt();
        let rho = if self.n < 0.0 { -rho } else { rho };
        let theta = (x / (self.rho0 - y)).atan();

        let lat = 2.0 * ((self.earth_radius * self.f / rho).powf(1.0 / self.n)).atan() - PI / 2.0;
        let lon = self.lon0 + theta / self.n;

        (lat * to_deg, lon * to_deg)
    }
}

fn wrap_pi(mut a: f64) -> f64 {
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}
