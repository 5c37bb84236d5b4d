//! Transverse Mercator projection into NAD83 / Illinois East (EPSG:26971).
//!
//! Forward-only: every distance in the pipeline is measured on projected
//! meters, while output layers keep the original WGS84 coordinates.

/// GRS80 semi-major axis in meters.
const GRS80_A: f64 = 6_378_137.0;

/// GRS80 inverse flattening.
const GRS80_INV_F: f64 = 298.257_222_101;

/// Parameters of a Transverse Mercator projection on GRS80.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercator {
    lon0: f64,
    k0: f64,
    false_easting: f64,
    false_northing: f64,
    e2: f64,
    ep2: f64,
    m0: f64,
}

impl TransverseMercator {
    /// Builds a projection from origin (degrees), scale, and false offsets.
    #[must_use]
    pub fn new(
        lat0_deg: f64,
        lon0_deg: f64,
        k0: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Self {
        let f = 1.0 / GRS80_INV_F;
        let e2 = f.mul_add(-f, 2.0 * f);
        let lat0 = lat0_deg.to_radians();
        Self {
            lon0: lon0_deg.to_radians(),
            k0,
            false_easting,
            false_northing,
            e2,
            ep2: e2 / (1.0 - e2),
            m0: meridian_arc(lat0, e2),
        }
    }

    /// NAD83 / Illinois East (EPSG:26971), meters.
    #[must_use]
    pub fn illinois_east() -> Self {
        Self::new(36.0 + 40.0 / 60.0, -(88.0 + 20.0 / 60.0), 0.999_975, 300_000.0, 0.0)
    }

    /// Projects WGS84 `(lon, lat)` degrees to `(x, y)` meters.
    #[must_use]
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let phi = lat.to_radians();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let tan_phi = phi.tan();

        let n = GRS80_A / self.e2.mul_add(-sin_phi * sin_phi, 1.0).sqrt();
        let t = tan_phi * tan_phi;
        let c = self.ep2 * cos_phi * cos_phi;
        let a = (lon.to_radians() - self.lon0) * cos_phi;
        let a2 = a * a;
        let a3 = a2 * a;
        let a4 = a2 * a2;
        let a5 = a4 * a;
        let a6 = a4 * a2;

        let x = self.k0
            * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * self.ep2) * a5 / 120.0);
        let y = self.k0
            * (meridian_arc(phi, self.e2) - self.m0
                + n * tan_phi
                    * (a2 / 2.0
                        + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                        + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * self.ep2) * a6
                            / 720.0));

        (x + self.false_easting, y + self.false_northing)
    }
}

impl Default for TransverseMercator {
    fn default() -> Self {
        Self::illinois_east()
    }
}

/// Meridian arc length from the equator to latitude `phi` (radians).
fn meridian_arc(phi: f64, e2: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    GRS80_A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_maps_to_false_offsets() {
        let proj = TransverseMercator::illinois_east();
        let (x, y) = proj.project(-(88.0 + 20.0 / 60.0), 36.0 + 40.0 / 60.0);
        assert!((x - 300_000.0).abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn chicago_loop_lands_in_expected_range() {
        let (x, y) = TransverseMercator::illinois_east().project(-87.6298, 41.8781);
        assert!((x - 358_398.1).abs() < 1.0, "x = {x}");
        assert!((y - 578_802.6).abs() < 1.0, "y = {y}");
    }

    #[test]
    fn small_latitude_step_is_about_111_meters() {
        let proj = TransverseMercator::illinois_east();
        let (_, y1) = proj.project(-87.6298, 41.8781);
        let (_, y2) = proj.project(-87.6298, 41.8791);
        assert!(((y2 - y1) - 111.07).abs() < 0.1);
    }
}
