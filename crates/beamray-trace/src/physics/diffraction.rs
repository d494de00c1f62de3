//! Fraunhofer diffraction behind slit openings.
//!
//! Deflection angles are drawn by rejection sampling from the far-field
//! intensity pattern: `sinc²` for each axis of a rectangular opening and the
//! Airy pattern for an elliptical one. Both samplers window the pattern to
//! `±5 λ/b` and draw their uniforms in a fixed order.

use std::f64::consts::PI;

use beamray_math::Vec3;

use crate::rng::RayRng;

/// Bound on rejection-sampling attempts; an exhausted sampler returns zero.
pub const MAX_REJECTION_TRIES: u32 = 10_000;

/// Bessel function of the first kind, order one.
///
/// Abramowitz & Stegun 9.4.4 / 9.4.6 rational approximations, absolute
/// error below `1e-7` on the real line.
pub fn bessel_j1(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 3.0 {
        let y = (x / 3.0) * (x / 3.0);
        return x
            * (0.5
                + y * (-0.562_499_85
                    + y * (0.210_935_73
                        + y * (-0.039_542_89
                            + y * (0.004_433_19 + y * (-0.000_317_61 + y * 0.000_011_09))))));
    }
    let z = 3.0 / ax;
    let f = 0.797_884_56
        + z * (0.000_001_56
            + z * (0.016_596_67
                + z * (0.000_171_05
                    + z * (-0.002_495_11 + z * (0.001_136_53 - z * 0.000_200_33)))));
    let theta = ax - 2.356_194_49
        + z * (0.124_996_12
            + z * (0.000_056_5
                + z * (-0.006_378_79
                    + z * (0.000_743_48 + z * (0.000_798_24 - z * 0.000_291_66)))));
    let value = f * theta.cos() / ax.sqrt();
    if x < 0.0 {
        -value
    } else {
        value
    }
}

/// Deflection angle behind an opening `width` mm wide.
pub fn sample_sinc_angle(width: f64, wavelength: f64, rng: &mut RayRng) -> f64 {
    let b = width * 1e6;
    if b <= 0.0 || wavelength <= 0.0 {
        return 0.0;
    }
    let window = 10.0 * wavelength / b;
    for _ in 0..MAX_REJECTION_TRIES {
        let angle = (rng.next_f64() - 0.5) * window;
        let u = PI * b * angle.sin() / wavelength;
        let weight = if u.abs() < 1e-12 {
            1.0
        } else {
            let s = u.sin() / u;
            s * s
        };
        if weight >= rng.next_f64() {
            return angle;
        }
    }
    0.0
}

/// Deflection angles `(dphi, dpsi)` behind an elliptical opening with the
/// given diameters along x and z (mm).
pub fn sample_airy_angles(
    diameter_x: f64,
    diameter_z: f64,
    wavelength: f64,
    rng: &mut RayRng,
) -> (f64, f64) {
    let (bx, bz) = (diameter_x * 1e6, diameter_z * 1e6);
    if bx <= 0.0 || bz <= 0.0 || wavelength <= 0.0 {
        return (0.0, 0.0);
    }
    let (window_x, window_z) = (10.0 * wavelength / bx, 10.0 * wavelength / bz);
    for _ in 0..MAX_REJECTION_TRIES {
        let dphi = (rng.next_f64() - 0.5) * window_x;
        let dpsi = (rng.next_f64() - 0.5) * window_z;
        let ux = bx * dphi.sin();
        let uz = bz * dpsi.sin();
        let u = PI * (ux * ux + uz * uz).sqrt() / wavelength;
        let weight = if u < 1e-12 {
            1.0
        } else {
            let a = 2.0 * bessel_j1(u) / u;
            a * a
        };
        if weight >= rng.next_f64() {
            return (dphi, dpsi);
        }
    }
    (0.0, 0.0)
}

/// Tilt a ray crossing the local `y = 0` plane by `dphi` towards x and
/// `dpsi` towards z, keeping its side of travel.
pub fn deflect(direction: &Vec3, dphi: f64, dpsi: f64) -> Vec3 {
    let along = direction.y.abs();
    let phi = direction.x.atan2(along) + dphi;
    let psi = direction.z.atan2(along) + dpsi;
    Vec3::new(phi.tan(), direction.y.signum(), psi.tan()).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bessel_j1_reference_values() {
        let cases = [
            (2.0, 0.576_724_807_756_873_4),
            (4.0, -0.066_043_328_023_549_23),
            (PI, 0.284_615_343_179_752_73),
            (12.123, -0.213_681_984_513_028_97),
            (10.2, -0.006_615_743_297_708_316_7),
            (1e-8, 5e-9),
        ];
        for (x, expected) in cases {
            assert!((bessel_j1(x) - expected).abs() < 1e-7, "J1({x})");
            assert!((bessel_j1(-x) + expected).abs() < 1e-7, "J1(-{x})");
        }
        assert_eq!(bessel_j1(0.0), 0.0);
    }

    #[test]
    fn test_sinc_angles_stay_in_window() {
        let mut rng = RayRng::new(1, 2, 3);
        let wavelength = 12.39852;
        let width = 0.01;
        let window = 10.0 * wavelength / (width * 1e6);
        let mut sum = 0.0;
        for _ in 0..2000 {
            let a = sample_sinc_angle(width, wavelength, &mut rng);
            assert!(a.abs() <= window / 2.0);
            sum += a;
        }
        // symmetric pattern
        assert!((sum / 2000.0).abs() < window / 20.0);
    }

    #[test]
    fn test_sinc_concentrates_in_central_lobe() {
        let mut rng = RayRng::new(9, 0, 0);
        let wavelength: f64 = 1.0;
        let width = 1e-3;
        let first_zero = (wavelength / (width * 1e6)).asin();
        let inside = (0..4000)
            .filter(|_| sample_sinc_angle(width, wavelength, &mut rng).abs() < first_zero)
            .count();
        // about 90 % of the sinc² power sits in the central lobe
        assert!(inside > 3200, "{inside} of 4000 in central lobe");
    }

    #[test]
    fn test_degenerate_openings_do_not_deflect() {
        let mut rng = RayRng::new(0, 0, 0);
        assert_eq!(sample_sinc_angle(0.0, 10.0, &mut rng), 0.0);
        assert_eq!(sample_sinc_angle(1.0, 0.0, &mut rng), 0.0);
        assert_eq!(sample_airy_angles(0.0, 1.0, 10.0, &mut rng), (0.0, 0.0));
    }

    #[test]
    fn test_airy_angles_stay_in_window() {
        let mut rng = RayRng::new(5, 6, 7);
        let wavelength = 5.0;
        let (dx, dz) = (0.02, 0.05);
        for _ in 0..500 {
            let (phi, psi) = sample_airy_angles(dx, dz, wavelength, &mut rng);
            assert!(phi.abs() <= 5.0 * wavelength / (dx * 1e6));
            assert!(psi.abs() <= 5.0 * wavelength / (dz * 1e6));
        }
    }

    #[test]
    fn test_deflect() {
        let d = Vec3::new(0.0, 1.0, 0.0);
        assert_relative_eq!(deflect(&d, 0.0, 0.0), d, epsilon = 1e-15);

        let tilted = deflect(&d, 0.01, 0.0);
        assert!((tilted.x.atan2(tilted.y) - 0.01).abs() < 1e-12);
        assert!((tilted.norm() - 1.0).abs() < 1e-12);

        let backwards = deflect(&Vec3::new(0.1, -0.9, 0.2).normalize(), 0.0, 0.0);
        assert_relative_eq!(backwards, Vec3::new(0.1, -0.9, 0.2).normalize(), epsilon = 1e-12);
    }
}
