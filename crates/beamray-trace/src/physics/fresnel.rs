//! Fresnel coefficients and polarization transfer.
//!
//! Angles of incidence are measured from the surface normal. Refractive
//! indices are complex (`n + ik`); the incident medium is vacuum for every
//! element in a beamline, but the functions take both sides explicitly.

use beamray_math::{ray_basis, CMat3, Complex, Mat3, Stokes, Tolerance, Vec3};
use nalgebra::Matrix2;

/// Complex Fresnel amplitudes for s- and p-polarized light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Amplitudes {
    /// Perpendicular (s) component.
    pub s: Complex,
    /// Parallel (p) component.
    pub p: Complex,
}

/// Complex refraction angle from Snell's law.
pub fn refract_angle(incidence: f64, n_i: Complex, n_t: Complex) -> Complex {
    (n_i / n_t * Complex::new(incidence.sin(), 0.0)).asin()
}

fn cosines(incidence: f64, n_i: Complex, n_t: Complex) -> (Complex, Complex) {
    let cos_i = Complex::new(incidence.cos(), 0.0);
    let cos_t = refract_angle(incidence, n_i, n_t).cos();
    (cos_i, cos_t)
}

/// Reflection amplitudes.
pub fn reflect_amplitude(incidence: f64, n_i: Complex, n_t: Complex) -> Amplitudes {
    let (cos_i, cos_t) = cosines(incidence, n_i, n_t);
    Amplitudes {
        s: (n_i * cos_i - n_t * cos_t) / (n_i * cos_i + n_t * cos_t),
        p: (n_t * cos_i - n_i * cos_t) / (n_t * cos_i + n_i * cos_t),
    }
}

/// Transmission amplitudes.
pub fn refract_amplitude(incidence: f64, n_i: Complex, n_t: Complex) -> Amplitudes {
    let (cos_i, cos_t) = cosines(incidence, n_i, n_t);
    let two_ni_cos_i = Complex::new(2.0, 0.0) * n_i * cos_i;
    Amplitudes {
        s: two_ni_cos_i / (n_i * cos_i + n_t * cos_t),
        p: two_ni_cos_i / (n_t * cos_i + n_i * cos_t),
    }
}

/// Reflectance `(R_s, R_p)`.
pub fn reflect_intensity(incidence: f64, n_i: Complex, n_t: Complex) -> (f64, f64) {
    let a = reflect_amplitude(incidence, n_i, n_t);
    (a.s.norm_sqr(), a.p.norm_sqr())
}

/// Transmittance `(T_s, T_p)`, including the beam-cross-section factor.
pub fn refract_intensity(incidence: f64, n_i: Complex, n_t: Complex) -> (f64, f64) {
    let (cos_i, cos_t) = cosines(incidence, n_i, n_t);
    let factor = ((n_t * cos_t) / (n_i * cos_i)).re;
    let a = refract_amplitude(incidence, n_i, n_t);
    (a.s.norm_sqr() * factor, a.p.norm_sqr() * factor)
}

/// Brewster angle for real indices.
pub fn brewster_angle(n_i: f64, n_t: f64) -> f64 {
    (n_t / n_i).atan()
}

/// Critical angle for total internal reflection, if one exists.
pub fn critical_angle(n_i: f64, n_t: f64) -> Option<f64> {
    (n_t < n_i).then(|| (n_t / n_i).asin())
}

/// Jones matrix in the (s, p, propagation) basis.
pub fn jones_matrix(amplitudes: &Amplitudes) -> CMat3 {
    CMat3::from_diagonal(&nalgebra::Vector3::new(
        amplitudes.s,
        amplitudes.p,
        Complex::new(1.0, 0.0),
    ))
}

fn complexify(m: &Mat3) -> CMat3 {
    m.map(|v| Complex::new(v, 0.0))
}

/// World-frame field transfer matrix for one reflection or diffraction.
///
/// `normal` must face the incident ray. At normal incidence the plane of
/// incidence is undefined and the s amplitude is applied uniformly.
pub fn polarization_matrix(
    incident: &Vec3,
    outgoing: &Vec3,
    normal: &Vec3,
    amplitudes: &Amplitudes,
) -> CMat3 {
    let s0 = incident.cross(&(-normal));
    if s0.norm() < Tolerance::DEFAULT.angular {
        return CMat3::from_diagonal_element(amplitudes.s);
    }
    let s0 = s0.normalize();
    let p0 = incident.cross(&s0);
    let p1 = outgoing.cross(&s0);

    let out_basis = Mat3::from_columns(&[s0, p1, *outgoing]);
    let in_basis = Mat3::from_columns(&[s0, p0, *incident]).transpose();

    complexify(&out_basis) * jones_matrix(amplitudes) * complexify(&in_basis)
}

/// Apply a world-frame field transfer matrix to a Stokes vector.
///
/// The Stokes vectors are referenced to [`ray_basis`] of the incident and
/// outgoing directions. Partially polarized light is handled through the
/// coherency matrix, so unpolarized input stays unpolarized under an
/// isotropic transfer.
pub fn transfer_stokes(incident: &Vec3, outgoing: &Vec3, matrix: &CMat3, stokes: &Stokes) -> Stokes {
    let local = complexify(&ray_basis(outgoing).transpose()) * matrix * complexify(&ray_basis(incident));
    let jones = Matrix2::new(local[(0, 0)], local[(0, 1)], local[(1, 0)], local[(1, 1)]);

    let half = 0.5;
    let coherency = Matrix2::new(
        Complex::new(half * (stokes[0] + stokes[1]), 0.0),
        Complex::new(half * stokes[2], half * stokes[3]),
        Complex::new(half * stokes[2], -half * stokes[3]),
        Complex::new(half * (stokes[0] - stokes[1]), 0.0),
    );
    let out = jones * coherency * jones.adjoint();

    Stokes::new(
        out[(0, 0)].re + out[(1, 1)].re,
        out[(0, 0)].re - out[(1, 1)].re,
        2.0 * out[(0, 1)].re,
        2.0 * out[(0, 1)].im,
    )
}

/// Fully polarized field `(E_x, E_y)` with the given Stokes parameters.
///
/// `E_x` is real; the relative phase sits on `E_y`.
pub fn stokes_to_field(stokes: &Stokes) -> (Complex, Complex) {
    let x = ((stokes[0] + stokes[1]) * 0.5).max(0.0).sqrt();
    let y_mag = ((stokes[0] - stokes[1]) * 0.5).max(0.0).sqrt();
    let phase = -stokes[3].atan2(stokes[2]);
    (Complex::new(x, 0.0), Complex::from_polar(y_mag, phase))
}

/// Stokes parameters of a fully polarized field.
pub fn field_to_stokes(x: Complex, y: Complex) -> Stokes {
    let (mx, my) = (x.norm(), y.norm());
    let delta = x.arg() - y.arg();
    Stokes::new(
        mx * mx + my * my,
        mx * mx - my * my,
        2.0 * mx * my * delta.cos(),
        2.0 * mx * my * delta.sin(),
    )
}

/// Total intensity `S0`.
pub fn intensity(stokes: &Stokes) -> f64 {
    stokes[0]
}

/// Degree of polarization, zero for a dark ray.
pub fn degree_of_polarization(stokes: &Stokes) -> f64 {
    if stokes[0] <= 0.0 {
        return 0.0;
    }
    (stokes[1] * stokes[1] + stokes[2] * stokes[2] + stokes[3] * stokes[3]).sqrt() / stokes[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_1_SQRT_2;

    const VACUUM: Complex = Complex::new(1.0, 0.0);
    const GLASS: Complex = Complex::new(1.5, 0.0);

    #[test]
    fn test_normal_incidence_reflectance() {
        let (rs, rp) = reflect_intensity(0.0, VACUUM, GLASS);
        assert!((rs - 0.04).abs() < 1e-12);
        assert!((rp - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_energy_conservation_for_dielectric() {
        for degrees in [10.0f64, 30.0, 60.0, 80.0] {
            let theta = degrees.to_radians();
            let (rs, rp) = reflect_intensity(theta, VACUUM, GLASS);
            let (ts, tp) = refract_intensity(theta, VACUUM, GLASS);
            assert!((rs + ts - 1.0).abs() < 1e-12, "s at {degrees}");
            assert!((rp + tp - 1.0).abs() < 1e-12, "p at {degrees}");
        }
    }

    #[test]
    fn test_brewster_angle_kills_p_reflection() {
        let theta = brewster_angle(1.0, 1.5);
        let (rs, rp) = reflect_intensity(theta, VACUUM, GLASS);
        assert!(rp < 1e-20);
        assert!(rs > 0.1);
    }

    #[test]
    fn test_total_internal_reflection() {
        let critical = critical_angle(1.5, 1.0).unwrap();
        assert!((critical - (1.0f64 / 1.5).asin()).abs() < 1e-12);
        assert!(critical_angle(1.0, 1.5).is_none());

        let (rs, rp) = reflect_intensity(critical + 0.1, GLASS, VACUUM);
        assert!((rs - 1.0).abs() < 1e-9);
        assert!((rp - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_absorbing_mirror_loses_intensity() {
        let gold = Complex::new(0.95, 0.05);
        let (rs, rp) = reflect_intensity(80f64.to_radians(), VACUUM, gold);
        assert!(rs > 0.0 && rs < 1.0);
        assert!(rp > 0.0 && rp < 1.0);
    }

    fn mirror_45() -> (Vec3, Vec3, Vec3) {
        let incident = Vec3::z();
        let normal = Vec3::new(FRAC_1_SQRT_2, 0.0, -FRAC_1_SQRT_2);
        let outgoing = incident - 2.0 * incident.dot(&normal) * normal;
        (incident, outgoing, normal)
    }

    #[test]
    fn test_transfer_separates_s_and_p() {
        let (incident, outgoing, normal) = mirror_45();
        assert_relative_eq!(outgoing, Vec3::x(), epsilon = 1e-12);

        let theta = std::f64::consts::FRAC_PI_4;
        let amplitudes = reflect_amplitude(theta, VACUUM, GLASS);
        let (rs, rp) = reflect_intensity(theta, VACUUM, GLASS);
        let m = polarization_matrix(&incident, &outgoing, &normal, &amplitudes);

        // x lies in the plane of incidence: p-polarized
        let p_out = transfer_stokes(&incident, &outgoing, &m, &Stokes::new(1.0, 1.0, 0.0, 0.0));
        assert!((p_out[0] - rp).abs() < 1e-12);
        assert!((p_out[1] - rp).abs() < 1e-12);

        let s_out = transfer_stokes(&incident, &outgoing, &m, &Stokes::new(1.0, -1.0, 0.0, 0.0));
        assert!((s_out[0] - rs).abs() < 1e-12);
        assert!((s_out[1] + rs).abs() < 1e-12);

        let unpolarized = transfer_stokes(&incident, &outgoing, &m, &Stokes::new(1.0, 0.0, 0.0, 0.0));
        assert!((unpolarized[0] - 0.5 * (rs + rp)).abs() < 1e-12);
    }

    #[test]
    fn test_normal_incidence_transfer() {
        let incident = Vec3::z();
        let normal = -Vec3::z();
        let outgoing = -Vec3::z();
        let amplitudes = reflect_amplitude(0.0, VACUUM, GLASS);
        let m = polarization_matrix(&incident, &outgoing, &normal, &amplitudes);
        let out = transfer_stokes(&incident, &outgoing, &m, &Stokes::new(2.0, 0.0, 0.0, 0.0));
        assert!((out[0] - 0.08).abs() < 1e-12);
        assert!(degree_of_polarization(&out) < 1e-9);
    }

    #[test]
    fn test_ideal_transfer_preserves_stokes() {
        let (incident, outgoing, normal) = mirror_45();
        let ideal = Amplitudes {
            s: Complex::new(1.0, 0.0),
            p: Complex::new(1.0, 0.0),
        };
        let m = polarization_matrix(&incident, &outgoing, &normal, &ideal);
        let stokes = Stokes::new(1.0, 0.3, 0.4, 0.5);
        let out = transfer_stokes(&incident, &outgoing, &m, &stokes);
        assert!((out[0] - 1.0).abs() < 1e-12);
        assert!((degree_of_polarization(&out) - degree_of_polarization(&stokes)).abs() < 1e-12);
    }

    #[test]
    fn test_field_stokes_conversion() {
        let stokes = Stokes::new(1.0, 0.6, 0.0, 0.8);
        let (x, y) = stokes_to_field(&stokes);
        let back = field_to_stokes(x, y);
        assert_relative_eq!(back, stokes, epsilon = 1e-12);
        assert!((intensity(&back) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_degree_of_polarization() {
        assert_eq!(degree_of_polarization(&Stokes::new(1.0, 0.0, 0.0, 0.0)), 0.0);
        assert!((degree_of_polarization(&Stokes::new(1.0, 1.0, 0.0, 0.0)) - 1.0).abs() < 1e-12);
        assert_eq!(degree_of_polarization(&Stokes::zeros()), 0.0);
    }
}
