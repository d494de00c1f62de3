//! Grating equation and line densities.
//!
//! Line densities are in lines/mm, wavelengths in nm. The `1e-6` factors
//! convert `nm * lines/mm` into a dimensionless direction-cosine shift.

use beamray_math::{Point3, Vec3};
use serde::{Deserialize, Serialize};

/// Line density of a variable-line-spacing grating at local `z`.
///
/// `vls` holds the polynomial coefficients `b2..b7`.
pub fn vls_line_density(line_density: f64, z: f64, vls: &[f64; 6]) -> f64 {
    let mut factor = 1.0;
    let mut power = z;
    for (i, coefficient) in vls.iter().enumerate() {
        factor += (i as f64 + 2.0) * coefficient * power;
        power *= z;
    }
    line_density * factor
}

/// Direction-cosine shift along the grating's `z` axis.
pub fn grating_az(wavelength: f64, line_density: f64, order: i32) -> f64 {
    wavelength * line_density * f64::from(order) * 1e-6
}

/// Two-dimensional grating equation.
///
/// The incoming `direction` is expressed in the frame where `normal` is the
/// `y` axis, its tangential components are shifted by `(ax, az)` and the
/// result is lifted back onto the outgoing hemisphere. Returns `None` when
/// no propagating solution exists (the ray is beyond the horizon).
pub fn refrac_2d(direction: &Vec3, normal: &Vec3, az: f64, ax: f64) -> Option<Vec3> {
    let flip = normal.y < 0.0;
    let (d, n) = if flip {
        (
            Vec3::new(direction.x, -direction.y, direction.z),
            Vec3::new(normal.x, -normal.y, normal.z),
        )
    } else {
        (*direction, *normal)
    };

    let eps = (n.x / n.y).atan();
    let del = -n.z.asin();
    let (se, ce) = eps.sin_cos();
    let (sd, cd) = del.sin_cos();

    // Rotation taking `n` onto the y axis.
    let rot = nalgebra::Matrix3::new(
        ce, -se, 0.0, //
        cd * se, cd * ce, -sd, //
        sd * se, sd * ce, cd,
    );

    let r = rot * d;
    let x1 = r.x - ax;
    let z1 = r.z - az;
    let y1 = 1.0 - x1 * x1 - z1 * z1;
    if y1 <= 0.0 {
        return None;
    }

    let mut out = rot.transpose() * Vec3::new(x1, y1.sqrt(), z1);
    if flip {
        out.y = -out.y;
    }
    Some(out)
}

/// Imaging condition a reflection zone plate was designed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RzpImageType {
    /// Point source imaged to a point; sagittal arms equal meridional arms.
    #[default]
    PointToPoint,
    /// Astigmatic source imaged astigmatically; sagittal and meridional
    /// arms differ.
    Astigmatic,
}

/// Zone structure of a reflection zone plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RzpKind {
    /// Zones focus in both directions.
    #[default]
    Elliptical,
    /// Zones focus only in the meridional plane; no sagittal line density.
    Meridional,
}

/// Design of a reflection zone plate.
///
/// Arm lengths are in mm, angles are grazing angles in radians and the
/// design wavelength is in nm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RzpParams {
    /// Imaging condition.
    #[serde(default)]
    pub image_type: RzpImageType,
    /// Zone structure.
    #[serde(default)]
    pub kind: RzpKind,
    /// Design wavelength in nm.
    pub design_wavelength: f64,
    /// Diffraction order, used both for the design and for tracing.
    pub order: i32,
    /// Source distance in the meridional plane.
    pub entrance_arm_meridional: f64,
    /// Image distance in the meridional plane.
    pub exit_arm_meridional: f64,
    /// Source distance in the sagittal plane (astigmatic designs only).
    #[serde(default)]
    pub entrance_arm_sagittal: f64,
    /// Image distance in the sagittal plane (astigmatic designs only).
    #[serde(default)]
    pub exit_arm_sagittal: f64,
    /// Grazing angle of incidence.
    pub design_alpha: f64,
    /// Grazing angle of diffraction.
    pub design_beta: f64,
    /// Send half of the rays into order zero.
    #[serde(default)]
    pub additional_zero_order: bool,
}

impl RzpParams {
    fn sagittal_arms(&self) -> (f64, f64) {
        match self.image_type {
            RzpImageType::PointToPoint => (self.entrance_arm_meridional, self.exit_arm_meridional),
            RzpImageType::Astigmatic => (self.entrance_arm_sagittal, self.exit_arm_sagittal),
        }
    }
}

/// Direction cosines `(a_i, b_i, a_m, b_m)` of the source and image arms
/// seen from `position`, along the local tangent axes `t_z`/`t_x`.
fn arm_cosines(
    position: &Point3,
    tangent_x: &Vec3,
    tangent_z: &Vec3,
    entrance: f64,
    exit: f64,
    alpha: f64,
    beta: f64,
) -> (f64, f64, f64, f64) {
    let source = Point3::new(0.0, entrance * alpha.sin(), -entrance * alpha.cos());
    let image = Point3::new(0.0, exit * beta.sin(), exit * beta.cos());
    let to_source = source - position;
    let to_image = image - position;
    let (ls, li) = (to_source.norm(), to_image.norm());
    (
        to_source.dot(tangent_z) / ls,
        -to_source.dot(tangent_x) / ls,
        to_image.dot(tangent_z) / li,
        -to_image.dot(tangent_x) / li,
    )
}

/// Local line density `(D_x, D_z)` of a reflection zone plate at `position`.
///
/// For curved substrates the arm vectors are measured along the tangent
/// plane at `position`, given by its `normal`.
pub fn rzp_line_density(position: &Point3, normal: &Vec3, params: &RzpParams) -> (f64, f64) {
    let scale = params.design_wavelength * 1e-6 * f64::from(params.order);
    if scale == 0.0 {
        return (0.0, 0.0);
    }

    let n = normal.normalize();
    let tangent_x = (Vec3::x() - n.x * n).normalize();
    let tangent_z = (Vec3::z() - n.z * n).normalize();

    let (ai, _, am, _) = arm_cosines(
        position,
        &tangent_x,
        &tangent_z,
        params.entrance_arm_meridional,
        params.exit_arm_meridional,
        params.design_alpha,
        params.design_beta,
    );
    let dz = (-ai - am) / scale;

    let dx = match params.kind {
        RzpKind::Meridional => 0.0,
        RzpKind::Elliptical => {
            let (entrance, exit) = params.sagittal_arms();
            let (_, bi, _, bm) = arm_cosines(
                position,
                &tangent_x,
                &tangent_z,
                entrance,
                exit,
                params.design_alpha,
                params.design_beta,
            );
            (bi + bm) / scale
        }
    };

    (dx, dz)
}
