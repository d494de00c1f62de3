#![warn(missing_docs)]

//! Math types for the beamray X-ray tracer.
//!
//! Thin wrappers around nalgebra providing the vocabulary shared by the
//! tracing kernel and its backends: points, vectors, Stokes vectors,
//! complex 3x3 matrices for polarization transfer, element placement
//! transforms and tolerances.

use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A real 3x3 matrix.
pub type Mat3 = Matrix3<f64>;

/// A Stokes vector `(S0, S1, S2, S3)`.
pub type Stokes = Vector4<f64>;

/// A double precision complex number.
pub type Complex = nalgebra::Complex<f64>;

/// A complex 3x3 matrix, used for polarization transfer.
pub type CMat3 = Matrix3<Complex>;

/// A 4x4 affine transformation matrix.
///
/// Elements carry two of these: `in_trans` maps world coordinates into the
/// element frame and `out_trans` maps them back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transform {
    /// The underlying 4x4 matrix.
    pub matrix: Matrix4<f64>,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Translation by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 3)] = dx;
        m[(1, 3)] = dy;
        m[(2, 3)] = dz;
        Self { matrix: m }
    }

    /// Rotation about the X axis by `angle` radians.
    pub fn rotation_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Matrix4::identity();
        m[(1, 1)] = c;
        m[(1, 2)] = -s;
        m[(2, 1)] = s;
        m[(2, 2)] = c;
        Self { matrix: m }
    }

    /// Rotation about the Y axis by `angle` radians.
    pub fn rotation_y(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Matrix4::identity();
        m[(0, 0)] = c;
        m[(0, 2)] = s;
        m[(2, 0)] = -s;
        m[(2, 2)] = c;
        Self { matrix: m }
    }

    /// Element-to-world placement from a position and an orientation whose
    /// columns are the element's x, y and z axes expressed in world space.
    pub fn placement(position: &Point3, orientation: &Mat3) -> Self {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(orientation);
        m[(0, 3)] = position.x;
        m[(1, 3)] = position.y;
        m[(2, 3)] = position.z;
        Self { matrix: m }
    }

    /// Compose: `self` then `other` (self * other).
    ///
    /// Applying the result to `p` computes `self(other(p))`.
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        let v = self.matrix * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3::new(v.x, v.y, v.z)
    }

    /// Transform a direction vector (ignores translation).
    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        let r = self.matrix * Vector4::new(v.x, v.y, v.z, 0.0);
        Vec3::new(r.x, r.y, r.z)
    }

    /// Inverse of this transform, if it exists.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }

    /// True if every entry of the matrix is finite.
    pub fn is_finite(&self) -> bool {
        self.matrix.iter().all(|v| v.is_finite())
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Orthonormal basis attached to a propagation direction.
///
/// Returns a matrix whose columns are `(right, up, forward)`. Stokes
/// vectors are referenced to the `right`/`up` pair, so the same direction
/// always yields the same basis.
pub fn ray_basis(forward: &Vec3) -> Mat3 {
    let f = forward.normalize();
    let world_up = Vec3::y();
    let (right, up) = if f.dot(&world_up).abs() < 0.5 {
        let right = world_up.cross(&f).normalize();
        (right, f.cross(&right).normalize())
    } else {
        let up = f.cross(&Vec3::x()).normalize();
        (up.cross(&f).normalize(), up)
    };
    Mat3::from_columns(&[right, up, f])
}

/// Tolerances for geometric comparisons in the tracer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    /// Distances below this (mm) count as zero.
    pub linear: f64,
    /// Angles or sines below this (rad) count as zero.
    pub angular: f64,
}

impl Tolerance {
    /// 1 nm linear, 1 nrad angular.
    pub const DEFAULT: Self = Self {
        linear: 1e-6,
        angular: 1e-9,
    };
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}
