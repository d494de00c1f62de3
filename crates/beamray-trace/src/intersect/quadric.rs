//! Ray-quadric intersection.

use beamray_math::{Point3, Vec3};
use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};

use super::SurfaceHit;

/// General second-order surface in element coordinates:
///
/// `a11 x² + a22 y² + a33 z² + 2 a12 xy + 2 a13 xz + 2 a23 yz
///  + 2 a14 x + 2 a24 y + 2 a34 z + a44 = 0`
///
/// `icurv` selects which of the two roots along a ray counts as the surface:
/// `+1` the far root, `-1` the near root.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadric {
    /// Root selector, `+1` or `-1`.
    pub icurv: i32,
    #[allow(missing_docs)]
    pub a11: f64,
    #[allow(missing_docs)]
    pub a12: f64,
    #[allow(missing_docs)]
    pub a13: f64,
    #[allow(missing_docs)]
    pub a14: f64,
    #[allow(missing_docs)]
    pub a22: f64,
    #[allow(missing_docs)]
    pub a23: f64,
    #[allow(missing_docs)]
    pub a24: f64,
    #[allow(missing_docs)]
    pub a33: f64,
    #[allow(missing_docs)]
    pub a34: f64,
    #[allow(missing_docs)]
    pub a44: f64,
}

impl Quadric {
    /// Sphere of `radius` tangent to the `y = 0` plane at the origin,
    /// curving towards `+y` (a concave mirror seen from above).
    pub fn sphere(radius: f64) -> Self {
        Self {
            icurv: 1,
            a11: 1.0,
            a12: 0.0,
            a13: 0.0,
            a14: 0.0,
            a22: 1.0,
            a23: 0.0,
            a24: -radius,
            a33: 1.0,
            a34: 0.0,
            a44: 0.0,
        }
    }

    /// Symmetric 4x4 coefficient matrix in homogeneous coordinates.
    pub fn matrix(&self) -> Matrix4<f64> {
        Matrix4::new(
            self.a11, self.a12, self.a13, self.a14, //
            self.a12, self.a22, self.a23, self.a24, //
            self.a13, self.a23, self.a33, self.a34, //
            self.a14, self.a24, self.a34, self.a44,
        )
    }

    /// Value of the implicit function at `p`.
    pub fn eval(&self, p: &Point3) -> f64 {
        let h = Vector4::new(p.x, p.y, p.z, 1.0);
        h.dot(&(self.matrix() * h))
    }
}

/// Intersect a ray with a quadric surface.
///
/// The normal is the normalized gradient, oriented against the ray.
pub fn intersect_quadric(origin: &Point3, direction: &Vec3, quadric: &Quadric) -> Option<SurfaceHit> {
    let m = quadric.matrix();
    let o = Vector4::new(origin.x, origin.y, origin.z, 1.0);
    let d = Vector4::new(direction.x, direction.y, direction.z, 0.0);
    let md = m * d;

    let a = d.dot(&md);
    let b = 2.0 * o.dot(&md);
    let c = o.dot(&(m * o));

    let t = if a.abs() < 1e-12 {
        // Degenerate to a linear equation along this ray.
        if b.abs() < 1e-12 {
            return None;
        }
        -c / b
    } else {
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return None;
        }
        (-b + f64::from(quadric.icurv.signum()) * disc.sqrt()) / (2.0 * a)
    };

    if t < 0.0 || !t.is_finite() {
        return None;
    }

    let point = origin + t * direction;
    let g = m * Vector4::new(point.x, point.y, point.z, 1.0);
    let gradient = Vec3::new(g.x, g.y, g.z);
    let length = gradient.norm();
    if length == 0.0 {
        return None;
    }
    let mut normal = gradient / length;
    if normal.dot(direction) > 0.0 {
        normal = -normal;
    }

    Some(SurfaceHit { t, point, normal })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_hit_near_vertex() {
        let sphere = Quadric::sphere(1000.0);
        let origin = Point3::new(0.0, 10.0, -100.0);
        let direction = Vec3::new(0.0, -0.1, 1.0).normalize();
        let hit = intersect_quadric(&origin, &direction, &sphere).unwrap();

        assert!(hit.t > 0.0);
        assert!(sphere.eval(&hit.point).abs() < 1e-6);
        assert!(hit.point.y > -1e-9 && hit.point.y < 0.1);
        assert!(hit.normal.y > 0.99);
        assert!(hit.normal.dot(&direction) < 0.0);
    }

    #[test]
    fn test_sphere_normal_at_vertex() {
        let sphere = Quadric::sphere(50.0);
        let hit = intersect_quadric(&Point3::new(0.0, 5.0, 0.0), &Vec3::new(0.0, -1.0, 0.0), &sphere)
            .unwrap();
        assert!((hit.t - 5.0).abs() < 1e-10);
        assert!((hit.normal - Vec3::y()).norm() < 1e-12);
    }

    #[test]
    fn test_near_root_selector() {
        let mut sphere = Quadric::sphere(50.0);
        sphere.icurv = -1;
        // from below the vertex, moving up: enters at y = 0
        let hit = intersect_quadric(&Point3::new(0.0, -5.0, 0.0), &Vec3::new(0.0, 1.0, 0.0), &sphere)
            .unwrap();
        assert!((hit.t - 5.0).abs() < 1e-10);
        assert!((hit.normal + Vec3::y()).norm() < 1e-12);
    }

    #[test]
    fn test_miss() {
        let sphere = Quadric::sphere(1.0);
        let hit = intersect_quadric(&Point3::new(5.0, 1.0, 0.0), &Vec3::new(0.0, 0.0, 1.0), &sphere);
        assert!(hit.is_none());
    }

    #[test]
    fn test_plane_as_degenerate_quadric() {
        let plane = Quadric {
            icurv: 1,
            a11: 0.0,
            a12: 0.0,
            a13: 0.0,
            a14: 0.0,
            a22: 0.0,
            a23: 0.0,
            a24: 0.5,
            a33: 0.0,
            a34: 0.0,
            a44: 0.0,
        };
        let hit = intersect_quadric(&Point3::new(1.0, 4.0, 2.0), &Vec3::new(0.0, -1.0, 0.0), &plane)
            .unwrap();
        assert!((hit.t - 4.0).abs() < 1e-12);
        assert!((hit.normal - Vec3::y()).norm() < 1e-12);
    }
}
