//! Ray-plane intersection (closed-form).

use beamray_math::{Point3, Vec3};

use super::SurfaceHit;

/// Intersect a ray with the element plane `y = 0`.
///
/// Returns `None` if the ray is parallel to the plane or the plane lies
/// behind the origin. The normal faces the incoming ray.
pub fn intersect_plane(origin: &Point3, direction: &Vec3) -> Option<SurfaceHit> {
    // Ray is parallel to plane
    if direction.y.abs() < 1e-12 {
        return None;
    }

    let t = -origin.y / direction.y;

    // Intersection is behind ray origin
    if t < 0.0 {
        return None;
    }

    let mut point = origin + t * direction;
    point.y = 0.0;
    let normal = if direction.y > 0.0 { -Vec3::y() } else { Vec3::y() };

    Some(SurfaceHit { t, point, normal })
}
