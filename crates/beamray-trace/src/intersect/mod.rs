//! Ray-surface intersection and collision search.
//!
//! Surfaces are defined in element coordinates, where planar elements lie
//! in `y = 0`. The collision search transforms the world-space ray into each
//! element's frame, intersects, applies the element's cutout and keeps the
//! nearest hit in world distance.

mod plane;
mod quadric;

pub use plane::intersect_plane;
pub use quadric::{intersect_quadric, Quadric};

use beamray_math::{Point3, Vec3};
use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::ray::Ray;

/// Geometric surface of an element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Surface {
    /// The plane `y = 0`.
    Plane,
    /// A second-order surface.
    Quadric(Quadric),
}

impl Surface {
    /// Intersect a ray given in element coordinates.
    pub fn intersect(&self, origin: &Point3, direction: &Vec3) -> Option<SurfaceHit> {
        match self {
            Surface::Plane => intersect_plane(origin, direction),
            Surface::Quadric(q) => intersect_quadric(origin, direction, q),
        }
    }
}

/// Result of a ray-surface intersection in element coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    /// Parameter along the (element-space) ray.
    pub t: f64,
    /// Intersection point.
    pub point: Point3,
    /// Unit surface normal facing the incoming ray.
    pub normal: Vec3,
}

/// Nearest element hit by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    /// Index of the element in the beamline.
    pub element: usize,
    /// Hit in the element's coordinates.
    pub hit: SurfaceHit,
    /// World-space distance from the ray origin to the hit.
    pub distance: f64,
}

/// Find the nearest element hit by a world-space ray.
///
/// `exclude` is the element the ray is leaving; it is skipped so that a ray
/// starting on a surface does not collide with that surface again.
pub fn find_collision(ray: &Ray, elements: &[Element], exclude: Option<usize>) -> Option<Collision> {
    let mut nearest: Option<Collision> = None;

    for (index, element) in elements.iter().enumerate() {
        if exclude == Some(index) {
            continue;
        }

        let origin = element.in_trans.apply_point(&ray.position);
        let direction = element.in_trans.apply_vec(&ray.direction);
        let Some(hit) = element.surface.intersect(&origin, &direction) else {
            continue;
        };
        if !element.cutout.contains(hit.point.x, hit.point.z) {
            continue;
        }

        let distance = (element.out_trans.apply_point(&hit.point) - ray.position).norm();
        if nearest.map_or(true, |n| distance < n.distance) {
            nearest = Some(Collision {
                element: index,
                hit,
                distance,
            });
        }
    }

    nearest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::Behaviour;
    use crate::element::Cutout;
    use beamray_math::{Stokes, Transform};

    fn screen_at(z: f64) -> Element {
        // local y axis along world z
        let placement = Transform::translation(0.0, 0.0, z)
            .then(&Transform::rotation_x(std::f64::consts::FRAC_PI_2));
        Element::new(placement, Surface::Plane, Behaviour::ImagePlane).unwrap()
    }

    fn ray_along_z() -> Ray {
        Ray::new(Point3::origin(), Vec3::z(), 100.0, Stokes::new(1.0, 0.0, 0.0, 0.0))
    }

    #[test]
    fn test_nearest_element_wins() {
        let elements = vec![screen_at(30.0), screen_at(10.0), screen_at(20.0)];
        let collision = find_collision(&ray_along_z(), &elements, None).unwrap();
        assert_eq!(collision.element, 1);
        assert!((collision.distance - 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_excluded_element_is_skipped() {
        let elements = vec![screen_at(10.0), screen_at(20.0)];
        let collision = find_collision(&ray_along_z(), &elements, Some(0)).unwrap();
        assert_eq!(collision.element, 1);
    }

    #[test]
    fn test_cutout_limits_collisions() {
        let mut narrow = screen_at(10.0);
        narrow.cutout = Cutout::Rect {
            width: 2.0,
            length: 2.0,
        };
        let elements = vec![narrow, screen_at(20.0)];

        let mut off_axis = ray_along_z();
        off_axis.position = Point3::new(5.0, 0.0, 0.0);
        let collision = find_collision(&off_axis, &elements, None).unwrap();
        assert_eq!(collision.element, 1);

        let collision = find_collision(&ray_along_z(), &elements, None).unwrap();
        assert_eq!(collision.element, 0);
    }

    #[test]
    fn test_no_collision_behind() {
        let elements = vec![screen_at(-10.0)];
        assert!(find_collision(&ray_along_z(), &elements, None).is_none());
    }

    #[test]
    fn test_hit_at_origin_counts_for_fresh_rays() {
        let elements = vec![screen_at(0.0)];
        let collision = find_collision(&ray_along_z(), &elements, None).unwrap();
        assert_eq!(collision.distance, 0.0);
    }
}
