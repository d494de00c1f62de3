//! Optical elements and beamlines.

use beamray_math::Transform;
use serde::{Deserialize, Serialize};

use crate::behaviour::Behaviour;
use crate::intersect::Surface;
use crate::material::Material;
use crate::ray::Ray;

/// Aperture of an element in its local x/z coordinates, centred on the origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cutout {
    /// No limit.
    #[default]
    Unlimited,
    /// Rectangle `width` along x and `length` along z.
    Rect {
        /// Extent along x.
        width: f64,
        /// Extent along z.
        length: f64,
    },
    /// Ellipse with the given diameters.
    Elliptical {
        /// Diameter along x.
        diameter_x: f64,
        /// Diameter along z.
        diameter_z: f64,
    },
}

impl Cutout {
    /// True if the local point `(x, z)` lies inside (boundary included).
    pub fn contains(&self, x: f64, z: f64) -> bool {
        match *self {
            Cutout::Unlimited => true,
            Cutout::Rect { width, length } => x.abs() <= width / 2.0 && z.abs() <= length / 2.0,
            Cutout::Elliptical {
                diameter_x,
                diameter_z,
            } => {
                let (rx, rz) = (diameter_x / 2.0, diameter_z / 2.0);
                if rx <= 0.0 || rz <= 0.0 {
                    return false;
                }
                (x / rx).powi(2) + (z / rz).powi(2) <= 1.0
            }
        }
    }
}

/// One optical element placed in the beamline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// World to element coordinates.
    pub in_trans: Transform,
    /// Element to world coordinates.
    pub out_trans: Transform,
    /// Geometric surface.
    pub surface: Surface,
    /// Aperture limiting where the surface exists.
    #[serde(default)]
    pub cutout: Cutout,
    /// What happens to a ray that hits the element.
    pub behaviour: Behaviour,
    /// Surface material.
    #[serde(default)]
    pub material: Material,
}

impl Element {
    /// Create an element from its element-to-world placement.
    ///
    /// Returns `None` if the placement cannot be inverted.
    pub fn new(placement: Transform, surface: Surface, behaviour: Behaviour) -> Option<Self> {
        let in_trans = placement.inverse()?;
        Some(Self {
            in_trans,
            out_trans: placement,
            surface,
            cutout: Cutout::Unlimited,
            behaviour,
            material: Material::Perfect,
        })
    }

    /// Replace the cutout.
    pub fn with_cutout(mut self, cutout: Cutout) -> Self {
        self.cutout = cutout;
        self
    }

    /// Replace the material.
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    /// Express a world-space ray in element coordinates.
    pub fn to_local(&self, ray: &Ray) -> Ray {
        Ray {
            position: self.in_trans.apply_point(&ray.position),
            direction: self.in_trans.apply_vec(&ray.direction),
            ..*ray
        }
    }

    /// Express an element-space ray in world coordinates.
    pub fn to_world(&self, ray: &Ray) -> Ray {
        Ray {
            position: self.out_trans.apply_point(&ray.position),
            direction: self.out_trans.apply_vec(&ray.direction),
            ..*ray
        }
    }
}

/// Ordered list of optical elements.
///
/// Element order only fixes the indices reported in `last_element`; rays hit
/// whichever element is nearest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Beamline {
    /// The elements.
    pub elements: Vec<Element>,
}

impl Beamline {
    /// Empty beamline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element.
    pub fn push(&mut self, element: Element) {
        self.elements.push(element);
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl FromIterator<Element> for Beamline {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}
