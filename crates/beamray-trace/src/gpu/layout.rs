//! Device-side record layouts.
//!
//! The WGSL kernels work in `f32`; these structs mirror the shader structs
//! byte for byte. Element parameters are packed into fixed slots whose
//! meaning depends on the kind codes below.

use bytemuck::{Pod, Zeroable};

use beamray_math::{Point3, Stokes, Transform, Vec3};

use crate::behaviour::Behaviour;
use crate::element::{Cutout, Element};
use crate::intersect::Surface;
use crate::material::Material;
use crate::physics::grating::{RzpImageType, RzpKind};
use crate::ray::{EventType, Ray};

/// Surface kind codes.
pub const SURFACE_PLANE: u32 = 0;
/// See [`SURFACE_PLANE`].
pub const SURFACE_QUADRIC: u32 = 1;

/// Cutout kind codes.
pub const CUTOUT_UNLIMITED: u32 = 0;
/// See [`CUTOUT_UNLIMITED`].
pub const CUTOUT_RECT: u32 = 1;
/// See [`CUTOUT_UNLIMITED`].
pub const CUTOUT_ELLIPTICAL: u32 = 2;

/// Behaviour kind codes.
pub const BEHAVIOUR_MIRROR: u32 = 0;
/// See [`BEHAVIOUR_MIRROR`].
pub const BEHAVIOUR_PLANE_GRATING: u32 = 1;
/// See [`BEHAVIOUR_MIRROR`].
pub const BEHAVIOUR_SPHERE_GRATING: u32 = 2;
/// See [`BEHAVIOUR_MIRROR`].
pub const BEHAVIOUR_SLIT: u32 = 3;
/// See [`BEHAVIOUR_MIRROR`].
pub const BEHAVIOUR_RZP: u32 = 4;
/// See [`BEHAVIOUR_MIRROR`].
pub const BEHAVIOUR_IMAGE_PLANE: u32 = 5;

/// A ray as the shaders see it (64 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuRay {
    /// Position.
    pub position: [f32; 3],
    /// [`EventType`] code.
    pub event_type: u32,
    /// Direction.
    pub direction: [f32; 3],
    /// Energy in eV.
    pub energy: f32,
    /// Stokes vector.
    pub stokes: [f32; 4],
    /// Optical path length.
    pub path_length: f32,
    /// Diffraction order.
    pub order: i32,
    /// Last element index, `-1` for none.
    pub last_element: i32,
    /// Padding to 16-byte alignment.
    pub _pad: u32,
}

impl GpuRay {
    /// Narrow a ray to device precision.
    pub fn from_ray(ray: &Ray) -> Self {
        Self {
            position: [ray.position.x as f32, ray.position.y as f32, ray.position.z as f32],
            event_type: ray.event_type.code(),
            direction: [ray.direction.x as f32, ray.direction.y as f32, ray.direction.z as f32],
            energy: ray.energy as f32,
            stokes: [
                ray.stokes[0] as f32,
                ray.stokes[1] as f32,
                ray.stokes[2] as f32,
                ray.stokes[3] as f32,
            ],
            path_length: ray.path_length as f32,
            order: ray.order,
            last_element: ray.last_element.map_or(-1, |e| e as i32),
            _pad: 0,
        }
    }

    /// Widen back to a host ray. Unknown event codes become `FatalError`.
    pub fn to_ray(&self) -> Ray {
        let [px, py, pz] = self.position.map(f64::from);
        let [dx, dy, dz] = self.direction.map(f64::from);
        let [s0, s1, s2, s3] = self.stokes.map(f64::from);
        Ray {
            position: Point3::new(px, py, pz),
            event_type: EventType::from_code(self.event_type).unwrap_or(EventType::FatalError),
            direction: Vec3::new(dx, dy, dz),
            energy: f64::from(self.energy),
            stokes: Stokes::new(s0, s1, s2, s3),
            path_length: f64::from(self.path_length),
            order: self.order,
            last_element: u32::try_from(self.last_element).ok(),
        }
    }
}

/// An element as the shaders see it (272 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuElement {
    /// World to element, column-major.
    pub in_trans: [[f32; 4]; 4],
    /// Element to world, column-major.
    pub out_trans: [[f32; 4]; 4],
    /// Surface kind code.
    pub surface_kind: u32,
    /// Cutout kind code.
    pub cutout_kind: u32,
    /// Behaviour kind code.
    pub behaviour_kind: u32,
    /// Material table index, `-1` for a perfect reflector.
    pub material: i32,
    /// Surface parameters.
    pub surface: [f32; 12],
    /// Cutout parameters.
    pub cutout: [f32; 4],
    /// Behaviour parameters.
    pub behaviour: [f32; 16],
}

fn columns(transform: &Transform) -> [[f32; 4]; 4] {
    let mut out = [[0.0f32; 4]; 4];
    for (c, column) in out.iter_mut().enumerate() {
        for (r, value) in column.iter_mut().enumerate() {
            *value = transform.matrix[(r, c)] as f32;
        }
    }
    out
}

fn cutout_params(cutout: &Cutout) -> (u32, [f32; 2]) {
    match *cutout {
        Cutout::Unlimited => (CUTOUT_UNLIMITED, [0.0, 0.0]),
        Cutout::Rect { width, length } => (CUTOUT_RECT, [width as f32, length as f32]),
        Cutout::Elliptical {
            diameter_x,
            diameter_z,
        } => (CUTOUT_ELLIPTICAL, [diameter_x as f32, diameter_z as f32]),
    }
}

impl GpuElement {
    /// Pack an element.
    pub fn from_element(element: &Element) -> Self {
        let mut surface = [0.0f32; 12];
        let surface_kind = match &element.surface {
            Surface::Plane => SURFACE_PLANE,
            Surface::Quadric(q) => {
                let values = [
                    f64::from(q.icurv),
                    q.a11,
                    q.a12,
                    q.a13,
                    q.a14,
                    q.a22,
                    q.a23,
                    q.a24,
                    q.a33,
                    q.a34,
                    q.a44,
                ];
                for (slot, v) in surface.iter_mut().zip(values) {
                    *slot = v as f32;
                }
                SURFACE_QUADRIC
            }
        };

        let (cutout_kind, extent) = cutout_params(&element.cutout);
        let cutout = [extent[0], extent[1], 0.0, 0.0];

        let mut p = [0.0f32; 16];
        let behaviour_kind = match &element.behaviour {
            Behaviour::Mirror => BEHAVIOUR_MIRROR,
            Behaviour::PlaneGrating(g) | Behaviour::SphereGrating(g) => {
                p[0] = g.line_density as f32;
                p[1] = g.order as f32;
                for (slot, v) in p[2..8].iter_mut().zip(g.vls) {
                    *slot = v as f32;
                }
                p[8] = if g.additional_zero_order { 1.0 } else { 0.0 };
                if matches!(element.behaviour, Behaviour::PlaneGrating(_)) {
                    BEHAVIOUR_PLANE_GRATING
                } else {
                    BEHAVIOUR_SPHERE_GRATING
                }
            }
            Behaviour::Slit(slit) => {
                let (kind, extent) = cutout_params(&slit.opening);
                p[0] = kind as f32;
                p[1] = extent[0];
                p[2] = extent[1];
                match &slit.beamstop {
                    Some(stop) => {
                        let (kind, extent) = cutout_params(stop);
                        p[3] = kind as f32;
                        p[4] = extent[0];
                        p[5] = extent[1];
                    }
                    None => p[3] = -1.0,
                }
                BEHAVIOUR_SLIT
            }
            Behaviour::ReflectionZonePlate(rzp) => {
                p[0] = match rzp.image_type {
                    RzpImageType::PointToPoint => 0.0,
                    RzpImageType::Astigmatic => 1.0,
                };
                p[1] = match rzp.kind {
                    RzpKind::Elliptical => 0.0,
                    RzpKind::Meridional => 1.0,
                };
                p[2] = rzp.design_wavelength as f32;
                p[3] = rzp.order as f32;
                p[4] = rzp.entrance_arm_meridional as f32;
                p[5] = rzp.exit_arm_meridional as f32;
                p[6] = rzp.entrance_arm_sagittal as f32;
                p[7] = rzp.exit_arm_sagittal as f32;
                p[8] = rzp.design_alpha as f32;
                p[9] = rzp.design_beta as f32;
                p[10] = if rzp.additional_zero_order { 1.0 } else { 0.0 };
                BEHAVIOUR_RZP
            }
            Behaviour::ImagePlane => BEHAVIOUR_IMAGE_PLANE,
        };

        Self {
            in_trans: columns(&element.in_trans),
            out_trans: columns(&element.out_trans),
            surface_kind,
            cutout_kind,
            behaviour_kind,
            material: match element.material {
                Material::Perfect => -1,
                Material::Table(id) => id as i32,
            },
            surface,
            cutout,
            behaviour: p,
        }
    }
}

/// Uniform block of the trace kernel (48 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct KernelParams {
    /// Rays in the batch.
    pub ray_count: u32,
    /// Elements in the beamline.
    pub element_count: u32,
    /// Bound on events per ray.
    pub max_events: u32,
    /// First event index written.
    pub start_event_id: u32,
    /// Low word of the seed.
    pub seed_lo: u32,
    /// High word of the seed.
    pub seed_hi: u32,
    /// Low word of the first ray id.
    pub first_id_lo: u32,
    /// High word of the first ray id.
    pub first_id_hi: u32,
    /// Materials in the tables.
    pub material_count: u32,
    /// Invocations per dispatch row.
    pub grid_width: u32,
    /// Event slots per ray.
    pub capacity: u32,
    /// Padding to 16-byte alignment.
    pub _pad: u32,
}

/// Uniform block of the scan and gather kernels (16 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CompactParams {
    /// Items in this pass.
    pub count: u32,
    /// Invocations per dispatch row.
    pub grid_width: u32,
    /// Event slots per ray (gather only).
    pub capacity: u32,
    /// Padding.
    pub _pad: u32,
}
