//! What happens to a ray when it hits an element.
//!
//! Every element carries one [`Behaviour`]. [`Behaviour::interact`] takes the
//! ray in element coordinates, positioned at the hit point, and either hands
//! back the outgoing ray or reports why the ray ends here.

use beamray_math::{Complex, Transform, Vec3};
use serde::{Deserialize, Serialize};

use crate::element::Cutout;
use crate::intersect::SurfaceHit;
use crate::material::{Material, MaterialTables};
use crate::physics::diffraction::{deflect, sample_airy_angles, sample_sinc_angle};
use crate::physics::fresnel::{polarization_matrix, reflect_amplitude, transfer_stokes};
use crate::physics::grating::{grating_az, refrac_2d, rzp_line_density, vls_line_density, RzpParams};
use crate::physics::hvlam;
use crate::ray::Ray;
use crate::rng::RayRng;

/// Parameters shared by plane and spherical gratings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GratingParams {
    /// Central line density in lines/mm.
    pub line_density: f64,
    /// Diffraction order.
    pub order: i32,
    /// Variable-line-spacing coefficients `b2..b7`.
    #[serde(default)]
    pub vls: [f64; 6],
    /// Send half of the rays into order zero.
    #[serde(default)]
    pub additional_zero_order: bool,
}

/// Order a ray is diffracted into, drawing from `rng` only when an additional
/// zero order is configured.
fn effective_order(order: i32, additional_zero_order: bool, rng: &mut RayRng) -> i32 {
    if additional_zero_order && rng.next_f64() < 0.5 {
        0
    } else {
        order
    }
}

/// Aperture of a slit element.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SlitParams {
    /// Opening rays pass through.
    pub opening: Cutout,
    /// Optional central stop inside the opening.
    #[serde(default)]
    pub beamstop: Option<Cutout>,
}

/// Physical response of an element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Behaviour {
    /// Specular reflection.
    Mirror,
    /// Reflection grating on a flat substrate.
    PlaneGrating(GratingParams),
    /// Reflection grating on a curved substrate.
    SphereGrating(GratingParams),
    /// Aperture with Fraunhofer diffraction.
    Slit(SlitParams),
    /// Reflection zone plate.
    ReflectionZonePlate(RzpParams),
    /// Detector screen; rays are recorded and pass through.
    ImagePlane,
}

/// Result of one interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// The ray leaves the element, in element coordinates.
    Continue(Ray),
    /// The ray was stopped by the element.
    Absorbed,
    /// No propagating diffracted ray exists.
    BeyondHorizon,
    /// Invalid input or non-finite result.
    FatalError,
}

/// Scene data an interaction may consult.
pub struct InteractionContext<'a> {
    /// Refractive-index tables.
    pub materials: &'a MaterialTables,
    /// Material of the hit element.
    pub material: Material,
    /// Placement of the hit element, for world-frame polarization.
    pub to_world: &'a Transform,
    /// Random stream for this interaction.
    pub rng: RayRng,
}

impl Behaviour {
    /// Interact with a ray given in element coordinates at `hit`.
    pub fn interact(&self, ray: &Ray, hit: &SurfaceHit, ctx: &mut InteractionContext<'_>) -> Outcome {
        let incident = ray.direction;
        let normal = hit.normal;

        let (direction, order) = match self {
            Behaviour::Mirror => (reflect(&incident, &normal), ray.order),
            Behaviour::PlaneGrating(params) | Behaviour::SphereGrating(params) => {
                let order = effective_order(params.order, params.additional_zero_order, &mut ctx.rng);
                let line_density = vls_line_density(params.line_density, hit.point.z, &params.vls);
                let az = grating_az(hvlam(ray.energy), line_density, order);
                match refrac_2d(&incident, &normal, az, 0.0) {
                    Some(direction) => (direction, order),
                    None => return Outcome::BeyondHorizon,
                }
            }
            Behaviour::ReflectionZonePlate(params) => {
                let order = effective_order(params.order, params.additional_zero_order, &mut ctx.rng);
                let (dx, dz) = rzp_line_density(&hit.point, &normal, params);
                let scale = hvlam(ray.energy) * f64::from(order) * 1e-6;
                match refrac_2d(&incident, &normal, dz * scale, dx * scale) {
                    Some(direction) => (direction, order),
                    None => return Outcome::BeyondHorizon,
                }
            }
            Behaviour::Slit(params) => {
                let (x, z) = (hit.point.x, hit.point.z);
                let blocked = params.beamstop.is_some_and(|stop| stop.contains(x, z));
                if !params.opening.contains(x, z) || blocked {
                    return Outcome::Absorbed;
                }
                let direction = diffract(&incident, &params.opening, hvlam(ray.energy), &mut ctx.rng);
                return finish(Ray {
                    position: hit.point,
                    direction,
                    ..*ray
                });
            }
            Behaviour::ImagePlane => {
                return finish(Ray {
                    position: hit.point,
                    ..*ray
                });
            }
        };

        let stokes = match ctx.material {
            Material::Perfect => ray.stokes,
            Material::Table(id) => {
                let Some(index) = ctx.materials.refractive_index(id, ray.energy) else {
                    return Outcome::FatalError;
                };
                let incidence = (-incident.dot(&normal)).clamp(-1.0, 1.0).acos();
                let amplitudes = reflect_amplitude(incidence, Complex::new(1.0, 0.0), index);

                let w_in = ctx.to_world.apply_vec(&incident).normalize();
                let w_out = ctx.to_world.apply_vec(&direction).normalize();
                let w_normal = ctx.to_world.apply_vec(&normal).normalize();
                let matrix = polarization_matrix(&w_in, &w_out, &w_normal, &amplitudes);
                transfer_stokes(&w_in, &w_out, &matrix, &ray.stokes)
            }
        };

        finish(Ray {
            position: hit.point,
            direction,
            stokes,
            order,
            ..*ray
        })
    }
}

fn finish(ray: Ray) -> Outcome {
    if ray.is_finite() {
        Outcome::Continue(ray)
    } else {
        Outcome::FatalError
    }
}

/// Specular reflection of `direction` about `normal`.
pub fn reflect(direction: &Vec3, normal: &Vec3) -> Vec3 {
    direction - 2.0 * direction.dot(normal) * normal
}

fn diffract(direction: &Vec3, opening: &Cutout, wavelength: f64, rng: &mut RayRng) -> Vec3 {
    let (dphi, dpsi) = match *opening {
        Cutout::Unlimited => return *direction,
        Cutout::Rect { width, length } => {
            let dphi = sample_sinc_angle(width, wavelength, rng);
            let dpsi = sample_sinc_angle(length, wavelength, rng);
            (dphi, dpsi)
        }
        Cutout::Elliptical {
            diameter_x,
            diameter_z,
        } => sample_airy_angles(diameter_x, diameter_z, wavelength, rng),
    };
    deflect(direction, dphi, dpsi)
}
