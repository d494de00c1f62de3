//! Per-ray trace state machine.
//!
//! A ray starts `Uninit`, collects one `JustHitElement` event per interaction
//! and ends with exactly one terminal event. Each ray owns a fixed window of
//! output slots; [`trace_ray`] fills the window from the front and returns
//! how many slots it wrote.

use crate::behaviour::{InteractionContext, Outcome};
use crate::element::Element;
use crate::intersect::find_collision;
use crate::material::MaterialTables;
use crate::ray::{EventType, Ray};
use crate::rng::RayRng;

/// Launch parameters shared by every ray of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelLaunch {
    /// Global id of the first ray in the batch.
    pub first_ray_id: u64,
    /// Bound on events per ray, terminal event included.
    pub max_events: u32,
    /// Events with a smaller index are not written (except the terminal one).
    pub start_event_id: u32,
    /// Seed of the whole trace.
    pub seed: u64,
    /// Run rays one after another, in id order.
    pub sequential: bool,
}

impl KernelLaunch {
    /// Output slots reserved per ray.
    pub fn event_capacity(&self) -> usize {
        self.max_events.saturating_sub(self.start_event_id) as usize
    }
}

struct EventWriter<'a> {
    slots: &'a mut [Ray],
    written: usize,
    start: u32,
}

impl EventWriter<'_> {
    fn record(&mut self, index: u32, event: Ray) {
        if index >= self.start {
            self.push(event);
        }
    }

    // Terminal events are written regardless of `start`.
    fn finish(mut self, event: Ray) -> u32 {
        self.push(event);
        self.written as u32
    }

    fn push(&mut self, event: Ray) {
        if let Some(slot) = self.slots.get_mut(self.written) {
            *slot = event;
            self.written += 1;
        }
    }
}

/// Trace one ray through `elements`, writing its events into `slots`.
///
/// `slots` must hold [`KernelLaunch::event_capacity`] entries. Every slot is
/// reset to `Uninit` first. Returns the number of events written.
pub fn trace_ray(
    ray_id: u64,
    input: &Ray,
    elements: &[Element],
    materials: &MaterialTables,
    launch: &KernelLaunch,
    slots: &mut [Ray],
) -> u32 {
    slots.fill(Ray::default());
    let mut out = EventWriter {
        slots,
        written: 0,
        start: launch.start_event_id,
    };

    let mut ray = *input;
    ray.event_type = EventType::Uninit;
    let mut bounce: u32 = 0;
    let mut leaving: Option<usize> = None;

    loop {
        if !ray.is_finite() {
            return out.finish(ray.with_event(EventType::FatalError));
        }

        let Some(collision) = find_collision(&ray, elements, leaving) else {
            return out.finish(ray.with_event(EventType::FlyOff));
        };

        let element = &elements[collision.element];
        let mut local = element.to_local(&ray);
        local.position = collision.hit.point;
        local.path_length += collision.distance;
        local.last_element = Some(collision.element as u32);

        if bounce + 1 >= launch.max_events {
            return out.finish(local.with_event(EventType::NotEnoughBounces));
        }

        let mut ctx = InteractionContext {
            materials,
            material: element.material,
            to_world: &element.out_trans,
            rng: RayRng::new(launch.seed, ray_id, bounce),
        };

        match element.behaviour.interact(&local, &collision.hit, &mut ctx) {
            Outcome::Continue(next) => {
                out.record(bounce, next.with_event(EventType::JustHitElement));
                ray = element.to_world(&next);
                leaving = Some(collision.element);
                bounce += 1;
            }
            Outcome::Absorbed => {
                return out.finish(local.with_event(EventType::Absorbed));
            }
            Outcome::BeyondHorizon => {
                let world = element.to_world(&local);
                return out.finish(world.with_event(EventType::BeyondHorizon));
            }
            Outcome::FatalError => {
                let world = element.to_world(&local);
                return out.finish(world.with_event(EventType::FatalError));
            }
        }
    }
}
