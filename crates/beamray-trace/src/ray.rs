//! Photon rays, event types and trace histories.

use beamray_math::{Point3, Stokes, Vec3};
use serde::{Deserialize, Serialize};

/// Classification of a recorded event.
///
/// The numeric codes are stable and appear in exported records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum EventType {
    /// The ray left the beamline without hitting anything further.
    FlyOff = 0,
    /// The ray interacted with an element and continues.
    JustHitElement = 1,
    /// The event budget ran out before the ray finished.
    NotEnoughBounces = 2,
    /// The ray was absorbed, for example by a slit blade.
    Absorbed = 3,
    /// Slot never written by the kernel.
    #[default]
    Uninit = 4,
    /// The diffraction equation has no real solution.
    BeyondHorizon = 5,
    /// The computation produced non-finite values or hit invalid input.
    FatalError = 6,
}

impl EventType {
    /// Numeric code of this event type.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Event type for a numeric code, if it is known.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::FlyOff),
            1 => Some(Self::JustHitElement),
            2 => Some(Self::NotEnoughBounces),
            3 => Some(Self::Absorbed),
            4 => Some(Self::Uninit),
            5 => Some(Self::BeyondHorizon),
            6 => Some(Self::FatalError),
            _ => None,
        }
    }

    /// True for event types that end a ray's history.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::JustHitElement | Self::Uninit)
    }
}

/// A photon ray.
///
/// Positions and directions are in world coordinates for rays in flight and
/// in element coordinates for recorded element events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ray {
    /// Current position.
    pub position: Point3,
    /// Classification of the last event.
    pub event_type: EventType,
    /// Propagation direction (unit length).
    pub direction: Vec3,
    /// Photon energy in eV.
    pub energy: f64,
    /// Polarization state.
    pub stokes: Stokes,
    /// Accumulated optical path length.
    pub path_length: f64,
    /// Diffraction order of the last grating interaction.
    pub order: i32,
    /// Index of the last element hit, if any.
    pub last_element: Option<u32>,
}

impl Ray {
    /// Create a ray that has not been traced yet.
    pub fn new(position: Point3, direction: Vec3, energy: f64, stokes: Stokes) -> Self {
        Self {
            position,
            direction,
            energy,
            stokes,
            ..Self::default()
        }
    }

    /// Copy of this ray tagged with `event_type`.
    pub fn with_event(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    /// True if every numeric field is finite.
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.direction.iter().all(|v| v.is_finite())
            && self.stokes.iter().all(|v| v.is_finite())
            && self.energy.is_finite()
            && self.path_length.is_finite()
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self {
            position: Point3::origin(),
            event_type: EventType::Uninit,
            direction: Vec3::z(),
            energy: 0.0,
            stokes: Stokes::new(1.0, 0.0, 0.0, 0.0),
            path_length: 0.0,
            order: 0,
            last_element: None,
        }
    }
}

/// A recorded snapshot of a ray.
pub type Event = Ray;

/// Chronological events of one ray.
pub type RayHistory = Vec<Event>;

/// One history per input ray, in input order.
pub type BundleHistory = Vec<RayHistory>;

/// Last event of every ray that recorded at least one.
pub fn last_events(history: &BundleHistory) -> Vec<Event> {
    history.iter().filter_map(|h| h.last().copied()).collect()
}

/// Total number of events across all rays.
pub fn event_count(history: &BundleHistory) -> usize {
    history.iter().map(Vec::len).sum()
}
