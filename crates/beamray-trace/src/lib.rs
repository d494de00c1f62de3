#![warn(missing_docs)]

//! Batched X-ray ray tracing through beamline optics.
//!
//! Rays are traced independently through an ordered list of optical
//! elements. Every ray produces a bounded history of events that ends in
//! exactly one terminal event; histories are gathered batch by batch into a
//! dense [`BundleHistory`] in ray order.
//!
//! # Architecture
//!
//! - [`Ray`], [`EventType`] - ray snapshots and what happened to them
//! - [`Element`], [`Beamline`] - placed surfaces with a [`Behaviour`]
//! - [`intersect`] - ray-surface intersection and nearest-element search
//! - [`physics`] - Fresnel coefficients, grating equations, slit diffraction
//! - [`kernel`] - the per-ray state machine
//! - [`compact`] - prefix sum and gather over sparse event windows
//! - [`backend`] - CPU and (with the `gpu` feature) wgpu backends
//! - [`Tracer`] - batch scheduling on a backend
//!
//! # Example
//!
//! ```ignore
//! use beamray_trace::{trace, Beamline, Behaviour, Element, MaterialTables, Ray, Surface, TraceConfig};
//!
//! let mirror = Element::new(placement, Surface::Plane, Behaviour::Mirror).unwrap();
//! let beamline: Beamline = [mirror].into_iter().collect();
//! let config = TraceConfig::for_beamline(&beamline);
//!
//! let history = trace(&beamline, &rays, &MaterialTables::default(), &config)?;
//! ```

pub mod backend;
mod behaviour;
pub mod buffers;
pub mod compact;
mod config;
mod element;
mod error;
pub mod intersect;
pub mod kernel;
mod material;
pub mod physics;
mod ray;
pub mod record;
mod rng;
mod scheduler;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use backend::{create_backend, BackendKind, BatchOutput, CpuBackend, ExecutionBackend};
pub use behaviour::{reflect, Behaviour, GratingParams, InteractionContext, Outcome, SlitParams};
pub use buffers::{BufferId, DeviceBuffer, HostBuffer};
pub use config::{ConfigError, TraceConfig};
pub use element::{Beamline, Cutout, Element};
pub use error::{DeviceError, TraceError};
pub use intersect::{Quadric, Surface};
pub use material::{Material, MaterialError, MaterialTables};
pub use physics::grating::{RzpImageType, RzpKind, RzpParams};
pub use ray::{event_count, last_events, BundleHistory, Event, EventType, Ray, RayHistory};
pub use record::{EventRecord, RecordError, RECORD_COLUMNS, RECORD_WIDTH};
pub use rng::RayRng;
pub use scheduler::{trace, Tracer};
