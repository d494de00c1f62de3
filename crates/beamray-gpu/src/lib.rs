//! GPU device management for beamray.
//!
//! This crate owns the process-wide wgpu device and queue and provides the
//! small helpers every compute backend needs:
//! - Device/queue initialization with adapter-sized limits
//! - Blocking buffer readback
//! - Workgroup grid sizing for large 1-D dispatches

#![warn(missing_docs)]

mod context;
mod dispatch;
mod readback;

pub use context::{GpuContext, GpuError};
pub use dispatch::{workgroup_grid, MAX_WORKGROUPS_PER_DIMENSION};
pub use readback::read_buffer;
