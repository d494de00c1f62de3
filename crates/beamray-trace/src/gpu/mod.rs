//! GPU backend using wgpu compute shaders.
//!
//! The trace kernel mirrors [`crate::kernel::trace_ray`] in `f32`, including
//! the per-ray random streams, so the CPU and GPU backends trace the same
//! bundle to the same event sequence up to single precision.

mod buffers;
mod layout;
mod pipeline;
pub mod shaders;

pub use buffers::GpuBuffer;
pub use layout::{
    CompactParams, GpuElement, GpuRay, KernelParams, BEHAVIOUR_IMAGE_PLANE, BEHAVIOUR_MIRROR,
    BEHAVIOUR_PLANE_GRATING, BEHAVIOUR_RZP, BEHAVIOUR_SLIT, BEHAVIOUR_SPHERE_GRATING, CUTOUT_ELLIPTICAL,
    CUTOUT_RECT, CUTOUT_UNLIMITED, SURFACE_PLANE, SURFACE_QUADRIC,
};
pub use pipeline::GpuBackend;
