//! Error types for tracing.

use thiserror::Error;

use crate::buffers::BufferId;
use crate::config::ConfigError;
use crate::material::MaterialError;

/// Failures of the execution backend. These abort the whole trace.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A buffer could not be grown.
    #[error("failed to allocate {bytes} bytes for {buffer:?}")]
    Allocation {
        /// Buffer being grown.
        buffer: BufferId,
        /// Requested size in bytes.
        bytes: u64,
    },

    /// A transfer addressed elements past the end of a buffer.
    #[error("{buffer:?}: access to {count} elements exceeds capacity {capacity}")]
    OutOfBounds {
        /// Buffer accessed.
        buffer: BufferId,
        /// Elements requested.
        count: usize,
        /// Current capacity.
        capacity: usize,
    },

    /// The compacted event count does not fit the output index type.
    #[error("batch produced {0} events, more than a batch can address")]
    EventOverflow(u64),

    /// A kernel could not be launched.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// Results could not be copied back to the host.
    #[error("readback failed")]
    Readback,

    /// The requested backend is not available in this build or on this machine.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Error from the GPU layer.
    #[cfg(feature = "gpu")]
    #[error(transparent)]
    Gpu(#[from] beamray_gpu::GpuError),
}

/// Errors returned by [`crate::Tracer::trace`].
#[derive(Debug, Error)]
pub enum TraceError {
    /// The configuration was rejected before any work was done.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The backend failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The material tables are malformed.
    #[error(transparent)]
    Material(#[from] MaterialError),
}
