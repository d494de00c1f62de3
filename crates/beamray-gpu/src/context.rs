//! Process-wide wgpu device and queue.

use std::sync::OnceLock;
use thiserror::Error;
use tracing::info;
use wgpu::{Device, Instance, Queue};

static GPU_CONTEXT: OnceLock<GpuContext> = OnceLock::new();

/// Failures of the GPU layer.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No adapter could be found on this machine.
    #[error("no GPU adapter available")]
    NoAdapter,

    /// The adapter refused to create a device.
    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// A staging buffer could not be mapped for reading.
    #[error("could not map staging buffer")]
    BufferMapping,

    /// A buffer larger than the device allows was requested.
    #[error("Buffer of {requested} bytes exceeds device limit of {limit} bytes")]
    BufferTooLarge {
        /// Requested size in bytes.
        requested: u64,
        /// Device limit in bytes.
        limit: u64,
    },

    /// The context is missing after initialization.
    #[error("GPU context not initialized")]
    NotInitialized,
}

/// Device and queue shared by every GPU backend in the process.
pub struct GpuContext {
    /// Creates buffers and pipelines.
    pub device: Device,
    /// Receives uploads and command buffers.
    pub queue: Queue,
    /// Name of the adapter the device was created on.
    pub adapter_name: String,
}

impl GpuContext {
    /// Create the context on first use; later calls return the same one.
    pub async fn init() -> Result<&'static Self, GpuError> {
        if let Some(ctx) = GPU_CONTEXT.get() {
            return Ok(ctx);
        }

        let instance = Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let adapter_name = adapter.get_info().name;

        // Event buffers scale with batch size, so take whatever the adapter offers.
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("beamray device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        info!(adapter = %adapter_name, "GPU device initialized");

        // A concurrent initializer may have won the race; its context is as good as ours.
        let _ = GPU_CONTEXT.set(GpuContext {
            device,
            queue,
            adapter_name,
        });

        GPU_CONTEXT.get().ok_or(GpuError::NotInitialized)
    }

    /// Blocking [`GpuContext::init`] for native callers.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn init_blocking() -> Result<&'static Self, GpuError> {
        pollster::block_on(Self::init())
    }

    /// Largest storage buffer binding the device accepts, in bytes.
    pub fn max_storage_binding(&self) -> u64 {
        let limits = self.device.limits();
        u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size)
    }

    /// Fail with [`GpuError::BufferTooLarge`] if `bytes` cannot be bound as storage.
    pub fn check_storage_size(&self, bytes: u64) -> Result<(), GpuError> {
        let limit = self.max_storage_binding();
        if bytes > limit {
            return Err(GpuError::BufferTooLarge {
                requested: bytes,
                limit,
            });
        }
        Ok(())
    }
}
