//! Device buffers for the wgpu backend.

use std::marker::PhantomData;

use beamray_gpu::{read_buffer, GpuContext};
use bytemuck::Pod;
use tracing::trace;

use crate::buffers::{prepare_host, BufferId, DeviceBuffer};
use crate::error::DeviceError;

/// Storage buffer on the GPU holding values of `T`.
///
/// Growing replaces the wgpu buffer, so contents do not survive a resize.
pub struct GpuBuffer<T: Pod> {
    id: BufferId,
    ctx: &'static GpuContext,
    buffer: Option<wgpu::Buffer>,
    capacity: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> GpuBuffer<T> {
    /// Unallocated storage buffer.
    pub fn new(ctx: &'static GpuContext, id: BufferId) -> Self {
        Self {
            id,
            ctx,
            buffer: None,
            capacity: 0,
            _marker: PhantomData,
        }
    }

    /// The wgpu buffer, allocating a one-element buffer if none exists yet.
    pub fn buffer(&mut self) -> Result<&wgpu::Buffer, DeviceError> {
        self.ensure_capacity(1)?;
        self.buffer.as_ref().ok_or(DeviceError::OutOfBounds {
            buffer: self.id,
            count: 1,
            capacity: 0,
        })
    }

    /// Whole-buffer binding resource.
    pub fn binding(&self) -> Result<wgpu::BindingResource<'_>, DeviceError> {
        self.buffer
            .as_ref()
            .map(wgpu::Buffer::as_entire_binding)
            .ok_or(DeviceError::OutOfBounds {
                buffer: self.id,
                count: 1,
                capacity: 0,
            })
    }

    fn bytes(count: usize) -> u64 {
        (count * std::mem::size_of::<T>()) as u64
    }
}

impl<T: Pod> DeviceBuffer<T> for GpuBuffer<T> {
    fn id(&self) -> BufferId {
        self.id
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn ensure_capacity(&mut self, required: usize) -> Result<(), DeviceError> {
        if required <= self.capacity && self.buffer.is_some() {
            return Ok(());
        }
        let target = required.max(1).next_power_of_two();
        let size = Self::bytes(target);
        self.ctx.check_storage_size(size)?;

        let label = format!("{:?} Buffer", self.id);
        self.buffer = Some(self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&label),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        }));
        trace!(buffer = ?self.id, old = self.capacity, new = target, "grew device buffer");
        self.capacity = target;
        Ok(())
    }

    fn transfer_in(&mut self, host: &[T], count: usize) -> Result<(), DeviceError> {
        let source = host.get(..count).ok_or(DeviceError::OutOfBounds {
            buffer: self.id,
            count,
            capacity: host.len(),
        })?;
        self.ensure_capacity(count)?;
        if count > 0 {
            let ctx = self.ctx;
            let buffer = self.buffer()?;
            ctx.queue.write_buffer(buffer, 0, bytemuck::cast_slice(source));
        }
        Ok(())
    }

    fn transfer_out(&self, host: &mut Vec<T>, count: usize) -> Result<(), DeviceError> {
        prepare_host(host, self.id, count)?;
        if count == 0 {
            return Ok(());
        }
        if count > self.capacity {
            return Err(DeviceError::OutOfBounds {
                buffer: self.id,
                count,
                capacity: self.capacity,
            });
        }
        let buffer = self.buffer.as_ref().ok_or(DeviceError::Readback)?;
        let values = read_buffer::<T>(self.ctx, buffer, 0, count as u64)?;
        host.extend_from_slice(&values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires GPU"]
    fn test_gpu_buffer_roundtrip() {
        let Ok(ctx) = GpuContext::init_blocking() else {
            return;
        };
        let mut buffer = GpuBuffer::<u32>::new(ctx, BufferId::Counts);
        let values: Vec<u32> = (0..100).collect();
        buffer.transfer_in(&values, 100).unwrap();
        assert_eq!(buffer.capacity(), 128);

        let mut host = Vec::new();
        buffer.transfer_out(&mut host, 10).unwrap();
        assert_eq!(host, (0..10).collect::<Vec<_>>());
    }

    #[test]
    #[ignore = "requires GPU"]
    fn test_gpu_buffer_out_of_bounds() {
        let Ok(ctx) = GpuContext::init_blocking() else {
            return;
        };
        let mut buffer = GpuBuffer::<u32>::new(ctx, BufferId::Offsets);
        buffer.ensure_capacity(4).unwrap();
        let mut host = Vec::new();
        assert!(matches!(
            buffer.transfer_out(&mut host, 5),
            Err(DeviceError::OutOfBounds { .. })
        ));
    }
}
