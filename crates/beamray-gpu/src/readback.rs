//! Blocking copies from device buffers back to the host.

use crate::context::{GpuContext, GpuError};
use bytemuck::Pod;

/// Copy `count` elements of `T` starting at element `first` out of `source`.
///
/// `source` must have been created with `COPY_SRC` usage. A staging buffer is
/// created per call and the device is polled until the copy has landed.
pub fn read_buffer<T: Pod>(
    ctx: &GpuContext,
    source: &wgpu::Buffer,
    first: u64,
    count: u64,
) -> Result<Vec<T>, GpuError> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let stride = std::mem::size_of::<T>() as u64;
    let size = count * stride;

    let staging_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
    encoder.copy_buffer_to_buffer(source, first * stride, &staging_buffer, 0, size);
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let buffer_slice = staging_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        // The receiver outlives the poll below, so a failed send cannot happen.
        let _ = tx.send(result);
    });

    ctx.device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|_| GpuError::BufferMapping)?
        .map_err(|_| GpuError::BufferMapping)?;

    let data = buffer_slice.get_mapped_range();
    let values: Vec<T> = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    staging_buffer.unmap();

    Ok(values)
}
