//! Multi-threaded CPU backend.

use rayon::prelude::*;

use super::{BackendKind, BatchOutput, ExecutionBackend};
use crate::buffers::{BufferId, DeviceBuffer, HostBuffer};
use crate::compact::{exclusive_scan, gather};
use crate::element::Element;
use crate::error::DeviceError;
use crate::kernel::{trace_ray, KernelLaunch};
use crate::material::MaterialTables;
use crate::ray::Ray;

/// Traces on the rayon thread pool, or on the calling thread when the launch
/// asks for sequential execution.
#[derive(Debug)]
pub struct CpuBackend {
    elements: Vec<Element>,
    materials: MaterialTables,
    rays: HostBuffer<Ray>,
    events: HostBuffer<Ray>,
    counts: HostBuffer<u32>,
    offsets: HostBuffer<u32>,
    compacted: HostBuffer<Ray>,
    ray_count: usize,
    capacity: usize,
    total: usize,
}

impl CpuBackend {
    /// Backend with empty buffers.
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            materials: MaterialTables::default(),
            rays: HostBuffer::new(BufferId::Rays),
            events: HostBuffer::new(BufferId::Events),
            counts: HostBuffer::new(BufferId::Counts),
            offsets: HostBuffer::new(BufferId::Offsets),
            compacted: HostBuffer::new(BufferId::Compacted),
            ray_count: 0,
            capacity: 0,
            total: 0,
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionBackend for CpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn load_scene(&mut self, elements: &[Element], materials: &MaterialTables) -> Result<(), DeviceError> {
        self.elements = elements.to_vec();
        self.materials = materials.clone();
        Ok(())
    }

    fn transfer_in(&mut self, rays: &[Ray]) -> Result<(), DeviceError> {
        self.rays.transfer_in(rays, rays.len())?;
        self.ray_count = rays.len();
        Ok(())
    }

    fn map_rays(&mut self, launch: &KernelLaunch) -> Result<(), DeviceError> {
        let n = self.ray_count;
        let capacity = launch.event_capacity();
        if capacity == 0 {
            return Err(DeviceError::Dispatch("launch reserves no event slots".to_string()));
        }
        self.capacity = capacity;
        self.events.ensure_capacity(n * capacity)?;
        self.counts.ensure_capacity(n)?;

        let elements = &self.elements;
        let materials = &self.materials;
        let rays = self.rays.slice(n)?;
        let events = self.events.slice_mut(n * capacity)?;
        let counts = self.counts.slice_mut(n)?;

        let run = |(i, (ray, (slots, count))): (usize, (&Ray, (&mut [Ray], &mut u32)))| {
            let id = launch.first_ray_id + i as u64;
            *count = trace_ray(id, ray, elements, materials, launch, slots);
        };

        if launch.sequential {
            rays.iter()
                .zip(events.chunks_mut(capacity).zip(counts.iter_mut()))
                .enumerate()
                .for_each(run);
        } else {
            rays.par_iter()
                .zip(events.par_chunks_mut(capacity).zip(counts.par_iter_mut()))
                .enumerate()
                .for_each(run);
        }
        Ok(())
    }

    fn scan(&mut self) -> Result<u64, DeviceError> {
        let n = self.ray_count;
        self.offsets.ensure_capacity(n)?;
        let counts = self.counts.slice(n)?;
        let offsets = self.offsets.slice_mut(n)?;
        exclusive_scan(counts, offsets)
    }

    fn gather(&mut self, total: u64) -> Result<(), DeviceError> {
        let n = self.ray_count;
        let total = usize::try_from(total).map_err(|_| DeviceError::EventOverflow(total))?;
        self.compacted.ensure_capacity(total)?;
        self.total = total;
        gather(
            self.events.slice(n * self.capacity)?,
            self.capacity,
            self.counts.slice(n)?,
            self.offsets.slice(n)?,
            self.compacted.slice_mut(total)?,
        )
    }

    fn transfer_out(&mut self, output: &mut BatchOutput) -> Result<(), DeviceError> {
        let n = self.ray_count;
        self.counts.transfer_out(&mut output.counts, n)?;
        self.offsets.transfer_out(&mut output.offsets, n)?;
        self.compacted.transfer_out(&mut output.events, self.total)?;
        Ok(())
    }
}
