//! wgpu compute backend.
//!
//! The trace kernel writes each ray's events into its window of the event
//! buffer, a multi-level blocked scan turns the counts into offsets and the
//! gather kernel packs the events densely. Everything stays on the device
//! until [`ExecutionBackend::transfer_out`].

use beamray_gpu::{read_buffer, workgroup_grid, GpuContext};
use bytemuck::Zeroable;
use tracing::{debug, trace};
use wgpu::util::DeviceExt;

use super::buffers::GpuBuffer;
use super::layout::{CompactParams, GpuElement, GpuRay, KernelParams};
use super::shaders::{GATHER_SHADER, SCAN_BLOCK_SIZE, SCAN_SHADER, TRACE_SHADER, TRACE_WORKGROUP_SIZE};
use crate::backend::{BackendKind, BatchOutput, ExecutionBackend};
use crate::buffers::{prepare_host, BufferId, DeviceBuffer};
use crate::element::Element;
use crate::error::DeviceError;
use crate::kernel::KernelLaunch;
use crate::material::MaterialTables;
use crate::ray::Ray;

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// A compute pipeline together with its bind group layout.
struct Kernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    label: &'static str,
}

impl Kernel {
    fn new(
        ctx: &GpuContext,
        label: &'static str,
        module: &wgpu::ShaderModule,
        entry_point: &'static str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> Self {
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries,
        });
        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        });
        Self {
            pipeline,
            layout,
            label,
        }
    }

    /// Record one dispatch over a `grid` of workgroups into `encoder`.
    fn dispatch(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        entries: &[wgpu::BindGroupEntry<'_>],
        grid: (u32, u32),
    ) {
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.label),
            layout: &self.layout,
            entries,
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(self.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(grid.0, grid.1, 1);
    }
}

fn entry<'a>(binding: u32, resource: wgpu::BindingResource<'a>) -> wgpu::BindGroupEntry<'a> {
    wgpu::BindGroupEntry { binding, resource }
}

fn compact_params(ctx: &GpuContext, count: u32, grid: (u32, u32), workgroup: u32, capacity: u32) -> wgpu::Buffer {
    let params = CompactParams {
        count,
        grid_width: grid.0 * workgroup,
        capacity,
        _pad: 0,
    };
    ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Compact Params"),
        contents: bytemuck::bytes_of(&params),
        usage: wgpu::BufferUsages::UNIFORM,
    })
}

/// Traces on the GPU through wgpu compute shaders.
///
/// Rays are traced in `f32`, so results agree with the CPU backend only to
/// single precision. The launch's `sequential` flag has no effect here.
pub struct GpuBackend {
    ctx: &'static GpuContext,
    trace: Kernel,
    scan_blocks: Kernel,
    add_carry: Kernel,
    gather: Kernel,
    elements: GpuBuffer<GpuElement>,
    material_index: GpuBuffer<u32>,
    material_table: GpuBuffer<f32>,
    rays: GpuBuffer<GpuRay>,
    events: GpuBuffer<GpuRay>,
    counts: GpuBuffer<u32>,
    offsets: GpuBuffer<u32>,
    compacted: GpuBuffer<GpuRay>,
    // Per scan level: block sums and their exclusive scan.
    block_sums: Vec<GpuBuffer<u32>>,
    block_offsets: Vec<GpuBuffer<u32>>,
    staged_rays: Vec<GpuRay>,
    staged_events: Vec<GpuRay>,
    element_count: u32,
    material_count: u32,
    ray_count: usize,
    capacity: usize,
    total: usize,
}

impl GpuBackend {
    /// Initialize the device and build all pipelines.
    pub fn new() -> Result<Self, DeviceError> {
        let ctx = GpuContext::init_blocking()?;

        let trace_module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Trace Shader"),
            source: wgpu::ShaderSource::Wgsl(TRACE_SHADER.into()),
        });
        let scan_module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scan Shader"),
            source: wgpu::ShaderSource::Wgsl(SCAN_SHADER.into()),
        });
        let gather_module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Gather Shader"),
            source: wgpu::ShaderSource::Wgsl(GATHER_SHADER.into()),
        });

        let trace = Kernel::new(
            ctx,
            "Trace Pipeline",
            &trace_module,
            "main",
            &[
                uniform_entry(0),
                // rays, elements, material index, material table
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                // event windows, counts
                storage_entry(5, false),
                storage_entry(6, false),
            ],
        );
        let scan_blocks = Kernel::new(
            ctx,
            "Scan Blocks Pipeline",
            &scan_module,
            "scan_blocks",
            &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
            ],
        );
        let add_carry = Kernel::new(
            ctx,
            "Add Carry Pipeline",
            &scan_module,
            "add_carry",
            &[uniform_entry(0), storage_entry(2, false), storage_entry(4, true)],
        );
        let gather = Kernel::new(
            ctx,
            "Gather Pipeline",
            &gather_module,
            "main",
            &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, false),
            ],
        );

        debug!(adapter = %ctx.adapter_name, "GPU backend ready");

        Ok(Self {
            ctx,
            trace,
            scan_blocks,
            add_carry,
            gather,
            elements: GpuBuffer::new(ctx, BufferId::Elements),
            material_index: GpuBuffer::new(ctx, BufferId::MaterialIndex),
            material_table: GpuBuffer::new(ctx, BufferId::MaterialTable),
            rays: GpuBuffer::new(ctx, BufferId::Rays),
            events: GpuBuffer::new(ctx, BufferId::Events),
            counts: GpuBuffer::new(ctx, BufferId::Counts),
            offsets: GpuBuffer::new(ctx, BufferId::Offsets),
            compacted: GpuBuffer::new(ctx, BufferId::Compacted),
            block_sums: Vec::new(),
            block_offsets: Vec::new(),
            staged_rays: Vec::new(),
            staged_events: Vec::new(),
            element_count: 0,
            material_count: 0,
            ray_count: 0,
            capacity: 0,
            total: 0,
        })
    }

    /// Name of the adapter in use.
    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_name
    }

    // Item counts per scan level, from the rays down to a single block.
    fn scan_levels(&mut self, n: usize) -> Result<Vec<u32>, DeviceError> {
        let block = SCAN_BLOCK_SIZE as usize;
        let mut levels = vec![n as u32];
        let mut count = n;
        loop {
            let blocks = count.div_ceil(block);
            let level = levels.len() - 1;
            if self.block_sums.len() <= level {
                self.block_sums.push(GpuBuffer::new(self.ctx, BufferId::Offsets));
                self.block_offsets.push(GpuBuffer::new(self.ctx, BufferId::Offsets));
            }
            self.block_sums[level].ensure_capacity(blocks)?;
            self.block_offsets[level].ensure_capacity(blocks)?;
            if blocks <= 1 {
                return Ok(levels);
            }
            levels.push(blocks as u32);
            count = blocks;
        }
    }
}

impl ExecutionBackend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn load_scene(&mut self, elements: &[Element], materials: &MaterialTables) -> Result<(), DeviceError> {
        let mut packed: Vec<GpuElement> = elements.iter().map(GpuElement::from_element).collect();
        self.element_count = packed.len() as u32;
        if packed.is_empty() {
            packed.push(GpuElement::zeroed());
        }

        let mut index = materials.index_table.clone();
        if index.is_empty() {
            index.push(0);
        }
        let mut table: Vec<f32> = materials.material_table.iter().map(|&v| v as f32).collect();
        if table.is_empty() {
            table.push(0.0);
        }
        self.material_count = materials.material_count() as u32;

        self.elements.transfer_in(&packed, packed.len())?;
        self.material_index.transfer_in(&index, index.len())?;
        self.material_table.transfer_in(&table, table.len())?;
        trace!(
            elements = self.element_count,
            materials = self.material_count,
            "scene uploaded"
        );
        Ok(())
    }

    fn transfer_in(&mut self, rays: &[Ray]) -> Result<(), DeviceError> {
        self.staged_rays.clear();
        self.staged_rays.extend(rays.iter().map(GpuRay::from_ray));
        self.rays.transfer_in(&self.staged_rays, rays.len())?;
        self.ray_count = rays.len();
        Ok(())
    }

    fn map_rays(&mut self, launch: &KernelLaunch) -> Result<(), DeviceError> {
        let n = self.ray_count;
        let capacity = launch.event_capacity();
        if capacity == 0 {
            return Err(DeviceError::Dispatch("launch reserves no event slots".to_string()));
        }
        let slots = n as u64 * capacity as u64;
        if slots > u64::from(u32::MAX) {
            return Err(DeviceError::EventOverflow(slots));
        }
        self.capacity = capacity;
        self.events.ensure_capacity(n * capacity)?;
        self.counts.ensure_capacity(n)?;
        if n == 0 {
            return Ok(());
        }
        if launch.sequential {
            trace!("sequential launch requested, GPU traces in parallel regardless");
        }

        let ctx = self.ctx;
        let grid = workgroup_grid(n as u32, TRACE_WORKGROUP_SIZE);
        let params = KernelParams {
            ray_count: n as u32,
            element_count: self.element_count,
            max_events: launch.max_events,
            start_event_id: launch.start_event_id,
            seed_lo: launch.seed as u32,
            seed_hi: (launch.seed >> 32) as u32,
            first_id_lo: launch.first_ray_id as u32,
            first_id_hi: (launch.first_ray_id >> 32) as u32,
            material_count: self.material_count,
            grid_width: grid.0 * TRACE_WORKGROUP_SIZE,
            capacity: capacity as u32,
            _pad: 0,
        };
        let params_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Kernel Params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Trace Encoder"),
        });
        self.trace.dispatch(
            ctx,
            &mut encoder,
            &[
                entry(0, params_buffer.as_entire_binding()),
                entry(1, self.rays.binding()?),
                entry(2, self.elements.binding()?),
                entry(3, self.material_index.binding()?),
                entry(4, self.material_table.binding()?),
                entry(5, self.events.binding()?),
                entry(6, self.counts.binding()?),
            ],
            grid,
        );
        ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn scan(&mut self) -> Result<u64, DeviceError> {
        let n = self.ray_count;
        self.offsets.ensure_capacity(n)?;
        if n == 0 {
            return Ok(0);
        }

        let ctx = self.ctx;
        let levels = self.scan_levels(n)?;
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Scan Encoder"),
        });

        // Scan every level bottom-up, collecting block sums.
        for (level, &count) in levels.iter().enumerate() {
            let grid = workgroup_grid(count, SCAN_BLOCK_SIZE);
            let params = compact_params(ctx, count, grid, SCAN_BLOCK_SIZE, 0);
            let (input, output) = if level == 0 {
                (self.counts.binding()?, self.offsets.binding()?)
            } else {
                (
                    self.block_sums[level - 1].binding()?,
                    self.block_offsets[level - 1].binding()?,
                )
            };
            self.scan_blocks.dispatch(
                ctx,
                &mut encoder,
                &[
                    entry(0, params.as_entire_binding()),
                    entry(1, input),
                    entry(2, output),
                    entry(3, self.block_sums[level].binding()?),
                ],
                grid,
            );
        }

        // Add carries top-down.
        for level in (1..levels.len()).rev() {
            let count = levels[level - 1];
            let grid = workgroup_grid(count, SCAN_BLOCK_SIZE);
            let params = compact_params(ctx, count, grid, SCAN_BLOCK_SIZE, 0);
            let output = if level == 1 {
                self.offsets.binding()?
            } else {
                self.block_offsets[level - 2].binding()?
            };
            self.add_carry.dispatch(
                ctx,
                &mut encoder,
                &[
                    entry(0, params.as_entire_binding()),
                    entry(2, output),
                    entry(4, self.block_offsets[level - 1].binding()?),
                ],
                grid,
            );
        }
        ctx.queue.submit(Some(encoder.finish()));

        let last = (n - 1) as u64;
        let last_offset: Vec<u32> = read_buffer(ctx, self.offsets.buffer()?, last, 1)?;
        let last_count: Vec<u32> = read_buffer(ctx, self.counts.buffer()?, last, 1)?;
        match (last_offset.first(), last_count.first()) {
            (Some(&offset), Some(&count)) => Ok(u64::from(offset) + u64::from(count)),
            _ => Err(DeviceError::Readback),
        }
    }

    fn gather(&mut self, total: u64) -> Result<(), DeviceError> {
        let n = self.ray_count;
        let total = usize::try_from(total).map_err(|_| DeviceError::EventOverflow(total))?;
        self.compacted.ensure_capacity(total)?;
        self.total = total;
        if n == 0 || total == 0 {
            return Ok(());
        }

        let ctx = self.ctx;
        let grid = workgroup_grid(n as u32, TRACE_WORKGROUP_SIZE);
        let params = compact_params(ctx, n as u32, grid, TRACE_WORKGROUP_SIZE, self.capacity as u32);
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Gather Encoder"),
        });
        self.gather.dispatch(
            ctx,
            &mut encoder,
            &[
                entry(0, params.as_entire_binding()),
                entry(1, self.events.binding()?),
                entry(2, self.counts.binding()?),
                entry(3, self.offsets.binding()?),
                entry(4, self.compacted.binding()?),
            ],
            grid,
        );
        ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn transfer_out(&mut self, output: &mut BatchOutput) -> Result<(), DeviceError> {
        let n = self.ray_count;
        self.counts.transfer_out(&mut output.counts, n)?;
        self.offsets.transfer_out(&mut output.offsets, n)?;
        self.compacted.transfer_out(&mut self.staged_events, self.total)?;

        prepare_host(&mut output.events, BufferId::Compacted, self.total)?;
        output.events.extend(self.staged_events.iter().map(GpuRay::to_ray));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::behaviour::Behaviour;
    use crate::compact::compact;
    use crate::intersect::Surface;
    use crate::ray::EventType;
    use beamray_math::{Point3, Stokes, Transform, Vec3};

    fn screen(z: f64) -> Element {
        let placement = Transform::translation(0.0, 0.0, z)
            .then(&Transform::rotation_x(std::f64::consts::FRAC_PI_2));
        Element::new(placement, Surface::Plane, Behaviour::ImagePlane).unwrap()
    }

    fn launch() -> KernelLaunch {
        KernelLaunch {
            first_ray_id: 0,
            max_events: 8,
            start_event_id: 0,
            seed: 5,
            sequential: false,
        }
    }

    fn run(backend: &mut dyn ExecutionBackend, elements: &[Element], rays: &[Ray]) -> BatchOutput {
        let mut output = BatchOutput::default();
        backend.load_scene(elements, &MaterialTables::default()).unwrap();
        backend.transfer_in(rays).unwrap();
        backend.map_rays(&launch()).unwrap();
        compact(backend).unwrap();
        backend.transfer_out(&mut output).unwrap();
        output
    }

    #[test]
    #[ignore = "requires GPU"]
    fn test_gpu_matches_cpu_on_screens() {
        let Ok(mut gpu) = GpuBackend::new() else {
            return;
        };
        let elements = [screen(10.0), screen(20.0)];
        // Every third ray misses the screens entirely.
        let rays: Vec<Ray> = (0..1000)
            .map(|i| {
                let direction = if i % 3 == 0 { -Vec3::z() } else { Vec3::z() };
                Ray::new(Point3::new(0.0, 0.0, 1.0), direction, 100.0, Stokes::new(1.0, 0.0, 0.0, 0.0))
            })
            .collect();

        let on_gpu = run(&mut gpu, &elements, &rays);
        let on_cpu = run(&mut CpuBackend::new(), &elements, &rays);

        assert_eq!(on_gpu.counts, on_cpu.counts);
        assert_eq!(on_gpu.offsets, on_cpu.offsets);
        assert_eq!(on_gpu.events.len(), on_cpu.events.len());
        for (g, c) in on_gpu.events.iter().zip(&on_cpu.events) {
            assert_eq!(g.event_type, c.event_type);
            assert_eq!(g.last_element, c.last_element);
            assert!((g.position - c.position).norm() < 1e-3);
        }
    }

    #[test]
    #[ignore = "requires GPU"]
    fn test_gpu_scan_spans_several_levels() {
        let Ok(mut gpu) = GpuBackend::new() else {
            return;
        };
        // 256 * 256 + 1 rays force a third scan level.
        let n = 65_537;
        let rays = vec![Ray::new(Point3::origin(), Vec3::z(), 100.0, Stokes::new(1.0, 0.0, 0.0, 0.0)); n];
        let output = run(&mut gpu, &[screen(10.0)], &rays);
        assert!(output.counts.iter().all(|&c| c == 2));
        assert!(output.offsets.iter().enumerate().all(|(i, &o)| o as usize == 2 * i));
        assert_eq!(output.events.len(), 2 * n);
        assert_eq!(output.events[2 * n - 1].event_type, EventType::FlyOff);
    }
}
