//! Batch scheduling.
//!
//! [`Tracer`] splits the input rays into contiguous batches, runs the
//! backend pipeline for each batch and appends the per-ray histories in ray
//! order. Batches run strictly one after another; a batch's results are
//! read back completely before the next batch is uploaded.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::backend::{create_backend, BackendKind, BatchOutput, ExecutionBackend};
use crate::compact::compact;
use crate::config::TraceConfig;
use crate::element::Beamline;
use crate::error::TraceError;
use crate::kernel::KernelLaunch;
use crate::material::MaterialTables;
use crate::ray::{BundleHistory, EventType, Ray};

/// Traces ray bundles through beamlines on one backend.
///
/// The backend's buffers are reused across batches and across calls.
pub struct Tracer {
    backend: Box<dyn ExecutionBackend>,
    output: BatchOutput,
}

impl Tracer {
    /// Tracer on a freshly created backend.
    pub fn new(kind: BackendKind) -> Result<Self, TraceError> {
        Ok(Self::with_backend(create_backend(kind)?))
    }

    /// Tracer on an existing backend.
    pub fn with_backend(backend: Box<dyn ExecutionBackend>) -> Self {
        Self {
            backend,
            output: BatchOutput::default(),
        }
    }

    /// Kind of the backend in use.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Trace `rays` through `beamline`.
    ///
    /// Returns one history per input ray, in input order. The backend named
    /// in `config` is ignored; the tracer always uses its own.
    pub fn trace(
        &mut self,
        beamline: &Beamline,
        rays: &[Ray],
        materials: &MaterialTables,
        config: &TraceConfig,
    ) -> Result<BundleHistory, TraceError> {
        config.validate()?;
        materials.validate()?;

        if beamline.is_empty() {
            debug!(rays = rays.len(), "empty beamline, nothing to trace");
            return Ok(vec![Vec::new(); rays.len()]);
        }

        if config.backend != self.backend.kind() {
            warn!(
                requested = %config.backend,
                using = %self.backend.kind(),
                "tracer backend differs from configuration"
            );
        }

        let seed = config.random_seed.unwrap_or_else(rand::random);
        let batch_count = rays.len().div_ceil(config.max_batch_size);
        info!(
            rays = rays.len(),
            elements = beamline.len(),
            batches = batch_count,
            backend = %self.backend.kind(),
            seed,
            "tracing"
        );

        self.backend.load_scene(&beamline.elements, materials)?;

        let mut history = BundleHistory::with_capacity(rays.len());
        for (batch, chunk) in rays.chunks(config.max_batch_size).enumerate() {
            let started = Instant::now();
            let first = batch * config.max_batch_size;
            let launch = KernelLaunch {
                first_ray_id: first as u64,
                max_events: config.max_events,
                start_event_id: config.start_event_id,
                seed,
                sequential: config.sequential,
            };

            self.backend.transfer_in(chunk)?;
            self.backend.map_rays(&launch)?;
            let total = compact(self.backend.as_mut())?;
            self.backend.transfer_out(&mut self.output)?;

            let mut fatal = 0usize;
            for index in 0..chunk.len() {
                let events = self.output.ray_events(index);
                if events.last().is_some_and(|e| e.event_type == EventType::FatalError) {
                    fatal += 1;
                }
                history.push(events.to_vec());
            }

            debug!(
                batch,
                first,
                rays = chunk.len(),
                events = total,
                elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
                "batch traced"
            );
            if fatal > 0 {
                warn!(batch, rays = fatal, "rays ended in a fatal error");
            }
        }

        Ok(history)
    }
}

/// Trace on a backend created for this call from `config.backend`.
pub fn trace(
    beamline: &Beamline,
    rays: &[Ray],
    materials: &MaterialTables,
    config: &TraceConfig,
) -> Result<BundleHistory, TraceError> {
    Tracer::new(config.backend)?.trace(beamline, rays, materials, config)
}
