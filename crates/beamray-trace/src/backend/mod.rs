//! Runtime-selected execution backends.
//!
//! A backend owns the buffers of one tracer and runs the three data-parallel
//! primitives every batch needs: [`ExecutionBackend::map_rays`] traces every
//! ray into its sparse event window, [`ExecutionBackend::scan`] turns the
//! per-ray counts into offsets and [`ExecutionBackend::gather`] packs the
//! events densely.

mod cpu;

pub use cpu::CpuBackend;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::error::DeviceError;
use crate::kernel::KernelLaunch;
use crate::material::MaterialTables;
use crate::ray::Ray;

/// Which backend to trace on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Multi-threaded CPU.
    #[default]
    Cpu,
    /// wgpu compute shaders.
    Gpu,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Cpu => write!(f, "cpu"),
            BackendKind::Gpu => write!(f, "gpu"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(BackendKind::Cpu),
            "gpu" => Ok(BackendKind::Gpu),
            other => Err(format!("unknown backend `{other}`, expected `cpu` or `gpu`")),
        }
    }
}

/// Host copy of one batch's compacted results.
#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    /// Events written per ray.
    pub counts: Vec<u32>,
    /// Exclusive prefix sum of `counts`.
    pub offsets: Vec<u32>,
    /// Dense events, ray after ray.
    pub events: Vec<Ray>,
}

impl BatchOutput {
    /// Events of ray `index` within the batch.
    pub fn ray_events(&self, index: usize) -> &[Ray] {
        let start = self.offsets[index] as usize;
        &self.events[start..start + self.counts[index] as usize]
    }
}

/// Storage and compute primitives of one tracer.
///
/// Calls follow the order `load_scene`, then per batch `transfer_in`,
/// `map_rays`, `scan`, `gather`, `transfer_out`.
pub trait ExecutionBackend: Send {
    /// Which kind of backend this is.
    fn kind(&self) -> BackendKind;

    /// Upload the beamline and material tables.
    fn load_scene(&mut self, elements: &[Element], materials: &MaterialTables) -> Result<(), DeviceError>;

    /// Upload the rays of the next batch.
    fn transfer_in(&mut self, rays: &[Ray]) -> Result<(), DeviceError>;

    /// Trace every uploaded ray into its event window.
    fn map_rays(&mut self, launch: &KernelLaunch) -> Result<(), DeviceError>;

    /// Exclusive prefix sum over the per-ray counts. Returns the total.
    fn scan(&mut self) -> Result<u64, DeviceError>;

    /// Pack `total` events densely in ray order.
    fn gather(&mut self, total: u64) -> Result<(), DeviceError>;

    /// Copy counts, offsets and packed events back to the host.
    fn transfer_out(&mut self, output: &mut BatchOutput) -> Result<(), DeviceError>;
}

/// Create a backend of the given kind.
pub fn create_backend(kind: BackendKind) -> Result<Box<dyn ExecutionBackend>, DeviceError> {
    match kind {
        BackendKind::Cpu => Ok(Box::new(CpuBackend::new())),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => Ok(Box::new(crate::gpu::GpuBackend::new()?)),
        #[cfg(not(feature = "gpu"))]
        BackendKind::Gpu => Err(DeviceError::Unavailable(
            "GPU feature not enabled. Compile with --features gpu".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_kind() {
        assert_eq!("cpu".parse::<BackendKind>(), Ok(BackendKind::Cpu));
        assert_eq!("GPU".parse::<BackendKind>(), Ok(BackendKind::Gpu));
        assert!("cuda".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Gpu.to_string(), "gpu");
    }

    #[test]
    fn test_cpu_backend_is_always_available() {
        let backend = create_backend(BackendKind::Cpu).unwrap();
        assert_eq!(backend.kind(), BackendKind::Cpu);
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn test_gpu_backend_needs_feature() {
        assert!(matches!(
            create_backend(BackendKind::Gpu),
            Err(DeviceError::Unavailable(_))
        ));
    }
}
