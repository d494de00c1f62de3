//! WGSL shader sources for tracing and compaction.

/// Per-ray trace kernel.
pub const TRACE_SHADER: &str = concat!(include_str!("common.wgsl"), include_str!("trace.wgsl"));

/// Blocked prefix sum (`scan_blocks` and `add_carry` entry points).
pub const SCAN_SHADER: &str = include_str!("scan.wgsl");

/// Event gather kernel.
pub const GATHER_SHADER: &str = concat!(include_str!("common.wgsl"), include_str!("gather.wgsl"));

/// Invocations per workgroup of the trace and gather kernels.
pub const TRACE_WORKGROUP_SIZE: u32 = 64;

/// Invocations per workgroup of the scan kernels, and values per scan block.
pub const SCAN_BLOCK_SIZE: u32 = 256;
