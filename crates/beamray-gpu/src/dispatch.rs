//! Workgroup grid sizing.

/// Upper bound on workgroups along one dispatch dimension (WebGPU default limit).
pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65_535;

/// Grid of workgroups covering `items` invocations with `workgroup_size` threads each.
///
/// Dispatches that would exceed [`MAX_WORKGROUPS_PER_DIMENSION`] along x spill
/// into y. Shaders recover the flat index as
/// `gid.x + gid.y * num_workgroups.x * workgroup_size` and must bounds-check it.
pub fn workgroup_grid(items: u32, workgroup_size: u32) -> (u32, u32) {
    let groups = items.div_ceil(workgroup_size).max(1);
    if groups <= MAX_WORKGROUPS_PER_DIMENSION {
        (groups, 1)
    } else {
        let rows = groups.div_ceil(MAX_WORKGROUPS_PER_DIMENSION);
        (MAX_WORKGROUPS_PER_DIMENSION, rows)
    }
}
