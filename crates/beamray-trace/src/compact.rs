//! Stream compaction of sparse event windows.
//!
//! The kernel leaves each ray's events at the front of a fixed window of
//! `capacity` slots. Compaction computes an exclusive prefix sum over the
//! per-ray counts and copies every window's valid prefix to its offset, so
//! ray `i` ends up at `offsets[i]..offsets[i] + counts[i]` with no gaps.

use rayon::prelude::*;

use crate::backend::ExecutionBackend;
use crate::buffers::BufferId;
use crate::error::DeviceError;
use crate::ray::Ray;

/// Counts summed per parallel task.
const SCAN_BLOCK: usize = 4096;

/// Exclusive prefix sum of `counts` into `offsets`. Returns the grand total.
///
/// Blocks are summed in parallel, the block sums are scanned, then every
/// block writes its offsets from its own base. Fails if the total does not
/// fit the `u32` offset type.
pub fn exclusive_scan(counts: &[u32], offsets: &mut [u32]) -> Result<u64, DeviceError> {
    if offsets.len() < counts.len() {
        return Err(DeviceError::OutOfBounds {
            buffer: BufferId::Offsets,
            count: counts.len(),
            capacity: offsets.len(),
        });
    }

    let block_sums: Vec<u64> = counts
        .par_chunks(SCAN_BLOCK)
        .map(|block| block.iter().map(|&c| u64::from(c)).sum())
        .collect();

    let mut bases = Vec::with_capacity(block_sums.len());
    let mut total = 0u64;
    for sum in block_sums {
        bases.push(total);
        total += sum;
    }
    if total > u64::from(u32::MAX) {
        return Err(DeviceError::EventOverflow(total));
    }

    offsets[..counts.len()]
        .par_chunks_mut(SCAN_BLOCK)
        .zip(counts.par_chunks(SCAN_BLOCK))
        .zip(bases.par_iter())
        .for_each(|((out, block), &base)| {
            let mut running = base as u32;
            for (slot, &count) in out.iter_mut().zip(block) {
                *slot = running;
                running += count;
            }
        });

    Ok(total)
}

/// Copy every ray's valid events from its window in `events` to
/// `offsets[i]..offsets[i] + counts[i]` in `out`.
///
/// `offsets` must be the exclusive prefix sum of `counts`.
pub fn gather(
    events: &[Ray],
    capacity: usize,
    counts: &[u32],
    offsets: &[u32],
    out: &mut [Ray],
) -> Result<(), DeviceError> {
    let invalid = |what: &str| DeviceError::Dispatch(format!("gather: {what}"));
    if capacity == 0 && !counts.is_empty() {
        return Err(invalid("zero event capacity"));
    }

    // Carve `out` into one disjoint destination per ray.
    let mut destinations: Vec<&mut [Ray]> = Vec::with_capacity(counts.len());
    let mut rest = out;
    let mut consumed = 0usize;
    for (&count, &offset) in counts.iter().zip(offsets) {
        let count = count as usize;
        if count > capacity {
            return Err(invalid("count exceeds event window"));
        }
        let skip = (offset as usize)
            .checked_sub(consumed)
            .ok_or_else(|| invalid("offsets overlap"))?;
        if rest.len() < skip + count {
            return Err(DeviceError::OutOfBounds {
                buffer: BufferId::Compacted,
                count: offset as usize + count,
                capacity: consumed + rest.len(),
            });
        }
        let (_, tail) = std::mem::take(&mut rest).split_at_mut(skip);
        let (head, tail) = tail.split_at_mut(count);
        destinations.push(head);
        rest = tail;
        consumed = offset as usize + count;
    }

    destinations
        .into_par_iter()
        .zip(events.par_chunks(capacity.max(1)))
        .for_each(|(dst, window)| {
            let n = dst.len();
            dst.copy_from_slice(&window[..n]);
        });

    Ok(())
}

/// Run the scan and gather primitives of `backend`. Returns the event total.
pub fn compact(backend: &mut dyn ExecutionBackend) -> Result<u64, DeviceError> {
    let total = backend.scan()?;
    backend.gather(total)?;
    Ok(total)
}
