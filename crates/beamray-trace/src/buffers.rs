//! Backend storage for rays, elements, materials and events.
//!
//! Buffers grow lazily to the next power of two and never shrink, so a
//! tracer that is reused across batches settles on a fixed allocation.
//! Growing does not zero memory and a device buffer may lose its old
//! contents; kernels tag every slot they own and callers re-upload after
//! growth.

use tracing::trace;

use crate::error::DeviceError;

/// Identity of a backend buffer, used in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferId {
    /// Input rays of the current batch.
    Rays,
    /// Beamline elements.
    Elements,
    /// Material row offsets.
    MaterialIndex,
    /// Material `(energy, n, k)` rows.
    MaterialTable,
    /// Sparse per-ray event slots.
    Events,
    /// Events written per ray.
    Counts,
    /// Exclusive prefix sum of the counts.
    Offsets,
    /// Dense compacted events.
    Compacted,
}

/// Growable storage owned by one backend.
pub trait DeviceBuffer<T> {
    /// Which buffer this is.
    fn id(&self) -> BufferId;

    /// Elements the buffer can hold without growing.
    fn capacity(&self) -> usize;

    /// Grow to the next power of two `>= required` if the buffer is smaller.
    fn ensure_capacity(&mut self, required: usize) -> Result<(), DeviceError>;

    /// Copy the first `count` elements of `host` into the buffer.
    fn transfer_in(&mut self, host: &[T], count: usize) -> Result<(), DeviceError>;

    /// Replace the contents of `host` with the first `count` elements.
    ///
    /// `host` is grown to a power-of-two capacity when it is too small.
    fn transfer_out(&self, host: &mut Vec<T>, count: usize) -> Result<(), DeviceError>;
}

/// Reserve room for `count` elements in `host`, rounding up to a power of two.
pub(crate) fn prepare_host<T>(host: &mut Vec<T>, id: BufferId, count: usize) -> Result<(), DeviceError> {
    host.clear();
    if host.capacity() < count {
        let target = count.next_power_of_two();
        host.try_reserve_exact(target).map_err(|_| DeviceError::Allocation {
            buffer: id,
            bytes: (target * std::mem::size_of::<T>()) as u64,
        })?;
    }
    Ok(())
}

/// Buffer in host memory, used by the CPU backend.
#[derive(Debug, Clone)]
pub struct HostBuffer<T> {
    id: BufferId,
    data: Vec<T>,
}

impl<T: Copy + Default> HostBuffer<T> {
    /// Empty buffer.
    pub fn new(id: BufferId) -> Self {
        Self { id, data: Vec::new() }
    }

    /// The first `count` elements.
    pub fn slice(&self, count: usize) -> Result<&[T], DeviceError> {
        let capacity = self.data.len();
        self.data.get(..count).ok_or(DeviceError::OutOfBounds {
            buffer: self.id,
            count,
            capacity,
        })
    }

    /// The first `count` elements, mutably.
    pub fn slice_mut(&mut self, count: usize) -> Result<&mut [T], DeviceError> {
        let capacity = self.data.len();
        let id = self.id;
        self.data.get_mut(..count).ok_or(DeviceError::OutOfBounds {
            buffer: id,
            count,
            capacity,
        })
    }
}

impl<T: Copy + Default> DeviceBuffer<T> for HostBuffer<T> {
    fn id(&self) -> BufferId {
        self.id
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn ensure_capacity(&mut self, required: usize) -> Result<(), DeviceError> {
        let old = self.data.len();
        if required <= old {
            return Ok(());
        }
        let target = required.next_power_of_two();
        self.data
            .try_reserve_exact(target - old)
            .map_err(|_| DeviceError::Allocation {
                buffer: self.id,
                bytes: (target * std::mem::size_of::<T>()) as u64,
            })?;
        self.data.resize(target, T::default());
        trace!(buffer = ?self.id, old, new = target, "grew host buffer");
        Ok(())
    }

    fn transfer_in(&mut self, host: &[T], count: usize) -> Result<(), DeviceError> {
        let source = host.get(..count).ok_or(DeviceError::OutOfBounds {
            buffer: self.id,
            count,
            capacity: host.len(),
        })?;
        self.ensure_capacity(count)?;
        self.data[..count].copy_from_slice(source);
        Ok(())
    }

    fn transfer_out(&self, host: &mut Vec<T>, count: usize) -> Result<(), DeviceError> {
        let source = self.slice(count)?;
        prepare_host(host, self.id, count)?;
        host.extend_from_slice(source);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grows_to_power_of_two() {
        let mut buffer = HostBuffer::<u32>::new(BufferId::Counts);
        assert_eq!(buffer.capacity(), 0);
        buffer.ensure_capacity(5).unwrap();
        assert_eq!(buffer.capacity(), 8);
        buffer.ensure_capacity(8).unwrap();
        assert_eq!(buffer.capacity(), 8);
        buffer.ensure_capacity(9).unwrap();
        assert_eq!(buffer.capacity(), 16);
    }

    #[test]
    fn test_never_shrinks() {
        let mut buffer = HostBuffer::<u32>::new(BufferId::Counts);
        buffer.ensure_capacity(100).unwrap();
        buffer.ensure_capacity(3).unwrap();
        assert_eq!(buffer.capacity(), 128);
    }

    #[test]
    fn test_transfer_copies_only_count() {
        let mut buffer = HostBuffer::<u32>::new(BufferId::Offsets);
        buffer.transfer_in(&[9, 9, 9, 9], 4).unwrap();
        buffer.transfer_in(&[1, 2, 3], 2).unwrap();
        // no implicit zeroing: the tail keeps its old contents
        assert_eq!(buffer.slice(4).unwrap(), &[1, 2, 9, 9]);

        let mut host = Vec::new();
        buffer.transfer_out(&mut host, 3).unwrap();
        assert_eq!(host, vec![1, 2, 9]);
        assert!(host.capacity() >= 4);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut buffer = HostBuffer::<u32>::new(BufferId::Rays);
        assert!(matches!(
            buffer.transfer_in(&[1, 2], 3),
            Err(DeviceError::OutOfBounds { count: 3, .. })
        ));
        buffer.ensure_capacity(2).unwrap();
        let mut host = Vec::new();
        assert!(matches!(
            buffer.transfer_out(&mut host, 5),
            Err(DeviceError::OutOfBounds {
                buffer: BufferId::Rays,
                ..
            })
        ));
    }
}
