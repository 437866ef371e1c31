//! Scope-bound device allocations.

use bytemuck::Pod;
use tracing::trace;

use crate::backend::{BufferId, ComputeBackend};
use crate::error::RuntimeError;

/// A device allocation that is released when dropped.
///
/// Holding the guard instead of a bare [`BufferId`] means every exit path of
/// the caller, including early returns on error, gives the memory back.
pub struct DeviceBuffer<'a, B: ComputeBackend + ?Sized> {
    backend: &'a B,
    id: BufferId,
    size: usize,
}

impl<'a, B: ComputeBackend + ?Sized> DeviceBuffer<'a, B> {
    /// Allocate `size` bytes on `backend`.
    pub fn allocate(backend: &'a B, size: usize) -> Result<Self, RuntimeError> {
        let id = backend.allocate(size)?;
        trace!(%id, size, "allocated device buffer");
        Ok(Self { backend, id, size })
    }

    /// Allocate a buffer sized for `data` and upload it.
    pub fn from_slice<T: Pod>(backend: &'a B, data: &[T]) -> Result<Self, RuntimeError> {
        let buffer = Self::allocate(backend, std::mem::size_of_val(data))?;
        buffer.upload(data)?;
        Ok(buffer)
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Size of the allocation in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Blocking host-to-device copy into the start of the buffer.
    pub fn upload<T: Pod>(&self, data: &[T]) -> Result<(), RuntimeError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() > self.size {
            return Err(RuntimeError::Transfer(format!(
                "upload of {} bytes exceeds {} ({} bytes)",
                bytes.len(),
                self.id,
                self.size
            )));
        }
        self.backend.write(self.id, bytes)
    }

    /// Blocking device-to-host copy from the start of the buffer.
    pub fn download<T: Pod>(&self, out: &mut [T]) -> Result<(), RuntimeError> {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
        if bytes.len() > self.size {
            return Err(RuntimeError::Transfer(format!(
                "download of {} bytes exceeds {} ({} bytes)",
                bytes.len(),
                self.id,
                self.size
            )));
        }
        self.backend.read(self.id, bytes)
    }
}

impl<B: ComputeBackend + ?Sized> Drop for DeviceBuffer<'_, B> {
    fn drop(&mut self) {
        trace!(id = %self.id, "releasing device buffer");
        self.backend.release(self.id);
    }
}

impl<B: ComputeBackend + ?Sized> std::fmt::Debug for DeviceBuffer<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("id", &self.id)
            .field("size", &self.size)
            .finish()
    }
}
