//! Unified-memory buffers for the Metal backend

use std::any::Any;
use std::ptr::NonNull;

use metal::{Buffer, BufferRef, Device, MTLResourceOptions};

use crate::backend::DeviceBuffer;
use crate::error::{DriverError, Result};

/// A `StorageModeShared` buffer: the CPU and GPU see the same bytes.
pub struct MetalBuffer {
    raw: Buffer,
    contents: NonNull<u8>,
    len_bytes: usize,
}

impl MetalBuffer {
    pub(crate) fn new(device: &Device, len_bytes: usize) -> Result<Self> {
        // Metal rejects zero-length buffers
        let raw = device.new_buffer(len_bytes.max(1) as u64, MTLResourceOptions::StorageModeShared);

        let contents = NonNull::new(raw.contents().cast::<u8>()).ok_or_else(|| DriverError::Allocation {
            requested: len_bytes,
            reason: "device returned a buffer without host contents".to_string(),
        })?;

        Ok(Self {
            raw,
            contents,
            len_bytes,
        })
    }

    pub(crate) fn raw(&self) -> &BufferRef {
        &self.raw
    }
}

// SAFETY: metal::Buffer is Send + Sync; `contents` points into it
unsafe impl Send for MetalBuffer {}
unsafe impl Sync for MetalBuffer {}

// SAFETY: shared-storage buffers are page aligned, at least `len_bytes` long,
// and keep their host address until released on drop.
unsafe impl DeviceBuffer for MetalBuffer {
    fn contents(&self) -> NonNull<u8> {
        self.contents
    }

    fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_buffer_allocates() {
        let device = Device::system_default().unwrap();
        let buffer = MetalBuffer::new(&device, 0).unwrap();
        assert_eq!(buffer.len_bytes(), 0);
        assert!(buffer.raw().length() >= 1);
    }

    #[test]
    fn contents_are_aligned() {
        let device = Device::system_default().unwrap();
        let buffer = MetalBuffer::new(&device, 24).unwrap();
        assert_eq!(buffer.contents().as_ptr() as usize % 8, 0);
    }
}
