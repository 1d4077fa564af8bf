//! Host memory for the CPU backend

use std::any::Any;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr::{self, NonNull};

use crate::backend::{DeviceBuffer, Element};
use crate::error::{DriverError, Result};

const WORD: usize = size_of::<u64>();

/// Zero-initialised, 8-byte aligned heap region.
///
/// The region never moves or grows, so its address is stable for the whole
/// lifetime of the buffer.
pub struct HostBuffer {
    words: NonNull<u64>,
    word_count: usize,
    len_bytes: usize,
}

impl HostBuffer {
    /// Allocate `len_bytes` of zeroed memory. Allocation failure is reported
    /// instead of aborting the process.
    pub fn zeroed(len_bytes: usize) -> Result<Self> {
        let word_count = len_bytes.div_ceil(WORD).max(1);

        let mut storage: Vec<u64> = Vec::new();
        storage
            .try_reserve_exact(word_count)
            .map_err(|err| DriverError::Allocation {
                requested: len_bytes,
                reason: err.to_string(),
            })?;
        storage.resize(word_count, 0);

        let raw = Box::into_raw(storage.into_boxed_slice());
        // SAFETY: Box::into_raw never returns null
        let words = unsafe { NonNull::new_unchecked(raw.cast::<u64>()) };

        Ok(Self {
            words,
            word_count,
            len_bytes,
        })
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        // SAFETY: `words`/`word_count` came from Box::into_raw in `zeroed`
        unsafe {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                self.words.as_ptr(),
                self.word_count,
            )));
        }
    }
}

// SAFETY: the buffer owns its allocation outright; concurrent access goes
// through raw pointers whose synchronisation is the caller's concern, as with
// device memory.
unsafe impl Send for HostBuffer {}
unsafe impl Sync for HostBuffer {}

// SAFETY: the allocation holds at least `len_bytes`, is u64-aligned and is
// freed only on drop.
unsafe impl DeviceBuffer for HostBuffer {
    fn contents(&self) -> NonNull<u8> {
        self.words.cast::<u8>()
    }

    fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Kernel-side view of a bound buffer.
///
/// Lanes run concurrently over the same memory, so access is element-wise
/// through raw loads and stores rather than through slices.
#[derive(Clone, Copy)]
pub struct DeviceSlice<'a> {
    ptr: NonNull<u8>,
    len_bytes: usize,
    _buffer: PhantomData<&'a dyn DeviceBuffer>,
}

// SAFETY: the view borrows a DeviceBuffer (itself Send + Sync) for 'a
unsafe impl Send for DeviceSlice<'_> {}
unsafe impl Sync for DeviceSlice<'_> {}

impl<'a> DeviceSlice<'a> {
    pub(crate) fn new(buffer: &'a dyn DeviceBuffer) -> Self {
        Self {
            ptr: buffer.contents(),
            len_bytes: buffer.len_bytes(),
            _buffer: PhantomData,
        }
    }

    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    /// Number of whole `T` elements in the buffer
    pub fn len<T: Element>(&self) -> usize {
        self.len_bytes / size_of::<T>()
    }

    /// Read element `index`, or `None` past the end.
    pub fn load<T: Element>(&self, index: usize) -> Option<T> {
        if index >= self.len::<T>() {
            return None;
        }
        // SAFETY: bounds checked above; any bit pattern is a valid `T`
        Some(unsafe { self.ptr.as_ptr().add(index * size_of::<T>()).cast::<T>().read_unaligned() })
    }

    /// Write element `index`. Returns `false` (and writes nothing) past the end.
    pub fn store<T: Element>(&self, index: usize, value: T) -> bool {
        if index >= self.len::<T>() {
            return false;
        }
        // SAFETY: bounds checked above
        unsafe {
            self.ptr
                .as_ptr()
                .add(index * size_of::<T>())
                .cast::<T>()
                .write_unaligned(value);
        }
        true
    }
}

impl std::fmt::Debug for DeviceSlice<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSlice").field("len_bytes", &self.len_bytes).finish()
    }
}
