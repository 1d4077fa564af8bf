//! Typed views over shared device memory
//!
//! A buffer is one flat region of `element_count × element_size` bytes that
//! both the host and the device can address. The host sees it as a
//! [`BufferView<T>`], which derefs to `[T]`; use [`crate::fold()`] to look at it
//! as a 2-D or 3-D array without copying.

use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

use gridlane_backends::{DeviceBuffer, Element, ElementKind};

use crate::cache::Handle;
use crate::error::Reason;
use crate::fold::{fold, fold_mut};

/// Largest region, in bytes, a single buffer may span
pub const MAX_BUFFER_BYTES: i64 = i32::MAX as i64;

/// Handle of a buffer stored in a [`crate::Context`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub(crate) Handle);

impl BufferId {
    /// Wrap a raw handle, e.g. one received over an FFI boundary.
    pub const fn from_raw(handle: Handle) -> Self {
        Self(handle)
    }

    pub const fn raw(self) -> Handle {
        self.0
    }

    /// `true` for handles that could reference a buffer (strictly positive).
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl From<BufferId> for Handle {
    fn from(id: BufferId) -> Self {
        id.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer #{}", self.0)
    }
}

/// What the cache keeps for one buffer.
#[derive(Clone)]
pub(crate) struct BufferRecord {
    pub(crate) kind: ElementKind,
    pub(crate) element_count: usize,
    pub(crate) memory: Arc<dyn DeviceBuffer>,
}

/// Validated size of a buffer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Extent {
    pub(crate) element_count: usize,
    pub(crate) byte_len: usize,
}

/// Check `dims` and compute the buffer size before anything is allocated.
///
/// The byte count is accumulated one dimension at a time and must stay within
/// [`MAX_BUFFER_BYTES`] after every step.
pub(crate) fn measure(kind: ElementKind, dims: &[i64]) -> Result<Extent, Reason> {
    if dims.is_empty() {
        return Err(Reason::MissingDimensions);
    }
    if let Some((index, &value)) = dims.iter().enumerate().find(|(_, dim)| **dim < 1) {
        return Err(Reason::InvalidDimension { index, value });
    }

    let mut bytes = kind.size_bytes() as i64;
    for &dim in dims {
        bytes = bytes
            .checked_mul(dim)
            .filter(|&total| total <= MAX_BUFFER_BYTES)
            .ok_or(Reason::ExceededMaximumBytes {
                limit: MAX_BUFFER_BYTES,
            })?;
    }

    let byte_len = bytes as usize;
    Ok(Extent {
        element_count: byte_len / kind.size_bytes(),
        byte_len,
    })
}

/// Host view of a buffer's memory as `[T]`.
///
/// The view keeps the underlying region alive, so the memory stays valid even
/// after the buffer's handle is released. There is no way to resize, move or
/// free the region through the view.
///
/// The device writes into the same memory during [`crate::Context::run`];
/// do not read or write a region from the host while a dispatch that binds it
/// is in flight on another thread.
pub struct BufferView<T: Element> {
    ptr: NonNull<T>,
    len: usize,
    memory: Arc<dyn DeviceBuffer>,
    _marker: PhantomData<T>,
}

// SAFETY: the view owns a share of the region and hands out `&[T]`/`&mut [T]`
// only through `&self`/`&mut self`; T is Send + Sync.
unsafe impl<T: Element> Send for BufferView<T> {}
unsafe impl<T: Element> Sync for BufferView<T> {}

impl<T: Element> BufferView<T> {
    /// View the first `len` elements of `memory`, clamped to what it holds.
    pub(crate) fn new(memory: Arc<dyn DeviceBuffer>, len: usize) -> Self {
        let len = len.min(memory.len_bytes() / size_of::<T>());
        Self {
            ptr: memory.contents().cast::<T>(),
            len,
            memory,
            _marker: PhantomData,
        }
    }

    pub fn kind(&self) -> ElementKind {
        T::KIND
    }

    pub fn byte_len(&self) -> usize {
        self.len * size_of::<T>()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self[..])
    }

    /// Split into `width` equal rows. See [`crate::fold()`].
    pub fn fold(&self, width: i64) -> Option<Vec<&[T]>> {
        fold(&self[..], width)
    }

    /// Split into `width` equal mutable rows. See [`crate::fold_mut()`].
    pub fn fold_mut(&mut self, width: i64) -> Option<Vec<&mut [T]>> {
        fold_mut(&mut self[..], width)
    }

    /// Reinterpret the whole region as `U` elements.
    ///
    /// Fails, handing the view back, when the byte length is not a multiple
    /// of `U`'s size.
    pub fn reinterpret<U: Element>(self) -> Result<BufferView<U>, Self> {
        let bytes = self.byte_len();
        if bytes % size_of::<U>() != 0 {
            return Err(self);
        }
        Ok(BufferView::new(self.memory, bytes / size_of::<U>()))
    }
}

impl<T: Element> Deref for BufferView<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: `ptr` is 8-byte aligned (DeviceBuffer contract, align_of::<T>() <= 8),
        // `len` elements fit inside the region, and `memory` keeps it alive.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Element> DerefMut for BufferView<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as in `deref`; `&mut self` makes this the only host borrow
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Element> fmt::Debug for BufferView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferView")
            .field("kind", &T::KIND)
            .field("len", &self.len)
            .finish()
    }
}
