//! Concurrency-safe handle cache
//!
//! Every accelerator-side resource a [`crate::Context`] hands out is
//! referenced by a positive `i32` handle: the 1-based position at which the
//! resource was stored. The slot vector only grows. Removing a resource
//! empties its slot and the handle is never given out again.
//!
//! ```text
//! store(a) -> 1    store(b) -> 2    remove(1)    store(c) -> 3
//! [a]              [a, b]           [_, b]       [_, b, c]
//! ```

use parking_lot::RwLock;

use crate::error::CacheError;

/// Raw resource handle. Valid handles are strictly positive.
pub type Handle = i32;

const MAX_HANDLES: usize = i32::MAX as usize;

/// Thread-safe store mapping handles to resources.
///
/// Lookups take the read lock, `store`/`remove` take the write lock. The
/// lock is only held for the vector operation itself; resources are cloned
/// out, so `R` is normally an `Arc` or a small record of `Arc`s.
pub struct HandleCache<R> {
    slots: RwLock<Vec<Option<R>>>,
    max_handles: usize,
}

impl<R> Default for HandleCache<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> HandleCache<R> {
    pub fn new() -> Self {
        Self::with_limit(MAX_HANDLES)
    }

    /// Cache that refuses to hand out more than `max_handles` handles.
    pub fn with_limit(max_handles: usize) -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            max_handles: max_handles.min(MAX_HANDLES),
        }
    }

    /// Append `resource` and return its handle.
    ///
    /// The length read and the push happen under one write lock, so
    /// concurrent stores starting from `k` slots return exactly `k+1..=k+T`.
    pub fn store(&self, resource: R) -> Result<Handle, CacheError> {
        let mut slots = self.slots.write();
        if slots.len() >= self.max_handles {
            return Err(CacheError::Exhausted);
        }
        slots.try_reserve(1).map_err(CacheError::Allocation)?;
        slots.push(Some(resource));
        Ok(slots.len() as Handle)
    }

    /// Empty the slot behind `handle` and hand back its resource.
    pub fn remove(&self, handle: Handle) -> Result<R, CacheError> {
        let mut slots = self.slots.write();
        let index = slot_index(handle, slots.len())?;
        slots[index].take().ok_or(CacheError::Vacant(handle))
    }

    /// Handles ever assigned (removed ones included)
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots still holding a resource
    pub fn live(&self) -> usize {
        self.slots.read().iter().filter(|slot| slot.is_some()).count()
    }
}

impl<R: Clone> HandleCache<R> {
    pub fn fetch(&self, handle: Handle) -> Result<R, CacheError> {
        let slots = self.slots.read();
        let index = slot_index(handle, slots.len())?;
        slots[index].clone().ok_or(CacheError::Vacant(handle))
    }
}

fn slot_index(handle: Handle, len: usize) -> Result<usize, CacheError> {
    if handle < 1 || handle as usize > len {
        return Err(CacheError::InvalidHandle(handle));
    }
    Ok(handle as usize - 1)
}
