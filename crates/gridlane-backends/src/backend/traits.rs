//! Capability traits every accelerator backend implements
//!
//! The core layer never sees a native handle. It talks to a backend through
//! this chain of objects, each produced by the previous one:
//!
//! ```text
//! Driver ──compile_module──▶ Module ──function──▶ KernelFunction
//!    │                                                 │
//!    │                                          build_pipeline
//!    │                                                 ▼
//!    └──allocate_shared──▶ DeviceBuffer          Pipeline ──new_queue──▶ SubmissionQueue
//! ```
//!
//! A compiled function is the triple (kernel function, pipeline, queue); the
//! queue already knows its pipeline, so a dispatch only needs the grid, the
//! group shape and the bound arguments.

use std::any::Any;
use std::ptr::NonNull;
use std::sync::Arc;

use super::types::{Dispatch, PipelineLimits};
use crate::error::Result;

/// Entry point into one accelerator backend.
pub trait Driver: Send + Sync {
    /// Short backend name used in logs and errors ("cpu", "metal")
    fn backend_name(&self) -> &'static str;

    /// Build a module from kernel source text.
    fn compile_module(&self, source: &str) -> Result<Box<dyn Module>>;

    /// Allocate `len_bytes` of memory visible to both host and device.
    fn allocate_shared(&self, len_bytes: usize) -> Result<Arc<dyn DeviceBuffer>>;

    fn as_any(&self) -> &dyn Any;
}

/// A compiled unit of kernel source.
pub trait Module: Send + Sync {
    /// Resolve an entry point by name.
    fn function(&self, name: &str) -> Option<Box<dyn KernelFunction>>;

    /// Names of every entry point the module exports.
    fn function_names(&self) -> Vec<String>;
}

/// A resolved kernel entry point.
pub trait KernelFunction: Send + Sync {
    fn name(&self) -> &str;

    /// Build the execution pipeline for this entry point.
    fn build_pipeline(&self) -> Result<Box<dyn Pipeline>>;
}

/// Execution state built from a kernel function.
pub trait Pipeline: Send + Sync {
    fn limits(&self) -> PipelineLimits;

    /// Create a queue that submits work to this pipeline.
    fn new_queue(&self) -> Result<Box<dyn SubmissionQueue>>;
}

/// Submits dispatches for one pipeline.
pub trait SubmissionQueue: Send + Sync {
    /// Run `dispatch` and block the calling thread until the device reports
    /// completion or failure.
    fn submit(&self, dispatch: &Dispatch<'_>) -> Result<()>;
}

/// Memory shared between host and device.
///
/// # Safety
///
/// Implementors guarantee that [`DeviceBuffer::contents`] points to at least
/// [`DeviceBuffer::len_bytes`] bytes, aligned to 8 bytes, that stay valid and
/// at the same address until the buffer is dropped. Host views are built
/// directly on that pointer.
pub unsafe trait DeviceBuffer: Send + Sync {
    fn contents(&self) -> NonNull<u8>;

    fn len_bytes(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}
