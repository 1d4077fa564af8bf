//! Accelerator drivers for gridlane kernel dispatch
//!
//! This crate provides:
//! - **Capability traits**: `Driver` → `Module` → `KernelFunction` → `Pipeline` → `SubmissionQueue`
//! - **Shared memory**: `DeviceBuffer`, a host-visible region with a stable address
//! - **CPU Backend**: reference implementation running host kernels on rayon
//! - **Metal Backend**: runtime-compiled compute kernels on Apple GPUs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     gridlane-core                        │
//! │        (handle caches, typed views, dispatch rules)      │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │  dyn Driver
//!               ┌───────┴───────┐
//!               ▼               ▼
//!         ┌─────────┐     ┌─────────┐
//!         │   CPU   │     │  Metal  │
//!         │ Driver  │     │ Driver  │
//!         └─────────┘     └─────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use gridlane_backends::{Argument, CpuDriver, Dispatch, Driver, GridDim, GroupDim};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let driver = CpuDriver::default();
//! driver.register("iota", |lane, args| {
//!     if let Some(out) = args.buffer(0) {
//!         out.store(lane.x() as usize, lane.x());
//!     }
//! });
//!
//! let module = driver.compile_module("kernel void iota(device uint *out) {}")?;
//! let function = module.function("iota").ok_or("missing function")?;
//! let queue = function.build_pipeline()?.new_queue()?;
//!
//! let out = driver.allocate_shared(16 * 4)?;
//! let arguments = [Argument::Buffer(out.as_ref())];
//! queue.submit(&Dispatch {
//!     grid: GridDim::linear(16),
//!     group: GroupDim::new(8, 1, 1),
//!     arguments: &arguments,
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod backends;
pub mod error;

pub use backend::{
    Argument, DeviceBuffer, Dispatch, Driver, Element, ElementKind, GridDim, GroupDim, KernelFunction, Module,
    Pipeline, PipelineLimits, Scalar, SubmissionQueue,
};
pub use backends::{ArgumentTable, CpuConfig, CpuDriver, DeviceSlice, HostBuffer, HostKernel, Lane, MetalDriver};
pub use error::{DriverError, Result};
