//! # gridlane-core - data-parallel dispatch over shared device memory
//!
//! Compile a kernel once, allocate regions both host and device can address,
//! then dispatch the kernel over a 3-D grid as often as needed, from any
//! number of threads.
//!
//! ## Architecture
//!
//! ```text
//! Context
//! ├── HandleCache<Resource>   - positive i32 handles, never reused
//! │   ├── FunctionRecord      - entry point + pipeline + queue
//! │   └── BufferRecord        - Arc<dyn DeviceBuffer> + element kind
//! └── Arc<dyn Driver>         - CPU reference backend or Metal
//! ```
//!
//! - **Handles**: every store returns the next 1-based slot index. Released
//!   handles stay retired.
//! - **Buffers**: one flat allocation viewed as `[T]`; [`fold()`] reshapes it
//!   into 2-D / 3-D views without copying.
//! - **Dispatch**: grid axes clamp to 1, groups are
//!   `(lockstep, max_threads / lockstep, 1)`, scalars bind before buffers.
//!
//! ## Example
//!
//! ```rust
//! use gridlane_core::{Context, Grid, RunParameters};
//!
//! # fn main() -> Result<(), gridlane_core::Error> {
//! let ctx = Context::new();
//! ctx.register_host_kernel("transfer2D", |lane, args| {
//!     let (Some(input), Some(output)) = (args.buffer(0), args.buffer(1)) else {
//!         return;
//!     };
//!     let i = lane.folded_index();
//!     if let Some(value) = input.load::<f32>(i) {
//!         output.store(i, value);
//!     }
//! })?;
//!
//! let transfer = ctx.compile_function(
//!     "kernel void transfer2D(device const float *input, device float *output) {}",
//!     "transfer2D",
//! )?;
//!
//! let (input_id, mut input) = ctx.allocate_buffer_2d::<f32>(3, 4)?;
//! let (output_id, output) = ctx.allocate_buffer_2d::<f32>(3, 4)?;
//! for (i, row) in input.fold_mut(3).unwrap().into_iter().enumerate() {
//!     for (j, cell) in row.iter_mut().enumerate() {
//!         *cell = (i * 4 + j) as f32;
//!     }
//! }
//!
//! ctx.run(transfer, &RunParameters::new(Grid::planar(3, 4)).buffers([input_id, output_id]))?;
//! assert_eq!(output.fold(3).unwrap()[2][1], 9.0);
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
mod fold;
pub mod function;

pub use buffer::{BufferId, BufferView, MAX_BUFFER_BYTES};
pub use cache::{Handle, HandleCache};
pub use config::{BackendType, ContextConfig};
pub use context::Context;
pub use error::{CacheError, Error, ErrorKind, Operation, Reason, Result};
pub use fold::{fold, fold_mut};
pub use function::{FunctionId, Grid, RunParameters};

pub use gridlane_backends::{
    ArgumentTable, CpuConfig, DeviceSlice, Element, ElementKind, Lane, PipelineLimits, Scalar,
};
