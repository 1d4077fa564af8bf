//! CPU reference backend
//!
//! Runs dispatches on host threads with the same contract as an accelerator
//! backend: kernels are compiled from source text, memory is allocated as
//! shared regions, and every dispatch is split into execution groups that
//! rayon executes in parallel.
//!
//! # Kernel model
//!
//! The CPU backend does not generate code. Kernel source is scanned for
//! `kernel void <name>(` declarations, and each declared entry point is bound
//! to a host kernel registered on the driver under the same name:
//!
//! ```rust
//! use gridlane_backends::{CpuConfig, CpuDriver, Driver};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let driver = CpuDriver::new(CpuConfig::default());
//! driver.register("double", |lane, args| {
//!     let (Some(input), Some(output)) = (args.buffer(0), args.buffer(1)) else {
//!         return;
//!     };
//!     let i = lane.x() as usize;
//!     if let Some(value) = input.load::<f32>(i) {
//!         output.store(i, value * 2.0);
//!     }
//! });
//!
//! let module = driver.compile_module("kernel void double(device float *in, device float *out) {}")?;
//! assert_eq!(module.function_names(), vec!["double".to_string()]);
//! # Ok(())
//! # }
//! ```

mod compiler;
mod executor;
mod memory;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{DeviceBuffer, Driver, GridDim, Module};
use crate::error::{DriverError, Result};

pub use executor::ArgumentTable;
pub use memory::{DeviceSlice, HostBuffer};

use compiler::CpuModule;

pub(crate) type KernelRegistry = Arc<RwLock<HashMap<String, Arc<dyn HostKernel>>>>;

/// Execution limits the CPU backend reports to the dispatch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuConfig {
    /// Lanes treated as one lockstep unit
    pub lockstep_width: u32,
    /// Maximum threads in one execution group
    pub max_threads_per_group: u32,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            lockstep_width: 32,
            max_threads_per_group: 1024,
        }
    }
}

impl CpuConfig {
    /// Clamp to limits a real device could report: at least one lockstep
    /// lane, and a group at least one lockstep unit wide.
    pub fn sanitized(self) -> Self {
        let lockstep_width = self.lockstep_width.max(1);
        Self {
            lockstep_width,
            max_threads_per_group: self.max_threads_per_group.max(lockstep_width),
        }
    }
}

/// Host implementation of a kernel entry point.
///
/// Invoked once per grid position, concurrently from many threads.
pub trait HostKernel: Send + Sync {
    fn invoke(&self, lane: Lane, args: &ArgumentTable<'_>);
}

impl<F> HostKernel for F
where
    F: Fn(Lane, &ArgumentTable<'_>) + Send + Sync,
{
    fn invoke(&self, lane: Lane, args: &ArgumentTable<'_>) {
        self(lane, args)
    }
}

/// Position of one kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lane {
    /// Position in the whole grid
    pub position: [u32; 3],
    /// Position of the execution group in the group grid
    pub group: [u32; 3],
    /// Position inside the execution group
    pub local: [u32; 3],
    /// Size of the dispatch
    pub grid: GridDim,
}

impl Lane {
    pub fn x(&self) -> u32 {
        self.position[0]
    }

    pub fn y(&self) -> u32 {
        self.position[1]
    }

    pub fn z(&self) -> u32 {
        self.position[2]
    }

    /// Offset of this lane in a flat buffer folded as `[x][y][z]`, i.e. the
    /// layout produced by folding by width, then height.
    pub fn folded_index(&self) -> usize {
        let [x, y, z] = self.position.map(u64::from);
        ((x * u64::from(self.grid.y) + y) * u64::from(self.grid.z) + z) as usize
    }
}

/// Driver for the CPU reference backend.
pub struct CpuDriver {
    config: CpuConfig,
    kernels: KernelRegistry,
}

impl CpuDriver {
    pub fn new(config: CpuConfig) -> Self {
        Self {
            config: config.sanitized(),
            kernels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> CpuConfig {
        self.config
    }

    /// Register (or replace) the host kernel backing entry point `name`.
    ///
    /// Only modules resolved after the call see the new kernel.
    pub fn register<F>(&self, name: impl Into<String>, kernel: F)
    where
        F: Fn(Lane, &ArgumentTable<'_>) + Send + Sync + 'static,
    {
        self.register_kernel(name, Arc::new(kernel));
    }

    /// Register an already shared kernel.
    pub fn register_kernel(&self, name: impl Into<String>, kernel: Arc<dyn HostKernel>) {
        let name = name.into();
        tracing::debug!(kernel = %name, "cpu_kernel_registered");
        self.kernels.write().insert(name, kernel);
    }

    /// Names of registered host kernels, sorted.
    pub fn registered_kernels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.kernels.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for CpuDriver {
    fn default() -> Self {
        Self::new(CpuConfig::default())
    }
}

impl Driver for CpuDriver {
    fn backend_name(&self) -> &'static str {
        "cpu"
    }

    fn compile_module(&self, source: &str) -> Result<Box<dyn Module>> {
        let declared = compiler::declared_kernels(source);
        if declared.is_empty() {
            return Err(DriverError::Compilation(
                "source declares no kernel functions".to_string(),
            ));
        }

        Ok(Box::new(CpuModule::new(declared, Arc::clone(&self.kernels), self.config)))
    }

    fn allocate_shared(&self, len_bytes: usize) -> Result<Arc<dyn DeviceBuffer>> {
        Ok(Arc::new(HostBuffer::zeroed(len_bytes)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
