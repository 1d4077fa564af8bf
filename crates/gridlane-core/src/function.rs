//! Compiled compute functions and the dispatch protocol
//!
//! A compute function is compiled once into a record of (entry point,
//! pipeline, queue) and then run any number of times, from any thread, over a
//! 3-D grid of threads:
//!
//! 1. every grid axis below 1 is treated as 1;
//! 2. the execution group is `lockstep_width` lanes wide and
//!    `max_threads_per_group / lockstep_width` rows tall;
//! 3. scalars bind to argument slots `0..s`, buffers to `s..s+b`, each in
//!    the order given;
//! 4. the dispatch is submitted and the caller blocks until it completes.

use std::fmt;

use gridlane_backends::{Driver, GridDim, GroupDim, KernelFunction, Pipeline, PipelineLimits, Scalar, SubmissionQueue};

use crate::buffer::BufferId;
use crate::cache::Handle;
use crate::error::Reason;

/// Handle of a compute function stored in a [`crate::Context`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId(pub(crate) Handle);

impl FunctionId {
    /// Wrap a raw handle, e.g. one received over an FFI boundary.
    pub const fn from_raw(handle: Handle) -> Self {
        Self(handle)
    }

    pub const fn raw(self) -> Handle {
        self.0
    }

    /// `true` for handles that could reference a function (strictly positive).
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl From<FunctionId> for Handle {
    fn from(id: FunctionId) -> Self {
        id.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function #{}", self.0)
    }
}

/// Logical size of the index space, one thread per position.
///
/// Unused axes should be 1; anything below 1 is normalized to 1 at dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Grid {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Grid {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Create 1D grid
    pub const fn linear(x: i32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    /// Create 2D grid
    pub const fn planar(x: i32, y: i32) -> Self {
        Self { x, y, z: 1 }
    }

    /// Grid with every axis clamped to at least 1
    pub fn normalized(self) -> GridDim {
        GridDim::new(axis(self.x), axis(self.y), axis(self.z))
    }
}

fn axis(value: i32) -> u32 {
    value.max(1).unsigned_abs()
}

/// Everything one [`crate::Context::run`] call needs.
///
/// ```rust
/// use gridlane_core::{BufferId, Grid, RunParameters};
///
/// let params = RunParameters::new(Grid::planar(640, 480))
///     .scalar(0.5f32)
///     .scalar(3u32)
///     .buffers([BufferId::from_raw(1), BufferId::from_raw(2)]);
/// assert_eq!(params.scalars.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunParameters {
    pub grid: Grid,
    /// Bound first, by value, in order
    pub scalars: Vec<Scalar>,
    /// Bound after the scalars, by reference, in order
    pub buffers: Vec<BufferId>,
}

impl RunParameters {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            ..Self::default()
        }
    }

    pub fn scalar(mut self, value: impl Into<Scalar>) -> Self {
        self.scalars.push(value.into());
        self
    }

    pub fn buffer(mut self, id: BufferId) -> Self {
        self.buffers.push(id);
        self
    }

    pub fn buffers(mut self, ids: impl IntoIterator<Item = BufferId>) -> Self {
        self.buffers.extend(ids);
        self
    }
}

/// What the cache keeps for one compiled function. Immutable once built.
pub(crate) struct FunctionRecord {
    function: Box<dyn KernelFunction>,
    pipeline: Box<dyn Pipeline>,
    queue: Box<dyn SubmissionQueue>,
}

impl FunctionRecord {
    pub(crate) fn name(&self) -> &str {
        self.function.name()
    }

    pub(crate) fn group_shape(&self) -> GroupDim {
        group_shape(self.pipeline.limits())
    }

    pub(crate) fn queue(&self) -> &dyn SubmissionQueue {
        self.queue.as_ref()
    }
}

/// Run the compile chain for `entry` in `source`.
///
/// Each stage either succeeds or ends the attempt; nothing is kept from a
/// failed attempt.
pub(crate) fn compile(driver: &dyn Driver, source: &str, entry: &str) -> Result<FunctionRecord, Reason> {
    if source.is_empty() {
        return Err(Reason::MissingCode);
    }
    if entry.is_empty() {
        return Err(Reason::MissingFunctionName);
    }

    let module = driver.compile_module(source).map_err(Reason::CreateLibrary)?;
    let function = module
        .function(entry)
        .ok_or_else(|| Reason::FunctionNotFound(entry.to_string()))?;
    let pipeline = function.build_pipeline().map_err(Reason::CreatePipeline)?;
    let queue = pipeline.new_queue().map_err(Reason::CreateQueue)?;

    Ok(FunctionRecord {
        function,
        pipeline,
        queue,
    })
}

/// Execution-group shape for a pipeline: one lockstep unit wide, as many
/// rows as the group limit allows, never empty.
pub(crate) fn group_shape(limits: PipelineLimits) -> GroupDim {
    let lockstep = limits.lockstep_width.max(1);
    let rows = (limits.max_threads_per_group / lockstep).max(1);
    GroupDim::new(lockstep, rows, 1)
}
