//! The dispatch context
//!
//! A [`Context`] owns one driver and the handle cache for everything created
//! through it. It is `Send + Sync`; share it behind an `Arc` and call
//! [`Context::run`] from as many threads as needed.

use std::sync::Arc;

use gridlane_backends::{
    Argument, ArgumentTable, CpuDriver, Dispatch, Driver, Element, ElementKind, Lane, MetalDriver,
};
use gridlane_tracing::perf_span;

use crate::buffer::{measure, BufferId, BufferRecord, BufferView};
use crate::cache::{Handle, HandleCache};
use crate::config::{BackendType, ContextConfig};
use crate::error::{CacheError, Error, Operation, Reason, Result};
use crate::function::{self, FunctionId, FunctionRecord, RunParameters};

#[derive(Clone)]
enum Resource {
    Function(Arc<FunctionRecord>),
    Buffer(BufferRecord),
}

/// Entry point for compiling functions, allocating buffers and running
/// dispatches on one backend.
///
/// # Example
///
/// ```rust
/// use gridlane_core::{Context, Grid, RunParameters};
///
/// # fn main() -> Result<(), gridlane_core::Error> {
/// let ctx = Context::new();
/// ctx.register_host_kernel("scale", |lane, args| {
///     let factor = args.scalar::<f32>(0).unwrap_or(1.0);
///     if let Some(data) = args.buffer(1) {
///         let i = lane.x() as usize;
///         if let Some(value) = data.load::<f32>(i) {
///             data.store(i, value * factor);
///         }
///     }
/// })?;
///
/// let scale = ctx.compile_function("kernel void scale(constant float &f, device float *d) {}", "scale")?;
/// let (id, mut data) = ctx.allocate_buffer_1d::<f32>(4)?;
/// data.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
///
/// ctx.run(scale, &RunParameters::new(Grid::linear(4)).scalar(2.0f32).buffer(id))?;
/// assert_eq!(&data[..], &[2.0, 4.0, 6.0, 8.0]);
/// # Ok(())
/// # }
/// ```
pub struct Context {
    driver: Arc<dyn Driver>,
    cache: HandleCache<Resource>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a context on the CPU reference backend with default limits.
    pub fn new() -> Self {
        Self::with_driver(Arc::new(CpuDriver::default()))
    }

    /// Create a context on an explicit backend.
    ///
    /// # Errors
    ///
    /// Returns an [`crate::ErrorKind::Device`] error if the backend has no
    /// usable device on this system.
    #[tracing::instrument]
    pub fn new_with_backend(backend: BackendType) -> Result<Self> {
        Self::with_config(ContextConfig {
            backend: Some(backend),
            ..ContextConfig::default()
        })
    }

    /// Create a context on the best available backend: Metal if a device is
    /// present, otherwise the CPU backend.
    #[tracing::instrument]
    pub fn new_auto() -> Self {
        Self::auto(ContextConfig::default())
    }

    /// Create a context from a [`ContextConfig`].
    #[tracing::instrument]
    pub fn with_config(config: ContextConfig) -> Result<Self> {
        let start = std::time::Instant::now();

        let driver: Arc<dyn Driver> = match config.backend {
            Some(BackendType::Cpu) => Arc::new(CpuDriver::new(config.cpu)),
            Some(BackendType::Metal) => {
                let metal = MetalDriver::new().map_err(|err| Error::logged(Operation::OpenDevice, Reason::Device(err)))?;
                Arc::new(metal)
            }
            None => return Ok(Self::auto(config)),
        };

        let duration_us = start.elapsed().as_micros() as u64;
        tracing::debug!(
            duration_us = duration_us,
            backend = driver.backend_name(),
            "context_created"
        );

        Ok(Self::with_driver(driver))
    }

    /// Wrap an existing driver.
    pub fn with_driver(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            cache: HandleCache::new(),
        }
    }

    fn auto(config: ContextConfig) -> Self {
        if MetalDriver::is_available() {
            if let Ok(metal) = MetalDriver::new() {
                tracing::info!("Auto-selected Metal backend");
                return Self::with_driver(Arc::new(metal));
            }
        }

        tracing::info!("Auto-selected CPU backend (fallback)");
        Self::with_driver(Arc::new(CpuDriver::new(config.cpu)))
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn backend_name(&self) -> &'static str {
        self.driver.backend_name()
    }

    /// Back entry point `name` with a host closure. Only the CPU backend runs
    /// host kernels; register before compiling functions that use `name`.
    pub fn register_host_kernel<F>(&self, name: impl Into<String>, kernel: F) -> Result<()>
    where
        F: Fn(Lane, &ArgumentTable<'_>) + Send + Sync + 'static,
    {
        let cpu = self.driver.as_any().downcast_ref::<CpuDriver>().ok_or_else(|| {
            Error::logged(
                Operation::SetUpFunction,
                Reason::HostKernelsUnsupported {
                    backend: self.driver.backend_name(),
                },
            )
        })?;
        cpu.register(name, kernel);
        Ok(())
    }

    /// Compile entry point `entry` from `source` and store it.
    ///
    /// Checks, in order: non-empty source, non-empty entry name, module
    /// build, entry point lookup, pipeline build, queue creation. A failed
    /// attempt stores nothing.
    #[tracing::instrument(skip(self, source), fields(source_len = source.len()))]
    pub fn compile_function(&self, source: &str, entry: &str) -> Result<FunctionId> {
        let start = std::time::Instant::now();

        let record = function::compile(self.driver.as_ref(), source, entry)
            .map_err(|reason| Error::logged(Operation::SetUpFunction, reason))?;
        let group = record.group_shape();

        let handle = self
            .cache
            .store(Resource::Function(Arc::new(record)))
            .map_err(|err| Error::logged(Operation::SetUpFunction, err))?;

        let duration_us = start.elapsed().as_micros() as u64;
        tracing::debug!(
            duration_us = duration_us,
            function = handle,
            group = %group,
            "function_compiled"
        );

        Ok(FunctionId(handle))
    }

    /// Entry point name of `id`, or `""` if `id` does not reference a live
    /// function.
    pub fn function_name(&self, id: FunctionId) -> String {
        self.fetch_function(id)
            .map(|record| record.name().to_string())
            .unwrap_or_default()
    }

    /// Run a compiled function and block until the device is done.
    ///
    /// Buffers are resolved in order and the first unknown id aborts the run
    /// without looking at the rest.
    #[tracing::instrument(skip(self, params), fields(
        function = id.raw(),
        scalars = params.scalars.len(),
        buffers = params.buffers.len()
    ))]
    pub fn run(&self, id: FunctionId, params: &RunParameters) -> Result<()> {
        let failed = |reason: Reason| Error::logged(Operation::RunFunction, reason);

        let function = self.fetch_function(id).map_err(|err| failed(Reason::RetrieveFunction(err)))?;

        let count = params.buffers.len();
        let mut regions = Vec::with_capacity(count);
        for (index, &buffer_id) in params.buffers.iter().enumerate() {
            let record = self.fetch_buffer(buffer_id).map_err(|source| {
                failed(Reason::RetrieveBuffer {
                    position: index + 1,
                    count,
                    id: buffer_id.raw(),
                    source,
                })
            })?;
            regions.push(record.memory);
        }

        let grid = params.grid.normalized();
        let group = function.group_shape();

        let mut arguments = Vec::with_capacity(params.scalars.len() + count);
        arguments.extend(params.scalars.iter().map(|scalar| Argument::Bytes(scalar.as_bytes())));
        arguments.extend(regions.iter().map(|region| Argument::Buffer(region.as_ref())));

        let _span = perf_span!("run_function", function = id.raw(), threads = grid.total_threads());
        function
            .queue()
            .submit(&Dispatch {
                grid,
                group,
                arguments: &arguments,
            })
            .map_err(|err| failed(Reason::Execution(err)))?;

        tracing::debug!(%grid, %group, "function_run");
        Ok(())
    }

    /// Allocate a zeroed buffer of `T` with the given dimensions.
    ///
    /// The buffer holds the product of `dims` elements; the returned view is
    /// flat, use [`crate::fold()`] to reshape it.
    ///
    /// # Errors
    ///
    /// - `missing dimension(s)` if `dims` is empty
    /// - `invalid dimension` if any dimension is below 1
    /// - `exceeded maximum bytes` if the byte size passes `i32::MAX`
    pub fn allocate_buffer<T: Element>(&self, dims: &[i64]) -> Result<(BufferId, BufferView<T>)> {
        let (id, record) = self.allocate_region(T::KIND, dims)?;
        Ok((id, BufferView::new(record.memory, record.element_count)))
    }

    pub fn allocate_buffer_1d<T: Element>(&self, width: i64) -> Result<(BufferId, BufferView<T>)> {
        self.allocate_buffer(&[width])
    }

    pub fn allocate_buffer_2d<T: Element>(&self, width: i64, height: i64) -> Result<(BufferId, BufferView<T>)> {
        self.allocate_buffer(&[width, height])
    }

    pub fn allocate_buffer_3d<T: Element>(
        &self,
        width: i64,
        height: i64,
        depth: i64,
    ) -> Result<(BufferId, BufferView<T>)> {
        self.allocate_buffer(&[width, height, depth])
    }

    /// Allocate a 1-D buffer holding a copy of `data`.
    pub fn allocate_buffer_with<T: Element>(&self, data: &[T]) -> Result<(BufferId, BufferView<T>)> {
        let len = i64::try_from(data.len()).unwrap_or(i64::MAX);
        let (id, mut view) = self.allocate_buffer::<T>(&[len])?;
        view.copy_from_slice(data);
        Ok((id, view))
    }

    /// Allocate a buffer of `kind` elements and view it as raw bytes.
    ///
    /// Use [`BufferView::reinterpret`] to get a typed view.
    pub fn allocate_bytes(&self, kind: ElementKind, dims: &[i64]) -> Result<(BufferId, BufferView<u8>)> {
        let (id, record) = self.allocate_region(kind, dims)?;
        let byte_len = record.element_count * kind.size_bytes();
        Ok((id, BufferView::new(record.memory, byte_len)))
    }

    /// Element kind `id` was allocated with, if it is a live buffer.
    pub fn buffer_kind(&self, id: BufferId) -> Option<ElementKind> {
        self.fetch_buffer(id).ok().map(|record| record.kind)
    }

    #[tracing::instrument(skip_all, fields(kind = %kind, dims = ?dims))]
    fn allocate_region(&self, kind: ElementKind, dims: &[i64]) -> Result<(BufferId, BufferRecord)> {
        let start = std::time::Instant::now();
        let failed = |reason: Reason| Error::logged(Operation::CreateBuffer, reason);

        let extent = measure(kind, dims).map_err(failed)?;
        let memory = self
            .driver
            .allocate_shared(extent.byte_len)
            .map_err(|err| failed(Reason::Allocate(err)))?;

        let record = BufferRecord {
            kind,
            element_count: extent.element_count,
            memory,
        };
        let handle = self
            .cache
            .store(Resource::Buffer(record.clone()))
            .map_err(|err| failed(err.into()))?;

        let duration_us = start.elapsed().as_micros() as u64;
        tracing::debug!(
            duration_us = duration_us,
            buffer = handle,
            size_bytes = extent.byte_len,
            "buffer_allocated"
        );

        Ok((BufferId(handle), record))
    }

    /// Drop the context's reference to a function or buffer.
    ///
    /// The handle stays retired: it is never reissued and every later lookup
    /// fails. Views of a released buffer keep its memory alive until they are
    /// dropped.
    #[tracing::instrument(skip(self, handle))]
    pub fn release(&self, handle: impl Into<Handle>) -> Result<()> {
        let handle = handle.into();
        self.cache
            .remove(handle)
            .map_err(|err| Error::logged(Operation::ReleaseResource, err))?;
        tracing::debug!(handle, "resource_released");
        Ok(())
    }

    /// Handles issued so far, released ones included
    pub fn handle_count(&self) -> usize {
        self.cache.len()
    }

    /// Resources still held by the context
    pub fn live_resources(&self) -> usize {
        self.cache.live()
    }

    fn fetch_function(&self, id: FunctionId) -> std::result::Result<Arc<FunctionRecord>, CacheError> {
        match self.cache.fetch(id.0)? {
            Resource::Function(record) => Ok(record),
            Resource::Buffer(_) => Err(CacheError::WrongKind {
                handle: id.0,
                expected: "function",
            }),
        }
    }

    fn fetch_buffer(&self, id: BufferId) -> std::result::Result<BufferRecord, CacheError> {
        match self.cache.fetch(id.0)? {
            Resource::Buffer(record) => Ok(record),
            Resource::Function(_) => Err(CacheError::WrongKind {
                handle: id.0,
                expected: "buffer",
            }),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("backend", &self.driver.backend_name())
            .field("handles", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::function::Grid;

    fn context_with_noop() -> (Context, FunctionId) {
        let ctx = Context::new();
        ctx.register_host_kernel("noop", |_: Lane, _: &ArgumentTable<'_>| {}).unwrap();
        let id = ctx.compile_function("kernel void noop() {}", "noop").unwrap();
        (ctx, id)
    }

    #[test]
    fn handles_are_shared_across_kinds() {
        let (ctx, function) = context_with_noop();
        let (buffer, _view) = ctx.allocate_buffer_1d::<f32>(4).unwrap();
        assert_eq!(function.raw(), 1);
        assert_eq!(buffer.raw(), 2);
        assert_eq!(ctx.handle_count(), 2);
    }

    #[test]
    fn function_name_is_empty_for_non_functions() {
        let (ctx, function) = context_with_noop();
        let (buffer, _view) = ctx.allocate_buffer_1d::<u8>(1).unwrap();

        assert_eq!(ctx.function_name(function), "noop");
        assert_eq!(ctx.function_name(FunctionId::from_raw(buffer.raw())), "");
        assert_eq!(ctx.function_name(FunctionId::default()), "");
        assert_eq!(ctx.function_name(FunctionId::from_raw(99)), "");

        ctx.release(function).unwrap();
        assert_eq!(ctx.function_name(function), "");
    }

    #[test]
    fn functions_are_not_buffers() {
        let (ctx, function) = context_with_noop();
        let err = ctx
            .run(function, &RunParameters::new(Grid::default()).buffer(BufferId::from_raw(function.raw())))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "unable to run function: failed to retrieve buffer 1/1 using id 1");
    }

    #[test]
    fn empty_dispatch_is_a_no_op() {
        let (ctx, function) = context_with_noop();
        ctx.run(function, &RunParameters::default()).unwrap();
        ctx.run(function, &RunParameters::new(Grid::new(-1, -1, -1))).unwrap();
    }

    #[test]
    fn release_retires_handles() {
        let ctx = Context::new();
        let (buffer, mut view) = ctx.allocate_buffer_with(&[1u16, 2, 3]).unwrap();
        assert_eq!(ctx.buffer_kind(buffer), Some(ElementKind::U16));

        ctx.release(buffer).unwrap();
        assert_eq!(ctx.buffer_kind(buffer), None);
        assert_eq!(ctx.live_resources(), 0);

        // memory outlives the handle
        view[0] = 9;
        assert_eq!(&view[..], &[9, 2, 3]);

        let err = ctx.release(buffer).unwrap_err();
        assert_eq!(err.to_string(), "unable to release resource: handle 1 has been released");
        let err = ctx.release(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let (next, _) = ctx.allocate_buffer_1d::<u8>(1).unwrap();
        assert_eq!(next.raw(), 2);
    }

    #[test]
    fn allocate_bytes_matches_kind() {
        let ctx = Context::new();
        let (id, bytes) = ctx.allocate_bytes(ElementKind::F64, &[3, 2]).unwrap();
        assert_eq!(bytes.len(), 48);
        assert_eq!(ctx.buffer_kind(id), Some(ElementKind::F64));

        let doubles = bytes.reinterpret::<f64>().unwrap();
        assert_eq!(doubles.len(), 6);
    }

    #[test]
    fn allocation_errors_store_nothing() {
        let ctx = Context::new();
        let err = ctx.allocate_buffer::<f32>(&[]).unwrap_err();
        assert_eq!(err.to_string(), "unable to create buffer: missing dimension(s)");
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = ctx.allocate_buffer_2d::<f32>(10, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("invalid dimension"));

        let err = ctx.allocate_buffer_1d::<f32>(1 << 31).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overflow);
        assert!(err.to_string().contains("exceeded maximum bytes"));

        let err = ctx.allocate_buffer_with::<u8>(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(ctx.handle_count(), 0);
    }

    #[test]
    fn failed_compile_stores_nothing() {
        let ctx = Context::new();
        let err = ctx.compile_function("kernel void ghost() {}", "ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Compile);
        assert!(err.to_string().starts_with("unable to set up function: failed to create pipeline"));
        assert_eq!(ctx.handle_count(), 0);
    }

    #[test]
    #[cfg(not(target_vendor = "apple"))]
    fn host_kernels_need_the_cpu_backend() {
        let ctx = Context::with_driver(Arc::new(MetalDriver));
        let err = ctx
            .register_host_kernel("noop", |_: Lane, _: &ArgumentTable<'_>| {})
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "unable to set up function: host kernels are not supported by the metal backend"
        );
    }
}
