//! Metal backend for Apple GPUs
//!
//! Compiles Metal Shading Language source at runtime and dispatches compute
//! kernels on the system default device.
//!
//! # Architecture
//!
//! ```text
//! MetalDriver
//! ├── Device          - system default GPU
//! ├── MetalModule     - compiled Library
//! ├── MetalPipeline   - ComputePipelineState + execution limits
//! ├── MetalQueue      - CommandQueue, one command buffer per dispatch
//! └── MetalBuffer     - StorageModeShared buffer (unified memory)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use gridlane_backends::{Driver, MetalDriver};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let driver = MetalDriver::new()?;
//! let module = driver.compile_module("kernel void noop() {}")?;
//! let pipeline = module.function("noop").unwrap().build_pipeline()?;
//! println!("lockstep width {}", pipeline.limits().lockstep_width);
//! # Ok(())
//! # }
//! ```

#[cfg(target_vendor = "apple")]
mod executor;
#[cfg(target_vendor = "apple")]
mod memory;
#[cfg(target_vendor = "apple")]
mod pipeline;

use std::any::Any;
use std::sync::Arc;

use crate::backend::{DeviceBuffer, Driver, Module};
use crate::error::{DriverError, Result};

#[cfg(target_vendor = "apple")]
use metal::{CompileOptions, Device};

#[cfg(target_vendor = "apple")]
pub use memory::MetalBuffer;

/// Driver for the system default Metal device.
#[cfg(target_vendor = "apple")]
pub struct MetalDriver {
    device: Device,
}

#[cfg(target_vendor = "apple")]
impl MetalDriver {
    /// Open the system default device.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::DeviceUnavailable`] when no Metal device exists.
    pub fn new() -> Result<Self> {
        let device = Device::system_default()
            .ok_or_else(|| DriverError::DeviceUnavailable("no Metal device found".to_string()))?;
        tracing::debug!(device = %device.name(), "metal_device_opened");
        Ok(Self { device })
    }

    /// Check if Metal is available on this system
    pub fn is_available() -> bool {
        Device::system_default().is_some()
    }

    pub fn device_name(&self) -> String {
        self.device.name().to_string()
    }
}

#[cfg(target_vendor = "apple")]
impl Driver for MetalDriver {
    fn backend_name(&self) -> &'static str {
        "metal"
    }

    fn compile_module(&self, source: &str) -> Result<Box<dyn Module>> {
        let library = self
            .device
            .new_library_with_source(source, &CompileOptions::new())
            .map_err(DriverError::Compilation)?;

        Ok(Box::new(pipeline::MetalModule::new(self.device.clone(), library)))
    }

    fn allocate_shared(&self, len_bytes: usize) -> Result<Arc<dyn DeviceBuffer>> {
        Ok(Arc::new(MetalBuffer::new(&self.device, len_bytes)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// Stub implementation for non-Apple platforms
#[cfg(not(target_vendor = "apple"))]
pub struct MetalDriver;

#[cfg(not(target_vendor = "apple"))]
impl MetalDriver {
    pub fn new() -> Result<Self> {
        Err(DriverError::DeviceUnavailable(
            "Metal backend only available on Apple platforms".into(),
        ))
    }

    pub fn is_available() -> bool {
        false
    }
}

#[cfg(not(target_vendor = "apple"))]
impl Driver for MetalDriver {
    fn backend_name(&self) -> &'static str {
        "metal"
    }

    fn compile_module(&self, _source: &str) -> Result<Box<dyn Module>> {
        Err(DriverError::unsupported("Metal backend only available on Apple platforms"))
    }

    fn allocate_shared(&self, _len_bytes: usize) -> Result<Arc<dyn DeviceBuffer>> {
        Err(DriverError::unsupported("Metal backend only available on Apple platforms"))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}


#[cfg(test)]
#[cfg(target_vendor = "apple")]
mod tests {
    use super::*;

    #[test]
    fn metal_availability() {
        assert!(MetalDriver::is_available());
    }

    #[test]
    fn invalid_source_reports_compiler_output() {
        let driver = MetalDriver::new().unwrap();
        let err = driver.compile_module("invalid").err().unwrap();
        assert!(matches!(err, DriverError::Compilation(_)));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn shared_buffer_is_host_visible() {
        let driver = MetalDriver::new().unwrap();
        let buffer = driver.allocate_shared(16).unwrap();
        assert_eq!(buffer.len_bytes(), 16);

        let bytes = unsafe { std::slice::from_raw_parts_mut(buffer.contents().as_ptr(), 16) };
        bytes.copy_from_slice(b"Hello, Metal!!!!");
        let again = unsafe { std::slice::from_raw_parts(buffer.contents().as_ptr(), 16) };
        assert_eq!(again, b"Hello, Metal!!!!");
    }
}
