//! Library, function and pipeline objects for the Metal backend

use metal::{ComputePipelineState, Device, Function, Library};

use super::executor::MetalQueue;
use crate::backend::{KernelFunction, Module, Pipeline, PipelineLimits, SubmissionQueue};
use crate::error::{DriverError, Result};

pub(crate) struct MetalModule {
    device: Device,
    library: Library,
}

impl MetalModule {
    pub(crate) fn new(device: Device, library: Library) -> Self {
        Self { device, library }
    }
}

impl Module for MetalModule {
    fn function(&self, name: &str) -> Option<Box<dyn KernelFunction>> {
        let function = self.library.get_function(name, None).ok()?;
        Some(Box::new(MetalFunction {
            device: self.device.clone(),
            name: name.to_string(),
            function,
        }))
    }

    fn function_names(&self) -> Vec<String> {
        self.library.function_names()
    }
}

struct MetalFunction {
    device: Device,
    name: String,
    function: Function,
}

impl KernelFunction for MetalFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_pipeline(&self) -> Result<Box<dyn Pipeline>> {
        let state = self
            .device
            .new_compute_pipeline_state_with_function(&self.function)
            .map_err(DriverError::Pipeline)?;

        Ok(Box::new(MetalPipeline {
            device: self.device.clone(),
            state,
        }))
    }
}

struct MetalPipeline {
    device: Device,
    state: ComputePipelineState,
}

impl Pipeline for MetalPipeline {
    fn limits(&self) -> PipelineLimits {
        PipelineLimits {
            lockstep_width: self.state.thread_execution_width().min(u64::from(u32::MAX)) as u32,
            max_threads_per_group: self.state.max_total_threads_per_threadgroup().min(u64::from(u32::MAX)) as u32,
        }
    }

    fn new_queue(&self) -> Result<Box<dyn SubmissionQueue>> {
        Ok(Box::new(MetalQueue::new(self.device.new_command_queue(), self.state.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
        #include <metal_stdlib>
        using namespace metal;

        kernel void fill(device uint *out [[buffer(0)]], uint i [[thread_position_in_grid]]) {
            out[i] = i;
        }
    "#;

    fn module() -> MetalModule {
        let device = Device::system_default().unwrap();
        let library = device
            .new_library_with_source(SOURCE, &metal::CompileOptions::new())
            .unwrap();
        MetalModule::new(device, library)
    }

    #[test]
    fn resolves_declared_functions_only() {
        let module = module();
        assert_eq!(module.function_names(), vec!["fill".to_string()]);
        assert!(module.function("fill").is_some());
        assert!(module.function("missing").is_none());
    }

    #[test]
    fn pipeline_reports_device_limits() {
        let pipeline = module().function("fill").unwrap().build_pipeline().unwrap();
        let limits = pipeline.limits();
        assert!(limits.lockstep_width >= 1);
        assert!(limits.max_threads_per_group >= limits.lockstep_width);
    }
}
