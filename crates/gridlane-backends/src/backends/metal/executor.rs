//! Dispatch submission for the Metal backend

use metal::{BufferRef, CommandQueue, ComputePipelineState, MTLCommandBufferStatus, MTLSize};

use gridlane_tracing::perf_span;

use super::memory::MetalBuffer;
use crate::backend::{Argument, Dispatch, SubmissionQueue};
use crate::error::{DriverError, Result};

enum Binding<'a> {
    Bytes(&'a [u8]),
    Buffer(&'a BufferRef),
}

pub(crate) struct MetalQueue {
    queue: CommandQueue,
    state: ComputePipelineState,
}

impl MetalQueue {
    pub(crate) fn new(queue: CommandQueue, state: ComputePipelineState) -> Self {
        Self { queue, state }
    }
}

impl SubmissionQueue for MetalQueue {
    fn submit(&self, dispatch: &Dispatch<'_>) -> Result<()> {
        // Resolve every binding before touching the command queue
        let bindings = dispatch
            .arguments
            .iter()
            .enumerate()
            .map(|(slot, argument)| match *argument {
                Argument::Bytes(bytes) => Ok(Binding::Bytes(bytes)),
                Argument::Buffer(buffer) => buffer
                    .as_any()
                    .downcast_ref::<MetalBuffer>()
                    .map(|metal| Binding::Buffer(metal.raw()))
                    .ok_or(DriverError::ForeignBuffer { slot, backend: "metal" }),
            })
            .collect::<Result<Vec<_>>>()?;

        let _span = perf_span!(
            "metal_dispatch",
            threads = dispatch.grid.total_threads(),
            arguments = bindings.len()
        );

        let command_buffer = self.queue.new_command_buffer();
        let encoder = command_buffer.new_compute_command_encoder();
        encoder.set_compute_pipeline_state(&self.state);

        for (slot, binding) in bindings.iter().enumerate() {
            match binding {
                Binding::Bytes(bytes) => {
                    encoder.set_bytes(slot as u64, bytes.len() as u64, bytes.as_ptr().cast());
                }
                Binding::Buffer(buffer) => encoder.set_buffer(slot as u64, Some(*buffer), 0),
            }
        }

        let grid = dispatch.grid;
        let group = dispatch.group;
        encoder.dispatch_threads(
            MTLSize::new(u64::from(grid.x), u64::from(grid.y), u64::from(grid.z)),
            MTLSize::new(u64::from(group.x), u64::from(group.y), u64::from(group.z)),
        );
        encoder.end_encoding();

        command_buffer.commit();
        command_buffer.wait_until_completed();

        if matches!(command_buffer.status(), MTLCommandBufferStatus::Error) {
            tracing::error!(grid = %grid, group = %group, "metal_command_buffer_failed");
            return Err(DriverError::execution("command buffer execution failed"));
        }

        Ok(())
    }
}
