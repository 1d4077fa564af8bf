//! Backend interface and shared types

mod traits;
mod types;

pub use traits::{DeviceBuffer, Driver, KernelFunction, Module, Pipeline, SubmissionQueue};
pub use types::{Argument, Dispatch, Element, ElementKind, GridDim, GroupDim, PipelineLimits, Scalar};
