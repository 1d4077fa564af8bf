//! Driver implementations for different execution targets
//!
//! This module contains:
//! - `cpu` - CPU reference backend (host kernels, rayon execution groups)
//! - `metal` - Metal GPU backend (Apple platforms)

pub mod cpu;
pub mod metal;

// Re-export drivers
pub use cpu::{ArgumentTable, CpuConfig, CpuDriver, DeviceSlice, HostBuffer, HostKernel, Lane};
pub use metal::MetalDriver;
