//! Dispatch execution for the CPU backend
//!
//! A dispatch is cut into execution groups exactly the way a device would cut
//! it. Groups run in parallel on the rayon pool; lanes inside a group run in
//! order on one thread. Groups on the grid edge are clipped so no lane ever
//! sees a position outside the grid.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use gridlane_tracing::perf_span;
use rayon::prelude::*;

use super::memory::DeviceSlice;
use super::{HostKernel, Lane};
use crate::backend::{Argument, Dispatch, Element, GridDim, GroupDim, SubmissionQueue};
use crate::error::{DriverError, Result};

/// Arguments bound to one dispatch, as seen by a host kernel.
#[derive(Debug)]
pub struct ArgumentTable<'a> {
    slots: Vec<Slot<'a>>,
}

#[derive(Debug)]
enum Slot<'a> {
    Bytes(&'a [u8]),
    Buffer(DeviceSlice<'a>),
}

impl<'a> ArgumentTable<'a> {
    pub(crate) fn bind(arguments: &[Argument<'a>]) -> Self {
        let slots = arguments
            .iter()
            .map(|argument| match *argument {
                Argument::Bytes(bytes) => Slot::Bytes(bytes),
                Argument::Buffer(buffer) => Slot::Buffer(DeviceSlice::new(buffer)),
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Scalar bound at `slot`, if that slot holds exactly one `T`.
    pub fn scalar<T: Element>(&self, slot: usize) -> Option<T> {
        match self.slots.get(slot)? {
            Slot::Bytes(bytes) => bytemuck::try_pod_read_unaligned(bytes).ok(),
            Slot::Buffer(_) => None,
        }
    }

    /// Buffer bound at `slot`.
    pub fn buffer(&self, slot: usize) -> Option<DeviceSlice<'a>> {
        match self.slots.get(slot)? {
            Slot::Buffer(buffer) => Some(*buffer),
            Slot::Bytes(_) => None,
        }
    }
}

pub(crate) struct CpuQueue {
    name: Arc<str>,
    kernel: Arc<dyn HostKernel>,
}

impl CpuQueue {
    pub(crate) fn new(name: Arc<str>, kernel: Arc<dyn HostKernel>) -> Self {
        Self { name, kernel }
    }
}

impl SubmissionQueue for CpuQueue {
    fn submit(&self, dispatch: &Dispatch<'_>) -> Result<()> {
        let Dispatch { grid, group, arguments } = *dispatch;
        if group.total_lanes() == 0 {
            return Err(DriverError::execution(format!("invalid execution group shape {group}")));
        }

        let groups = group.groups_to_cover(grid);
        let table = ArgumentTable::bind(arguments);
        let kernel = self.kernel.as_ref();

        let _span = perf_span!(
            "cpu_dispatch",
            kernel = &*self.name,
            threads = grid.total_threads(),
            groups = groups.total_threads()
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            (0..groups.total_threads())
                .into_par_iter()
                .for_each(|index| run_group(kernel, &table, grid, group, groups, index));
        }));

        outcome.map_err(|payload| {
            let message = panic_message(payload.as_ref());
            tracing::error!(kernel = &*self.name, %message, "cpu_kernel_panicked");
            DriverError::execution(format!("kernel '{}' panicked: {message}", self.name))
        })
    }
}

fn run_group(
    kernel: &dyn HostKernel,
    table: &ArgumentTable<'_>,
    grid: GridDim,
    group: GroupDim,
    groups: GridDim,
    index: u64,
) {
    let per_plane = u64::from(groups.x) * u64::from(groups.y);
    let group_pos = [
        (index % u64::from(groups.x)) as u32,
        ((index / u64::from(groups.x)) % u64::from(groups.y)) as u32,
        (index / per_plane) as u32,
    ];

    let extent = [
        axis_range(group_pos[0], group.x, grid.x),
        axis_range(group_pos[1], group.y, grid.y),
        axis_range(group_pos[2], group.z, grid.z),
    ];

    for z in extent[2].0..extent[2].1 {
        for y in extent[1].0..extent[1].1 {
            for x in extent[0].0..extent[0].1 {
                let lane = Lane {
                    position: [x, y, z],
                    group: group_pos,
                    local: [x - extent[0].0, y - extent[1].0, z - extent[2].0],
                    grid,
                };
                kernel.invoke(lane, table);
            }
        }
    }
}

/// Half-open lane range of group `position` along one axis, clipped to the grid.
fn axis_range(position: u32, width: u32, limit: u32) -> (u32, u32) {
    let start = u64::from(position) * u64::from(width);
    let end = (start + u64::from(width)).min(u64::from(limit));
    (start.min(u64::from(limit)) as u32, end as u32)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
