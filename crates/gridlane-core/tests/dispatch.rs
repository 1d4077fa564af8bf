//! Integration tests for the dispatch protocol on the CPU backend
//!
//! Kernels are host closures registered under the entry point names the
//! source declares; the tests check grid coverage, argument binding order
//! and buffer aliasing end to end.

use std::sync::Arc;
use std::thread;

use gridlane_core::{
    fold, fold_mut, ArgumentTable, BufferId, Context, Element, ErrorKind, Grid, Lane, RunParameters,
};

const TRANSFER_SOURCE: &str = r#"
    #include <metal_stdlib>
    using namespace metal;

    kernel void transfer1D(device const float *input, device float *result, uint i [[thread_position_in_grid]]) {
        result[i] = input[i];
    }

    kernel void transfer2D(device const float *input, device float *result, uint2 pos [[thread_position_in_grid]]) {}
    kernel void transfer3D(device const float *input, device float *result, uint3 pos [[thread_position_in_grid]]) {}
"#;

fn transfer<T: Element>(lane: Lane, args: &ArgumentTable<'_>) {
    let (Some(input), Some(output)) = (args.buffer(0), args.buffer(1)) else {
        return;
    };
    let i = lane.folded_index();
    if let Some(value) = input.load::<T>(i) {
        output.store(i, value);
    }
}

fn transfer_context() -> Context {
    let ctx = Context::new();
    for name in ["transfer1D", "transfer2D", "transfer3D"] {
        ctx.register_host_kernel(name, transfer::<f32>).unwrap();
    }
    ctx
}

#[test]
fn transfer_1d_round_trip() -> gridlane_core::Result<()> {
    let ctx = transfer_context();
    let function = ctx.compile_function(TRANSFER_SOURCE, "transfer1D")?;

    let width = 100_000;
    let (input_id, mut input) = ctx.allocate_buffer_1d::<f32>(width)?;
    let (output_id, output) = ctx.allocate_buffer_1d::<f32>(width)?;
    for (i, value) in input.iter_mut().enumerate() {
        *value = i as f32;
    }

    let params = RunParameters::new(Grid::linear(width as i32)).buffers([input_id, output_id]);
    ctx.run(function, &params)?;
    assert_eq!(&input[..], &output[..]);

    // mutate the input in place and run again
    for value in input.iter_mut() {
        *value *= 2.0;
    }
    ctx.run(function, &params)?;
    assert_eq!(output[0], 0.0);
    assert_eq!(output[99_999], 199_998.0);
    assert_eq!(&input[..], &output[..]);

    Ok(())
}

#[test]
fn transfer_2d_round_trip() -> gridlane_core::Result<()> {
    let ctx = transfer_context();
    let function = ctx.compile_function(TRANSFER_SOURCE, "transfer2D")?;

    let (width, height) = (100, 37);
    let (input_id, mut input) = ctx.allocate_buffer_2d::<f32>(width, height)?;
    let (output_id, output) = ctx.allocate_buffer_2d::<f32>(width, height)?;

    for (i, row) in input.fold_mut(width).unwrap().into_iter().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (i as i64 * height + j as i64) as f32;
        }
    }

    ctx.run(
        function,
        &RunParameters::new(Grid::planar(width as i32, height as i32)).buffers([input_id, output_id]),
    )?;

    let rows = output.fold(width).unwrap();
    for i in 0..width as usize {
        for j in 0..height as usize {
            assert_eq!(rows[i][j], (i * height as usize + j) as f32);
        }
    }

    Ok(())
}

#[test]
fn transfer_3d_round_trip() -> gridlane_core::Result<()> {
    let ctx = transfer_context();
    let function = ctx.compile_function(TRANSFER_SOURCE, "transfer3D")?;

    let (width, height, depth) = (20, 15, 9);
    let (input_id, mut input) = ctx.allocate_buffer_3d::<f32>(width, height, depth)?;
    let (output_id, output) = ctx.allocate_buffer_3d::<f32>(width, height, depth)?;

    {
        let mut rows = fold_mut(&mut input[..], width * height).unwrap();
        let mut cube = fold_mut(&mut rows, width).unwrap();
        for x in 0..width as usize {
            for y in 0..height as usize {
                for z in 0..depth as usize {
                    cube[x][y][z] = ((x * 100 + y) * 100 + z) as f32;
                }
            }
        }
    }

    let grid = Grid::new(width as i32, height as i32, depth as i32);
    ctx.run(function, &RunParameters::new(grid).buffers([input_id, output_id]))?;

    let rows = fold(&output[..], width * height).unwrap();
    let cube = fold(&rows, width).unwrap();
    assert_eq!(cube[0][0][0], 0.0);
    assert_eq!(cube[19][14][8], 191_408.0);
    assert_eq!(cube[3][2][1], 30_201.0);
    assert_eq!(&input[..], &output[..]);

    Ok(())
}

#[test]
fn missing_function_and_buffers_are_reported() {
    let ctx = Context::new();
    ctx.register_host_kernel("noop", |_: Lane, _: &ArgumentTable<'_>| {}).unwrap();
    let function = ctx.compile_function("kernel void noop() {}", "noop").unwrap();

    let err = ctx
        .run(Default::default(), &RunParameters::default())
        .unwrap_err();
    assert_eq!(err.to_string(), "unable to run function: failed to retrieve function");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = ctx
        .run(function, &RunParameters::default().buffer(BufferId::from_raw(10000)))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "unable to run function: failed to retrieve buffer 1/1 using id 10000"
    );

    ctx.run(function, &RunParameters::new(Grid::new(-1, -1, -1))).unwrap();
}

#[test]
fn buffer_resolution_stops_at_first_bad_id() {
    let ctx = Context::new();
    ctx.register_host_kernel("noop", |_: Lane, _: &ArgumentTable<'_>| {}).unwrap();
    let function = ctx.compile_function("kernel void noop() {}", "noop").unwrap();
    let (good, _view) = ctx.allocate_buffer_1d::<u8>(4).unwrap();

    let params = RunParameters::default().buffers([good, BufferId::from_raw(-3), BufferId::from_raw(77)]);
    let err = ctx.run(function, &params).unwrap_err();
    assert_eq!(err.to_string(), "unable to run function: failed to retrieve buffer 2/3 using id -3");
}

#[test]
fn scalars_bind_before_buffers() -> gridlane_core::Result<()> {
    let ctx = Context::new();
    ctx.register_host_kernel("offset", |lane: Lane, args: &ArgumentTable<'_>| {
        let (Some(base), Some(step), Some(out)) = (args.scalar::<u32>(0), args.scalar::<half::f16>(1), args.buffer(2))
        else {
            return;
        };
        let i = lane.x() as usize;
        out.store(i, base as f32 + step.to_f32() * i as f32);
    })?;
    let function = ctx.compile_function(
        "kernel void offset(constant uint &base, constant half &step, device float *out) {}",
        "offset",
    )?;

    let (out_id, out) = ctx.allocate_buffer_1d::<f32>(64)?;
    let params = RunParameters::new(Grid::linear(64))
        .scalar(10u32)
        .scalar(half::f16::from_f32(0.5))
        .buffer(out_id);
    ctx.run(function, &params)?;

    for (i, &value) in out.iter().enumerate() {
        assert_eq!(value, 10.0 + 0.5 * i as f32);
    }
    Ok(())
}

#[test]
fn kernel_panics_surface_as_execution_errors() {
    let ctx = Context::new();
    ctx.register_host_kernel("explode", |lane: Lane, _: &ArgumentTable<'_>| {
        assert!(lane.x() < 10, "lane {} out of budget", lane.x());
    })
    .unwrap();
    let function = ctx.compile_function("kernel void explode() {}", "explode").unwrap();

    let err = ctx.run(function, &RunParameters::new(Grid::linear(64))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(err.to_string().starts_with("unable to run function: failed to execute function"));

    ctx.run(function, &RunParameters::new(Grid::linear(10))).unwrap();
}

#[test]
fn concurrent_runs_share_one_function() {
    let ctx = Arc::new(transfer_context());
    let function = ctx.compile_function(TRANSFER_SOURCE, "transfer1D").unwrap();

    thread::scope(|scope| {
        for t in 0..16 {
            let ctx = Arc::clone(&ctx);
            scope.spawn(move || {
                let width = 1000 + t * 17;
                let (input_id, mut input) = ctx.allocate_buffer_1d::<f32>(width).unwrap();
                let (output_id, output) = ctx.allocate_buffer_1d::<f32>(width).unwrap();

                for iteration in 0..10 {
                    for (i, value) in input.iter_mut().enumerate() {
                        *value = (t * 1_000_000 + iteration * 10_000) as f32 + i as f32;
                    }
                    ctx.run(
                        function,
                        &RunParameters::new(Grid::linear(width as i32)).buffers([input_id, output_id]),
                    )
                    .unwrap();
                    assert_eq!(&input[..], &output[..], "thread {t} iteration {iteration}");
                }
            });
        }
    });

    // one function plus two buffers per thread, no gaps
    assert_eq!(ctx.handle_count(), 1 + 16 * 2);
}

fn check_transfer_type<T>(values: impl Fn(usize) -> T)
where
    T: Element + PartialEq + std::fmt::Debug,
{
    let ctx = Context::new();
    ctx.register_host_kernel("transferType", transfer::<T>).unwrap();
    let function = ctx
        .compile_function("kernel void transferType(device const T *input, device T *output) {}", "transferType")
        .unwrap();

    let width = 257;
    let (input_id, mut input) = ctx.allocate_buffer_1d::<T>(width).unwrap();
    let (output_id, output) = ctx.allocate_buffer_1d::<T>(width).unwrap();
    for (i, value) in input.iter_mut().enumerate() {
        *value = values(i);
    }

    ctx.run(
        function,
        &RunParameters::new(Grid::linear(width as i32)).buffers([input_id, output_id]),
    )
    .unwrap();

    assert_eq!(&input[..], &output[..], "{:?}", T::KIND);
    assert_eq!(ctx.buffer_kind(output_id), Some(T::KIND));
}

#[test]
fn every_element_kind_transfers() {
    check_transfer_type(|i| i as i8);
    check_transfer_type(|i| i as i16 * -3);
    check_transfer_type(|i| i as i32 * 1000);
    check_transfer_type(|i| i as i64 * -1_000_000_007);
    check_transfer_type(|i| i as u8);
    check_transfer_type(|i| i as u16 * 7);
    check_transfer_type(|i| i as u32 * 65_537);
    check_transfer_type(|i| (i as u64) << 40);
    check_transfer_type(|i| half::f16::from_f32(i as f32 / 4.0));
    check_transfer_type(|i| i as f32 * 0.25);
    check_transfer_type(|i| i as f64 / 3.0);
}
