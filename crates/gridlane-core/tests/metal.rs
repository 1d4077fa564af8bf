//! Dispatch tests against a real Metal device
#![cfg(target_vendor = "apple")]

use gridlane_core::{fold, BackendType, Context, ErrorKind, Grid, RunParameters};

const TRANSFER_SOURCE: &str = r#"
    #include <metal_stdlib>
    using namespace metal;

    kernel void transfer1D(device const float *input, device float *result, uint i [[thread_position_in_grid]]) {
        result[i] = input[i];
    }

    kernel void transfer2D(device const float *input, device float *result, uint2 size [[threads_per_grid]], uint2 pos [[thread_position_in_grid]]) {
        uint i = pos.x * size.y + pos.y;
        result[i] = input[i];
    }

    kernel void scaled(constant float &factor, device const float *input, device float *result, uint i [[thread_position_in_grid]]) {
        result[i] = input[i] * factor;
    }
"#;

fn metal_context() -> Option<Context> {
    match Context::new_with_backend(BackendType::Metal) {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            assert_eq!(err.kind(), ErrorKind::Device);
            eprintln!("skipping: {err}");
            None
        }
    }
}

#[test]
fn transfer_1d_on_device() {
    let Some(ctx) = metal_context() else { return };
    assert_eq!(ctx.backend_name(), "metal");

    let function = ctx.compile_function(TRANSFER_SOURCE, "transfer1D").unwrap();
    let width = 100_000;
    let (input_id, mut input) = ctx.allocate_buffer_1d::<f32>(width).unwrap();
    let (output_id, output) = ctx.allocate_buffer_1d::<f32>(width).unwrap();
    for (i, value) in input.iter_mut().enumerate() {
        *value = i as f32;
    }

    let params = RunParameters::new(Grid::linear(width as i32)).buffers([input_id, output_id]);
    ctx.run(function, &params).unwrap();
    assert_eq!(&input[..], &output[..]);
}

#[test]
fn transfer_2d_on_device() {
    let Some(ctx) = metal_context() else { return };

    let function = ctx.compile_function(TRANSFER_SOURCE, "transfer2D").unwrap();
    let (width, height) = (100, 37);
    let (input_id, mut input) = ctx.allocate_buffer_2d::<f32>(width, height).unwrap();
    let (output_id, output) = ctx.allocate_buffer_2d::<f32>(width, height).unwrap();
    for (i, value) in input.iter_mut().enumerate() {
        *value = i as f32;
    }

    ctx.run(
        function,
        &RunParameters::new(Grid::planar(width as i32, height as i32)).buffers([input_id, output_id]),
    )
    .unwrap();

    let rows = fold(&output[..], width).unwrap();
    assert_eq!(rows[99][36], (99 * 37 + 36) as f32);
    assert_eq!(&input[..], &output[..]);
}

#[test]
fn scalar_binds_before_buffers() {
    let Some(ctx) = metal_context() else { return };

    let function = ctx.compile_function(TRANSFER_SOURCE, "scaled").unwrap();
    let (input_id, _input) = ctx.allocate_buffer_with(&[1.0f32, 2.0, 3.0, 4.0]).unwrap();
    let (output_id, output) = ctx.allocate_buffer_1d::<f32>(4).unwrap();

    ctx.run(
        function,
        &RunParameters::new(Grid::linear(4)).scalar(3.0f32).buffers([input_id, output_id]),
    )
    .unwrap();
    assert_eq!(&output[..], &[3.0, 6.0, 9.0, 12.0]);
}

#[test]
fn compile_errors_come_from_the_device_compiler() {
    let Some(ctx) = metal_context() else { return };

    let err = ctx.compile_function("invalid", "invalid").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compile);
    assert!(err.to_string().starts_with("unable to set up function: failed to create library"));

    let err = ctx.compile_function(TRANSFER_SOURCE, "missing").unwrap_err();
    assert_eq!(err.to_string(), "unable to set up function: failed to find function 'missing'");

    let err = ctx.register_host_kernel("noop", |_, _| {}).unwrap_err();
    assert_eq!(err.to_string(), "unable to set up function: host kernels are not supported by the metal backend");
}
