//! Shared helpers for `lumen-engine` integration tests.
//!
//! Tests run against whatever adapter wgpu finds. Without one they are skipped,
//! unless `LUMEN_REQUIRE_GPU` is set, in which case they fail.

#![allow(dead_code)]

use std::sync::OnceLock;

use lumen_engine::logging::{init_logging, LoggingConfig};
use lumen_engine::pipeline::{VertexBuffer, VertexLayout};
use lumen_engine::{Gpu, GpuInit, GraphicsPipeline, PipelineParams};

pub const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
pub const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
pub const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

pub fn require_gpu() -> bool {
    let Ok(raw) = std::env::var("LUMEN_REQUIRE_GPU") else {
        return false;
    };

    let v = raw.trim();
    v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
}

pub fn skip_or_panic(test_name: &str, reason: &str) {
    if require_gpu() {
        panic!("LUMEN_REQUIRE_GPU is enabled but {test_name} cannot run: {reason}");
    }
    eprintln!("skipping {test_name}: {reason}");
}

/// Process-wide headless GPU, created on first use.
///
/// One device is shared by every test in the binary; engines are per test.
pub fn gpu(test_name: &str) -> Option<&'static Gpu> {
    static GPU: OnceLock<Result<Gpu, String>> = OnceLock::new();

    init_logging(LoggingConfig::for_tests());

    match GPU.get_or_init(|| {
        Gpu::new_headless_blocking(GpuInit::default()).map_err(|e| format!("{e:#}"))
    }) {
        Ok(gpu) => Some(gpu),
        Err(reason) => {
            skip_or_panic(test_name, reason);
            None
        }
    }
}

/// An initialized engine with default parameters.
pub fn engine(gpu: &Gpu, width: u32, height: u32) -> GraphicsPipeline {
    engine_with(gpu, PipelineParams::default(), width, height)
}

pub fn engine_with(
    gpu: &Gpu,
    params: PipelineParams,
    width: u32,
    height: u32,
) -> GraphicsPipeline {
    let mut engine = GraphicsPipeline::new(gpu.device().clone(), params);
    engine
        .initialize(width, height, gpu.queue().clone())
        .expect("initialize");
    engine
}

/// Interleaved `position: vec3, colour: vec4` vertices for the default shader.
pub fn colored_vertices(points: &[[f32; 2]], color: [f32; 4]) -> VertexBuffer {
    let layout = VertexLayout::packed(&[
        wgpu::VertexFormat::Float32x3,
        wgpu::VertexFormat::Float32x4,
    ]);
    let data: Vec<f32> = points
        .iter()
        .flat_map(|&[x, y]| [x, y, 0.0, color[0], color[1], color[2], color[3]])
        .collect();
    VertexBuffer::from_pod(layout, &data).expect("vertex data")
}

/// Two triangles covering all of clip space.
pub fn full_screen(color: [f32; 4]) -> VertexBuffer {
    colored_vertices(
        &[
            [-1.0, -1.0],
            [1.0, -1.0],
            [1.0, 1.0],
            [-1.0, -1.0],
            [1.0, 1.0],
            [-1.0, 1.0],
        ],
        color,
    )
}
