//! Headless smoke run of the pipeline engine.
//!
//! Clears the frame, draws a coloured quad over half of it, and probes both
//! halves. Failed probes write their diagnostic PNG into the output directory
//! (first argument, default `lumen-out`).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bytemuck::{Pod, Zeroable};

use lumen_engine::logging::{init_logging, LoggingConfig};
use lumen_engine::pipeline::{
    ChannelOrder, Command, CommandList, Comparator, DrawArraysCommand, ProbeCommand, ProbeRegion,
    ProbeResult, Topology, VertexBuffer, VertexLayout,
};
use lumen_engine::{Gpu, GpuInit, GraphicsPipeline, PipelineParams};

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 64;

const CLEAR: [f32; 4] = [0.0, 0.0, 1.0, 1.0];
const FILL: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct ColorVertex {
    position: [f32; 3],
    color: [f32; 4],
}

/// Two triangles covering the left half of clip space.
fn left_half_quad() -> [ColorVertex; 6] {
    let v = |x: f32, y: f32| ColorVertex {
        position: [x, y, 0.0],
        color: FILL,
    };
    [
        v(-1.0, -1.0),
        v(0.0, -1.0),
        v(0.0, 1.0),
        v(-1.0, -1.0),
        v(0.0, 1.0),
        v(-1.0, 1.0),
    ]
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("lumen-out"));

    let gpu = Gpu::new_headless_blocking(GpuInit::default())
        .context("failed to create headless GPU")?;

    let params = PipelineParams::default();
    let order = ChannelOrder::of(params.color_format)
        .context("default colour format has no byte order")?;

    let mut engine = GraphicsPipeline::new(gpu.device().clone(), params);
    engine
        .initialize(FRAME_WIDTH, FRAME_HEIGHT, gpu.queue().clone())
        .context("failed to initialize graphics pipeline")?;

    let layout = VertexLayout::packed(&[
        wgpu::VertexFormat::Float32x3,
        wgpu::VertexFormat::Float32x4,
    ]);
    let quad = VertexBuffer::from_pod(layout, &left_half_quad())
        .context("failed to build vertex buffer")?;

    let half = FRAME_WIDTH / 2;
    let left = ProbeRegion::Rect {
        x: 0,
        y: 0,
        width: half,
        height: FRAME_HEIGHT,
    };
    let right = ProbeRegion::Rect {
        x: half,
        y: 0,
        width: FRAME_WIDTH - half,
        height: FRAME_HEIGHT,
    };
    let tolerance = Comparator::tolerance_rgba([1, 1, 1, 0], order);

    let mut commands = CommandList::new();
    commands
        .push(Command::SetClearColor(CLEAR))
        .clear()
        .probe(ProbeCommand::rgba(ProbeRegion::Whole, CLEAR, order))
        .draw(DrawArraysCommand::new(Topology::TriangleList, 0, 6), Some(&quad))
        .probe(ProbeCommand::rgba(left, FILL, order).with_comparator(tolerance))
        .probe(ProbeCommand::rgba(right, CLEAR, order).with_comparator(tolerance));

    let report = engine
        .process_commands(&mut commands)
        .context("command list failed")?;

    let failures = report_probes(&report.probes, &out_dir)?;

    let stats = engine.stats();
    println!(
        "passes: {} begun / {} ended, pipelines: {} built / {} reused, submissions: {}",
        stats.render_pass_begins,
        stats.render_pass_ends,
        stats.pipeline_builds,
        stats.pipeline_cache_hits,
        stats.submissions
    );

    engine.shutdown();

    if failures > 0 {
        bail!("{failures} of {} probes failed", report.probes.len());
    }
    println!("all {} probes passed", report.probes.len());
    Ok(())
}

/// Prints each result and writes diagnostic images for failures.
fn report_probes(probes: &[ProbeResult], out_dir: &Path) -> Result<usize> {
    let mut failures = 0;
    for (i, probe) in probes.iter().enumerate() {
        let r = probe.rect;
        let Some(png) = probe.diagnostic_image() else {
            println!("probe {i}: ({}, {}) {}x{} ok", r.x, r.y, r.width, r.height);
            continue;
        };

        failures += 1;
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;
        let path = out_dir.join(format!("probe-{i}.png"));
        std::fs::write(&path, png)
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::debug!("wrote {} byte diagnostic image", png.len());
        println!("probe {i}: FAILED, actual pixels in {}", path.display());
    }
    Ok(failures)
}
