use std::collections::HashMap;
use std::sync::mpsc;

use wgpu::util::DeviceExt;

use crate::value::ScalarValue;

use super::cache::{PipelineCache, PipelineKey};
use super::command::{AspectMask, ClearValue, Command, CommandList, DrawArraysCommand, ProbeCommand};
use super::error::{PipelineError, Result};
use super::frame::{AttachmentSet, ChannelOrder, FrameBuffer, ReadbackLayout};
use super::index::IndexBuffer;
use super::params::PipelineParams;
use super::probe::{verify_pixels, ProbeRect, ProbeResult};
use super::state::{PassTracker, RenderPassState};
use super::stats::EngineStats;
use super::vertex::{VertexBuffer, VertexBufferId};

const NOT_INITIALIZED: &str = "graphics pipeline is not initialized";

/// Largest patch size accepted by tessellation-capable APIs.
const MAX_PATCH_CONTROL_POINTS: u32 = 32;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Lifecycle {
    Created,
    Ready,
    ShutDown,
}

/// Clear values and dynamic state applied by later operations.
#[derive(Debug, Copy, Clone)]
struct ClearState {
    color: [f32; 4],
    stencil: u32,
    depth: f32,
    patch_control_points: u32,
}

impl Default for ClearState {
    fn default() -> Self {
        Self {
            color: [0.0; 4],
            stencil: 0,
            depth: 1.0,
            patch_control_points: 3,
        }
    }
}

/// Engine-side copy of a caller's vertex buffer.
///
/// Kept only while some step draws from it; see [`GraphicsPipeline::process_commands`].
struct UploadedVertices {
    generation: u64,
    buffer: wgpu::Buffer,
    /// Drawn from since the last completed step.
    used: bool,
}

/// Results of one drained command list.
#[derive(Debug, Default, Clone)]
pub struct StepReport {
    pub probes: Vec<ProbeResult>,
}

impl StepReport {
    pub fn passed(&self) -> bool {
        self.probes.iter().all(ProbeResult::passed)
    }
}

/// Drives one graphics pipeline through clears, draws and probes.
///
/// The draw render pass is opened lazily by the first draw and closed before
/// any clear, probe, or the end of a command list. Everything between two
/// closures is recorded into one encoder and submitted together.
///
/// Owns its frame buffer, index buffer and pipeline objects. Vertex buffers
/// are borrowed per draw; the engine keeps a GPU copy of each.
pub struct GraphicsPipeline {
    device: wgpu::Device,
    limits: wgpu::Limits,
    params: PipelineParams,
    lifecycle: Lifecycle,

    // Declaration order is drop order: the open pass must go before its encoder.
    active_pass: Option<wgpu::RenderPass<'static>>,
    encoder: Option<wgpu::CommandEncoder>,
    last_submission: Option<wgpu::SubmissionIndex>,
    /// Error raised while ending the draw pass, reported at the next submit.
    pass_error: Option<wgpu::Error>,
    pass: PassTracker,

    pipelines: PipelineCache,
    vertex_uploads: HashMap<VertexBufferId, UploadedVertices>,
    index_buffer: Option<IndexBuffer>,
    layout: Option<wgpu::PipelineLayout>,
    shader: Option<wgpu::ShaderModule>,
    attachments: Option<AttachmentSet>,
    frame: Option<FrameBuffer>,
    queue: Option<wgpu::Queue>,

    clear: ClearState,
    frame_width: u32,
    frame_height: u32,
    stats: EngineStats,
}

impl GraphicsPipeline {
    /// Creates an engine bound to `device`. No GPU objects are created until
    /// [`initialize`](Self::initialize).
    pub fn new(device: wgpu::Device, params: PipelineParams) -> Self {
        let limits = device.limits();
        Self {
            device,
            limits,
            params,
            lifecycle: Lifecycle::Created,
            active_pass: None,
            encoder: None,
            last_submission: None,
            pass_error: None,
            pass: PassTracker::new(),
            pipelines: PipelineCache::new(),
            vertex_uploads: HashMap::new(),
            index_buffer: None,
            layout: None,
            shader: None,
            attachments: None,
            frame: None,
            queue: None,
            clear: ClearState::default(),
            frame_width: 0,
            frame_height: 0,
            stats: EngineStats::default(),
        }
    }

    /// Allocates the frame buffer and base pipeline layout.
    ///
    /// Must be called exactly once. On failure nothing is retained and
    /// [`shutdown`](Self::shutdown) is still safe.
    pub fn initialize(&mut self, width: u32, height: u32, queue: wgpu::Queue) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Ready => return Err(PipelineError::InvalidState("already initialized")),
            Lifecycle::ShutDown => return Err(PipelineError::InvalidState("already shut down")),
        }

        let attachments =
            AttachmentSet::new(self.params.color_format, self.params.depth_stencil_format)?;
        let ((frame, invalid), out_of_memory) =
            capture_errors(&self.device, wgpu::ErrorFilter::OutOfMemory, || {
                capture_errors(&self.device, wgpu::ErrorFilter::Validation, || {
                    FrameBuffer::new(&self.device, width, height, attachments)
                })
            });
        let frame = frame?;
        if let Some(err) = out_of_memory.or(invalid) {
            frame.destroy();
            return Err(PipelineError::Resource(format!(
                "frame buffer allocation failed: {err}"
            )));
        }

        let ((shader, layout), rejected) =
            capture_errors(&self.device, wgpu::ErrorFilter::Validation, || {
                let shader = self
                    .device
                    .create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: Some("lumen shader"),
                        source: wgpu::ShaderSource::Wgsl(self.params.shaders.source.clone()),
                    });

                let layout = self
                    .device
                    .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("lumen pipeline layout"),
                        bind_group_layouts: &[],
                        immediate_size: 0,
                    });
                (shader, layout)
            });
        if let Some(err) = rejected {
            frame.destroy();
            return Err(PipelineError::PipelineBuild(format!(
                "shader program rejected: {err}"
            )));
        }

        self.frame = Some(frame);
        self.attachments = Some(attachments);
        self.shader = Some(shader);
        self.layout = Some(layout);
        self.queue = Some(queue);
        self.frame_width = width;
        self.frame_height = height;
        self.lifecycle = Lifecycle::Ready;

        log::debug!(
            "initialized {width}x{height} frame ({:?} / {:?})",
            attachments.color_format,
            attachments.depth_stencil_format
        );
        Ok(())
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.frame_width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.frame_height
    }

    #[inline]
    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.params.color_format
    }

    #[inline]
    pub fn depth_stencil_format(&self) -> Option<wgpu::TextureFormat> {
        self.params.depth_stencil_format
    }

    /// Byte order of packed pixels returned by probes.
    pub fn channel_order(&self) -> Option<ChannelOrder> {
        ChannelOrder::of(self.params.color_format)
    }

    #[inline]
    pub fn render_pass_state(&self) -> RenderPassState {
        self.pass.state()
    }

    /// Read-only view of the frame buffer, if initialized.
    pub fn frame(&self) -> Option<&FrameBuffer> {
        self.frame.as_ref()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            render_pass_begins: self.pass.activations(),
            render_pass_ends: self.pass.deactivations(),
            pipeline_builds: self.pipelines.misses(),
            pipeline_cache_hits: self.pipelines.hits(),
            ..self.stats
        }
    }

    /// Replaces the index buffer. An empty slice selects non-indexed drawing.
    pub fn set_index_buffer(&mut self, values: &[ScalarValue]) -> Result<()> {
        self.ensure_ready()?;

        if values.len() as u64 * 4 > self.limits.max_buffer_size {
            return Err(PipelineError::Resource(format!(
                "{} indices exceed the maximum buffer size",
                values.len()
            )));
        }

        // Draws already recorded hold their own reference to the old buffer.
        self.index_buffer = IndexBuffer::new(&self.device, values);
        if self.index_buffer.is_some() {
            self.stats.index_uploads += 1;
        }
        Ok(())
    }

    pub fn set_clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.clear.color = [r, g, b, a];
    }

    pub fn set_clear_stencil(&mut self, stencil: u32) {
        self.clear.stencil = stencil;
    }

    pub fn set_clear_depth(&mut self, depth: f32) {
        self.clear.depth = depth;
    }

    pub fn set_patch_control_points(&mut self, points: u32) {
        self.clear.patch_control_points = points;
    }

    /// Clears colour, depth and stencil with the current clear state.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_ready()?;
        let aspects = self.attachments().map(AttachmentSet::aspects)?;
        let [r, g, b, a] = self.clear.color.map(f64::from);
        let value = ClearValue {
            color: wgpu::Color { r, g, b, a },
            depth: self.clear.depth,
            stencil: self.clear.stencil,
        };
        self.clear_buffer(value, aspects)
    }

    /// Clears only the aspects in `aspect` to `value`.
    ///
    /// Runs as its own pass outside any draw pass, so the whole attachment is
    /// cleared regardless of viewport or scissor state.
    pub fn clear_buffer(&mut self, value: ClearValue, aspect: AspectMask) -> Result<()> {
        self.ensure_ready()?;
        let available = self.attachments().map(AttachmentSet::aspects)?;
        if aspect.is_empty() || !available.contains(aspect) {
            return Err(PipelineError::InvalidArgument(format!(
                "cannot clear {aspect:?}; frame has {available:?}"
            )));
        }

        self.deactivate_render_pass_if_needed();

        let frame = self
            .frame
            .as_ref()
            .ok_or(PipelineError::InvalidState(NOT_INITIALIZED))?;
        let encoder = pending_encoder(&self.device, &mut self.encoder);

        let color_attachment = aspect
            .contains(AspectMask::COLOR)
            .then(|| frame.color_attachment(wgpu::LoadOp::Clear(value.color)));

        let depth_stencil_attachment = if aspect.intersects(AspectMask::DEPTH | AspectMask::STENCIL) {
            let depth_load = if aspect.contains(AspectMask::DEPTH) {
                wgpu::LoadOp::Clear(value.depth)
            } else {
                wgpu::LoadOp::Load
            };
            let stencil_load = if aspect.contains(AspectMask::STENCIL) {
                wgpu::LoadOp::Clear(value.stencil)
            } else {
                wgpu::LoadOp::Load
            };
            frame.depth_stencil_attachment(depth_load, stencil_load)
        } else {
            None
        };

        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lumen clear pass"),
                color_attachments: &[color_attachment],
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }

        self.stats.clears += 1;
        log::trace!("cleared {aspect:?}");
        Ok(())
    }

    /// Records one draw into the (lazily opened) render pass.
    ///
    /// On error the render pass stays active; retry or shut down.
    pub fn draw(
        &mut self,
        command: &DrawArraysCommand,
        vertex_buffer: Option<&VertexBuffer>,
    ) -> Result<()> {
        self.ensure_ready()?;

        let vertices = range(command.first_vertex, command.vertex_count, "vertex")?;
        let instances = range(command.first_instance, command.instance_count, "instance")?;

        if !command.indexed
            && let Some(vb) = vertex_buffer
            && u64::from(vertices.end) > vb.vertex_count()
        {
            return Err(PipelineError::InvalidArgument(format!(
                "draw reads vertices {vertices:?} but the buffer holds {}",
                vb.vertex_count()
            )));
        }

        if command.indexed {
            let available = self.index_buffer.as_ref().map_or(0, IndexBuffer::count);
            if available == 0 {
                return Err(PipelineError::InvalidArgument(
                    "indexed draw without an index buffer".into(),
                ));
            }
            if vertices.end > available {
                return Err(PipelineError::InvalidArgument(format!(
                    "indexed draw reads indices {vertices:?} but only {available} are set"
                )));
            }
        }

        self.activate_render_pass_if_needed()?;

        if let Some(vb) = vertex_buffer {
            self.send_vertex_buffer_data_if_needed(vb)?;
        }

        let key = PipelineKey::new(
            command,
            vertex_buffer.map(VertexBuffer::layout),
            self.clear.patch_control_points,
        );

        let builder = PipelineBuilder {
            device: &self.device,
            limits: &self.limits,
            attachments: self
                .attachments
                .as_ref()
                .ok_or(PipelineError::InvalidState(NOT_INITIALIZED))?,
            shader: self
                .shader
                .as_ref()
                .ok_or(PipelineError::InvalidState(NOT_INITIALIZED))?,
            layout: self
                .layout
                .as_ref()
                .ok_or(PipelineError::InvalidState(NOT_INITIALIZED))?,
            params: &self.params,
        };
        let pipeline = self.pipelines.get_or_try_build(&key, |key| builder.build(key))?;

        let pass = self
            .active_pass
            .as_mut()
            .ok_or(PipelineError::InvalidState("render pass is not active"))?;

        pass.set_pipeline(pipeline);
        pass.set_stencil_reference(command.pipeline_data.stencil_reference);

        if let Some(vb) = vertex_buffer {
            let upload = self.vertex_uploads.get(&vb.id()).ok_or(PipelineError::InvalidState(
                "vertex buffer upload missing",
            ))?;
            pass.set_vertex_buffer(0, upload.buffer.slice(..));
        }

        if command.indexed {
            let index_buffer = self
                .index_buffer
                .as_ref()
                .ok_or(PipelineError::InvalidState("index buffer missing"))?;
            pass.set_index_buffer(index_buffer.buffer().slice(..), index_buffer.format());
            pass.draw_indexed(vertices, 0, instances);
        } else {
            pass.draw(vertices, instances);
        }

        self.stats.draws += 1;
        Ok(())
    }

    /// Drains `commands` in order, then closes the render pass, submits, and
    /// waits for the GPU. On error the remaining commands stay queued.
    ///
    /// After a successful step, GPU copies of vertex buffers that the step did
    /// not draw from are released; drawing them again re-uploads.
    pub fn process_commands(&mut self, commands: &mut CommandList<'_>) -> Result<StepReport> {
        self.ensure_ready()?;

        let mut report = StepReport::default();
        while let Some(command) = commands.pop_front() {
            match command {
                Command::SetClearColor([r, g, b, a]) => self.set_clear_color(r, g, b, a),
                Command::SetClearDepth(depth) => self.set_clear_depth(depth),
                Command::SetClearStencil(stencil) => self.set_clear_stencil(stencil),
                Command::SetPatchControlPoints(points) => self.set_patch_control_points(points),
                Command::SetIndexBuffer(values) => self.set_index_buffer(&values)?,
                Command::Clear => self.clear()?,
                Command::ClearBuffer { value, aspect } => self.clear_buffer(value, aspect)?,
                Command::Draw {
                    command,
                    vertex_buffer,
                } => self.draw(&command, vertex_buffer)?,
                Command::Probe(probe) => {
                    let (x, y, width, height) =
                        probe.region.resolve(self.frame_width, self.frame_height);
                    report.probes.push(self.submit_probe(x, y, width, height, &probe)?);
                }
            }
        }

        self.submit_pending()?;
        self.wait_for_gpu()?;
        self.evict_unused_vertex_uploads();
        Ok(report)
    }

    /// Reads back a rectangle of the colour attachment and compares it with
    /// `command`. A mismatch is a normal result carrying a PNG of the actual
    /// pixels.
    pub fn submit_probe(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        command: &ProbeCommand,
    ) -> Result<ProbeResult> {
        self.ensure_ready()?;

        let fits = |start: u32, len: u32, max: u32| start.checked_add(len).is_some_and(|end| end <= max);
        if width == 0
            || height == 0
            || !fits(x, width, self.frame_width)
            || !fits(y, height, self.frame_height)
        {
            return Err(PipelineError::InvalidArgument(format!(
                "probe rectangle ({x}, {y}) {width}x{height} is outside the {}x{} frame",
                self.frame_width, self.frame_height
            )));
        }

        let pixel_count = width as usize * height as usize;
        if !(command.expected.len() == 1 || command.expected.len() == pixel_count) {
            return Err(PipelineError::InvalidArgument(format!(
                "probe has {} expected values for {pixel_count} pixels",
                command.expected.len()
            )));
        }

        self.deactivate_render_pass_if_needed();

        let layout = ReadbackLayout::new(width, height);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lumen probe readback"),
            size: layout.buffer_size(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        {
            let frame = self
                .frame
                .as_ref()
                .ok_or(PipelineError::InvalidState(NOT_INITIALIZED))?;
            let encoder = pending_encoder(&self.device, &mut self.encoder);
            frame.copy_color_region(encoder, x, y, &layout, &staging);
        }

        self.submit_pending()?;

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.wait_for_gpu()?;

        match rx.try_recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(PipelineError::Synchronization(format!(
                    "failed to map probe readback: {err}"
                )));
            }
            Err(_) => {
                return Err(PipelineError::Synchronization(
                    "probe readback was not mapped after GPU completion".into(),
                ));
            }
        }

        let actual = {
            let data = slice.get_mapped_range();
            layout.unpack(&data)
        };
        staging.unmap();
        staging.destroy();

        self.stats.probes += 1;
        let rect = ProbeRect {
            x,
            y,
            width,
            height,
        };
        Ok(verify_pixels(rect, actual, command)?)
    }

    /// Releases every GPU object the engine owns, children first.
    ///
    /// Safe to call repeatedly, and after a failed or missing
    /// [`initialize`](Self::initialize). Unsubmitted work is discarded.
    pub fn shutdown(&mut self) {
        if self.lifecycle == Lifecycle::ShutDown {
            return;
        }

        self.deactivate_render_pass_if_needed();
        self.encoder = None;
        self.last_submission = None;
        if let Some(err) = self.pass_error.take() {
            log::warn!("discarding rejected render pass: {err}");
        }

        self.pipelines.clear();
        for (_, upload) in self.vertex_uploads.drain() {
            upload.buffer.destroy();
        }
        if let Some(index_buffer) = self.index_buffer.take() {
            index_buffer.destroy();
        }
        self.layout = None;
        self.shader = None;
        self.attachments = None;
        if let Some(frame) = self.frame.take() {
            frame.destroy();
        }
        self.queue = None;

        self.lifecycle = Lifecycle::ShutDown;
        log::debug!("graphics pipeline shut down");
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Ready => Ok(()),
            Lifecycle::Created => Err(PipelineError::InvalidState(NOT_INITIALIZED)),
            Lifecycle::ShutDown => Err(PipelineError::InvalidState("graphics pipeline was shut down")),
        }
    }

    fn attachments(&self) -> Result<&AttachmentSet> {
        self.attachments
            .as_ref()
            .ok_or(PipelineError::InvalidState(NOT_INITIALIZED))
    }

    fn activate_render_pass_if_needed(&mut self) -> Result<()> {
        if self.pass.state().is_active() {
            return Ok(());
        }

        let frame = self
            .frame
            .as_ref()
            .ok_or(PipelineError::InvalidState(NOT_INITIALIZED))?;
        let encoder = pending_encoder(&self.device, &mut self.encoder);

        let pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lumen draw pass"),
                color_attachments: &[Some(frame.color_attachment(wgpu::LoadOp::Load))],
                depth_stencil_attachment: frame
                    .depth_stencil_attachment(wgpu::LoadOp::Load, wgpu::LoadOp::Load),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            })
            .forget_lifetime();

        self.active_pass = Some(pass);
        self.pass.activate();
        log::trace!("render pass begun");
        Ok(())
    }

    fn deactivate_render_pass_if_needed(&mut self) {
        if self.pass.deactivate() {
            // Ending the pass unlocks the encoder for clears and copies.
            let pass = self.active_pass.take();
            let ((), rejected) =
                capture_errors(&self.device, wgpu::ErrorFilter::Validation, || drop(pass));
            if rejected.is_some() && self.pass_error.is_none() {
                self.pass_error = rejected;
            }
            log::trace!("render pass ended");
        }
    }

    fn send_vertex_buffer_data_if_needed(&mut self, vertex_buffer: &VertexBuffer) -> Result<()> {
        if let Some(upload) = self.vertex_uploads.get_mut(&vertex_buffer.id())
            && upload.generation == vertex_buffer.generation()
        {
            upload.used = true;
            return Ok(());
        }

        let data = vertex_buffer.data();
        if data.is_empty() {
            return Err(PipelineError::InvalidArgument("vertex buffer has no data".into()));
        }
        if data.len() as u64 > self.limits.max_buffer_size {
            return Err(PipelineError::Resource(format!(
                "{} bytes of vertex data exceed the maximum buffer size",
                data.len()
            )));
        }

        // A fresh buffer per generation: draws recorded against the old copy
        // still reference it until their submission completes.
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("lumen vertex buffer"),
                contents: data,
                usage: wgpu::BufferUsages::VERTEX,
            });

        self.vertex_uploads.insert(
            vertex_buffer.id(),
            UploadedVertices {
                generation: vertex_buffer.generation(),
                buffer,
                used: true,
            },
        );
        self.stats.vertex_uploads += 1;
        log::debug!(
            "uploaded {} vertices for {:?}",
            vertex_buffer.vertex_count(),
            vertex_buffer.id()
        );
        Ok(())
    }

    /// Drops GPU copies of vertex buffers the finished step never drew from.
    ///
    /// Runs after the GPU is idle, so no submitted work still reads them.
    fn evict_unused_vertex_uploads(&mut self) {
        let before = self.vertex_uploads.len();
        self.vertex_uploads.retain(|_, upload| {
            let keep = std::mem::take(&mut upload.used);
            if !keep {
                upload.buffer.destroy();
            }
            keep
        });
        let evicted = (before - self.vertex_uploads.len()) as u64;
        if evicted > 0 {
            self.stats.vertex_evictions += evicted;
            log::debug!("evicted {evicted} unused vertex uploads");
        }
    }

    /// Closes any open pass and submits the pending encoder, if any.
    fn submit_pending(&mut self) -> Result<()> {
        self.deactivate_render_pass_if_needed();

        let Some(encoder) = self.encoder.take() else {
            return Ok(());
        };
        if let Some(err) = self.pass_error.take() {
            return Err(PipelineError::Rejected(err.to_string()));
        }
        let queue = self
            .queue
            .as_ref()
            .ok_or(PipelineError::InvalidState(NOT_INITIALIZED))?;

        let (index, rejected) = capture_errors(&self.device, wgpu::ErrorFilter::Validation, || {
            queue.submit(std::iter::once(encoder.finish()))
        });
        if let Some(err) = rejected {
            return Err(PipelineError::Rejected(err.to_string()));
        }
        self.last_submission = Some(index);
        self.stats.submissions += 1;
        Ok(())
    }

    /// Blocks until the last submission completes, bounded by the fence timeout.
    fn wait_for_gpu(&mut self) -> Result<()> {
        let Some(index) = self.last_submission.take() else {
            return Ok(());
        };

        let timeout = self.params.fence_timeout;
        match self.device.poll(wgpu::PollType::Wait {
            submission_index: Some(index),
            timeout: Some(timeout),
        }) {
            Ok(_) => Ok(()),
            Err(wgpu::PollError::Timeout) => {
                log::error!("GPU work did not finish within {timeout:?}");
                Err(PipelineError::SynchronizationTimeout { timeout })
            }
            Err(err) => Err(PipelineError::Synchronization(err.to_string())),
        }
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs `f` inside an error scope and returns the first error it caught.
///
/// Without a scope wgpu hands errors to the uncaptured-error handler, which
/// panics by default.
fn capture_errors<T>(
    device: &wgpu::Device,
    filter: wgpu::ErrorFilter,
    f: impl FnOnce() -> T,
) -> (T, Option<wgpu::Error>) {
    let scope = device.push_error_scope(filter);
    let value = f();
    let error = pollster::block_on(scope.pop());
    (value, error)
}

/// Returns the pending encoder, creating one if the last was submitted.
fn pending_encoder<'a>(
    device: &wgpu::Device,
    slot: &'a mut Option<wgpu::CommandEncoder>,
) -> &'a mut wgpu::CommandEncoder {
    slot.get_or_insert_with(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lumen command encoder"),
        })
    })
}

fn range(first: u32, count: u32, what: &str) -> Result<std::ops::Range<u32>> {
    let end = first.checked_add(count).ok_or_else(|| {
        PipelineError::InvalidArgument(format!("{what} range {first}+{count} overflows"))
    })?;
    Ok(first..end)
}

/// Borrowed inputs needed to build a pipeline on a cache miss.
struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    limits: &'a wgpu::Limits,
    attachments: &'a AttachmentSet,
    shader: &'a wgpu::ShaderModule,
    layout: &'a wgpu::PipelineLayout,
    params: &'a PipelineParams,
}

impl PipelineBuilder<'_> {
    fn build(&self, key: &PipelineKey) -> Result<wgpu::RenderPipeline> {
        if let Some(points) = key.patch_control_points
            && !(1..=MAX_PATCH_CONTROL_POINTS).contains(&points)
        {
            return Err(PipelineError::PipelineBuild(format!(
                "patch control points must be in 1..={MAX_PATCH_CONTROL_POINTS}, got {points}"
            )));
        }

        let topology = key.topology.to_wgpu().ok_or_else(|| {
            PipelineError::PipelineBuild(format!(
                "{:?} topology is not supported by this device",
                key.topology
            ))
        })?;

        if let Some(layout) = &key.vertex_layout {
            layout.validate(self.limits)?;
        }

        let state = &key.state;
        let depth_stencil = match self.attachments.depth_stencil_format {
            Some(format) => {
                if state.depth_test && !format.has_depth_aspect() {
                    return Err(PipelineError::PipelineBuild(format!(
                        "depth test needs a depth aspect, {format:?} has none"
                    )));
                }
                if state.stencil_enabled() && !format.has_stencil_aspect() {
                    return Err(PipelineError::PipelineBuild(format!(
                        "stencil test needs a stencil aspect, {format:?} has none"
                    )));
                }
                Some(state.depth_stencil_state(format))
            }
            None if state.depth_test || state.stencil_enabled() => {
                return Err(PipelineError::PipelineBuild(
                    "depth/stencil state requires a depth/stencil attachment".into(),
                ));
            }
            None => None,
        };

        let attributes = key
            .vertex_layout
            .as_ref()
            .map(|l| l.wgpu_attributes())
            .unwrap_or_default();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
            .vertex_layout
            .as_ref()
            .map(|l| wgpu::VertexBufferLayout {
                array_stride: l.stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            })
            .into_iter()
            .collect();

        let (pipeline, rejected) = capture_errors(self.device, wgpu::ErrorFilter::Validation, || {
            self.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("lumen graphics pipeline"),
                    layout: Some(self.layout),

                    vertex: wgpu::VertexState {
                        module: self.shader,
                        entry_point: Some(self.params.shaders.vertex_entry.as_ref()),
                        compilation_options: Default::default(),
                        buffers: &buffers,
                    },

                    fragment: Some(wgpu::FragmentState {
                        module: self.shader,
                        entry_point: Some(self.params.shaders.fragment_entry.as_ref()),
                        compilation_options: Default::default(),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: self.attachments.color_format,
                            blend: state.blend,
                            write_mask: state.color_write_mask,
                        })],
                    }),

                    primitive: wgpu::PrimitiveState {
                        topology,
                        strip_index_format: key
                            .topology
                            .is_strip()
                            .then_some(wgpu::IndexFormat::Uint32),
                        front_face: state.front_face,
                        cull_mode: state.cull_mode,
                        polygon_mode: wgpu::PolygonMode::Fill,
                        unclipped_depth: false,
                        conservative: false,
                    },

                    depth_stencil,
                    multisample: wgpu::MultisampleState::default(),
                    multiview_mask: None,
                    cache: None,
                })
        });

        if let Some(err) = rejected {
            return Err(PipelineError::PipelineBuild(format!(
                "{:?} pipeline rejected by the device: {err}",
                key.topology
            )));
        }
        Ok(pipeline)
    }
}
