//! Draw, clear and probe commands consumed by the engine.
//!
//! These are built by the script front end; the engine only reads them.

use std::collections::VecDeque;

use crate::value::ScalarValue;

use super::frame::ChannelOrder;
use super::vertex::VertexBuffer;

/// Primitive topology as written in test scripts.
///
/// Only the first five have a wgpu equivalent. The others are accepted by the
/// parser and rejected when the pipeline is built.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
    LineListWithAdjacency,
    LineStripWithAdjacency,
    TriangleListWithAdjacency,
    TriangleStripWithAdjacency,
    PatchList,
}

impl Topology {
    pub fn to_wgpu(self) -> Option<wgpu::PrimitiveTopology> {
        match self {
            Topology::PointList => Some(wgpu::PrimitiveTopology::PointList),
            Topology::LineList => Some(wgpu::PrimitiveTopology::LineList),
            Topology::LineStrip => Some(wgpu::PrimitiveTopology::LineStrip),
            Topology::TriangleList => Some(wgpu::PrimitiveTopology::TriangleList),
            Topology::TriangleStrip => Some(wgpu::PrimitiveTopology::TriangleStrip),
            _ => None,
        }
    }

    #[inline]
    pub fn is_strip(self) -> bool {
        matches!(self, Topology::LineStrip | Topology::TriangleStrip)
    }

    #[inline]
    pub fn is_patch(self) -> bool {
        self == Topology::PatchList
    }
}

/// Fixed-function state that participates in pipeline identity.
///
/// Value equality: two separately built commands with equal `PipelineData`
/// share one pipeline object.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PipelineData {
    pub blend: Option<wgpu::BlendState>,
    pub color_write_mask: wgpu::ColorWrites,

    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: wgpu::CompareFunction,

    pub stencil_front: wgpu::StencilFaceState,
    pub stencil_back: wgpu::StencilFaceState,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
    /// Dynamic; set on the pass per draw and excluded from pipeline identity.
    pub stencil_reference: u32,

    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
}

impl Default for PipelineData {
    fn default() -> Self {
        Self {
            blend: None,
            color_write_mask: wgpu::ColorWrites::ALL,
            depth_test: false,
            depth_write: false,
            depth_compare: wgpu::CompareFunction::Less,
            stencil_front: wgpu::StencilFaceState::IGNORE,
            stencil_back: wgpu::StencilFaceState::IGNORE,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            stencil_reference: 0,
            cull_mode: None,
            front_face: wgpu::FrontFace::Ccw,
        }
    }
}

impl PipelineData {
    /// Copy with dynamic state zeroed, used as the cache identity.
    pub fn static_state(&self) -> Self {
        Self {
            stencil_reference: 0,
            ..*self
        }
    }

    #[inline]
    pub fn stencil_enabled(&self) -> bool {
        self.stencil_front != wgpu::StencilFaceState::IGNORE
            || self.stencil_back != wgpu::StencilFaceState::IGNORE
    }

    pub(crate) fn depth_stencil_state(&self, format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        wgpu::DepthStencilState {
            format,
            depth_write_enabled: self.depth_test && self.depth_write,
            depth_compare: if self.depth_test {
                self.depth_compare
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState {
                front: self.stencil_front,
                back: self.stencil_back,
                read_mask: self.stencil_read_mask,
                write_mask: self.stencil_write_mask,
            },
            bias: wgpu::DepthBiasState::default(),
        }
    }
}

/// A `draw arrays` / `draw indexed` request.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawArraysCommand {
    pub topology: Topology,
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub first_instance: u32,
    pub instance_count: u32,
    /// Draw through the engine's index buffer; `first_vertex` then indexes it.
    pub indexed: bool,
    pub pipeline_data: PipelineData,
}

impl DrawArraysCommand {
    pub fn new(topology: Topology, first_vertex: u32, vertex_count: u32) -> Self {
        Self {
            topology,
            first_vertex,
            vertex_count,
            first_instance: 0,
            instance_count: 1,
            indexed: false,
            pipeline_data: PipelineData::default(),
        }
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn with_instances(mut self, first_instance: u32, instance_count: u32) -> Self {
        self.first_instance = first_instance;
        self.instance_count = instance_count;
        self
    }

    pub fn with_pipeline_data(mut self, data: PipelineData) -> Self {
        self.pipeline_data = data;
        self
    }
}

bitflags::bitflags! {
    /// Attachment aspects targeted by a clear.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct AspectMask: u8 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Values written by a clear. Only the fields selected by the aspect mask are used.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClearValue {
    pub color: wgpu::Color,
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValue {
    fn default() -> Self {
        Self {
            color: wgpu::Color::TRANSPARENT,
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Pixel comparison policy carried by a probe.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Comparator {
    /// Packed 32-bit values must be identical.
    Exact,
    /// Each byte of the packed value (least significant first) may differ by
    /// at most the matching entry.
    Tolerance([u8; 4]),
}

impl Comparator {
    /// Builds a tolerance from per-channel RGBA limits for a frame with `order`.
    pub fn tolerance_rgba(rgba: [u8; 4], order: ChannelOrder) -> Self {
        Comparator::Tolerance(order.to_storage(rgba))
    }

    pub fn matches(&self, expected: &ScalarValue, actual: &ScalarValue) -> bool {
        match self {
            Comparator::Exact => expected.as_u32() == actual.as_u32(),
            Comparator::Tolerance(limits) => {
                let e = expected.as_u32().to_le_bytes();
                let a = actual.as_u32().to_le_bytes();
                e.iter()
                    .zip(a.iter())
                    .zip(limits.iter())
                    .all(|((&e, &a), &limit)| e.abs_diff(a) <= limit)
            }
        }
    }
}

/// Area of the frame a probe reads.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProbeRegion {
    /// The full frame, whatever its size.
    Whole,
    Rect { x: u32, y: u32, width: u32, height: u32 },
}

impl ProbeRegion {
    /// Returns `(x, y, width, height)` for a frame of the given size.
    pub fn resolve(self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        match self {
            ProbeRegion::Whole => (0, 0, frame_width, frame_height),
            ProbeRegion::Rect { x, y, width, height } => (x, y, width, height),
        }
    }
}

/// Expected pixel values for a region plus the comparator to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeCommand {
    pub region: ProbeRegion,
    /// One entry broadcast to every pixel, or one entry per pixel in row-major order.
    pub expected: Vec<ScalarValue>,
    pub comparator: Comparator,
}

impl ProbeCommand {
    pub fn new(region: ProbeRegion, expected: Vec<ScalarValue>) -> Self {
        Self {
            region,
            expected,
            comparator: Comparator::Exact,
        }
    }

    /// Expects every pixel to hold the normalized colour `rgba`, packed in
    /// the attachment's byte `order`.
    pub fn rgba(region: ProbeRegion, rgba: [f32; 4], order: ChannelOrder) -> Self {
        let packed = order.pack(rgba.map(super::frame::unorm8));
        Self::new(region, vec![ScalarValue::from(packed)])
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Expected value for pixel `index` of the probed region.
    pub(crate) fn expected_at(&self, index: usize) -> Option<&ScalarValue> {
        match self.expected.as_slice() {
            [single] => Some(single),
            all => all.get(index),
        }
    }
}

/// One step of a queued test sequence.
#[derive(Debug, Clone)]
pub enum Command<'a> {
    SetClearColor([f32; 4]),
    SetClearDepth(f32),
    SetClearStencil(u32),
    SetPatchControlPoints(u32),
    SetIndexBuffer(Vec<ScalarValue>),
    Clear,
    ClearBuffer { value: ClearValue, aspect: AspectMask },
    Draw {
        command: DrawArraysCommand,
        vertex_buffer: Option<&'a VertexBuffer>,
    },
    Probe(ProbeCommand),
}

/// Ordered queue of commands drained by
/// [`GraphicsPipeline::process_commands`](super::GraphicsPipeline::process_commands).
///
/// Draw commands borrow their vertex buffers, so a buffer cannot be mutated
/// while a queued draw still references it.
#[derive(Debug, Default, Clone)]
pub struct CommandList<'a> {
    commands: VecDeque<Command<'a>>,
}

impl<'a> CommandList<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command<'a>) -> &mut Self {
        self.commands.push_back(command);
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.push(Command::Clear)
    }

    pub fn draw(
        &mut self,
        command: DrawArraysCommand,
        vertex_buffer: Option<&'a VertexBuffer>,
    ) -> &mut Self {
        self.push(Command::Draw {
            command,
            vertex_buffer,
        })
    }

    pub fn probe(&mut self, probe: ProbeCommand) -> &mut Self {
        self.push(Command::Probe(probe))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub(crate) fn pop_front(&mut self) -> Option<Command<'a>> {
        self.commands.pop_front()
    }
}
