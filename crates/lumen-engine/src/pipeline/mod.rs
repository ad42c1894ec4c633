//! Graphics pipeline engine.
//!
//! [`GraphicsPipeline`] owns an offscreen frame buffer and executes
//! [`CommandList`]s of clears, draws and probes against it. Draws are batched
//! into one lazily opened render pass; clears and probes close it first.

mod cache;
mod command;
mod error;
mod frame;
mod graphics;
mod index;
mod params;
mod probe;
mod state;
mod stats;
mod vertex;

pub use cache::{PipelineCache, PipelineKey};
pub use command::{
    AspectMask, ClearValue, Command, CommandList, Comparator, DrawArraysCommand, PipelineData,
    ProbeCommand, ProbeRegion, Topology,
};
pub use error::{PipelineError, Result};
pub use frame::{unorm8, AttachmentSet, ChannelOrder, FrameBuffer, COLOR_BYTES_PER_PIXEL};
pub use graphics::{GraphicsPipeline, StepReport};
pub use index::IndexBuffer;
pub use params::{PipelineParams, ShaderProgram};
pub use probe::{ProbeOutcome, ProbeRect, ProbeResult, VerificationMismatch};
pub use state::{PassTracker, RenderPassState};
pub use stats::EngineStats;
pub use vertex::{VertexAttribute, VertexBuffer, VertexBufferId, VertexLayout};
