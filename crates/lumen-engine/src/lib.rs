//! Lumen engine crate.
//!
//! Executes scripted graphics conformance steps on a headless wgpu device and
//! verifies rendered pixels.

pub mod device;
pub mod logging;
pub mod pipeline;
pub mod png;
pub mod value;

pub use device::{Gpu, GpuInit};
pub use pipeline::{GraphicsPipeline, PipelineError, PipelineParams};
pub use value::ScalarValue;
