//! Headless GPU device management.
//!
//! Creates the wgpu Instance/Adapter/Device/Queue used by the pipeline engine.
//! No surface is involved; every render target is an offscreen texture.

mod gpu;

pub use gpu::{Gpu, GpuInit};
