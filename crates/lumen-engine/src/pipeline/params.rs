use std::borrow::Cow;
use std::time::Duration;

/// WGSL program used for every pipeline an engine builds.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    pub source: Cow<'static, str>,
    pub vertex_entry: Cow<'static, str>,
    pub fragment_entry: Cow<'static, str>,
}

impl ShaderProgram {
    /// WGSL source with `vs_main` / `fs_main` entry points.
    pub fn wgsl(source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            source: source.into(),
            vertex_entry: Cow::Borrowed("vs_main"),
            fragment_entry: Cow::Borrowed("fs_main"),
        }
    }

    /// Built-in program: position (`Float32x3`, location 0) passed through as
    /// clip space, colour (`Float32x4`, location 1) written as is.
    pub fn vertex_color() -> Self {
        Self::wgsl(include_str!("shaders/vertex_color.wgsl"))
    }
}

impl Default for ShaderProgram {
    fn default() -> Self {
        Self::vertex_color()
    }
}

/// Immutable creation parameters of a [`GraphicsPipeline`](super::GraphicsPipeline).
#[derive(Debug, Clone)]
pub struct PipelineParams {
    /// 8-bit RGBA/BGRA unorm colour attachment format.
    ///
    /// BGRA matches the channel swap applied by diagnostic PNG export.
    pub color_format: wgpu::TextureFormat,

    /// Depth/stencil attachment format, or `None` for colour-only frames.
    pub depth_stencil_format: Option<wgpu::TextureFormat>,

    /// Upper bound on every host wait for GPU completion.
    pub fence_timeout: Duration,

    pub shaders: ShaderProgram,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            color_format: wgpu::TextureFormat::Bgra8Unorm,
            depth_stencil_format: Some(wgpu::TextureFormat::Depth24PlusStencil8),
            fence_timeout: Duration::from_millis(1000),
            shaders: ShaderProgram::default(),
        }
    }
}
