use anyhow::{Context, Result};

/// Initialization parameters for the headless GPU layer.
///
/// Keep this structure minimal. Add flags only when a concrete backend
/// requirement exists.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Backends the instance may choose from.
    pub backends: wgpu::Backends,

    /// Adapter preference.
    pub power_preference: wgpu::PowerPreference,

    /// Force a software adapter (e.g. lavapipe/WARP) for reproducible CI runs.
    pub force_fallback_adapter: bool,

    /// Required wgpu features.
    ///
    /// Favor an empty set for portability unless a feature is strictly necessary.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
        }
    }
}

/// Owns the wgpu core objects for offscreen rendering.
///
/// `Device` and `Queue` are reference-counted handles; [`Gpu::device`] and
/// [`Gpu::queue`] clones can be handed to pipeline engines freely.
pub struct Gpu {
    /// Kept alive for the lifetime of the adapter.
    _instance: wgpu::Instance,

    adapter: wgpu::Adapter,

    /// Logical device.
    device: wgpu::Device,

    /// Submission queue.
    queue: wgpu::Queue,
}

impl Gpu {
    /// Creates a GPU context with no presentation surface.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu; native callers
    /// typically wrap this in `pollster::block_on`.
    pub async fn new_headless(init: GpuInit) -> Result<Self> {
        let GpuInit {
            backends,
            power_preference,
            force_fallback_adapter,
            required_features,
            required_limits,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lumen device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        Ok(Self {
            _instance: instance,
            adapter,
            device,
            queue,
        })
    }

    /// Blocking wrapper around [`Gpu::new_headless`] for native callers.
    pub fn new_headless_blocking(init: GpuInit) -> Result<Self> {
        pollster::block_on(Self::new_headless(init))
    }

    /// Returns adapter identification for reports.
    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the submission queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}
