use std::time::Duration;

use crate::png::EncodeError;

/// Failures surfaced by [`GraphicsPipeline`](super::GraphicsPipeline).
///
/// None of these are retried internally. After any error the render pass may
/// still be open; [`shutdown`](super::GraphicsPipeline::shutdown) reclaims
/// everything regardless.
///
/// A failed probe comparison is not an error; see
/// [`ProbeOutcome`](super::ProbeOutcome).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// GPU allocation or upload failed.
    #[error("resource error: {0}")]
    Resource(String),

    /// The pipeline configuration cannot be built on this device.
    #[error("pipeline build error: {0}")]
    PipelineBuild(String),

    /// Waiting for submitted GPU work exceeded the configured fence timeout.
    #[error("GPU work did not complete within {timeout:?}")]
    SynchronizationTimeout { timeout: Duration },

    /// The device reported a failure while waiting or mapping readback memory.
    #[error("synchronization error: {0}")]
    Synchronization(String),

    /// Recorded commands failed device validation when submitted.
    #[error("device rejected submitted work: {0}")]
    Rejected(String),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("unsupported format {format:?}: {reason}")]
    UnsupportedFormat {
        format: wgpu::TextureFormat,
        reason: &'static str,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
