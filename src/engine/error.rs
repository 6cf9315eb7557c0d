use thiserror::Error;

/// Failures surfaced by the completion pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("failed to fetch reference image {url}: {reason}")]
    RemoteResource { url: String, reason: String },

    #[error("image generation failed: {0}")]
    Generation(String),
}
