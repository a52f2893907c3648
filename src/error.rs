use std::path::PathBuf;

/// Error taxonomy for the background-removal pipeline.
///
/// Every worker-side error is caught at the loop boundary and reduced to a
/// terminal run status plus one of these; nothing crosses the thread boundary
/// as a panic.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Missing or inconsistent run configuration. Surfaced before any
    /// resource is touched.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// Checkpoint unreadable or the requested device is unavailable.
    #[error("failed to load model from {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    /// Source unreadable, destination unwritable, or a mid-stream
    /// decode/encode failure.
    #[error("media I/O error: {0}")]
    Io(String),

    /// The model rejected a frame mid-run.
    #[error("inference failed: {0}")]
    Inference(String),

    /// A run is already active on this controller.
    #[error("a run is already active")]
    RunActive,
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PipelineError::Validation(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        PipelineError::Io(msg.into())
    }
}

impl From<ffmpeg_next::Error> for PipelineError {
    fn from(err: ffmpeg_next::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::Io(err.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
