//! Background removal for images and video.
//!
//! The core is the video pipeline: a single worker thread reads frames from
//! a [`media::FrameSource`], runs them through a segmentation model plus
//! compositor ([`engine::RemovalEngine`]), writes results in order to a
//! [`media::FrameSink`], and reports progress/previews through shared state
//! that the caller polls without ever blocking the worker.

pub mod compose;
pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod preview;
pub mod progress;
pub mod segmentation;

pub use config::{BackgroundMode, Device, RunConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineController, RunHandle};
pub use progress::{Progress, RunStatus};
