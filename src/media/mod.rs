mod decode;
mod encode;

pub use decode::VideoFileSource;
pub use encode::VideoFileSink;

use crate::error::Result;
use image::RgbImage;

/// Stream attributes reported by a frame source.
#[derive(Debug, Clone, Copy)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// 0 when the container does not report a frame count.
    pub total_frames: u64,
}

/// Trait for decodable frame sources.
///
/// Frames are produced in strict temporal order, one decode per call; no
/// look-ahead buffering.
pub trait FrameSource: Send {
    fn info(&self) -> MediaInfo;

    /// Decode the next frame. `None` is the end-of-stream sentinel.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Release underlying resources. Idempotent; only the first call has an
    /// observable effect.
    fn close(&mut self) -> Result<()>;
}

/// Trait for encodable frame sinks.
///
/// The caller must write frames in exactly the order the source produced
/// them.
pub trait FrameSink: Send {
    /// Append one frame to the output.
    fn write(&mut self, frame: &RgbImage) -> Result<()>;

    /// Finalize the container (flush trailing data, write the trailer).
    /// Idempotent and safe after partial writes on abort.
    fn close(&mut self) -> Result<()>;
}
