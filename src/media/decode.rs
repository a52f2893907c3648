use super::{FrameSource, MediaInfo};
use crate::error::{PipelineError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::format;
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context as Scaler, flag::Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;
use image::RgbImage;
use std::path::Path;

/// Decoder state that exists only while the source is open.
struct OpenStream {
    input: format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: Scaler,
    stream_index: usize,
    eof_sent: bool,
}

/// FFmpeg-backed frame source for video files.
///
/// Decodes one frame per call, scaled to RGB24 at source resolution.
pub struct VideoFileSource {
    stream: Option<OpenStream>,
    info: MediaInfo,
}

// SAFETY: SwsContext has no thread affinity; ffmpeg-next marks its other
// wrapper types Send but omits scaling::Context. All access goes through
// &mut self, so the scaler is never used from two threads at once.
unsafe impl Send for VideoFileSource {}

impl VideoFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Opening video source {}", path.display());

        ffmpeg::init()?;

        let input = format::input(&path).map_err(|err| {
            PipelineError::io(format!("failed to open {}: {err}", path.display()))
        })?;

        let stream = input.streams().best(Type::Video).ok_or_else(|| {
            PipelineError::io(format!("{} has no video stream", path.display()))
        })?;
        let stream_index = stream.index();

        let rate = stream.avg_frame_rate();
        let frame_rate = if rate.1 != 0 {
            rate.0 as f64 / rate.1 as f64
        } else {
            0.0
        };
        let total_frames = stream.frames().max(0) as u64;

        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        let (width, height) = (decoder.width(), decoder.height());
        let scaler = Scaler::get(
            decoder.format(),
            width,
            height,
            format::Pixel::RGB24,
            width,
            height,
            Flags::BILINEAR,
        )?;

        let info = MediaInfo {
            width,
            height,
            frame_rate,
            total_frames,
        };
        tracing::info!(
            "Source: {}x{} @ {:.2} fps, {} frames",
            width,
            height,
            frame_rate,
            total_frames
        );

        Ok(Self {
            stream: Some(OpenStream {
                input,
                decoder,
                scaler,
                stream_index,
                eof_sent: false,
            }),
            info,
        })
    }
}

impl FrameSource for VideoFileSource {
    fn info(&self) -> MediaInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let mut decoded = VideoFrame::empty();
        loop {
            // Drain buffered frames before feeding another packet.
            if stream.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb = VideoFrame::empty();
                stream.scaler.run(&decoded, &mut rgb)?;
                return Ok(Some(frame_to_image(&rgb, self.info.width, self.info.height)?));
            }

            if stream.eof_sent {
                return Ok(None);
            }

            match stream.input.packets().next() {
                Some((packet_stream, packet)) => {
                    if packet_stream.index() == stream.stream_index {
                        stream.decoder.send_packet(&packet)?;
                    }
                }
                None => {
                    stream.decoder.send_eof()?;
                    stream.eof_sent = true;
                }
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            tracing::info!("Video source closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{FrameSink, VideoFileSink};

    #[test]
    fn close_is_idempotent_and_ends_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.mp4");
        let mut sink = VideoFileSink::open(&path, 16, 16, 30.0).unwrap();
        sink.write(&RgbImage::new(16, 16)).unwrap();
        sink.write(&RgbImage::new(16, 16)).unwrap();
        sink.close().unwrap();

        let mut source = VideoFileSource::open(&path).unwrap();
        assert_eq!(source.info().width, 16);
        assert!(source.next_frame().unwrap().is_some());
        source.close().unwrap();
        // Second close is a no-op, and a closed source reports end of stream.
        source.close().unwrap();
        assert!(source.next_frame().unwrap().is_none());
    }
}

/// Copy an RGB24 frame into an `RgbImage`, honoring the row stride.
fn frame_to_image(frame: &VideoFrame, width: u32, height: u32) -> Result<RgbImage> {
    let data = frame.data(0);
    let stride = frame.stride(0);
    let row_bytes = width as usize * 3;

    let mut buffer = Vec::with_capacity(row_bytes * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        buffer.extend_from_slice(&data[start..start + row_bytes]);
    }

    RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| PipelineError::io("decoded frame buffer has unexpected size"))
}
