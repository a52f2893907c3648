use super::FrameSink;
use crate::error::{PipelineError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::software::scaling::{context::Context as Scaler, flag::Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::{codec, format, Rational};
use image::RgbImage;
use std::path::Path;

/// Encoder state that exists until the sink is finalized.
struct OpenOutput {
    octx: format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: Scaler,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    next_pts: i64,
}

/// FFmpeg-backed frame sink writing an MPEG-4 video file.
///
/// Frames must be appended in source order; `close` writes the trailer
/// exactly once and is safe to call after partial writes on abort.
pub struct VideoFileSink {
    output: Option<OpenOutput>,
    width: u32,
    height: u32,
}

// SAFETY: SwsContext has no thread affinity; ffmpeg-next marks its other
// wrapper types Send but omits scaling::Context. All access goes through
// &mut self, so the scaler is never used from two threads at once.
unsafe impl Send for VideoFileSink {}

impl VideoFileSink {
    pub fn open<P: AsRef<Path>>(path: P, width: u32, height: u32, frame_rate: f64) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(
            "Opening video sink {} ({}x{} @ {:.2} fps)",
            path.display(),
            width,
            height,
            frame_rate
        );

        ffmpeg::init()?;

        let codec = ffmpeg::encoder::find(codec::Id::MPEG4)
            .ok_or_else(|| PipelineError::io("MPEG-4 encoder unavailable"))?;

        let mut octx = format::output(&path).map_err(|err| {
            PipelineError::io(format!("failed to create {}: {err}", path.display()))
        })?;
        let global_header = octx
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);

        // Millisecond-precision time base carries fractional frame rates.
        let rate = Rational::new((frame_rate * 1000.0).round().max(1.0) as i32, 1000);
        let time_base = rate.invert();

        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(format::Pixel::YUV420P);
        encoder.set_frame_rate(Some(rate));
        encoder.set_time_base(time_base);
        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec)?;

        let stream_index;
        {
            let mut stream = octx.add_stream(codec)?;
            stream_index = stream.index();
            stream.set_parameters(&encoder);
            stream.set_time_base(time_base);
        }

        octx.write_header()?;

        // The muxer may rewrite the stream time base during write_header.
        let stream_time_base = octx
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .unwrap_or(time_base);

        let scaler = Scaler::get(
            format::Pixel::RGB24,
            width,
            height,
            format::Pixel::YUV420P,
            width,
            height,
            Flags::BILINEAR,
        )?;

        Ok(Self {
            output: Some(OpenOutput {
                octx,
                encoder,
                scaler,
                stream_index,
                encoder_time_base: time_base,
                stream_time_base,
                next_pts: 0,
            }),
            width,
            height,
        })
    }

    fn drain(output: &mut OpenOutput) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while output.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(output.stream_index);
            packet.rescale_ts(output.encoder_time_base, output.stream_time_base);
            packet.write_interleaved(&mut output.octx)?;
        }
        Ok(())
    }
}

impl FrameSink for VideoFileSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let Some(output) = self.output.as_mut() else {
            return Err(PipelineError::io("frame sink is already closed"));
        };
        if frame.dimensions() != (self.width, self.height) {
            return Err(PipelineError::io(format!(
                "frame is {}x{}, sink expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let mut rgb = VideoFrame::new(format::Pixel::RGB24, self.width, self.height);
        copy_image_into_frame(frame, &mut rgb);

        let mut yuv = VideoFrame::empty();
        output.scaler.run(&rgb, &mut yuv)?;
        yuv.set_pts(Some(output.next_pts));
        output.next_pts += 1;

        output.encoder.send_frame(&yuv)?;
        Self::drain(output)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut output) = self.output.take() {
            output.encoder.send_eof()?;
            Self::drain(&mut output)?;
            output.octx.write_trailer()?;
            tracing::info!("Video sink finalized after {} frames", output.next_pts);
        }
        Ok(())
    }
}

impl Drop for VideoFileSink {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!("Failed to finalize video sink on drop: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FrameSink;

    #[test]
    fn close_is_idempotent_and_finalizes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let mut sink = VideoFileSink::open(&path, 16, 16, 30.0).unwrap();
        sink.write(&RgbImage::new(16, 16)).unwrap();
        sink.write(&RgbImage::new(16, 16)).unwrap();
        sink.close().unwrap();
        // Second close is a no-op, not an error.
        sink.close().unwrap();
        assert!(path.metadata().unwrap().len() > 0);
    }

    #[test]
    fn write_after_close_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let mut sink = VideoFileSink::open(&path, 16, 16, 30.0).unwrap();
        sink.close().unwrap();
        assert!(sink.write(&RgbImage::new(16, 16)).is_err());
    }
}

/// Copy image rows into an FFmpeg frame, honoring the destination stride.
fn copy_image_into_frame(image: &RgbImage, frame: &mut VideoFrame) {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let stride = frame.stride(0);
    let data = frame.data_mut(0);
    let source = image.as_raw();

    let row_bytes = width * 3;
    for y in 0..height {
        let src = &source[y * row_bytes..(y + 1) * row_bytes];
        data[y * stride..y * stride + row_bytes].copy_from_slice(src);
    }
}
