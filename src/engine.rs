use crate::compose::{self, Compositor};
use crate::config::{BackgroundMode, RunConfig};
use crate::error::{PipelineError, Result};
use crate::segmentation::{self, SegmentationModel};
use image::{GrayImage, Luma, RgbImage};
use std::path::PathBuf;

/// Per-frame processing step of the pipeline.
///
/// Implementations must never be invoked concurrently on the same instance;
/// the worker loop guarantees strictly sequential calls.
pub trait FrameProcessor: Send {
    /// Process one frame, returning a result with identical dimensions.
    fn process(&mut self, frame: &RgbImage) -> Result<RgbImage>;
}

/// Segmentation model plus compositor for the chosen background mode.
///
/// Construction is the expensive step of a run; the per-frame call is
/// synchronous and dominated by inference.
pub struct RemovalEngine {
    model: Box<dyn SegmentationModel>,
    compositor: Compositor,
}

impl RemovalEngine {
    /// Build the engine for a run: load the checkpoint onto the requested
    /// device and, for `Custom Image` mode only, load the backdrop still.
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let model = segmentation::load_model(config)?;
        Self::with_model(model, config)
    }

    /// Assemble an engine around an existing model. Test seam.
    pub fn with_model(model: Box<dyn SegmentationModel>, config: &RunConfig) -> Result<Self> {
        let compositor = if config.mode == BackgroundMode::CustomImage {
            let path = config.custom_image.as_deref().ok_or_else(|| {
                PipelineError::validation("Custom Image mode requires a custom image path")
            })?;
            Compositor::with_backdrop_file(config.mode, path)?
        } else {
            // The custom image path is never read for any other mode.
            Compositor::new(config.mode, None)
        };
        Ok(Self { model, compositor })
    }
}

impl FrameProcessor for RemovalEngine {
    fn process(&mut self, frame: &RgbImage) -> Result<RgbImage> {
        let matte = self.model.segment(frame)?;
        self.compositor.composite(frame, &matte)
    }
}

/// One-shot single-image path: open, infer once, save. No loop, no abort,
/// no preview.
pub fn process_image(config: &RunConfig) -> Result<PathBuf> {
    config.validate()?;
    let model = segmentation::load_model(config)?;
    process_image_with(config, model)
}

/// Single-image processing with a caller-supplied model. Test seam.
pub fn process_image_with(
    config: &RunConfig,
    mut model: Box<dyn SegmentationModel>,
) -> Result<PathBuf> {
    config.validate()?;
    let frame = image::open(&config.source)
        .map_err(|err| {
            PipelineError::io(format!(
                "failed to open image {}: {err}",
                config.source.display()
            ))
        })?
        .to_rgb8();

    let matte = model.segment(&frame)?;
    let output_path = config.output_image_path();

    match config.mode {
        BackgroundMode::Map => {
            let (width, height) = frame.dimensions();
            let gray = GrayImage::from_fn(width, height, |x, y| {
                let idx = (y * width + x) as usize;
                Luma([(matte[idx] * 255.0).clamp(0.0, 255.0) as u8])
            });
            gray.save(&output_path)?;
        }
        _ => {
            // Subject cut out on a transparent background.
            compose::cutout_rgba(&frame, &matte).save(&output_path)?;
        }
    }

    tracing::info!("Image result saved to {}", output_path.display());
    Ok(output_path)
}
