use crate::config::BackgroundMode;
use crate::error::{PipelineError, Result};
use image::{imageops, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;

const GREEN: [u8; 3] = [0, 255, 0];
const WHITE: [u8; 3] = [255, 255, 255];

/// Blur strength for the `blur` background mode.
const BLUR_SIGMA: f32 = 8.0;

/// Opacity of the green wash in `overlay` mode.
const OVERLAY_STRENGTH: f32 = 0.5;

/// Renders a segmented frame against the configured background.
///
/// Owns the backdrop still for `Custom Image` mode and caches its resized
/// copy so repeated frames of the same size pay for one resize.
pub struct Compositor {
    mode: BackgroundMode,
    backdrop: Option<RgbImage>,
    scaled_backdrop: Option<RgbImage>,
}

impl Compositor {
    pub fn new(mode: BackgroundMode, backdrop: Option<RgbImage>) -> Self {
        Self {
            mode,
            backdrop,
            scaled_backdrop: None,
        }
    }

    /// Load the backdrop still from disk. Only called for `Custom Image`
    /// mode; other modes never read the path.
    pub fn with_backdrop_file(mode: BackgroundMode, path: &Path) -> Result<Self> {
        let backdrop = image::open(path)
            .map_err(|err| {
                PipelineError::io(format!(
                    "failed to load custom image {}: {err}",
                    path.display()
                ))
            })?
            .to_rgb8();
        Ok(Self::new(mode, Some(backdrop)))
    }

    /// Composite one frame against its matte. Output dimensions always equal
    /// the input dimensions.
    pub fn composite(&mut self, frame: &RgbImage, matte: &[f32]) -> Result<RgbImage> {
        let (width, height) = frame.dimensions();
        debug_assert_eq!(matte.len(), (width * height) as usize);

        let out = match self.mode {
            BackgroundMode::Map => matte_to_rgb(matte, width, height),
            BackgroundMode::Green => blend_solid(frame, matte, GREEN),
            BackgroundMode::White => blend_solid(frame, matte, WHITE),
            BackgroundMode::Blur => {
                let blurred = imageops::blur(frame, BLUR_SIGMA);
                blend_image(frame, matte, &blurred)
            }
            BackgroundMode::Overlay => green_wash(frame, matte),
            BackgroundMode::CustomImage => {
                let backdrop = self.scaled_backdrop(width, height)?;
                blend_image(frame, matte, &backdrop)
            }
        };
        Ok(out)
    }

    /// Backdrop resized to exact frame dimensions, cached per size.
    fn scaled_backdrop(&mut self, width: u32, height: u32) -> Result<RgbImage> {
        let backdrop = self.backdrop.as_ref().ok_or_else(|| {
            PipelineError::validation("Custom Image mode requires a backdrop image")
        })?;

        let scaled = match self.scaled_backdrop.take() {
            Some(cached) if cached.dimensions() == (width, height) => cached,
            _ if backdrop.dimensions() == (width, height) => backdrop.clone(),
            _ => imageops::resize(backdrop, width, height, imageops::FilterType::Lanczos3),
        };
        self.scaled_backdrop = Some(scaled.clone());
        Ok(scaled)
    }
}

/// Render a matte as a grayscale RGB image.
pub fn matte_to_rgb(matte: &[f32], width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let idx = (y * width + x) as usize;
        let value = (matte[idx] * 255.0).clamp(0.0, 255.0) as u8;
        Rgb([value, value, value])
    })
}

/// Cut the subject out as a transparent RGBA image, alpha taken from the
/// matte. Used by the single-image path.
pub fn cutout_rgba(frame: &RgbImage, matte: &[f32]) -> RgbaImage {
    let (width, height) = frame.dimensions();
    RgbaImage::from_fn(width, height, |x, y| {
        let idx = (y * width + x) as usize;
        let alpha = (matte[idx] * 255.0).clamp(0.0, 255.0) as u8;
        let pixel = frame.get_pixel(x, y);
        Rgba([pixel[0], pixel[1], pixel[2], alpha])
    })
}

fn blend_solid(frame: &RgbImage, matte: &[f32], color: [u8; 3]) -> RgbImage {
    blend_with(frame, matte, |_, _| color)
}

fn blend_image(frame: &RgbImage, matte: &[f32], background: &RgbImage) -> RgbImage {
    blend_with(frame, matte, |x, y| background.get_pixel(x, y).0)
}

/// Subject kept, background tinted towards green.
fn green_wash(frame: &RgbImage, matte: &[f32]) -> RgbImage {
    blend_with(frame, matte, |x, y| {
        let pixel = frame.get_pixel(x, y);
        let mut washed = [0u8; 3];
        for c in 0..3 {
            let original = pixel[c] as f32;
            let tint = GREEN[c] as f32;
            washed[c] = (original * (1.0 - OVERLAY_STRENGTH) + tint * OVERLAY_STRENGTH)
                .clamp(0.0, 255.0) as u8;
        }
        washed
    })
}

/// Per-pixel alpha blend of the frame over a background supplied by `bg_at`.
fn blend_with<F>(frame: &RgbImage, matte: &[f32], bg_at: F) -> RgbImage
where
    F: Fn(u32, u32) -> [u8; 3],
{
    let (width, height) = frame.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let idx = (y * width + x) as usize;
        let alpha = matte[idx].clamp(0.0, 1.0);
        let fg = frame.get_pixel(x, y);
        let bg = bg_at(x, y);
        let mut out = [0u8; 3];
        for c in 0..3 {
            out[c] = (fg[c] as f32 * alpha + bg[c] as f32 * (1.0 - alpha))
                .clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}
