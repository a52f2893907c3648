use crate::error::Result;
use image::RgbImage;

/// Alpha matte: grayscale values where 0.0 = background, 1.0 = foreground
/// Dimensions match the input frame dimensions
pub type Matte = Vec<f32>;

/// Trait for segmentation models
/// Allows swapping between different backends (RVM, MODNet, MediaPipe, etc.)
/// and substituting a stub model in tests.
pub trait SegmentationModel: Send {
    /// Process a frame and return an alpha matte
    ///
    /// # Arguments
    /// * `frame` - Input RGB frame
    ///
    /// # Returns
    /// * Alpha matte with values 0.0-1.0, flattened in row-major order
    fn segment(&mut self, frame: &RgbImage) -> Result<Matte>;

    /// Get the model's preferred input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}
