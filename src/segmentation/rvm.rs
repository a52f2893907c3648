use super::preprocess::Preprocessor;
use super::types::{Matte, SegmentationModel};
use super::ModelOptions;
use crate::config::Device;
use crate::error::{PipelineError, Result};
use image::RgbImage;
use ndarray::{Array4, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};

/// Model input size for normal quality.
const INPUT_SIZE: u32 = 512;
/// Model input size when fast mode trades quality for speed.
const INPUT_SIZE_FAST: u32 = 256;

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,

    // Recurrent hidden states
    // These are updated after each inference and fed back in the next frame
    r1: Option<Array4<f32>>,
    r2: Option<Array4<f32>>,
    r3: Option<Array4<f32>>,
    r4: Option<Array4<f32>>,

    // Downsample ratio for hidden states
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX checkpoint.
    ///
    /// This is the expensive step of a run. Fails with `ModelLoad` when the
    /// checkpoint is missing/incompatible or the requested device cannot be
    /// initialized.
    pub fn new(options: &ModelOptions) -> Result<Self> {
        let path = options.checkpoint.as_path();

        tracing::info!("Loading RVM model from {}", path.display());

        if !path.is_file() {
            return Err(PipelineError::ModelLoad {
                path: path.to_path_buf(),
                reason: "checkpoint file not found".into(),
            });
        }

        let model_load = |err: ort::Error| PipelineError::ModelLoad {
            path: path.to_path_buf(),
            reason: err.to_string(),
        };

        // Precompiled mode spends startup time on full graph optimization.
        let optimization = if options.precompiled {
            GraphOptimizationLevel::Level3
        } else {
            GraphOptimizationLevel::Level1
        };

        let mut builder = Session::builder()
            .map_err(model_load)?
            .with_optimization_level(optimization)
            .map_err(model_load)?
            .with_intra_threads(4)
            .map_err(model_load)?;

        if options.device == Device::Gpu {
            // Fail loudly instead of silently falling back to CPU.
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .build()
                    .error_on_failure()])
                .map_err(|err| PipelineError::ModelLoad {
                    path: path.to_path_buf(),
                    reason: format!("GPU device unavailable: {err}"),
                })?;
        }

        let session = builder.commit_from_file(path).map_err(model_load)?;

        tracing::info!("RVM model loaded successfully on {}", options.device);

        let size = if options.fast {
            INPUT_SIZE_FAST
        } else {
            INPUT_SIZE
        };
        let preprocessor = Preprocessor::new(size, size);

        Ok(Self {
            session,
            preprocessor,
            width: size,
            height: size,
            r1: None,
            r2: None,
            r3: None,
            r4: None,
            downsample_ratio: 0.25,
        })
    }

    /// Initialize hidden states to zeros
    fn init_hidden_states(&mut self) {
        let h = (self.height as f32 * self.downsample_ratio) as usize;
        let w = (self.width as f32 * self.downsample_ratio) as usize;

        tracing::debug!("Initializing hidden states to {}x{}", w, h);

        self.r1 = Some(Array4::zeros((1, 16, h, w)));
        self.r2 = Some(Array4::zeros((1, 20, h / 2, w / 2)));
        self.r3 = Some(Array4::zeros((1, 24, h / 4, w / 4)));
        self.r4 = Some(Array4::zeros((1, 28, h / 8, w / 8)));
    }
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(&mut self, frame: &RgbImage) -> Result<Matte> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        // Initialize hidden states on first frame
        if self.r1.is_none() {
            self.init_hidden_states();
        }

        // Preprocess frame to NCHW tensor
        let input_tensor = self.preprocessor.preprocess(frame)?;

        let inference = |err: ort::Error| PipelineError::Inference(err.to_string());

        // Prepare inputs for ONNX Runtime
        // RVM expects: src (frame), r1, r2, r3, r4
        let r1 = self.r1.as_ref().unwrap();
        let r2 = self.r2.as_ref().unwrap();
        let r3 = self.r3.as_ref().unwrap();
        let r4 = self.r4.as_ref().unwrap();

        // Run inference
        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(
                ort::inputs![
                    input_tensor.view(),
                    r1.view(),
                    r2.view(),
                    r3.view(),
                    r4.view()
                ]
                .map_err(inference)?,
            )
            .map_err(inference)?;
        drop(_infer_span);

        // Extract outputs: fgr (foreground), pha (alpha), r1, r2, r3, r4
        // We only need pha (the matte) and the updated hidden states

        // Alpha matte is typically the second output (index 1)
        let pha = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(inference)?
            .view()
            .to_owned()
            .into_dimensionality::<IxDyn>()
            .map_err(|err| PipelineError::Inference(err.to_string()))?;

        // Update hidden states for next frame
        for (slot, index) in [
            (&mut self.r1, 2usize),
            (&mut self.r2, 3),
            (&mut self.r3, 4),
            (&mut self.r4, 5),
        ] {
            *slot = Some(
                outputs[index]
                    .try_extract_tensor::<f32>()
                    .map_err(inference)?
                    .view()
                    .to_owned()
                    .into_dimensionality()
                    .map_err(|err| PipelineError::Inference(err.to_string()))?,
            );
        }

        // Extract matte values (shape: [1, 1, H, W])
        let matte_shape = pha.shape();
        let matte_height = matte_shape[2];
        let matte_width = matte_shape[3];

        // Flatten to Vec<f32>
        let matte_flat: Vec<f32> = pha.iter().copied().collect();

        // Postprocess: resize back to original frame dimensions
        let (frame_width, frame_height) = frame.dimensions();
        let final_matte = Preprocessor::postprocess_matte(
            &matte_flat,
            matte_width as u32,
            matte_height as u32,
            frame_width,
            frame_height,
        )?;

        Ok(final_matte)
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
