mod preprocess;
mod rvm;
pub mod types;

pub use preprocess::Preprocessor;
pub use rvm::RobustVideoMatting;
pub use types::{Matte, SegmentationModel};

use crate::config::{Device, RunConfig};
use crate::error::Result;
use std::path::PathBuf;

/// Everything the model needs at construction time.
#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub checkpoint: PathBuf,
    pub device: Device,
    pub fast: bool,
    pub precompiled: bool,
}

impl ModelOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            checkpoint: config.checkpoint.clone(),
            device: config.device,
            fast: config.fast,
            precompiled: config.precompiled,
        }
    }
}

/// Create the default segmentation model (RVM) for a run.
pub fn load_model(config: &RunConfig) -> Result<Box<dyn SegmentationModel>> {
    let model = RobustVideoMatting::new(&ModelOptions::from_config(config))?;
    Ok(Box::new(model))
}
