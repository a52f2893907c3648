use crate::error::{PipelineError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How the subject is rendered against a new background.
///
/// Closed set; unknown labels are a validation error rather than a silent
/// fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundMode {
    /// Grayscale confidence matte.
    Map,
    /// Subject over solid green.
    Green,
    /// Subject over solid white.
    White,
    /// Subject over a blurred copy of its own background.
    Blur,
    /// Translucent green wash over the background, subject untouched.
    Overlay,
    /// Subject over a user-supplied still image.
    CustomImage,
}

impl BackgroundMode {
    pub const ALL: [BackgroundMode; 6] = [
        BackgroundMode::Map,
        BackgroundMode::Green,
        BackgroundMode::White,
        BackgroundMode::Blur,
        BackgroundMode::Overlay,
        BackgroundMode::CustomImage,
    ];

    /// Case-sensitive label exposed to callers and used in output file names.
    pub fn label(&self) -> &'static str {
        match self {
            BackgroundMode::Map => "map",
            BackgroundMode::Green => "green",
            BackgroundMode::White => "white",
            BackgroundMode::Blur => "blur",
            BackgroundMode::Overlay => "overlay",
            BackgroundMode::CustomImage => "Custom Image",
        }
    }
}

impl fmt::Display for BackgroundMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BackgroundMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        BackgroundMode::ALL
            .into_iter()
            .find(|mode| mode.label() == s)
            .ok_or_else(|| PipelineError::validation(format!("unknown background type: {s:?}")))
    }
}

/// Where inference runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

impl Device {
    pub fn label(&self) -> &'static str {
        match self {
            Device::Cpu => "CPU",
            Device::Gpu => "GPU",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Device {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CPU" => Ok(Device::Cpu),
            "GPU" => Ok(Device::Gpu),
            other => Err(PipelineError::validation(format!(
                "unknown device: {other:?} (expected CPU or GPU)"
            ))),
        }
    }
}

/// Parameters for one background-removal run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Input image or video file.
    pub source: PathBuf,
    /// Directory the result is written into.
    pub destination: PathBuf,
    pub mode: BackgroundMode,
    /// Backdrop still, required iff `mode` is `Custom Image`. Never read for
    /// any other mode.
    pub custom_image: Option<PathBuf>,
    /// Model checkpoint (ONNX).
    pub checkpoint: PathBuf,
    pub device: Device,
    /// Trade quality for speed by running the model at a smaller input size.
    pub fast: bool,
    /// Enable ahead-of-time graph optimization when building the session.
    pub precompiled: bool,
}

impl RunConfig {
    /// Check the invariants from the data model. Violations are reported
    /// before any resource is opened.
    pub fn validate(&self) -> Result<()> {
        if self.source.as_os_str().is_empty() {
            return Err(PipelineError::validation("source path is empty"));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(PipelineError::validation("destination folder is empty"));
        }
        if !self.destination.is_dir() {
            return Err(PipelineError::validation(format!(
                "destination {} is not a directory",
                self.destination.display()
            )));
        }
        if self.checkpoint.as_os_str().is_empty() {
            return Err(PipelineError::validation("checkpoint path is empty"));
        }
        match (self.mode, &self.custom_image) {
            (BackgroundMode::CustomImage, None) => Err(PipelineError::validation(
                "background type \"Custom Image\" requires a custom image path",
            )),
            (BackgroundMode::CustomImage, Some(path)) if path.as_os_str().is_empty() => Err(
                PipelineError::validation("custom image path is empty"),
            ),
            (mode, Some(_)) if mode != BackgroundMode::CustomImage => {
                Err(PipelineError::validation(format!(
                    "custom image path is only valid with \"Custom Image\", not {mode}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Whether the source is treated as a video container, by extension.
    pub fn is_video_source(&self) -> bool {
        matches!(
            self.source
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase())
                .as_deref(),
            Some("mp4" | "avi" | "mov")
        )
    }

    /// Output file for a video run: source base name, mode label, fixed
    /// suffix, placed in the destination folder.
    pub fn output_video_path(&self) -> PathBuf {
        let stem = self
            .source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        self.destination
            .join(format!("{stem}_{}_processed.mp4", self.mode.label()))
    }

    /// Fixed-named output for single-image runs.
    pub fn output_image_path(&self) -> PathBuf {
        self.destination.join("background_removed.png")
    }
}

/// Find a default checkpoint the way the desktop tool did: the first model
/// file inside a `ckpt/` folder next to the working directory.
pub fn default_checkpoint() -> Option<PathBuf> {
    let ckpt_dir = Path::new("ckpt");
    let mut entries: Vec<PathBuf> = std::fs::read_dir(ckpt_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"))
        })
        .collect();
    entries.sort();
    entries.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(dest: &Path) -> RunConfig {
        RunConfig {
            source: PathBuf::from("clip.mp4"),
            destination: dest.to_path_buf(),
            mode: BackgroundMode::Map,
            custom_image: None,
            checkpoint: PathBuf::from("ckpt/rvm.onnx"),
            device: Device::Cpu,
            fast: false,
            precompiled: false,
        }
    }

    #[test]
    fn mode_labels_round_trip() {
        for mode in BackgroundMode::ALL {
            assert_eq!(mode.label().parse::<BackgroundMode>().unwrap(), mode);
        }
        assert!("greenscreen".parse::<BackgroundMode>().is_err());
        // Labels are case-sensitive.
        assert!("custom image".parse::<BackgroundMode>().is_err());
    }

    #[test]
    fn empty_destination_is_rejected() {
        let mut config = base_config(Path::new("nonexistent-dir"));
        match config.validate() {
            Err(PipelineError::Validation(message)) => {
                assert!(message.contains("is not a directory"), "{message}");
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
        config.destination = PathBuf::new();
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn custom_image_required_iff_custom_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config(dir.path());

        config.mode = BackgroundMode::CustomImage;
        assert!(config.validate().is_err());

        config.custom_image = Some(PathBuf::from("backdrop.png"));
        assert!(config.validate().is_ok());

        config.mode = BackgroundMode::Green;
        assert!(config.validate().is_err());

        config.custom_image = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn video_detection_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config(dir.path());
        for ext in ["mp4", "MOV", "avi"] {
            config.source = PathBuf::from(format!("input.{ext}"));
            assert!(config.is_video_source(), "{ext} should be video");
        }
        config.source = PathBuf::from("input.png");
        assert!(!config.is_video_source());
    }

    #[test]
    fn output_names_carry_stem_and_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config(dir.path());
        config.source = PathBuf::from("/videos/holiday.mp4");
        config.mode = BackgroundMode::Blur;
        assert_eq!(
            config.output_video_path(),
            dir.path().join("holiday_blur_processed.mp4")
        );
        assert_eq!(
            config.output_image_path(),
            dir.path().join("background_removed.png")
        );
    }
}
