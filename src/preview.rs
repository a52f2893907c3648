use image::{imageops, RgbImage};
use std::sync::Mutex;

/// Fixed thumbnail size for live previews.
pub const PREVIEW_WIDTH: u32 = 320;
pub const PREVIEW_HEIGHT: u32 = 240;

/// A raw/processed thumbnail pair. Ownership passes to whoever takes it.
pub struct PreviewPair {
    pub original: RgbImage,
    pub processed: RgbImage,
}

/// Latest-value slot for live previews.
///
/// Best-effort delivery: publishing a new pair discards an unconsumed
/// previous pair, so the worker never waits on a slow consumer.
pub struct PreviewPublisher {
    slot: Mutex<Option<PreviewPair>>,
}

impl PreviewPublisher {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Downsample both frames to thumbnail size and replace whatever is in
    /// the slot.
    pub fn publish(&self, original: &RgbImage, processed: &RgbImage) {
        let pair = PreviewPair {
            original: thumbnail(original),
            processed: thumbnail(processed),
        };
        *self.slot.lock().unwrap() = Some(pair);
    }

    /// Hand the latest pair to the caller, leaving the slot empty.
    pub fn take(&self) -> Option<PreviewPair> {
        self.slot.lock().unwrap().take()
    }

    /// Drop any pending pair. Called on run teardown.
    pub fn clear(&self) {
        *self.slot.lock().unwrap() = None;
    }
}

impl Default for PreviewPublisher {
    fn default() -> Self {
        Self::new()
    }
}

fn thumbnail(frame: &RgbImage) -> RgbImage {
    imageops::resize(
        frame,
        PREVIEW_WIDTH,
        PREVIEW_HEIGHT,
        imageops::FilterType::Triangle,
    )
}
