use chrono::{DateTime, Utc};
use image::RgbImage;
use std::sync::Arc;

/// A captured video frame.
///
/// The pixels are shared, so cloning a frame never copies the image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in capture order, starting at 1 for every stream start
    pub seq: u64,
    pub captured_at: DateTime<Utc>,
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(seq: u64, image: RgbImage) -> Self {
        Self {
            seq,
            captured_at: Utc::now(),
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
