//! Plate detection and reading.
//!
//! The detector and recognizer are external models behind narrow traits; this
//! module crops, filters and packages their output as review candidates.

pub mod pipeline;
pub mod validator;

pub use pipeline::RecognitionPipeline;
pub use validator::{NonEmptyText, PlatePattern, PlateValidator};

use crate::capture::Frame;
use crate::error::Result;
use async_trait::async_trait;
use image::RgbImage;

/// Axis-aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Detector score, when the model reports one
    pub score: Option<f32>,
}

/// Integer region fully inside an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            score: None,
        }
    }

    /// Clip the box to a `width` x `height` image.
    ///
    /// Boxes that lie partly outside are clipped; boxes with no area left
    /// inside the image give `None`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Region> {
        let coords = [self.x1, self.y1, self.x2, self.y2];
        if coords.iter().any(|c| !c.is_finite()) {
            return None;
        }

        let (left, right) = (self.x1.min(self.x2), self.x1.max(self.x2));
        let (top, bottom) = (self.y1.min(self.y2), self.y1.max(self.y2));

        let x1 = left.floor().clamp(0.0, width as f32) as u32;
        let x2 = right.ceil().clamp(0.0, width as f32) as u32;
        let y1 = top.floor().clamp(0.0, height as f32) as u32;
        let y2 = bottom.ceil().clamp(0.0, height as f32) as u32;

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(Region {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }
}

/// Text read from a plate crop
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub confidence: Option<f32>,
}

impl Recognition {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence: Some(confidence),
        }
    }
}

/// Finds plate regions in a full frame
#[async_trait]
pub trait PlateDetector: Send + Sync {
    async fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>>;
}

/// Reads the text on a cropped plate; `None` when nothing legible was found
#[async_trait]
pub trait PlateRecognizer: Send + Sync {
    async fn recognize(&self, crop: &RgbImage) -> Result<Option<Recognition>>;
}

/// A recognized plate waiting for operator review
#[derive(Debug, Clone)]
pub struct Candidate {
    pub text: String,
    pub confidence: Option<f32>,
    /// Detector box as reported
    pub bbox: BoundingBox,
    /// Box clipped to the frame, the area that was cropped
    pub region: Region,
    pub crop: RgbImage,
    pub frame: Frame,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_inside() {
        let region = BoundingBox::new(10.2, 20.0, 50.0, 40.7).clamp_to(100, 100);
        assert_eq!(
            region,
            Some(Region {
                x: 10,
                y: 20,
                width: 40,
                height: 21
            })
        );
    }

    #[test]
    fn test_clamp_partially_outside_is_clipped() {
        let region = BoundingBox::new(-15.0, 90.0, 30.0, 130.0).clamp_to(100, 100);
        assert_eq!(
            region,
            Some(Region {
                x: 0,
                y: 90,
                width: 30,
                height: 10
            })
        );
    }

    #[test]
    fn test_clamp_swapped_corners() {
        let region = BoundingBox::new(30.0, 30.0, 10.0, 10.0).clamp_to(100, 100);
        assert_eq!(
            region,
            Some(Region {
                x: 10,
                y: 10,
                width: 20,
                height: 20
            })
        );
    }

    #[test]
    fn test_clamp_outside_or_degenerate() {
        assert_eq!(BoundingBox::new(120.0, 10.0, 150.0, 20.0).clamp_to(100, 100), None);
        assert_eq!(BoundingBox::new(10.0, 10.0, 10.0, 40.0).clamp_to(100, 100), None);
        assert_eq!(BoundingBox::new(f32::NAN, 0.0, 5.0, 5.0).clamp_to(100, 100), None);
    }
}
