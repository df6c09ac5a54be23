use super::{Candidate, NonEmptyText, PlateDetector, PlateRecognizer, PlateValidator};
use crate::capture::Frame;
use crate::error::Error;
use image::imageops;
use log::{debug, warn};
use std::sync::Arc;

/// Detector, recognizer and validity predicate run in sequence on one frame
#[derive(Clone)]
pub struct RecognitionPipeline {
    detector: Arc<dyn PlateDetector>,
    recognizer: Arc<dyn PlateRecognizer>,
    validator: Arc<dyn PlateValidator>,
}

impl RecognitionPipeline {
    pub fn new(
        detector: Arc<dyn PlateDetector>,
        recognizer: Arc<dyn PlateRecognizer>,
        validator: Arc<dyn PlateValidator>,
    ) -> Self {
        Self {
            detector,
            recognizer,
            validator,
        }
    }

    /// Pipeline that accepts any non-empty text
    pub fn with_defaults(
        detector: Arc<dyn PlateDetector>,
        recognizer: Arc<dyn PlateRecognizer>,
    ) -> Self {
        Self::new(detector, recognizer, Arc::new(NonEmptyText))
    }

    /// Valid candidates in `frame`, in detector order.
    ///
    /// Inference errors are logged and absorbed: a detector failure gives no
    /// candidates, a recognizer failure drops only that crop.
    pub async fn process(&self, frame: &Frame) -> Vec<Candidate> {
        let image = frame.image.as_ref();

        let boxes = match self.detector.detect(image).await {
            Ok(boxes) => boxes,
            Err(e) => {
                warn!("{}", as_inference_failure(e, "detector", frame.seq));
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for bbox in boxes {
            let region = match bbox.clamp_to(image.width(), image.height()) {
                Some(region) => region,
                None => {
                    debug!("Skipping box outside frame {}: {:?}", frame.seq, bbox);
                    continue;
                }
            };

            let crop =
                imageops::crop_imm(image, region.x, region.y, region.width, region.height)
                    .to_image();

            let recognition = match self.recognizer.recognize(&crop).await {
                Ok(Some(recognition)) => recognition,
                Ok(None) => continue,
                Err(e) => {
                    warn!("{}", as_inference_failure(e, "recognizer", frame.seq));
                    continue;
                }
            };

            let text = recognition.text.trim();
            if text.is_empty() || !self.validator.is_valid(&recognition) {
                debug!("Rejected reading {:?} in frame {}", recognition.text, frame.seq);
                continue;
            }

            candidates.push(Candidate {
                text: text.to_string(),
                confidence: recognition.confidence,
                bbox,
                region,
                crop,
                frame: frame.clone(),
            });
        }

        candidates
    }
}

fn as_inference_failure(err: Error, stage: &str, seq: u64) -> Error {
    match err {
        Error::InferenceFailure(msg) => {
            Error::InferenceFailure(format!("{} on frame {}: {}", stage, seq, msg))
        }
        other => Error::InferenceFailure(format!("{} on frame {}: {}", stage, seq, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::recognition::{BoundingBox, PlatePattern, Recognition};
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedDetector(Result<Vec<BoundingBox>>);

    #[async_trait]
    impl PlateDetector for FixedDetector {
        async fn detect(&self, _image: &RgbImage) -> Result<Vec<BoundingBox>> {
            self.0.clone()
        }
    }

    /// Reads the red channel of the crop's top-left pixel as a lookup key
    struct ColorRecognizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PlateRecognizer for ColorRecognizer {
        async fn recognize(&self, crop: &RgbImage) -> Result<Option<Recognition>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match crop.get_pixel(0, 0).0[0] {
                10 => Ok(Some(Recognition::new(" AB12CD "))),
                20 => Ok(Some(Recognition::new("   "))),
                30 => Ok(None),
                40 => Err(Error::InferenceFailure("model crashed".to_string())),
                50 => Ok(Some(Recognition::with_confidence("XY99ZZ", 0.2))),
                _ => Ok(Some(Recognition::new("KA01AB1234"))),
            }
        }
    }

    fn recognizer() -> Arc<ColorRecognizer> {
        Arc::new(ColorRecognizer {
            calls: AtomicUsize::new(0),
        })
    }

    /// 100x100 frame with one 10x10 block per lookup value along the diagonal
    fn frame() -> Frame {
        let mut image = RgbImage::new(100, 100);
        for (i, value) in [10u8, 20, 30, 40, 50, 60].iter().enumerate() {
            let origin = i as u32 * 15;
            for y in origin..origin + 10 {
                for x in origin..origin + 10 {
                    image.put_pixel(x, y, Rgb([*value, 0, 0]));
                }
            }
        }
        Frame::new(7, image)
    }

    fn block(i: u32) -> BoundingBox {
        let origin = (i * 15) as f32;
        BoundingBox::new(origin, origin, origin + 10.0, origin + 10.0)
    }

    #[tokio::test]
    async fn test_keeps_valid_candidates_in_detector_order() {
        let detector = FixedDetector(Ok(vec![block(5), block(1), block(0), block(2)]));
        let pipeline = RecognitionPipeline::with_defaults(Arc::new(detector), recognizer());

        let candidates = pipeline.process(&frame()).await;
        let texts: Vec<_> = candidates.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["KA01AB1234", "AB12CD"]);

        let first = &candidates[0];
        assert_eq!(first.crop.dimensions(), (10, 10));
        assert_eq!(first.region.x, 75);
        assert_eq!(first.frame.seq, 7);
    }

    #[tokio::test]
    async fn test_recognizer_error_skips_only_that_crop() {
        let detector = FixedDetector(Ok(vec![block(3), block(0)]));
        let recognizer = recognizer();
        let pipeline = RecognitionPipeline::with_defaults(Arc::new(detector), recognizer.clone());

        let candidates = pipeline.process(&frame()).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].text, "AB12CD");
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_detector_error_gives_no_candidates() {
        let detector = FixedDetector(Err(Error::InferenceFailure("no gpu".to_string())));
        let recognizer = recognizer();
        let pipeline = RecognitionPipeline::with_defaults(Arc::new(detector), recognizer.clone());

        assert!(pipeline.process(&frame()).await.is_empty());
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_boxes_outside_frame_are_not_recognized() {
        let detector = FixedDetector(Ok(vec![
            BoundingBox::new(150.0, 150.0, 180.0, 170.0),
            BoundingBox::new(40.0, 40.0, 40.0, 60.0),
        ]));
        let recognizer = recognizer();
        let pipeline = RecognitionPipeline::with_defaults(Arc::new(detector), recognizer.clone());

        assert!(pipeline.process(&frame()).await.is_empty());
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validator_filters_readings() -> anyhow::Result<()> {
        let detector = FixedDetector(Ok(vec![block(0), block(4), block(5)]));
        let validator = PlatePattern::new(Some(r"^[A-Z]{2}\d{2}"), Some(0.5))?;
        let pipeline =
            RecognitionPipeline::new(Arc::new(detector), recognizer(), Arc::new(validator));

        let candidates = pipeline.process(&frame()).await;
        let texts: Vec<_> = candidates.iter().map(|c| c.text.as_str()).collect();
        // XY99ZZ matches the pattern but is below the confidence floor
        assert_eq!(texts, vec!["AB12CD", "KA01AB1234"]);
        Ok(())
    }
}
