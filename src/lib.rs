//! License-plate detection and reading on still images.
//!
//! Chains two pretrained models through ONNX Runtime: a YOLO-family
//! detector locates plates (or vehicles, with a stock COCO model) and a CTC
//! text recognizer reads the cropped regions. This crate sequences detect,
//! crop, read and annotate; the models do everything model-shaped.

use std::time::{Duration, Instant};

use image::{DynamicImage, GenericImageView, RgbImage};
use serde::Serialize;

pub mod annotate;
pub mod detector;
pub mod error;
pub mod reader;

#[cfg(feature = "gui")]
pub mod gui;

pub use annotate::Annotator;
pub use detector::{Detection, Detector};
pub use error::{Error, Result};
pub use reader::{Charset, Reader, TextSpan};

/// Axis-aligned box in pixel coordinates, top-left and bottom-right corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    /// Clamp all corners into `[0, w] x [0, h]`.
    pub fn clip(&self, image_w: u32, image_h: u32) -> BBox {
        let w = image_w as i32;
        let h = image_h as i32;
        BBox {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

impl std::fmt::Display for BBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x1, self.y1, self.x2, self.y2)
    }
}

/// One detection and whatever was read from its crop: the span texts joined
/// with single spaces, their mean confidence, and the raw spans.
#[derive(Debug, Clone, Serialize)]
pub struct PlateReading {
    pub detection: Detection,
    pub text: String,
    pub confidence: f32,
    pub spans: Vec<TextSpan>,
}

/// Result of one pipeline run.
pub struct Outcome {
    pub annotated: RgbImage,
    pub readings: Vec<PlateReading>,
    pub elapsed: Duration,
}

/// The detect, crop, read, annotate chain. One synchronous pass per image;
/// a failure in any step aborts the run.
pub struct Pipeline {
    detector: Detector,
    reader: Reader,
    annotator: Annotator,
}

impl Pipeline {
    pub fn new(detector: Detector, reader: Reader, annotator: Annotator) -> Self {
        Self {
            detector,
            reader,
            annotator,
        }
    }

    /// Process one image: detect, then for every detection clip its box,
    /// crop, read text, and draw the overlay.
    ///
    /// OCR runs on every detection whatever its class. With a plate model
    /// every box is a plate; with a stock COCO model the text pass simply
    /// comes back empty for most objects.
    pub fn process(&mut self, image: &DynamicImage) -> Result<Outcome> {
        let started = Instant::now();

        let detections = self.detector.detect(image)?;
        tracing::debug!("found {} objects", detections.len());

        let mut annotated = image.to_rgb8();
        let mut readings = Vec::with_capacity(detections.len());
        for detection in detections {
            let spans = match crop_detection(image, &detection.bbox) {
                Some(crop) => self.reader.read_text(&crop)?,
                None => Vec::new(),
            };
            let text = spans
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let confidence = if spans.is_empty() {
                0.0
            } else {
                spans.iter().map(|s| s.confidence).sum::<f32>() / spans.len() as f32
            };
            if text.is_empty() {
                tracing::debug!("no text in {} box {}", detection.class_name, detection.bbox);
            }

            let label = annotate::compose_label(&detection.class_name, &text);
            self.annotator.draw(&mut annotated, &detection.bbox, &label);
            readings.push(PlateReading {
                detection,
                text,
                confidence,
                spans,
            });
        }

        Ok(Outcome {
            annotated,
            readings,
            elapsed: started.elapsed(),
        })
    }
}

/// Clip the box to the image and crop the remaining region; `None` when
/// nothing remains.
pub fn crop_detection(image: &DynamicImage, bbox: &BBox) -> Option<DynamicImage> {
    let (w, h) = image.dimensions();
    let clipped = bbox.clip(w, h);
    if clipped.is_empty() {
        return None;
    }
    Some(image.crop_imm(
        clipped.x1 as u32,
        clipped.y1 as u32,
        clipped.width() as u32,
        clipped.height() as u32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_clamps_corners_into_bounds() {
        let bbox = BBox { x1: -10, y1: -5, x2: 120, y2: 60 };
        assert_eq!(bbox.clip(100, 50), BBox { x1: 0, y1: 0, x2: 100, y2: 50 });
    }

    #[test]
    fn clip_of_outside_box_is_empty() {
        let bbox = BBox { x1: 200, y1: 200, x2: 300, y2: 300 };
        assert!(bbox.clip(100, 50).is_empty());
    }

    #[test]
    fn inverted_box_is_empty() {
        let bbox = BBox { x1: 50, y1: 10, x2: 20, y2: 40 };
        assert_eq!(bbox.width(), 0);
        assert!(bbox.is_empty());
    }

    #[test]
    fn bbox_displays_as_corner_list() {
        let bbox = BBox { x1: 1, y1: 2, x2: 3, y2: 4 };
        assert_eq!(bbox.to_string(), "[1, 2, 3, 4]");
    }

    #[test]
    fn crop_follows_the_clipped_box() {
        let image = DynamicImage::new_rgb8(100, 50);
        let bbox = BBox { x1: -10, y1: -10, x2: 20, y2: 20 };
        let crop = crop_detection(&image, &bbox).unwrap();
        assert_eq!(crop.dimensions(), (20, 20));
    }

    #[test]
    fn crop_of_empty_region_is_none() {
        let image = DynamicImage::new_rgb8(100, 50);
        assert!(crop_detection(&image, &BBox { x1: 200, y1: 0, x2: 300, y2: 20 }).is_none());
        assert!(crop_detection(&image, &BBox { x1: 30, y1: 10, x2: 30, y2: 20 }).is_none());
    }
}
