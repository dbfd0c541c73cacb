//! YOLO detector wrapper.
//!
//! Wraps a pretrained YOLO-family detection model (an ultralytics ONNX
//! export with the raw `[1, 4+nc, N]` head) behind ONNX Runtime and
//! normalizes its output into plain [`Detection`] records. The model does
//! the detecting; this module only marshals pixels in and boxes out:
//! letterbox resize, candidate decode, confidence filter, non-maximum
//! suppression, and the map back to source-image coordinates.

use std::path::Path;

use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::BBox;

/// Network input edge, pixels. Ultralytics exports default to 640.
pub const INPUT_SIZE: u32 = 640;
/// Confidence threshold the original tool ships with.
pub const DEFAULT_CONF_THRESHOLD: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
/// Upper bound on detections kept after suppression.
pub const MAX_DETECTIONS: usize = 300;

/// Letterbox padding value, the gray ultralytics trains with.
const PAD_VALUE: u8 = 114;

/// Class names for the 80-class COCO models (`yolov8n.onnx` and friends).
/// Used when the model carries no usable `names` metadata of its own.
pub const COCO_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// One detected object: box in source-image pixels, confidence, class.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

/// Detection model session plus the knobs around it.
pub struct Detector {
    session: Session,
    names: Vec<String>,
    conf_threshold: f32,
    iou_threshold: f32,
}

impl Detector {
    /// Load a detection model from an ONNX file.
    ///
    /// Fails with [`Error::ModelNotFound`] when the path does not exist;
    /// unlike the Python ecosystem, nothing here downloads weights by name.
    pub fn from_file(model_path: impl AsRef<Path>) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(Error::ModelNotFound(model_path.to_path_buf()));
        }

        tracing::info!("loading detection model from {}", model_path.display());
        let session = Session::builder()?
            .with_intra_threads(4)?
            .commit_from_file(model_path)?;

        let names = match names_from_metadata(&session) {
            Some(names) => {
                tracing::debug!("resolved {} class names from model metadata", names.len());
                names
            }
            None => {
                tracing::debug!("no names metadata, assuming COCO classes");
                COCO_NAMES.iter().map(|s| s.to_string()).collect()
            }
        };

        Ok(Self {
            session,
            names,
            conf_threshold: DEFAULT_CONF_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    pub fn with_conf_threshold(mut self, threshold: f32) -> Self {
        self.conf_threshold = threshold;
        self
    }

    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    pub fn class_names(&self) -> &[String] {
        &self.names
    }

    /// Run the model on one image and return its detections, boxes clipped
    /// to the image bounds and sorted by descending confidence.
    ///
    /// An image in which nothing clears the confidence threshold yields an
    /// empty vec, not an error.
    pub fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let (src_w, src_h) = image.dimensions();
        let (canvas, letterbox) = letterbox(image, INPUT_SIZE);
        let input = image_tensor(&canvas);

        let input_value = Value::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();

        let candidates = decode_raw_head(&dims, data, self.conf_threshold)?;
        tracing::debug!("{} candidates above threshold {}", candidates.len(), self.conf_threshold);

        let mut kept = nms(candidates, self.iou_threshold);
        kept.truncate(MAX_DETECTIONS);

        let detections = kept
            .into_iter()
            .map(|c| {
                let (x1, y1) = letterbox.to_source(c.x1, c.y1);
                let (x2, y2) = letterbox.to_source(c.x2, c.y2);
                let bbox = BBox {
                    x1: x1.round() as i32,
                    y1: y1.round() as i32,
                    x2: x2.round() as i32,
                    y2: y2.round() as i32,
                }
                .clip(src_w, src_h);
                let class_name = self
                    .names
                    .get(c.class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", c.class_id));
                tracing::trace!(
                    "det {} score {:.3} at {},{} - {},{}",
                    class_name, c.score, bbox.x1, bbox.y1, bbox.x2, bbox.y2
                );
                Detection {
                    bbox,
                    confidence: c.score,
                    class_id: c.class_id,
                    class_name,
                }
            })
            .collect();
        Ok(detections)
    }
}

/// Scale and offsets of a letterbox resize, kept so network coordinates can
/// be mapped back onto the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Aspect-preserving resize onto a `size`×`size` gray canvas.
pub(crate) fn letterbox(image: &DynamicImage, size: u32) -> (RgbImage, Letterbox) {
    let (w, h) = image.dimensions();
    let scale = (size as f32 / w as f32).min(size as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);

    let resized = imageops::resize(&image.to_rgb8(), new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE, PAD_VALUE, PAD_VALUE]));
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;
    imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// RGB canvas to normalized NCHW float tensor.
fn image_tensor(canvas: &RgbImage) -> Array4<f32> {
    let (w, h) = canvas.dimensions();
    let mut input = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let Rgb([r, g, b]) = *pixel;
        input[[0, 0, y as usize, x as usize]] = r as f32 / 255.0;
        input[[0, 1, y as usize, x as usize]] = g as f32 / 255.0;
        input[[0, 2, y as usize, x as usize]] = b as f32 / 255.0;
    }
    input
}

/// Box candidate in network coordinates, pre-suppression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
}

/// Decode the raw ultralytics head: `[1, 4+nc, N]`, rows are
/// `cx, cy, w, h` then one sigmoid score per class.
pub(crate) fn decode_raw_head(
    dims: &[usize],
    data: &[f32],
    conf_threshold: f32,
) -> Result<Vec<Candidate>> {
    if dims.len() != 3 || dims[0] != 1 || dims[1] < 5 || dims[1] > dims[2] {
        return Err(Error::ModelOutput(format!(
            "expected a [1, 4+nc, N] detection head, got {:?}",
            dims
        )));
    }
    let attrs = dims[1];
    let anchors = dims[2];
    let num_classes = attrs - 4;
    if data.len() != attrs * anchors {
        return Err(Error::ModelOutput(format!(
            "head shape {:?} does not match {} values",
            dims,
            data.len()
        )));
    }

    let at = |attr: usize, anchor: usize| data[attr * anchors + anchor];
    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut class_id = 0;
        let mut score = at(4, anchor);
        for class in 1..num_classes {
            let s = at(4 + class, anchor);
            if s > score {
                score = s;
                class_id = class;
            }
        }
        if score < conf_threshold {
            continue;
        }
        let cx = at(0, anchor);
        let cy = at(1, anchor);
        let w = at(2, anchor);
        let h = at(3, anchor);
        candidates.push(Candidate {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            score,
            class_id,
        });
    }
    Ok(candidates)
}

/// Greedy per-class non-maximum suppression. Returns survivors sorted by
/// descending score.
pub(crate) fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

pub(crate) fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let intersection = ix * iy;
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

/// Pull class names out of the model's custom metadata. Ultralytics exports
/// store them under `names` as a Python-style dict: `{0: 'person', ...}`.
fn names_from_metadata(session: &Session) -> Option<Vec<String>> {
    let raw = session.metadata().ok()?.custom("names").ok()??;
    parse_names_metadata(&raw)
}

/// Parse `{0: 'person', 1: 'bicycle', ...}`. Ids may be sparse; gaps get
/// `class_<id>` placeholders. Returns `None` when the string is not in that
/// shape (callers fall back to COCO).
pub(crate) fn parse_names_metadata(raw: &str) -> Option<Vec<String>> {
    let inner = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
    let parts: Vec<&str> = inner.split('\'').collect();
    if parts.len() < 3 || parts.len() % 2 == 0 {
        return None;
    }

    let mut pairs: Vec<(usize, String)> = Vec::new();
    let mut idx = 1;
    while idx < parts.len() {
        let key = parts[idx - 1]
            .trim_matches(|c: char| c == ',' || c.is_whitespace())
            .trim_end_matches(':')
            .trim()
            .parse::<usize>()
            .ok()?;
        pairs.push((key, parts[idx].to_string()));
        idx += 2;
    }

    let len = pairs.iter().map(|(k, _)| k + 1).max()?;
    let mut names: Vec<String> = (0..len).map(|i| format!("class_{}", i)).collect();
    for (key, name) in pairs {
        names[key] = name;
    }
    Some(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize) -> Candidate {
        Candidate { x1, y1, x2, y2, score, class_id }
    }

    #[test]
    fn letterbox_pads_the_short_edge() {
        let img = DynamicImage::new_rgb8(1280, 720);
        let (canvas, lb) = letterbox(&img, 640);
        assert_eq!(canvas.dimensions(), (640, 640));
        assert_eq!(lb.scale, 0.5);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 140.0);
    }

    #[test]
    fn letterbox_upscales_small_input() {
        let img = DynamicImage::new_rgb8(320, 320);
        let (_, lb) = letterbox(&img, 640);
        assert_eq!(lb.scale, 2.0);
        assert_eq!((lb.pad_x, lb.pad_y), (0.0, 0.0));
    }

    #[test]
    fn letterbox_maps_back_to_source() {
        let img = DynamicImage::new_rgb8(1280, 720);
        let (_, lb) = letterbox(&img, 640);
        assert_eq!(lb.to_source(0.0, 140.0), (0.0, 0.0));
        assert_eq!(lb.to_source(640.0, 500.0), (1280.0, 720.0));
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = boxed(0.0, 0.0, 10.0, 10.0, 1.0, 0);
        let b = boxed(20.0, 20.0, 30.0, 30.0, 1.0, 0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn iou_of_half_overlapping_boxes() {
        let a = boxed(0.0, 0.0, 10.0, 10.0, 1.0, 0);
        let b = boxed(5.0, 0.0, 15.0, 10.0, 1.0, 0);
        // intersection 50, union 150
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn nms_suppresses_overlap_within_a_class() {
        let kept = nms(
            vec![
                boxed(0.0, 0.0, 10.0, 10.0, 0.9, 0),
                boxed(1.0, 1.0, 11.0, 11.0, 0.8, 0),
                boxed(50.0, 50.0, 60.0, 60.0, 0.7, 0),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.7);
    }

    #[test]
    fn nms_keeps_overlap_across_classes() {
        let kept = nms(
            vec![
                boxed(0.0, 0.0, 10.0, 10.0, 0.9, 0),
                boxed(1.0, 1.0, 11.0, 11.0, 0.8, 1),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn decode_reads_attribute_major_layout() {
        // one class, six anchors: [1, 5, 6]
        let dims = [1, 5, 6];
        #[rustfmt::skip]
        let data = [
            100.0, 300.0, 500.0, 0.0, 0.0, 0.0,  // cx
            100.0, 300.0, 500.0, 0.0, 0.0, 0.0,  // cy
             40.0,  40.0,  40.0, 0.0, 0.0, 0.0,  // w
             20.0,  20.0,  20.0, 0.0, 0.0, 0.0,  // h
              0.9,   0.1,   0.5, 0.0, 0.0, 0.0,  // class 0 score
        ];
        let candidates = decode_raw_head(&dims, &data, 0.25).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].x1, 80.0);
        assert_eq!(candidates[0].y1, 90.0);
        assert_eq!(candidates[0].x2, 120.0);
        assert_eq!(candidates[0].y2, 110.0);
        assert_eq!(candidates[1].score, 0.5);
    }

    #[test]
    fn decode_picks_the_best_class() {
        // two classes, eight anchors, only the first anchor scores: [1, 6, 8]
        let dims = [1, 6, 8];
        let mut data = [0.0f32; 48];
        data[0] = 10.0; // cx
        data[8] = 10.0; // cy
        data[16] = 4.0; // w
        data[24] = 4.0; // h
        data[32] = 0.3; // class 0
        data[40] = 0.8; // class 1
        let candidates = decode_raw_head(&dims, &data, 0.25).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].class_id, 1);
        assert_eq!(candidates[0].score, 0.8);
    }

    #[test]
    fn decode_rejects_unexpected_shapes() {
        assert!(decode_raw_head(&[1, 3, 10], &[0.0; 30], 0.25).is_err());
        assert!(decode_raw_head(&[2, 5, 10], &[0.0; 100], 0.25).is_err());
        // anchor-major head, as v5-era exports produce
        assert!(decode_raw_head(&[1, 8400, 84], &vec![0.0; 705600], 0.25).is_err());
        // data length disagrees with dims
        assert!(decode_raw_head(&[1, 5, 8], &[0.0; 10], 0.25).is_err());
    }

    #[test]
    fn parse_names_handles_ultralytics_dict() {
        let names = parse_names_metadata("{0: 'person', 1: 'bicycle', 2: 'car'}").unwrap();
        assert_eq!(names, vec!["person", "bicycle", "car"]);
    }

    #[test]
    fn parse_names_fills_gaps_with_placeholders() {
        let names = parse_names_metadata("{0: 'plate', 2: 'car'}").unwrap();
        assert_eq!(names, vec!["plate", "class_1", "car"]);
    }

    #[test]
    fn parse_names_rejects_other_shapes() {
        assert!(parse_names_metadata("").is_none());
        assert!(parse_names_metadata("just text").is_none());
        assert!(parse_names_metadata("{not: 'a number'}").is_none());
    }

    #[test]
    fn coco_table_is_complete() {
        assert_eq!(COCO_NAMES.len(), 80);
        assert_eq!(COCO_NAMES[0], "person");
        assert_eq!(COCO_NAMES[2], "car");
    }
}
