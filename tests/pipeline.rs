//! End-to-end smoke tests. These require real model files and are ignored
//! by default; run with: cargo test --test pipeline -- --ignored
//!
//! Expected layout:
//!   yolov8n.onnx       exported YOLOv8 detection model, crate root
//!   english_g2.onnx    exported text recognition model, crate root
//!   tests/data/bus.jpg a photo with detectable objects

use image::GenericImageView;

use plate_vision::{Annotator, Charset, Detector, Pipeline, Reader};

const DETECT_MODEL: &str = "yolov8n.onnx";
const OCR_MODEL: &str = "english_g2.onnx";
const SAMPLE_IMAGE: &str = "tests/data/bus.jpg";

fn build_pipeline() -> Pipeline {
    let detector = Detector::from_file(DETECT_MODEL).expect("detection model");
    let reader = Reader::with_charset(OCR_MODEL, Charset::plate_default()).expect("ocr model");
    Pipeline::new(detector, reader, Annotator::new())
}

#[test]
#[ignore] // Requires model files, run with: cargo test --test pipeline -- --ignored
fn test_full_chain_on_sample_image() {
    let image = image::open(SAMPLE_IMAGE).expect("sample image");
    let (width, height) = image.dimensions();
    let mut pipeline = build_pipeline();

    let outcome = pipeline.process(&image).expect("pipeline run");

    assert!(
        !outcome.readings.is_empty(),
        "sample image should contain objects"
    );
    assert!(outcome.elapsed.as_secs_f64() > 0.0);
    assert_eq!(outcome.annotated.dimensions(), (width, height));

    for reading in &outcome.readings {
        let det = &reading.detection;
        assert!(det.confidence >= 0.0 && det.confidence <= 1.0);
        assert!(det.bbox.x1 >= 0 && det.bbox.y1 >= 0);
        assert!(det.bbox.x2 <= width as i32 && det.bbox.y2 <= height as i32);
        println!(
            "{}: {:.2} {} {:?}",
            det.class_name, det.confidence, det.bbox, reading.text
        );
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let save_path = dir.path().join("result_bus.jpg");
    outcome.annotated.save(&save_path).expect("save annotated");
    assert!(save_path.exists());
}

#[test]
#[ignore]
fn test_detector_accepts_featureless_input() {
    let image = image::DynamicImage::new_rgb8(320, 240);
    let mut detector = Detector::from_file(DETECT_MODEL).expect("detection model");

    // A flat gray image carries nothing to detect; the call must still
    // succeed and anything it does return must be well formed.
    let detections = detector.detect(&image).expect("detect");
    for det in &detections {
        assert!(det.confidence >= 0.0 && det.confidence <= 1.0);
        assert!(!det.bbox.is_empty());
    }
}
