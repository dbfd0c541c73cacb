use std::env::args;
use std::error::Error;
use std::path::Path;
use std::process;

use plate_vision::{Annotator, Detector};

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = args();
    args.next();
    let image_path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("usage: detect <image> [model]");
            process::exit(1);
        }
    };
    let model_path = args.next().unwrap_or_else(|| "yolov8n.onnx".to_string());

    let img = image::open(&image_path)?;
    let mut detector = Detector::from_file(&model_path)?;
    let detections = detector.detect(&img)?;
    println!("found {} objects", detections.len());

    let annotator = Annotator::new();
    let mut canvas = img.to_rgb8();
    for detection in &detections {
        println!(
            "{} ({:.3}) {}",
            detection.class_name, detection.confidence, detection.bbox
        );
        annotator.draw(&mut canvas, &detection.bbox, "");
    }

    let file_name = Path::new(&image_path)
        .file_name()
        .ok_or("image path has no file name")?;
    let save_path = format!("detect_{}", file_name.to_string_lossy());
    canvas.save(&save_path)?;
    println!("saved to {}", save_path);
    Ok(())
}
