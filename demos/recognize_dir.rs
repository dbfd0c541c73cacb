use std::env::args;
use std::error::Error;
use std::fs;
use std::process;

use plate_vision::{Annotator, Charset, Detector, Pipeline, Reader};

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = args();
    args.next();
    let dir_path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("usage: recognize_dir <dir> [model] [ocr-model]");
            process::exit(1);
        }
    };
    let model_path = args.next().unwrap_or_else(|| "yolov8n.onnx".to_string());
    let ocr_model_path = args.next().unwrap_or_else(|| "english_g2.onnx".to_string());

    let detector = Detector::from_file(&model_path)?;
    let reader = Reader::with_charset(&ocr_model_path, Charset::plate_default())?;
    let mut pipeline = Pipeline::new(detector, reader, Annotator::new());

    let mut speeds = Vec::new();
    let mut scores = Vec::new();
    let mut total_amount = 0;
    let mut success = 0;
    for entry in fs::read_dir(&dir_path)? {
        let path = entry?.path();
        if path.extension().map(|ext| ext == "jpg") != Some(true) {
            continue;
        }
        let img = image::open(&path)?;
        let outcome = pipeline.process(&img)?;
        let speed = outcome.elapsed.as_millis();
        total_amount += 1;

        let texts: Vec<&str> = outcome
            .readings
            .iter()
            .filter(|r| !r.text.is_empty())
            .map(|r| r.text.as_str())
            .collect();
        if let Some(reading) = outcome.readings.iter().find(|r| !r.text.is_empty()) {
            scores.push(reading.confidence);
            speeds.push(speed);
            success += 1;
        }
        println!("file: {:?}, res: {:?}, speed: {}ms", path, texts, speed);
        if total_amount == 150 {
            break;
        }
    }

    if scores.is_empty() {
        println!("total_amount: {}, success: 0", total_amount);
    } else {
        let average_score = scores.iter().sum::<f32>() / scores.len() as f32;
        let average_speed = speeds.iter().sum::<u128>() / speeds.len() as u128;
        println!(
            "total_amount: {}, success: {}, average_score: {:.3}, average_speed: {}ms",
            total_amount, success, average_score, average_speed
        );
    }
    Ok(())
}
