use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{App, Arg};
use serde::Serialize;

use plate_vision::{Annotator, Charset, Detector, Pipeline, PlateReading, Reader};

#[derive(Serialize)]
struct Report<'a> {
    image: &'a str,
    saved_to: String,
    elapsed_ms: u128,
    readings: &'a [PlateReading],
}

fn main() -> anyhow::Result<()> {
    let matches = App::new("plate-vision")
        .version("0.1.0")
        .about("Locate and read license plates in a still image")
        .arg(
            Arg::with_name("image")
                .long("image")
                .help("Path to the input image")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("model")
                .long("model")
                .help("Path to the detection model")
                .takes_value(true)
                .default_value("yolov8n.onnx"),
        )
        .arg(
            Arg::with_name("ocr-model")
                .long("ocr-model")
                .help("Path to the text recognition model")
                .takes_value(true)
                .default_value("english_g2.onnx"),
        )
        .arg(
            Arg::with_name("output")
                .long("output")
                .help("Directory to save results")
                .takes_value(true)
                .default_value("data/output"),
        )
        .arg(
            Arg::with_name("conf")
                .long("conf")
                .help("Detection confidence threshold")
                .takes_value(true)
                .default_value("0.25"),
        )
        .arg(
            Arg::with_name("charset")
                .long("charset")
                .help("Recognizer symbol table, one symbol per line")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("font")
                .long("font")
                .help("TTF font for overlay labels")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("json")
                .long("json")
                .help("Print results as JSON"),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let image_path = matches.value_of("image").unwrap();
    let model_path = matches.value_of("model").unwrap();
    let ocr_model_path = matches.value_of("ocr-model").unwrap();
    let output_dir = PathBuf::from(matches.value_of("output").unwrap());
    let conf: f32 = matches
        .value_of("conf")
        .unwrap()
        .parse()
        .context("--conf must be a number")?;

    // Validate the input before any model is touched.
    if !Path::new(image_path).exists() {
        anyhow::bail!("image not found at {}", image_path);
    }
    let image = image::open(image_path).with_context(|| format!("could not read image {}", image_path))?;

    fs::create_dir_all(&output_dir)
        .with_context(|| format!("could not create output directory {}", output_dir.display()))?;

    tracing::info!("loading detector from {}", model_path);
    let detector = Detector::from_file(model_path)?.with_conf_threshold(conf);

    tracing::info!("loading text reader from {}", ocr_model_path);
    let charset = match matches.value_of("charset") {
        Some(path) => Charset::from_file(path)?,
        None => Charset::plate_default(),
    };
    let reader = Reader::with_charset(ocr_model_path, charset)?;

    let annotator = match matches.value_of("font") {
        Some(path) => Annotator::with_font_file(path)?,
        None => {
            tracing::warn!("no --font given, overlays will carry boxes only");
            Annotator::new()
        }
    };

    let mut pipeline = Pipeline::new(detector, reader, annotator);
    let outcome = pipeline.process(&image)?;

    let filename = Path::new(image_path)
        .file_name()
        .context("image path has no file name")?;
    let save_path = output_dir.join(format!("result_{}", filename.to_string_lossy()));
    outcome
        .annotated
        .save(&save_path)
        .with_context(|| format!("could not save result to {}", save_path.display()))?;

    if matches.is_present("json") {
        let report = Report {
            image: image_path,
            saved_to: save_path.display().to_string(),
            elapsed_ms: outcome.elapsed.as_millis(),
            readings: &outcome.readings,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Found {} objects.", outcome.readings.len());
    for (i, reading) in outcome.readings.iter().enumerate() {
        println!(
            "Object {}: {} ({:.2}), box {}",
            i, reading.detection.class_name, reading.detection.confidence, reading.detection.bbox
        );
        if reading.text.is_empty() {
            println!("  -> No text found.");
        } else {
            println!("  -> Text: {}", reading.text);
        }
    }
    println!("Result saved to {}", save_path.display());
    println!("Processed in {:.4} seconds", outcome.elapsed.as_secs_f64());

    Ok(())
}
