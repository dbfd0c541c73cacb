use anyhow::Context;
use clap::{App, Arg};

use plate_vision::{gui, Annotator, Charset, Detector, Pipeline, Reader};

fn main() -> anyhow::Result<()> {
    let matches = App::new("plate-vision-gui")
        .version("0.1.0")
        .about("Desktop viewer for license plate recognition")
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
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let conf: f32 = matches
        .value_of("conf")
        .unwrap()
        .parse()
        .context("--conf must be a number")?;

    let model_path = matches.value_of("model").unwrap();
    tracing::info!("loading detector from {}", model_path);
    let detector = Detector::from_file(model_path)?.with_conf_threshold(conf);

    let ocr_model_path = matches.value_of("ocr-model").unwrap();
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

    gui::run(Pipeline::new(detector, reader, annotator));
    Ok(())
}
