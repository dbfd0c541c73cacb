use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the detection/reading pipeline.
///
/// Every step propagates through this one enum; there is no retry or
/// partial-failure recovery, a failed step aborts the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("inference error: {0}")]
    Inference(#[from] ort::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("font error: {0}")]
    Font(#[from] ab_glyph::InvalidFont),

    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("unexpected model output: {0}")]
    ModelOutput(String),

    #[error("invalid charset: {0}")]
    Charset(String),
}

pub type Result<T> = std::result::Result<T, Error>;
