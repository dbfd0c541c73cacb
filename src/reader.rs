//! Text-recognition wrapper.
//!
//! Runs a pretrained CTC text recognizer (EasyOCR's `english_g2` ONNX
//! export, or any compatible CRNN-style graph taking `[1, 1, 64, W]`
//! grayscale and producing `[1, T, C]` class scores with blank at index 0)
//! over a cropped plate image. The crate's share of the work is the
//! marshalling: grayscale, proportional resize, normalization, and the
//! greedy CTC collapse of the output grid into a string.

use std::fs;
use std::path::Path;

use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView, Luma};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::BBox;

/// Input height the recognizer was trained at.
pub const RECOGNIZER_HEIGHT: u32 = 64;
const MIN_RECOGNIZER_WIDTH: u32 = 16;
const MAX_RECOGNIZER_WIDTH: u32 = 1024;

/// Symbols a plate recognizer emits when nothing better is configured.
pub const DEFAULT_PLATE_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// One recognized text region. The box is in crop-local coordinates; with a
/// single-line recognizer it covers the whole crop.
#[derive(Debug, Clone, Serialize)]
pub struct TextSpan {
    pub bbox: BBox,
    pub text: String,
    pub confidence: f32,
}

/// Symbol table for CTC decoding. Class 0 is the blank; class `k` maps to
/// `symbols[k - 1]`.
#[derive(Debug, Clone)]
pub struct Charset {
    symbols: Vec<String>,
}

impl Charset {
    /// The built-in `0-9A-Z` plate alphabet.
    pub fn plate_default() -> Self {
        Self {
            symbols: DEFAULT_PLATE_CHARSET.chars().map(String::from).collect(),
        }
    }

    /// Load a symbol table from a dictionary file, one symbol per line.
    /// Lines keep their content verbatim apart from the line ending, so a
    /// space symbol is representable; fully empty lines are skipped.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Charset(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_lines(&raw)
    }

    pub(crate) fn from_lines(raw: &str) -> Result<Self> {
        let symbols: Vec<String> = raw
            .lines()
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        if symbols.is_empty() {
            return Err(Error::Charset("no symbols in charset".to_string()));
        }
        Ok(Self { symbols })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    fn symbol(&self, index: usize) -> &str {
        &self.symbols[index]
    }
}

/// Recognition model session plus its decode charset.
pub struct Reader {
    session: Session,
    charset: Charset,
}

impl Reader {
    /// Load a recognition model with the default plate alphabet.
    pub fn from_file(model_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_charset(model_path, Charset::plate_default())
    }

    pub fn with_charset(model_path: impl AsRef<Path>, charset: Charset) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(Error::ModelNotFound(model_path.to_path_buf()));
        }

        tracing::info!("loading recognition model from {}", model_path.display());
        let session = Session::builder()?
            .with_intra_threads(4)?
            .commit_from_file(model_path)?;
        Ok(Self { session, charset })
    }

    /// Read text from a cropped plate image.
    ///
    /// Returns an empty vec for an empty crop or when the model emits only
    /// blanks; otherwise one span covering the crop.
    pub fn read_text(&mut self, crop: &DynamicImage) -> Result<Vec<TextSpan>> {
        let (w, h) = crop.dimensions();
        if w == 0 || h == 0 {
            return Ok(Vec::new());
        }

        let input = prepare_input(crop);
        let input_value = Value::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();

        let (steps, classes) = match dims.as_slice() {
            [1, t, c] => (*t, *c),
            [t, c] => (*t, *c),
            other => {
                return Err(Error::ModelOutput(format!(
                    "expected a [1, T, C] recognizer output, got {:?}",
                    other
                )))
            }
        };

        let (text, confidence) = ctc_greedy_decode(data, steps, classes, &self.charset)?;
        tracing::debug!("ocr decoded {:?} at confidence {:.3}", text, confidence);
        if text.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![TextSpan {
            bbox: BBox {
                x1: 0,
                y1: 0,
                x2: w as i32,
                y2: h as i32,
            },
            text,
            confidence,
        }])
    }
}

/// Grayscale, resize to the recognizer height with proportional width, and
/// normalize to `[-1, 1]` as a `[1, 1, H, W]` tensor.
fn prepare_input(crop: &DynamicImage) -> Array4<f32> {
    let gray = crop.to_luma8();
    let (w, h) = gray.dimensions();
    let width = target_width(w, h);
    let resized = imageops::resize(&gray, width, RECOGNIZER_HEIGHT, FilterType::Triangle);

    let mut input = Array4::<f32>::zeros((1, 1, RECOGNIZER_HEIGHT as usize, width as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let Luma([v]) = *pixel;
        input[[0, 0, y as usize, x as usize]] = (v as f32 / 255.0 - 0.5) / 0.5;
    }
    input
}

pub(crate) fn target_width(w: u32, h: u32) -> u32 {
    if h == 0 {
        return MIN_RECOGNIZER_WIDTH;
    }
    let scaled = (w as f32 * RECOGNIZER_HEIGHT as f32 / h as f32).round() as u32;
    scaled.clamp(MIN_RECOGNIZER_WIDTH, MAX_RECOGNIZER_WIDTH)
}

/// Collapse a `steps`×`classes` score grid into text: per-step softmax and
/// argmax, then drop blanks (class 0) and adjacent repeats. Confidence is
/// the mean probability of the emitted steps, 0 when nothing was emitted.
pub(crate) fn ctc_greedy_decode(
    data: &[f32],
    steps: usize,
    classes: usize,
    charset: &Charset,
) -> Result<(String, f32)> {
    if classes != charset.len() + 1 {
        return Err(Error::ModelOutput(format!(
            "recognizer emits {} classes but charset holds {} symbols (+1 blank)",
            classes,
            charset.len()
        )));
    }
    if data.len() != steps * classes {
        return Err(Error::ModelOutput(format!(
            "recognizer output length {} does not match {}x{}",
            data.len(),
            steps,
            classes
        )));
    }

    let mut text = String::new();
    let mut emitted = Vec::new();
    let mut prev_class = 0usize;
    let mut row = vec![0.0f32; classes];
    for step in 0..steps {
        row.copy_from_slice(&data[step * classes..(step + 1) * classes]);
        softmax_in_place(&mut row);
        let (best, prob) = argmax(&row);
        if best != 0 && best != prev_class {
            text.push_str(charset.symbol(best - 1));
            emitted.push(prob);
        }
        prev_class = best;
    }

    let confidence = if emitted.is_empty() {
        0.0
    } else {
        emitted.iter().sum::<f32>() / emitted.len() as f32
    };
    Ok((text, confidence))
}

fn softmax_in_place(row: &mut [f32]) {
    let max = row.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let mut sum = 0.0;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in row.iter_mut() {
        *v /= sum;
    }
}

fn argmax(row: &[f32]) -> (usize, f32) {
    let mut best = 0;
    let mut best_value = row[0];
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    (best, best_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    // blank + "AB"
    fn tiny_charset() -> Charset {
        Charset::from_lines("A\nB").unwrap()
    }

    /// One decode step strongly voting for `class`.
    fn step(classes: usize, class: usize) -> Vec<f32> {
        let mut row = vec![0.0; classes];
        row[class] = 10.0;
        row
    }

    fn grid(rows: &[Vec<f32>]) -> Vec<f32> {
        rows.iter().flatten().copied().collect()
    }

    #[test]
    fn default_charset_covers_plate_alphabet() {
        let charset = Charset::plate_default();
        assert_eq!(charset.len(), 36);
        assert_eq!(charset.symbol(0), "0");
        assert_eq!(charset.symbol(35), "Z");
    }

    #[test]
    fn charset_file_keeps_spaces_and_skips_blank_lines() {
        let charset = Charset::from_lines("A\r\nB\n\n \nC\n").unwrap();
        assert_eq!(charset.len(), 4);
        assert_eq!(charset.symbol(2), " ");
        assert!(Charset::from_lines("\n\n").is_err());
    }

    #[test]
    fn decode_collapses_repeats_and_blanks() {
        let charset = tiny_charset();
        let rows = [step(3, 0), step(3, 1), step(3, 1), step(3, 0), step(3, 2)];
        let (text, confidence) = ctc_greedy_decode(&grid(&rows), 5, 3, &charset).unwrap();
        assert_eq!(text, "AB");
        assert!(confidence > 0.9);
    }

    #[test]
    fn decode_emits_repeats_separated_by_blank() {
        let charset = tiny_charset();
        let rows = [step(3, 1), step(3, 0), step(3, 1)];
        let (text, _) = ctc_greedy_decode(&grid(&rows), 3, 3, &charset).unwrap();
        assert_eq!(text, "AA");
    }

    #[test]
    fn decode_of_all_blanks_is_empty_with_zero_confidence() {
        let charset = tiny_charset();
        let rows = [step(3, 0), step(3, 0)];
        let (text, confidence) = ctc_greedy_decode(&grid(&rows), 2, 3, &charset).unwrap();
        assert_eq!(text, "");
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn decode_checks_class_count_against_charset() {
        let charset = tiny_charset();
        assert!(ctc_greedy_decode(&[0.0; 8], 2, 4, &charset).is_err());
        assert!(ctc_greedy_decode(&[0.0; 5], 2, 3, &charset).is_err());
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let mut row = vec![1.0, 2.0, 3.0];
        softmax_in_place(&mut row);
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(row[2] > row[1] && row[1] > row[0]);
    }

    #[test]
    fn recognizer_width_is_proportional_and_clamped() {
        assert_eq!(target_width(100, 25), 256);
        assert_eq!(target_width(2, 64), MIN_RECOGNIZER_WIDTH);
        assert_eq!(target_width(10_000, 64), MAX_RECOGNIZER_WIDTH);
        assert_eq!(target_width(5, 0), MIN_RECOGNIZER_WIDTH);
    }
}
