//! Overlay drawing: hollow boxes and label text on the result image.

use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing;
use imageproc::rect::Rect;

use crate::error::Result;
use crate::BBox;

/// Overlay color of the original tool.
pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 18.0;
/// Gap between the label text and the top edge of the box.
const LABEL_OFFSET: i32 = 2;

/// Draws detection overlays. Label text needs a TTF; without one only the
/// boxes are drawn (imageproc has no built-in font to fall back on).
pub struct Annotator {
    font: Option<FontVec>,
    color: Rgb<u8>,
}

impl Annotator {
    pub fn new() -> Self {
        Self {
            font: None,
            color: BOX_COLOR,
        }
    }

    /// Load a TTF to label boxes with.
    pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        let font = FontVec::try_from_vec(bytes)?;
        Ok(Self {
            font: Some(font),
            color: BOX_COLOR,
        })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw one detection. Empty boxes are skipped; the label lands just
    /// above the box top-left corner, clamped into the canvas.
    pub fn draw(&self, canvas: &mut RgbImage, bbox: &BBox, label: &str) {
        if bbox.is_empty() {
            return;
        }
        draw_thick_hollow_rect(canvas, bbox, self.color);

        if let Some(font) = &self.font {
            if !label.is_empty() {
                let x = bbox.x1.max(0);
                let y = (bbox.y1 - LABEL_SCALE as i32 - LABEL_OFFSET).max(0);
                drawing::draw_text_mut(
                    canvas,
                    self.color,
                    x,
                    y,
                    PxScale::from(LABEL_SCALE),
                    font,
                    label,
                );
            }
        }
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

fn draw_thick_hollow_rect(canvas: &mut RgbImage, bbox: &BBox, color: Rgb<u8>) {
    for inset in 0..BOX_THICKNESS {
        let w = bbox.width() - 2 * inset;
        let h = bbox.height() - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(bbox.x1 + inset, bbox.y1 + inset).of_size(w as u32, h as u32);
        drawing::draw_hollow_rect_mut(canvas, rect, color);
    }
}

/// Label shown on the overlay and in the result listing: class name, then
/// the recognized text when there is any.
pub fn compose_label(class_name: &str, text: &str) -> String {
    if text.is_empty() {
        class_name.to_string()
    } else {
        format!("{} {}", class_name, text)
    }
}
