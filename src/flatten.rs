//! Burns annotation boxes and their notes into a copy of the source image.

use ab_glyph::{point, Font, FontRef, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};

use crate::error::FlattenError;
use crate::geometry::Rect;
use crate::model::Annotation;

/// Gap between the stroke and the note text, in pixels.
const TEXT_PADDING: f32 = 2.0;

#[derive(Clone, Copy, Debug)]
pub struct FlattenStyle {
    pub stroke_width: f32,
}

impl Default for FlattenStyle {
    fn default() -> Self {
        Self { stroke_width: 4.0 }
    }
}

/// Note text size for an image of the given dimensions.
pub fn note_font_size(width: u32, height: u32) -> f32 {
    (width.min(height) as f32 / 40.0).clamp(14.0, 48.0)
}

/// The face egui ships with, reused so notes look the same on canvas and in
/// the flattened output.
pub struct NoteFont {
    font: FontRef<'static>,
}

impl NoteFont {
    pub fn bundled() -> Result<Self, FlattenError> {
        Ok(Self {
            font: FontRef::try_from_slice(epaint_default_fonts::UBUNTU_LIGHT)?,
        })
    }

    pub fn measure(&self, scale: PxScale, text: &str) -> f32 {
        let scaled = self.font.as_scaled(scale);
        let mut width = 0.0;
        let mut prev = None;
        for ch in text.chars() {
            let id = self.font.glyph_id(ch);
            if let Some(prev) = prev {
                width += scaled.kern(prev, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        width
    }
}

/// Composite `annotations` over `source`. Output has the source's dimensions;
/// with no annotations it is an exact copy.
pub fn flatten(
    source: &RgbaImage,
    annotations: &[Annotation],
    style: FlattenStyle,
    font: &NoteFont,
) -> RgbaImage {
    let mut img = source.clone();
    if annotations.is_empty() {
        return img;
    }

    let scale = PxScale::from(note_font_size(img.width(), img.height()));
    for ann in annotations {
        let color = ann.color.to_rgba_u8();
        stroke_rect(&mut img, ann.rect, style.stroke_width, color);
        if !ann.text.trim().is_empty() {
            let inner = ann.rect.shrink(style.stroke_width + TEXT_PADDING);
            draw_note(&mut img, inner, &ann.text, scale, color, font);
        }
    }
    img
}

/// Greedy word wrap. Words wider than `max_width` are split by character.
pub fn wrap_text(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_owned()
            } else {
                format!("{line} {word}")
            };
            if measure(&candidate) <= max_width {
                line = candidate;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if measure(word) <= max_width {
                line = word.to_owned();
                continue;
            }
            for ch in word.chars() {
                let mut next = line.clone();
                next.push(ch);
                if !line.is_empty() && measure(&next) > max_width {
                    lines.push(std::mem::take(&mut line));
                    line.push(ch);
                } else {
                    line = next;
                }
            }
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// Integer pixel bounds `[x0, x1) x [y0, y1)` of a rect, clamped to the image.
fn pixel_bounds(img: &RgbaImage, rect: Rect) -> (i64, i64, i64, i64) {
    let (w, h) = (img.width() as i64, img.height() as i64);
    (
        (rect.x.round() as i64).clamp(0, w),
        (rect.y.round() as i64).clamp(0, h),
        (rect.max_x().round() as i64).clamp(0, w),
        (rect.max_y().round() as i64).clamp(0, h),
    )
}

fn fill_rect(img: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: [u8; 4]) {
    let (w, h) = (img.width() as i64, img.height() as i64);
    for y in y0.max(0)..y1.min(h) {
        for x in x0.max(0)..x1.min(w) {
            img.put_pixel(x as u32, y as u32, Rgba(color));
        }
    }
}

/// Stroke drawn inside the rectangle's bounds.
fn stroke_rect(img: &mut RgbaImage, rect: Rect, thickness: f32, color: [u8; 4]) {
    let x0 = rect.x.round() as i64;
    let y0 = rect.y.round() as i64;
    let x1 = rect.max_x().round() as i64;
    let y1 = rect.max_y().round() as i64;
    let t = (thickness.round() as i64).max(1);

    fill_rect(img, x0, y0, x1, (y0 + t).min(y1), color);
    fill_rect(img, x0, (y1 - t).max(y0), x1, y1, color);
    fill_rect(img, x0, y0, (x0 + t).min(x1), y1, color);
    fill_rect(img, (x1 - t).max(x0), y0, x1, y1, color);
}

fn blend(dst: &mut Rgba<u8>, color: [u8; 4], coverage: f32) {
    let c = coverage.clamp(0.0, 1.0);
    for i in 0..3 {
        let d = dst.0[i] as f32;
        dst.0[i] = (d + (color[i] as f32 - d) * c).round() as u8;
    }
    let a = dst.0[3] as f32;
    dst.0[3] = (a + (255.0 - a) * c).round() as u8;
}

fn draw_note(
    img: &mut RgbaImage,
    inner: Rect,
    text: &str,
    scale: PxScale,
    color: [u8; 4],
    font: &NoteFont,
) {
    if inner.width <= 0.0 || inner.height <= 0.0 {
        return;
    }
    let (cx0, cy0, cx1, cy1) = pixel_bounds(img, inner);
    let scaled = font.font.as_scaled(scale);
    let line_height = scaled.height() + scaled.line_gap();

    let lines = wrap_text(text, inner.width, |s| font.measure(scale, s));
    for (i, line) in lines.iter().enumerate() {
        let top = inner.y + i as f32 * line_height;
        if top >= inner.max_y() {
            break;
        }
        let baseline = top + scaled.ascent();
        let mut caret = inner.x;
        let mut prev = None;
        for ch in line.chars() {
            let id = font.font.glyph_id(ch);
            if let Some(prev) = prev {
                caret += scaled.kern(prev, id);
            }
            let glyph = id.with_scale_and_position(scale, point(caret, baseline));
            caret += scaled.h_advance(id);
            prev = Some(id);

            let Some(outlined) = font.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let x = bounds.min.x as i64 + gx as i64;
                let y = bounds.min.y as i64 + gy as i64;
                if x >= cx0 && x < cx1 && y >= cy0 && y < cy1 {
                    blend(img.get_pixel_mut(x as u32, y as u32), color, coverage);
                }
            });
        }
    }
}
