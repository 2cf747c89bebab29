use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

// ── Annotation Colors ───────────────────────────────────────────────────────

/// The fixed palette an annotation box can be drawn in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationColor {
    #[default]
    Red,
    Yellow,
    Cyan,
}

impl AnnotationColor {
    pub const ALL: [AnnotationColor; 3] = [
        AnnotationColor::Red,
        AnnotationColor::Yellow,
        AnnotationColor::Cyan,
    ];

    pub fn to_rgba_u8(self) -> [u8; 4] {
        match self {
            AnnotationColor::Red => [255, 0, 0, 255],
            AnnotationColor::Yellow => [255, 255, 0, 255],
            AnnotationColor::Cyan => [0, 255, 255, 255],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AnnotationColor::Red => "red",
            AnnotationColor::Yellow => "yellow",
            AnnotationColor::Cyan => "cyan",
        }
    }
}

// ── Annotation ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(pub u64);

/// A colored box with a note, positioned in source-image pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub rect: Rect,
    pub text: String,
    pub color: AnnotationColor,
}

impl Annotation {
    pub fn new(id: AnnotationId, rect: Rect, color: AnnotationColor) -> Self {
        Self {
            id,
            rect,
            text: String::new(),
            color,
        }
    }
}

/// Most frequent color among `annotations`.
///
/// Ties resolve to the earliest color in [`AnnotationColor::ALL`], so the
/// result does not depend on drawing order.
pub fn dominant_color(annotations: &[Annotation]) -> Option<AnnotationColor> {
    let mut counts = [0usize; 3];
    for ann in annotations {
        counts[ann.color as usize] += 1;
    }
    let mut best: Option<(AnnotationColor, usize)> = None;
    for color in AnnotationColor::ALL {
        let n = counts[color as usize];
        if n > 0 && best.map_or(true, |(_, b)| n > b) {
            best = Some((color, n));
        }
    }
    best.map(|(c, _)| c)
}
