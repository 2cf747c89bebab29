use crate::model::{dominant_color, Annotation, AnnotationColor};

/// Sent when re-running on a previous result to strip leftover markup.
pub const CLEANUP_INSTRUCTION: &str = "Remove all remaining marks from this image: any colored \
rectangles, outlines and annotation text. Fill those areas so they blend naturally with their \
surroundings and change nothing else.";

pub fn edit_instruction(color: AnnotationColor) -> String {
    let c = color.name();
    format!(
        "This image has {c} rectangles drawn on it. Each {c} rectangle marks a region to edit, \
and the {c} text inside it describes the edit to make there. Apply every described edit to its \
region. Then remove all {c} rectangles and text so no annotation marks remain. Keep everything \
outside the marked regions unchanged."
    )
}

/// Instruction for a normal generate over `annotations`, or `None` if there
/// is nothing to edit.
pub fn instruction_for(annotations: &[Annotation]) -> Option<String> {
    dominant_color(annotations).map(edit_instruction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::model::AnnotationId;

    fn words(s: &str) -> Vec<String> {
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    #[test]
    fn instruction_names_dominant_color() {
        let anns = vec![
            Annotation::new(AnnotationId(1), Rect::new(0.0, 0.0, 9.0, 9.0), AnnotationColor::Yellow),
            Annotation::new(AnnotationId(2), Rect::new(0.0, 0.0, 9.0, 9.0), AnnotationColor::Yellow),
            Annotation::new(AnnotationId(3), Rect::new(0.0, 0.0, 9.0, 9.0), AnnotationColor::Red),
        ];
        let text = instruction_for(&anns).unwrap();
        assert!(text.contains("yellow rectangles"));
        assert!(!words(&text).contains(&"red".to_owned()));
    }

    #[test]
    fn no_annotations_no_instruction() {
        assert_eq!(instruction_for(&[]), None);
    }

    #[test]
    fn cleanup_mentions_no_palette_color() {
        for color in AnnotationColor::ALL {
            assert!(!words(CLEANUP_INSTRUCTION).contains(&color.name().to_owned()));
        }
    }
}
