use crate::geometry::{Corner, Point, Rect};
use crate::history::History;
use crate::model::{Annotation, AnnotationColor, AnnotationId};

// ── Tool / Interaction State ────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Box,
    Select,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub enum EditorState {
    #[default]
    Idle,
    DrawingRect {
        start: Point,
        current: Point,
    },
    DraggingMove {
        id: AnnotationId,
        grab: Point,
        origin: Rect,
    },
    DraggingResize {
        id: AnnotationId,
        anchor: Point,
    },
}

/// What lies under the pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hit {
    Handle(AnnotationId, Corner),
    Body(AnnotationId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shortcut {
    Undo,
    Redo,
    Delete,
    Cancel,
    Tool(Tool),
    Color(AnnotationColor),
}

#[derive(Clone, Copy, Debug)]
pub struct EditorSettings {
    /// Boxes narrower or shorter than this (image px) are dropped as misclicks.
    pub min_box_size: f32,
    pub history_limit: usize,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            min_box_size: 8.0,
            history_limit: 100,
        }
    }
}

// ── Controller ──────────────────────────────────────────────────────────────

/// Owns everything the annotation canvas needs: the displayed set, its
/// history, selection, tool and the current drag.
///
/// The view feeds pointer and keyboard input in image-space coordinates and
/// reads state back out; it never edits annotations directly. Only completed
/// gestures reach the history.
#[derive(Debug)]
pub struct EditorController {
    annotations: Vec<Annotation>,
    history: History<Vec<Annotation>>,
    state: EditorState,
    tool: Tool,
    color: AnnotationColor,
    selected: Option<AnnotationId>,
    next_id: u64,
    handle_radius: f32,
    bounds: Option<Rect>,
    settings: EditorSettings,
}

impl EditorController {
    pub fn new(settings: EditorSettings) -> Self {
        Self {
            annotations: Vec::new(),
            history: History::new(Vec::new(), settings.history_limit),
            state: EditorState::Idle,
            tool: Tool::Box,
            color: AnnotationColor::Red,
            selected: None,
            next_id: 1,
            handle_radius: 6.0,
            bounds: None,
            settings,
        }
    }

    /// Keep drawn, moved and resized boxes within the image.
    pub fn with_bounds(mut self, width: u32, height: u32) -> Self {
        self.bounds = Some(Rect::from_corners(
            Point::new(0.0, 0.0),
            Point::new(width as f32, height as f32),
        ));
        self
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn color(&self) -> AnnotationColor {
        self.color
    }

    pub fn selected(&self) -> Option<AnnotationId> {
        self.selected
    }

    pub fn selected_annotation(&self) -> Option<&Annotation> {
        self.selected.and_then(|id| self.get(id))
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Handle grab distance in image pixels; the view derives it from zoom.
    pub fn set_handle_radius(&mut self, radius: f32) {
        self.handle_radius = radius.max(0.0);
    }

    /// Select from outside the canvas, e.g. a list of boxes.
    pub fn select(&mut self, id: Option<AnnotationId>) {
        if self.state != EditorState::Idle {
            return;
        }
        self.commit();
        self.selected = id.filter(|id| self.get(*id).is_some());
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    /// Sets the color for new boxes and recolors the selected one.
    pub fn set_color(&mut self, color: AnnotationColor) {
        self.color = color;
        if let Some(ann) = self.selected.and_then(|id| self.get_mut(id)) {
            ann.color = color;
            self.commit();
        }
    }

    /// Rectangle of the box being drawn, for preview.
    pub fn draft_rect(&self) -> Option<Rect> {
        match self.state {
            EditorState::DrawingRect { start, current } => Some(Rect::from_corners(start, current)),
            _ => None,
        }
    }

    pub fn hit_test(&self, pos: Point) -> Option<Hit> {
        if let Some(ann) = self.selected_annotation() {
            if let Some(corner) = ann.rect.handle_at(pos, self.handle_radius) {
                return Some(Hit::Handle(ann.id, corner));
            }
        }
        self.annotations
            .iter()
            .rev()
            .find(|ann| ann.rect.contains(pos))
            .map(|ann| Hit::Body(ann.id))
    }

    pub fn pointer_down(&mut self, pos: Point) {
        if self.state != EditorState::Idle {
            return;
        }
        let pos = self.clamp(pos);
        // A note typed but never committed counts as finished once the user
        // goes back to the canvas.
        self.commit();

        match self.hit_test(pos) {
            Some(Hit::Handle(id, corner)) => {
                if let Some(ann) = self.get(id) {
                    self.state = EditorState::DraggingResize {
                        id,
                        anchor: ann.rect.corner(corner.opposite()),
                    };
                }
            }
            Some(Hit::Body(id)) => {
                if let Some(ann) = self.get(id) {
                    self.state = EditorState::DraggingMove {
                        id,
                        grab: pos,
                        origin: ann.rect,
                    };
                }
                self.selected = Some(id);
            }
            None => {
                self.selected = None;
                if self.tool == Tool::Box {
                    self.state = EditorState::DrawingRect {
                        start: pos,
                        current: pos,
                    };
                }
            }
        }
    }

    pub fn pointer_move(&mut self, pos: Point) {
        let pos = self.clamp(pos);
        match self.state.clone() {
            EditorState::Idle => {}
            EditorState::DrawingRect { start, .. } => {
                self.state = EditorState::DrawingRect {
                    start,
                    current: pos,
                };
            }
            EditorState::DraggingMove { id, grab, origin } => {
                let mut rect = origin.translated(pos.x - grab.x, pos.y - grab.y);
                if let Some(bounds) = self.bounds {
                    rect = bounds.keep_inside(rect);
                }
                if let Some(ann) = self.get_mut(id) {
                    ann.rect = rect;
                }
            }
            EditorState::DraggingResize { id, anchor } => {
                if let Some(ann) = self.get_mut(id) {
                    ann.rect = Rect::from_corners(anchor, pos);
                }
            }
        }
    }

    pub fn pointer_up(&mut self, pos: Point) {
        self.pointer_move(pos);
        match std::mem::take(&mut self.state) {
            EditorState::Idle => {}
            EditorState::DrawingRect { start, current } => {
                let rect = Rect::from_corners(start, current);
                if rect.width < self.settings.min_box_size
                    || rect.height < self.settings.min_box_size
                {
                    log::debug!("discarding {}x{} box", rect.width, rect.height);
                    return;
                }
                let id = AnnotationId(self.next_id);
                self.next_id += 1;
                self.annotations.push(Annotation::new(id, rect, self.color));
                self.selected = Some(id);
                self.commit();
            }
            EditorState::DraggingMove { .. } | EditorState::DraggingResize { .. } => {
                self.commit();
            }
        }
    }

    /// Abandon the current gesture, restoring the last committed geometry.
    pub fn cancel(&mut self) {
        match std::mem::take(&mut self.state) {
            EditorState::Idle => self.selected = None,
            EditorState::DrawingRect { .. } => {}
            EditorState::DraggingMove { .. } | EditorState::DraggingResize { .. } => {
                self.annotations = self.history.current().clone();
            }
        }
    }

    /// Live edit of a note; becomes a history entry on [`Self::commit_note`].
    pub fn update_note(&mut self, id: AnnotationId, text: &str) {
        if let Some(ann) = self.get_mut(id) {
            if ann.text != text {
                ann.text = text.to_owned();
            }
        }
    }

    pub fn commit_note(&mut self) {
        if self.state == EditorState::Idle {
            self.commit();
        }
    }

    pub fn delete_selected(&mut self) {
        let Some(id) = self.selected.take() else {
            return;
        };
        self.annotations.retain(|ann| ann.id != id);
        self.commit();
    }

    pub fn undo(&mut self) {
        self.cancel_drag();
        self.commit();
        if let Some(snapshot) = self.history.undo() {
            self.annotations = snapshot.clone();
            self.fix_selection();
        }
    }

    pub fn redo(&mut self) {
        self.cancel_drag();
        self.commit();
        if let Some(snapshot) = self.history.redo() {
            self.annotations = snapshot.clone();
            self.fix_selection();
        }
    }

    pub fn handle_shortcut(&mut self, shortcut: Shortcut) {
        match shortcut {
            Shortcut::Undo => self.undo(),
            Shortcut::Redo => self.redo(),
            Shortcut::Delete => {
                if self.state == EditorState::Idle {
                    self.delete_selected();
                }
            }
            Shortcut::Cancel => self.cancel(),
            Shortcut::Tool(tool) => self.set_tool(tool),
            Shortcut::Color(color) => self.set_color(color),
        }
    }

    fn cancel_drag(&mut self) {
        if self.state != EditorState::Idle {
            self.cancel();
        }
    }

    fn clamp(&self, pos: Point) -> Point {
        self.bounds.map_or(pos, |b| b.clamp_point(pos))
    }

    /// Push the displayed set if it differs from the current snapshot.
    fn commit(&mut self) {
        if self.history.current() != &self.annotations {
            self.history.push(self.annotations.clone());
            log::trace!("history: {} snapshots", self.history.len());
        }
    }

    fn fix_selection(&mut self) {
        if let Some(id) = self.selected {
            if self.get(id).is_none() {
                self.selected = None;
            }
        }
    }

    fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|ann| ann.id == id)
    }

    fn get_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|ann| ann.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> EditorController {
        EditorController::new(EditorSettings::default())
    }

    fn drag(ed: &mut EditorController, from: (f32, f32), to: (f32, f32)) {
        ed.pointer_down(Point::new(from.0, from.1));
        ed.pointer_move(Point::new((from.0 + to.0) / 2.0, (from.1 + to.1) / 2.0));
        ed.pointer_up(Point::new(to.0, to.1));
    }

    #[test]
    fn drawn_box_is_bounding_box_of_endpoints() {
        let ends = [
            ((10.0, 10.0), (110.0, 50.0)),
            ((110.0, 50.0), (10.0, 10.0)),
            ((110.0, 10.0), (10.0, 50.0)),
            ((10.0, 50.0), (110.0, 10.0)),
        ];
        for (from, to) in ends {
            let mut ed = editor();
            drag(&mut ed, from, to);
            let rect = ed.annotations()[0].rect;
            assert_eq!(rect, Rect::new(10.0, 10.0, 100.0, 40.0));
            assert!(rect.width >= 0.0 && rect.height >= 0.0);
        }
    }

    #[test]
    fn tiny_box_is_discarded() {
        let mut ed = editor();
        drag(&mut ed, (10.0, 10.0), (15.0, 200.0));
        drag(&mut ed, (10.0, 10.0), (200.0, 12.0));
        assert!(ed.annotations().is_empty());
        assert!(!ed.can_undo());
        assert_eq!(ed.state(), &EditorState::Idle);
    }

    #[test]
    fn intermediate_frames_do_not_touch_history() {
        let mut ed = editor();
        ed.pointer_down(Point::new(0.0, 0.0));
        for i in 1..50 {
            ed.pointer_move(Point::new(i as f32 * 2.0, i as f32));
        }
        assert!(!ed.can_undo());
        assert!(ed.annotations().is_empty());
        ed.pointer_up(Point::new(100.0, 50.0));
        assert_eq!(ed.history.len(), 2);
    }

    #[test]
    fn undo_then_redo_restores_equal_snapshot() {
        let mut ed = editor();
        drag(&mut ed, (10.0, 10.0), (110.0, 50.0));
        drag(&mut ed, (200.0, 200.0), (300.0, 260.0));
        let before = ed.annotations().to_vec();

        ed.undo();
        assert_eq!(ed.annotations().len(), 1);
        ed.redo();
        assert_eq!(ed.annotations(), before.as_slice());
    }

    #[test]
    fn new_edit_after_undo_drops_redo() {
        let mut ed = editor();
        drag(&mut ed, (10.0, 10.0), (110.0, 50.0));
        ed.undo();
        assert!(ed.can_redo());
        drag(&mut ed, (200.0, 200.0), (300.0, 260.0));
        assert!(!ed.can_redo());
    }

    #[test]
    fn move_translates_and_commits_once() {
        let mut ed = editor();
        drag(&mut ed, (10.0, 10.0), (110.0, 50.0));
        ed.set_tool(Tool::Select);
        drag(&mut ed, (50.0, 30.0), (70.0, 60.0));

        assert_eq!(ed.annotations()[0].rect, Rect::new(30.0, 40.0, 100.0, 40.0));
        assert_eq!(ed.history.len(), 3);
        ed.undo();
        assert_eq!(ed.annotations()[0].rect, Rect::new(10.0, 10.0, 100.0, 40.0));
    }

    #[test]
    fn click_without_motion_only_selects() {
        let mut ed = editor();
        drag(&mut ed, (10.0, 10.0), (110.0, 50.0));
        ed.pointer_down(Point::new(400.0, 400.0));
        ed.pointer_up(Point::new(400.0, 400.0));
        assert_eq!(ed.selected(), None);

        ed.pointer_down(Point::new(50.0, 30.0));
        ed.pointer_up(Point::new(50.0, 30.0));
        assert_eq!(ed.selected(), Some(ed.annotations()[0].id));
        assert_eq!(ed.history.len(), 2);
    }

    #[test]
    fn resize_past_anchor_stays_normalized() {
        let mut ed = editor();
        drag(&mut ed, (100.0, 100.0), (200.0, 200.0));
        // Grab the bottom-right handle of the selected box and pull it past
        // the top-left anchor.
        drag(&mut ed, (200.0, 200.0), (40.0, 60.0));
        assert_eq!(ed.annotations()[0].rect, Rect::new(40.0, 60.0, 60.0, 40.0));
    }

    #[test]
    fn handle_of_selection_wins_over_topmost_box() {
        let mut ed = editor();
        drag(&mut ed, (0.0, 0.0), (100.0, 100.0));
        let first = ed.annotations()[0].id;
        // Second box is drawn on top of the first box's bottom-right corner.
        drag(&mut ed, (150.0, 150.0), (80.0, 80.0));
        let second = ed.annotations()[1].id;
        assert_eq!(ed.hit_test(Point::new(100.0, 100.0)), Some(Hit::Body(second)));

        ed.set_tool(Tool::Select);
        ed.pointer_down(Point::new(10.0, 10.0));
        ed.pointer_up(Point::new(10.0, 10.0));
        assert_eq!(ed.selected(), Some(first));
        assert_eq!(
            ed.hit_test(Point::new(100.0, 100.0)),
            Some(Hit::Handle(first, Corner::BottomRight))
        );
    }

    #[test]
    fn topmost_box_is_picked() {
        let mut ed = editor();
        drag(&mut ed, (0.0, 0.0), (100.0, 100.0));
        ed.pointer_down(Point::new(500.0, 500.0));
        ed.pointer_up(Point::new(500.0, 500.0));
        ed.set_tool(Tool::Box);
        // Second box fully overlaps the first; start it outside so the press misses both.
        drag(&mut ed, (120.0, 120.0), (20.0, 20.0));
        let top = ed.annotations()[1].id;
        assert_eq!(ed.hit_test(Point::new(50.0, 50.0)), Some(Hit::Body(top)));
    }

    #[test]
    fn select_tool_on_empty_space_does_not_draw() {
        let mut ed = editor();
        ed.set_tool(Tool::Select);
        drag(&mut ed, (10.0, 10.0), (200.0, 200.0));
        assert!(ed.annotations().is_empty());
        assert_eq!(ed.selected(), None);
    }

    #[test]
    fn delete_and_undo_restores() {
        let mut ed = editor();
        drag(&mut ed, (10.0, 10.0), (110.0, 50.0));
        ed.handle_shortcut(Shortcut::Delete);
        assert!(ed.annotations().is_empty());
        ed.handle_shortcut(Shortcut::Undo);
        assert_eq!(ed.annotations().len(), 1);
    }

    #[test]
    fn note_edit_commits_one_snapshot() {
        let mut ed = editor();
        drag(&mut ed, (10.0, 10.0), (110.0, 50.0));
        let id = ed.annotations()[0].id;
        for text in ["r", "re", "rem", "remove hat"] {
            ed.update_note(id, text);
        }
        assert_eq!(ed.history.len(), 2);
        ed.commit_note();
        assert_eq!(ed.history.len(), 3);
        assert_eq!(ed.annotations()[0].text, "remove hat");

        ed.undo();
        assert_eq!(ed.annotations()[0].text, "");
    }

    #[test]
    fn note_typed_before_redo_is_kept() {
        let mut ed = editor();
        drag(&mut ed, (10.0, 10.0), (110.0, 50.0));
        drag(&mut ed, (200.0, 200.0), (300.0, 260.0));
        let first = ed.annotations()[0].id;
        ed.undo();
        ed.update_note(first, "remove hat");
        ed.redo();
        ed.commit_note();

        assert_eq!(ed.annotations()[0].text, "remove hat");
        // The note became a new edit, so the undone box is gone from redo.
        assert_eq!(ed.annotations().len(), 1);
        assert!(!ed.can_redo());
        ed.undo();
        assert_eq!(ed.annotations()[0].text, "");
    }

    #[test]
    fn boxes_stay_within_image_bounds() {
        let mut ed = EditorController::new(EditorSettings::default()).with_bounds(200, 100);
        drag(&mut ed, (150.0, 50.0), (400.0, 300.0));
        assert_eq!(ed.annotations()[0].rect, Rect::new(150.0, 50.0, 50.0, 50.0));

        // Entirely outside: clamps to a sliver on the edge and is discarded.
        drag(&mut ed, (-80.0, 20.0), (-10.0, 90.0));
        assert_eq!(ed.annotations().len(), 1);

        ed.set_tool(Tool::Select);
        drag(&mut ed, (170.0, 70.0), (-500.0, -500.0));
        assert_eq!(ed.annotations()[0].rect, Rect::new(0.0, 0.0, 50.0, 50.0));

        // Resize handle dragged past the edge stops at the edge.
        drag(&mut ed, (50.0, 50.0), (900.0, 900.0));
        assert_eq!(ed.annotations()[0].rect, Rect::new(0.0, 0.0, 200.0, 100.0));
    }

    #[test]
    fn cancel_mid_move_restores_geometry() {
        let mut ed = editor();
        drag(&mut ed, (10.0, 10.0), (110.0, 50.0));
        ed.pointer_down(Point::new(50.0, 30.0));
        ed.pointer_move(Point::new(300.0, 300.0));
        ed.handle_shortcut(Shortcut::Cancel);
        assert_eq!(ed.annotations()[0].rect, Rect::new(10.0, 10.0, 100.0, 40.0));
        assert_eq!(ed.state(), &EditorState::Idle);
    }

    #[test]
    fn recolor_selected_is_undoable() {
        let mut ed = editor();
        drag(&mut ed, (10.0, 10.0), (110.0, 50.0));
        ed.handle_shortcut(Shortcut::Color(AnnotationColor::Cyan));
        assert_eq!(ed.annotations()[0].color, AnnotationColor::Cyan);
        ed.undo();
        assert_eq!(ed.annotations()[0].color, AnnotationColor::Red);
        assert_eq!(ed.color(), AnnotationColor::Cyan);
    }

    #[test]
    fn ids_are_not_reused_after_undo() {
        let mut ed = editor();
        drag(&mut ed, (10.0, 10.0), (110.0, 50.0));
        let first = ed.annotations()[0].id;
        ed.undo();
        drag(&mut ed, (10.0, 10.0), (110.0, 50.0));
        assert_ne!(ed.annotations()[0].id, first);
    }
}
