use eframe::egui;
use image::RgbaImage;

use crate::compare::{download_name, save_png};
use crate::editor::{EditorController, EditorState, Hit, Shortcut, Tool};
use crate::error::ValidationError;
use crate::flatten::note_font_size;
use crate::geometry::{Corner, Point, Rect};
use crate::job::EditKind;
use crate::model::{AnnotationColor, AnnotationId};
use crate::upload::{mime_for_path, IncomingFile};
use crate::workflow::{Session, Stage, Workflow};

/// Resize handle grab radius, in screen points.
const HANDLE_RADIUS: f32 = 7.0;
const NOTE_TEXT_ID: &str = "note_text";

fn color32(color: AnnotationColor) -> egui::Color32 {
    let [r, g, b, a] = color.to_rgba_u8();
    egui::Color32::from_rgba_unmultiplied(r, g, b, a)
}

fn to_color_image(img: &RgbaImage) -> egui::ColorImage {
    let size = [img.width() as usize, img.height() as usize];
    egui::ColorImage::from_rgba_unmultiplied(size, img.as_flat_samples().as_slice())
}

// ── Canvas view ─────────────────────────────────────────────────────────────

/// Pan/zoom mapping between screen points and image pixels.
struct CanvasView {
    pan: egui::Vec2,
    zoom: f32,
    panning: bool,
    needs_fit: bool,
}

impl Default for CanvasView {
    fn default() -> Self {
        Self {
            pan: egui::Vec2::ZERO,
            zoom: 1.0,
            panning: false,
            needs_fit: true,
        }
    }
}

impl CanvasView {
    fn fit(&mut self, canvas_rect: egui::Rect, image_size: egui::Vec2) {
        let zx = canvas_rect.width() / image_size.x;
        let zy = canvas_rect.height() / image_size.y;
        self.zoom = (zx.min(zy) * 0.95).clamp(0.1, 1.0);
        self.pan = egui::Vec2::ZERO;
        self.needs_fit = false;
    }

    fn image_to_screen(&self, canvas_rect: egui::Rect, image_size: egui::Vec2, p: Point) -> egui::Pos2 {
        canvas_rect.center() + self.pan + (egui::vec2(p.x, p.y) - image_size * 0.5) * self.zoom
    }

    fn screen_to_image(&self, canvas_rect: egui::Rect, image_size: egui::Vec2, pos: egui::Pos2) -> Point {
        let rel = pos - canvas_rect.center() - self.pan;
        Point::new(
            rel.x / self.zoom + image_size.x * 0.5,
            rel.y / self.zoom + image_size.y * 0.5,
        )
    }

    fn rect_to_screen(&self, canvas_rect: egui::Rect, image_size: egui::Vec2, r: Rect) -> egui::Rect {
        egui::Rect::from_two_pos(
            self.image_to_screen(canvas_rect, image_size, r.corner(Corner::TopLeft)),
            self.image_to_screen(canvas_rect, image_size, r.corner(Corner::BottomRight)),
        )
    }
}

#[derive(Default)]
struct Textures {
    session: u64,
    source: Option<egui::TextureHandle>,
    result: Option<(u64, egui::TextureHandle)>,
}

impl Textures {
    fn sync(&mut self, ctx: &egui::Context, session: &Session) {
        if self.session != session.id || self.source.is_none() {
            self.source = Some(ctx.load_texture(
                "source",
                to_color_image(&session.source.image),
                egui::TextureOptions::LINEAR,
            ));
            self.result = None;
            self.session = session.id;
        }
        let stale = self
            .result
            .as_ref()
            .map_or(true, |(rev, _)| *rev != session.result_revision);
        if stale {
            self.result = session.result.as_ref().map(|img| {
                (
                    session.result_revision,
                    ctx.load_texture("result", to_color_image(img), egui::TextureOptions::LINEAR),
                )
            });
        }
    }
}

// ── App ─────────────────────────────────────────────────────────────────────

pub struct RedlineApp {
    workflow: Workflow,
    view: CanvasView,
    textures: Textures,
    note_buffer: String,
    save_error: Option<String>,
}

impl RedlineApp {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            view: CanvasView::default(),
            textures: Textures::default(),
            note_buffer: String::new(),
            save_error: None,
        }
    }

    fn open(&mut self, file: Result<IncomingFile, ValidationError>) {
        self.workflow.open(file);
        if self.workflow.stage() == Stage::Editor {
            self.view = CanvasView::default();
            self.save_error = None;
        }
    }

    fn open_dialog(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "webp", "gif", "bmp"])
            .pick_file()
        {
            self.open(IncomingFile::from_path(&path));
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        let Some(file) = dropped.into_iter().next() else {
            return;
        };
        if self.workflow.is_busy() {
            return;
        }
        let incoming = match (file.bytes, file.path) {
            (Some(bytes), path) => {
                let declared_type = if !file.mime.is_empty() {
                    file.mime
                } else {
                    let name = path.unwrap_or_else(|| file.name.clone().into());
                    mime_for_path(&name).to_owned()
                };
                Ok(IncomingFile {
                    name: file.name,
                    declared_type,
                    bytes: bytes.to_vec(),
                })
            }
            (None, Some(path)) => IncomingFile::from_path(&path),
            (None, None) => return,
        };
        self.open(incoming);
    }

    fn generate(&mut self, ctx: &egui::Context) {
        let ctx = ctx.clone();
        self.workflow.generate(move || ctx.request_repaint());
    }

    fn cleanup(&mut self, ctx: &egui::Context) {
        let ctx = ctx.clone();
        self.workflow.cleanup(move || ctx.request_repaint());
    }

    fn download(&mut self) {
        let Some(session) = self.workflow.session() else {
            return;
        };
        let Some(result) = session.result.as_ref() else {
            return;
        };
        let Some(path) = rfd::FileDialog::new()
            .add_filter("PNG", &["png"])
            .set_file_name(download_name(session.source.stem()))
            .save_file()
        else {
            return;
        };
        self.save_error = match save_png(result, &path) {
            Ok(()) => None,
            Err(err) => {
                log::warn!("could not save {}: {err}", path.display());
                Some(format!("could not save {}: {err}", path.display()))
            }
        };
    }

    // ── Upload stage ────────────────────────────────────────────────────────

    fn upload_ui(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() * 0.3);
                ui.heading("Mark up an image, then let the model edit it");
                ui.add_space(12.0);
                if ui.button("Open image…").clicked() {
                    self.open_dialog();
                }
                ui.label("or drop an image file onto this window");
                if let Some(err) = self.workflow.upload_error() {
                    ui.add_space(8.0);
                    ui.colored_label(ui.visuals().error_fg_color, err);
                }
            });
        });
    }

    // ── Editor stage ────────────────────────────────────────────────────────

    fn editor_shortcuts(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let shortcuts = ctx.input(|i| {
            let mut out = Vec::new();
            if i.modifiers.command && i.key_pressed(egui::Key::Z) {
                out.push(if i.modifiers.shift {
                    Shortcut::Redo
                } else {
                    Shortcut::Undo
                });
            }
            if i.modifiers.command && i.key_pressed(egui::Key::Y) {
                out.push(Shortcut::Redo);
            }
            if i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace) {
                out.push(Shortcut::Delete);
            }
            if i.key_pressed(egui::Key::Escape) {
                out.push(Shortcut::Cancel);
            }
            if !i.modifiers.command {
                let keys = [
                    (egui::Key::B, Shortcut::Tool(Tool::Box)),
                    (egui::Key::V, Shortcut::Tool(Tool::Select)),
                    (egui::Key::Num1, Shortcut::Color(AnnotationColor::Red)),
                    (egui::Key::Num2, Shortcut::Color(AnnotationColor::Yellow)),
                    (egui::Key::Num3, Shortcut::Color(AnnotationColor::Cyan)),
                ];
                for (key, shortcut) in keys {
                    if i.key_pressed(key) {
                        out.push(shortcut);
                    }
                }
            }
            out
        });
        if let Some(session) = self.workflow.session_mut() {
            for shortcut in shortcuts {
                session.editor.handle_shortcut(shortcut);
            }
        }
    }

    fn editor_toolbar(&mut self, ctx: &egui::Context) {
        let busy = self.workflow.is_busy();
        let mut generate = false;
        let mut view_result = false;
        let mut new_image = false;

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let has_result = self.workflow.session().is_some_and(|s| s.result.is_some());
                let Some(session) = self.workflow.session_mut() else {
                    return;
                };
                let ed = &mut session.editor;

                let mut tool = ed.tool();
                ui.selectable_value(&mut tool, Tool::Box, "Box");
                ui.selectable_value(&mut tool, Tool::Select, "Select");
                if tool != ed.tool() {
                    ed.set_tool(tool);
                }
                ui.separator();

                for color in AnnotationColor::ALL {
                    let label = egui::RichText::new(color.name()).color(color32(color));
                    if ui.selectable_label(ed.color() == color, label).clicked() {
                        ed.set_color(color);
                    }
                }
                ui.separator();

                if ui.add_enabled(ed.can_undo(), egui::Button::new("Undo")).clicked() {
                    ed.undo();
                }
                if ui.add_enabled(ed.can_redo(), egui::Button::new("Redo")).clicked() {
                    ed.redo();
                }
                if ui
                    .add_enabled(ed.selected().is_some(), egui::Button::new("Delete"))
                    .clicked()
                {
                    ed.delete_selected();
                }
                ui.separator();

                if ui.add_enabled(!busy, egui::Button::new("Generate")).clicked() {
                    generate = true;
                }
                if busy {
                    ui.add(egui::Spinner::new());
                    ui.label("Generating…");
                }
                if has_result && ui.add_enabled(!busy, egui::Button::new("View result")).clicked() {
                    view_result = true;
                }
                ui.separator();
                if ui.button("New image").clicked() {
                    new_image = true;
                }
                ui.separator();
                ui.label(format!("Zoom: {:.0}%", self.view.zoom * 100.0));
            });
            if let Some(err) = self.workflow.editor_error() {
                ui.colored_label(ui.visuals().error_fg_color, err);
            }
        });

        if generate {
            self.generate(ctx);
        }
        if view_result {
            self.workflow.show_result();
        }
        if new_image {
            self.workflow.start_over();
        }
    }

    fn notes_panel(&mut self, ctx: &egui::Context) {
        let Some(session) = self.workflow.session_mut() else {
            return;
        };
        let ed = &mut session.editor;
        let note_id = egui::Id::new(NOTE_TEXT_ID);
        let editing = ctx.memory(|m| m.has_focus(note_id));

        egui::SidePanel::right("notes").default_width(240.0).show(ctx, |ui| {
            ui.heading("Boxes");
            let mut pick: Option<AnnotationId> = None;
            for ann in ed.annotations() {
                let preview = if ann.text.is_empty() {
                    "(no note)".to_owned()
                } else {
                    ann.text.lines().next().unwrap_or_default().to_owned()
                };
                let label = egui::RichText::new(preview).color(color32(ann.color));
                if ui.selectable_label(ed.selected() == Some(ann.id), label).clicked() {
                    pick = Some(ann.id);
                }
            }
            if let Some(id) = pick {
                ed.select(Some(id));
            }

            ui.separator();
            let (w, h) = session.source.image.dimensions();
            if session.source.was_downscaled() {
                let (ow, oh) = session.source.original_size;
                ui.weak(format!("{w}x{h} (downscaled from {ow}x{oh})"));
            } else {
                ui.weak(format!("{w}x{h}"));
            }
            ui.separator();
            let Some(selected) = ed.selected_annotation() else {
                ui.label("Select a box to write its note.");
                return;
            };
            let id = selected.id;
            if !editing {
                self.note_buffer.clone_from(&selected.text);
            }
            ui.label("Note");
            let response = ui.add(
                egui::TextEdit::multiline(&mut self.note_buffer)
                    .id(note_id)
                    .desired_rows(4)
                    .hint_text("what should change here?"),
            );
            if response.changed() {
                ed.update_note(id, &self.note_buffer);
            }
            if response.lost_focus() {
                ed.commit_note();
            }
        });
    }

    fn draw_annotations(
        painter: &egui::Painter,
        view: &CanvasView,
        canvas_rect: egui::Rect,
        image_size: egui::Vec2,
        ed: &EditorController,
        stroke_width: f32,
    ) {
        let font_px = note_font_size(image_size.x as u32, image_size.y as u32) * view.zoom;
        let stroke = (stroke_width * view.zoom).max(1.0);

        for ann in ed.annotations() {
            let rect = view.rect_to_screen(canvas_rect, image_size, ann.rect);
            let c = color32(ann.color);
            painter.rect_stroke(rect, 0.0, egui::Stroke::new(stroke, c), egui::StrokeKind::Inside);

            if !ann.text.is_empty() {
                let inner = rect.shrink(stroke + 2.0 * view.zoom);
                if inner.is_positive() {
                    let galley = painter.layout(
                        ann.text.clone(),
                        egui::FontId::proportional(font_px),
                        c,
                        inner.width(),
                    );
                    painter
                        .with_clip_rect(inner.intersect(canvas_rect))
                        .galley(inner.min, galley, c);
                }
            }

            if ed.selected() == Some(ann.id) {
                Self::draw_selection_indicator(painter, rect);
            }
        }

        if let Some(draft) = ed.draft_rect() {
            let rect = view.rect_to_screen(canvas_rect, image_size, draft);
            painter.rect_stroke(
                rect,
                0.0,
                egui::Stroke::new(stroke, color32(ed.color())),
                egui::StrokeKind::Inside,
            );
        }
    }

    fn draw_selection_indicator(painter: &egui::Painter, rect: egui::Rect) {
        let accent = egui::Color32::from_rgb(0, 120, 255);
        painter.rect_stroke(
            rect.expand(3.0),
            2.0,
            egui::Stroke::new(1.5, accent),
            egui::StrokeKind::Middle,
        );
        for corner in [rect.left_top(), rect.right_top(), rect.left_bottom(), rect.right_bottom()] {
            let handle = egui::Rect::from_center_size(corner, egui::vec2(8.0, 8.0));
            painter.rect_filled(handle, 1.0, egui::Color32::WHITE);
            painter.rect_stroke(handle, 1.0, egui::Stroke::new(1.5, accent), egui::StrokeKind::Middle);
        }
    }

    fn editor_canvas(&mut self, ctx: &egui::Context) {
        let stroke_width = self.workflow.config().stroke_width;
        let Some(session) = self.workflow.session_mut() else {
            return;
        };
        let image_size = egui::vec2(
            session.source.image.width() as f32,
            session.source.image.height() as f32,
        );
        let view = &mut self.view;
        let source_texture = self.textures.source.as_ref();

        egui::CentralPanel::default().show(ctx, |ui| {
            let (response, painter) =
                ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
            let canvas_rect = response.rect;
            if view.needs_fit {
                view.fit(canvas_rect, image_size);
            }

            painter.rect_filled(canvas_rect, 0.0, egui::Color32::from_gray(40));
            if let Some(tex) = source_texture {
                let img_rect = egui::Rect::from_min_max(
                    view.image_to_screen(canvas_rect, image_size, Point::new(0.0, 0.0)),
                    view.image_to_screen(canvas_rect, image_size, Point::new(image_size.x, image_size.y)),
                );
                painter.image(
                    tex.id(),
                    img_rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            }

            let ed = &mut session.editor;
            Self::draw_annotations(&painter, view, canvas_rect, image_size, ed, stroke_width);

            // Pan with the middle button.
            if ctx.input(|i| i.pointer.middle_down()) {
                view.pan += ctx.input(|i| i.pointer.delta());
                view.panning = true;
            } else {
                view.panning = false;
            }

            // Zoom around the cursor.
            let scroll_delta = ctx.input(|i| i.smooth_scroll_delta.y);
            if scroll_delta != 0.0 && response.hovered() {
                let new_zoom = (view.zoom * (1.0 + scroll_delta * 0.002)).clamp(0.1, 10.0);
                if let Some(cursor) = response.hover_pos() {
                    let cursor_rel = cursor - canvas_rect.center() - view.pan;
                    view.pan -= cursor_rel * (new_zoom / view.zoom - 1.0);
                }
                view.zoom = new_zoom;
            }
            ed.set_handle_radius(HANDLE_RADIUS / view.zoom);

            if let Some(pos) = response.hover_pos() {
                let cursor = match ed.state() {
                    EditorState::DraggingMove { .. } => egui::CursorIcon::Grabbing,
                    EditorState::DraggingResize { .. } | EditorState::DrawingRect { .. } => {
                        egui::CursorIcon::Crosshair
                    }
                    EditorState::Idle => match ed.hit_test(view.screen_to_image(canvas_rect, image_size, pos)) {
                        Some(Hit::Handle(_, Corner::TopLeft | Corner::BottomRight)) => {
                            egui::CursorIcon::ResizeNwSe
                        }
                        Some(Hit::Handle(..)) => egui::CursorIcon::ResizeNeSw,
                        Some(Hit::Body(_)) => egui::CursorIcon::Grab,
                        None if ed.tool() == Tool::Box => egui::CursorIcon::Crosshair,
                        None => egui::CursorIcon::Default,
                    },
                };
                ctx.set_cursor_icon(cursor);
            }

            if view.panning {
                return;
            }
            let to_image = |p: egui::Pos2| view.screen_to_image(canvas_rect, image_size, p);

            if response.clicked_by(egui::PointerButton::Primary) {
                if let Some(pos) = response.interact_pointer_pos() {
                    ed.pointer_down(to_image(pos));
                    ed.pointer_up(to_image(pos));
                }
            }
            if response.drag_started_by(egui::PointerButton::Primary) {
                let origin = ctx
                    .input(|i| i.pointer.press_origin())
                    .or(response.interact_pointer_pos());
                if let Some(pos) = origin {
                    ed.pointer_down(to_image(pos));
                }
            }
            if response.dragged_by(egui::PointerButton::Primary) {
                if let Some(pos) = response.interact_pointer_pos() {
                    ed.pointer_move(to_image(pos));
                }
            }
            if response.drag_stopped_by(egui::PointerButton::Primary) {
                let end = response
                    .interact_pointer_pos()
                    .or(ctx.input(|i| i.pointer.latest_pos()));
                match end {
                    Some(pos) => ed.pointer_up(to_image(pos)),
                    None => ed.cancel(),
                }
            }
        });
    }

    // ── Compare stage ───────────────────────────────────────────────────────

    fn compare_ui(&mut self, ctx: &egui::Context) {
        let busy = self.workflow.is_busy();
        let mut back = false;
        let mut cleanup = false;
        let mut download = false;
        let mut new_image = false;

        egui::TopBottomPanel::top("compare_toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.add_enabled(!busy, egui::Button::new("Back to editor")).clicked() {
                    back = true;
                }
                if ui.add_enabled(!busy, egui::Button::new("Clean up")).clicked() {
                    cleanup = true;
                }
                if ui.add_enabled(!busy, egui::Button::new("Download")).clicked() {
                    download = true;
                }
                if busy {
                    ui.add(egui::Spinner::new());
                    ui.label(match self.workflow.pending_kind() {
                        Some(EditKind::Cleanup) => "Cleaning up…",
                        _ => "Generating…",
                    });
                }
                ui.separator();
                if ui.button("New image").clicked() {
                    new_image = true;
                }
                if let Some(session) = self.workflow.session() {
                    ui.separator();
                    ui.label(format!("Divider: {:.0}%", session.slider.percent()));
                }
            });
            if let Some(err) = &self.save_error {
                ui.colored_label(ui.visuals().error_fg_color, err);
            }
        });

        if let (Some(session), Some(before), Some((_, after))) = (
            self.workflow.session_mut(),
            self.textures.source.as_ref(),
            self.textures.result.as_ref(),
        ) {
            let slider = &mut session.slider;
            let image_size = egui::vec2(
                session.source.image.width() as f32,
                session.source.image.height() as f32,
            );

            egui::CentralPanel::default().show(ctx, |ui| {
                let (response, painter) =
                    ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
                painter.rect_filled(response.rect, 0.0, egui::Color32::from_gray(40));

                let scale = (response.rect.width() / image_size.x)
                    .min(response.rect.height() / image_size.y)
                    .min(1.0);
                let img_rect = egui::Rect::from_center_size(response.rect.center(), image_size * scale);
                let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));

                if response.dragged() || response.clicked() {
                    if let Some(pos) = response.interact_pointer_pos() {
                        slider.drag_to(pos.x, img_rect.left(), img_rect.width());
                    }
                }
                let split_x = slider.split_x(img_rect.left(), img_rect.width());

                painter.image(after.id(), img_rect, uv, egui::Color32::WHITE);
                let before_rect = egui::Rect::from_min_max(img_rect.min, egui::pos2(split_x, img_rect.max.y));
                painter
                    .with_clip_rect(before_rect)
                    .image(before.id(), img_rect, uv, egui::Color32::WHITE);

                painter.line_segment(
                    [egui::pos2(split_x, img_rect.top()), egui::pos2(split_x, img_rect.bottom())],
                    egui::Stroke::new(2.0, egui::Color32::WHITE),
                );
                painter.circle_filled(egui::pos2(split_x, img_rect.center().y), 8.0, egui::Color32::WHITE);
                painter.text(
                    img_rect.left_top() + egui::vec2(8.0, 8.0),
                    egui::Align2::LEFT_TOP,
                    "Before",
                    egui::FontId::proportional(14.0),
                    egui::Color32::WHITE,
                );
                painter.text(
                    img_rect.right_top() + egui::vec2(-8.0, 8.0),
                    egui::Align2::RIGHT_TOP,
                    "After",
                    egui::FontId::proportional(14.0),
                    egui::Color32::WHITE,
                );
                if response.hovered() {
                    ctx.set_cursor_icon(egui::CursorIcon::ResizeHorizontal);
                }
            });
        }

        if back {
            self.workflow.back_to_editor();
        }
        if cleanup {
            self.cleanup(ctx);
        }
        if download {
            self.download();
        }
        if new_image {
            self.workflow.start_over();
        }
    }

    fn notice_ui(&mut self, ctx: &egui::Context) {
        let Some(message) = self.workflow.notice().map(str::to_owned) else {
            return;
        };
        let mut dismiss = false;
        egui::TopBottomPanel::top("notice").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.colored_label(ui.visuals().error_fg_color, message);
                if ui.button("Dismiss").clicked() {
                    dismiss = true;
                }
            });
        });
        if dismiss {
            self.workflow.dismiss_notice();
        }
    }
}

// ── eframe App impl ────────────────────────────────────────────────────────

impl eframe::App for RedlineApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.workflow.poll();
        self.handle_dropped_files(ctx);
        if let Some(session) = self.workflow.session() {
            self.textures.sync(ctx, session);
        }

        self.notice_ui(ctx);
        match self.workflow.stage() {
            Stage::Upload => self.upload_ui(ctx),
            Stage::Editor => {
                self.editor_shortcuts(ctx);
                self.editor_toolbar(ctx);
                self.notes_panel(ctx);
                self.editor_canvas(ctx);
            }
            Stage::Compare => self.compare_ui(ctx),
        }
    }
}
