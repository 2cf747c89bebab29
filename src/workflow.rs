//! The upload → edit → compare cycle, independent of the UI toolkit.

use std::sync::Arc;

use image::imageops::FilterType;
use image::RgbaImage;

use crate::compare::CompareSlider;
use crate::config::Config;
use crate::edit_service::ImageEditor;
use crate::editor::EditorController;
use crate::error::{AppError, FlattenError, Surface, ValidationError};
use crate::flatten::{flatten, FlattenStyle, NoteFont};
use crate::job::{EditKind, PendingEdit};
use crate::prompt::{instruction_for, CLEANUP_INSTRUCTION};
use crate::upload::{intake, IncomingFile, SourceImage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Editor,
    Compare,
}

/// Everything tied to one uploaded image. Dropped on "new image".
pub struct Session {
    /// Unique per upload, for caching derived textures.
    pub id: u64,
    /// Bumped every time `result` is replaced.
    pub result_revision: u64,
    pub source: SourceImage,
    pub editor: EditorController,
    pub result: Option<RgbaImage>,
    pub slider: CompareSlider,
    stage: Stage,
    pending: Option<PendingEdit>,
}

impl Session {
    fn new(id: u64, source: SourceImage, config: &Config) -> Self {
        let (width, height) = source.image.dimensions();
        Self {
            id,
            result_revision: 0,
            source,
            editor: EditorController::new(config.editor_settings()).with_bounds(width, height),
            result: None,
            slider: CompareSlider::default(),
            stage: Stage::Editor,
            pending: None,
        }
    }
}

pub struct Workflow {
    config: Config,
    service: Arc<dyn ImageEditor>,
    font: NoteFont,
    session: Option<Session>,
    next_session_id: u64,
    upload_error: Option<String>,
    editor_error: Option<String>,
    notice: Option<String>,
}

impl Workflow {
    pub fn new(config: Config, service: Arc<dyn ImageEditor>) -> Result<Self, FlattenError> {
        Ok(Self {
            config,
            service,
            font: NoteFont::bundled()?,
            session: None,
            next_session_id: 1,
            upload_error: None,
            editor_error: None,
            notice: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stage(&self) -> Stage {
        self.session.as_ref().map_or(Stage::Upload, |s| s.stage)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub fn is_busy(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.pending.is_some())
    }

    pub fn pending_kind(&self) -> Option<EditKind> {
        self.session
            .as_ref()
            .and_then(|s| s.pending.as_ref())
            .map(PendingEdit::kind)
    }

    pub fn upload_error(&self) -> Option<&str> {
        self.upload_error.as_deref()
    }

    pub fn editor_error(&self) -> Option<&str> {
        self.editor_error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn open(&mut self, file: Result<IncomingFile, ValidationError>) {
        match file.and_then(|f| intake(f, self.config.max_dimension)) {
            Ok(source) => {
                log::info!(
                    "opened {} ({}x{})",
                    source.name,
                    source.image.width(),
                    source.image.height()
                );
                self.upload_error = None;
                self.editor_error = None;
                self.session = Some(Session::new(self.next_session_id, source, &self.config));
                self.next_session_id += 1;
            }
            Err(err) => {
                log::warn!("rejected upload: {err}");
                self.report(err.into());
            }
        }
    }

    /// Flatten the current annotations and send them for editing.
    pub fn generate(&mut self, notify: impl FnOnce() + Send + 'static) {
        if self.is_busy() {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(instruction) = instruction_for(session.editor.annotations()) else {
            self.report(ValidationError::NoAnnotations.into());
            return;
        };
        let flattened = flatten(
            &session.source.image,
            session.editor.annotations(),
            FlattenStyle {
                stroke_width: self.config.stroke_width,
            },
            &self.font,
        );
        self.editor_error = None;
        session.pending = Some(PendingEdit::spawn(
            self.service.clone(),
            EditKind::Generate,
            flattened,
            instruction,
            notify,
        ));
    }

    /// Resend the last result with the fixed mark-removal instruction.
    pub fn cleanup(&mut self, notify: impl FnOnce() + Send + 'static) {
        if self.is_busy() {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(result) = session.result.clone() else {
            return;
        };
        session.pending = Some(PendingEdit::spawn(
            self.service.clone(),
            EditKind::Cleanup,
            result,
            CLEANUP_INSTRUCTION.to_owned(),
            notify,
        ));
    }

    /// Pick up a finished edit, if any. Call once per frame.
    pub fn poll(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(outcome) = session.pending.as_ref().and_then(PendingEdit::poll) else {
            return;
        };
        session.pending = None;
        match outcome.result {
            Ok(img) => {
                log::info!("{:?} succeeded", outcome.kind);
                let (width, height) = session.source.image.dimensions();
                let img = if img.dimensions() == (width, height) {
                    img
                } else {
                    log::debug!(
                        "resampling {}x{} result to {width}x{height}",
                        img.width(),
                        img.height()
                    );
                    image::imageops::resize(&img, width, height, FilterType::Lanczos3)
                };
                session.result = Some(img);
                session.result_revision += 1;
                session.stage = Stage::Compare;
            }
            Err(err) => {
                log::warn!("{:?} failed: {err}", outcome.kind);
                self.report(err.into());
            }
        }
    }

    pub fn back_to_editor(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.stage = Stage::Editor;
        }
    }

    pub fn show_result(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.result.is_some() {
                session.stage = Stage::Compare;
            }
        }
    }

    /// Go back to the upload screen, discarding the session.
    pub fn start_over(&mut self) {
        if self.session.take().is_some() {
            log::info!("session discarded");
        }
        self.editor_error = None;
        self.upload_error = None;
    }

    fn report(&mut self, err: AppError) {
        let message = err.to_string();
        match (err.surface(), self.stage()) {
            (Surface::Notice, _) => self.notice = Some(message),
            (Surface::Inline, Stage::Upload) => self.upload_error = Some(message),
            (Surface::Inline, _) => self.editor_error = Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::job::tests::FakeEditor;
    use crate::model::AnnotationColor;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    fn png_file(name: &str, w: u32, h: u32) -> Result<IncomingFile, ValidationError> {
        let img = RgbaImage::from_pixel(w, h, image::Rgba([200, 200, 200, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        Ok(IncomingFile {
            name: name.into(),
            declared_type: "image/png".into(),
            bytes,
        })
    }

    fn workflow(editor: Arc<FakeEditor>) -> Workflow {
        Workflow::new(Config::default(), editor).unwrap()
    }

    fn settle(wf: &mut Workflow) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while wf.is_busy() {
            assert!(Instant::now() < deadline, "edit never finished");
            std::thread::sleep(Duration::from_millis(5));
            wf.poll();
        }
    }

    fn draw(wf: &mut Workflow, color: AnnotationColor, from: (f32, f32), to: (f32, f32)) {
        let ed = &mut wf.session_mut().unwrap().editor;
        ed.set_color(color);
        ed.pointer_down(Point::new(from.0, from.1));
        ed.pointer_up(Point::new(to.0, to.1));
    }

    #[test]
    fn wrong_type_stays_on_upload_with_inline_error() {
        let fake = Arc::new(FakeEditor::default());
        let mut wf = workflow(fake);
        wf.open(Ok(IncomingFile {
            name: "notes.txt".into(),
            declared_type: "text/plain".into(),
            bytes: b"hello".to_vec(),
        }));
        assert_eq!(wf.stage(), Stage::Upload);
        assert!(wf.upload_error().unwrap().contains("not an image"));
        assert_eq!(wf.notice(), None);
    }

    #[test]
    fn generate_without_boxes_is_inline_error() {
        let fake = Arc::new(FakeEditor::default());
        let mut wf = workflow(fake.clone());
        wf.open(png_file("a.png", 64, 64));
        wf.generate(|| {});
        assert!(!wf.is_busy());
        assert!(wf.editor_error().is_some());
        assert!(fake.instructions.lock().unwrap().is_empty());
    }

    #[test]
    fn generate_then_cleanup_cycle() {
        let fake = Arc::new(FakeEditor::default());
        let mut wf = workflow(fake.clone());
        wf.open(png_file("a.png", 120, 120));
        draw(&mut wf, AnnotationColor::Cyan, (10.0, 10.0), (60.0, 60.0));
        draw(&mut wf, AnnotationColor::Cyan, (70.0, 70.0), (110.0, 110.0));

        wf.generate(|| {});
        assert!(wf.is_busy());
        assert_eq!(wf.pending_kind(), Some(EditKind::Generate));
        wf.generate(|| {});
        settle(&mut wf);

        assert_eq!(wf.stage(), Stage::Compare);
        let result = wf.session().unwrap().result.as_ref().unwrap();
        assert_eq!(result.dimensions(), (120, 120));

        // Repaint the boxes a different color: cleanup must not care.
        wf.back_to_editor();
        draw(&mut wf, AnnotationColor::Red, (5.0, 80.0), (50.0, 115.0));
        wf.show_result();
        wf.cleanup(|| {});
        settle(&mut wf);

        let sent = fake.instructions.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("cyan"));
        assert_eq!(sent[1], CLEANUP_INSTRUCTION);
    }

    #[test]
    fn result_of_another_size_is_matched_to_source() {
        let fake = Arc::new(FakeEditor {
            output_size: Some((300, 150)),
            ..FakeEditor::default()
        });
        let mut wf = workflow(fake);
        wf.open(png_file("a.png", 120, 80));
        draw(&mut wf, AnnotationColor::Yellow, (10.0, 10.0), (60.0, 60.0));
        wf.generate(|| {});
        settle(&mut wf);

        let result = wf.session().unwrap().result.as_ref().unwrap();
        assert_eq!(result.dimensions(), (120, 80));
    }

    #[test]
    fn remote_failure_becomes_notice_and_keeps_editor() {
        let fake = Arc::new(FakeEditor {
            fail: true,
            ..FakeEditor::default()
        });
        let mut wf = workflow(fake);
        wf.open(png_file("a.png", 64, 64));
        draw(&mut wf, AnnotationColor::Red, (10.0, 10.0), (50.0, 50.0));
        wf.generate(|| {});
        settle(&mut wf);

        assert_eq!(wf.stage(), Stage::Editor);
        assert_eq!(wf.notice(), Some("edit service returned no image"));
        assert!(wf.session().unwrap().result.is_none());
        assert_eq!(wf.session().unwrap().editor.annotations().len(), 1);
        wf.dismiss_notice();
        assert_eq!(wf.notice(), None);
    }

    #[test]
    fn start_over_discards_session() {
        let fake = Arc::new(FakeEditor::default());
        let mut wf = workflow(fake);
        wf.open(png_file("a.png", 64, 64));
        assert_eq!(wf.stage(), Stage::Editor);
        wf.start_over();
        assert_eq!(wf.stage(), Stage::Upload);
        assert!(wf.session().is_none());
    }
}
