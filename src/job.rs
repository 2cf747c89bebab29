use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use image::RgbaImage;

use crate::edit_service::ImageEditor;
use crate::error::RemoteError;

/// Why an edit was requested; decides what happens with the result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditKind {
    Generate,
    Cleanup,
}

pub struct EditOutcome {
    pub kind: EditKind,
    pub result: Result<RgbaImage, RemoteError>,
}

/// An in-flight edit request. The worker owns its input; the only thing
/// shared with it is the reply channel.
pub struct PendingEdit {
    kind: EditKind,
    rx: Receiver<Result<RgbaImage, RemoteError>>,
}

impl PendingEdit {
    /// Run `editor` on a worker thread. `notify` is called once the reply is
    /// ready, typically to request a repaint.
    pub fn spawn(
        editor: Arc<dyn ImageEditor>,
        kind: EditKind,
        image: RgbaImage,
        instruction: String,
        notify: impl FnOnce() + Send + 'static,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let result = editor.edit(&image, &instruction);
            // Receiver gone means the session was discarded; nothing to do.
            let _ = tx.send(result);
            notify();
        });
        Self { kind, rx }
    }

    pub fn kind(&self) -> EditKind {
        self.kind
    }

    /// Non-blocking check for the reply.
    pub fn poll(&self) -> Option<EditOutcome> {
        let result = match self.rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(RemoteError::WorkerLost),
        };
        Some(EditOutcome {
            kind: self.kind,
            result,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Records instructions and returns an inverted copy of the input,
    /// optionally rescaled to `output_size`.
    #[derive(Default)]
    pub(crate) struct FakeEditor {
        pub instructions: Mutex<Vec<String>>,
        pub fail: bool,
        pub output_size: Option<(u32, u32)>,
    }

    impl ImageEditor for FakeEditor {
        fn edit(&self, image: &RgbaImage, instruction: &str) -> Result<RgbaImage, RemoteError> {
            self.instructions.lock().unwrap().push(instruction.to_owned());
            if self.fail {
                return Err(RemoteError::EmptyResponse);
            }
            let mut out = match self.output_size {
                Some((w, h)) => image::imageops::resize(image, w, h, image::imageops::FilterType::Nearest),
                None => image.clone(),
            };
            image::imageops::invert(&mut out);
            Ok(out)
        }
    }

    pub(crate) fn wait(pending: &PendingEdit) -> EditOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(outcome) = pending.poll() {
                return outcome;
            }
            assert!(Instant::now() < deadline, "edit worker timed out");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn worker_sends_result_and_notifies() {
        let editor = Arc::new(FakeEditor::default());
        let (ntx, nrx) = mpsc::channel();
        let pending = PendingEdit::spawn(
            editor.clone(),
            EditKind::Cleanup,
            RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 255])),
            "clean".into(),
            move || ntx.send(()).unwrap(),
        );

        let outcome = wait(&pending);
        assert_eq!(outcome.kind, EditKind::Cleanup);
        let img = outcome.result.unwrap();
        assert_eq!(img.get_pixel(0, 0).0[..3], [255, 255, 255]);
        nrx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(editor.instructions.lock().unwrap().as_slice(), ["clean"]);
    }

    #[test]
    fn failure_is_passed_through() {
        let editor = Arc::new(FakeEditor {
            fail: true,
            ..FakeEditor::default()
        });
        let pending = PendingEdit::spawn(editor, EditKind::Generate, RgbaImage::new(1, 1), "x".into(), || {});
        assert!(matches!(wait(&pending).result, Err(RemoteError::EmptyResponse)));
    }
}
