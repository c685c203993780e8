use std::path::{Path, PathBuf};

use hotline_compile::{CompileObserver, CompileOutcome};
use tokio::sync::mpsc;

use crate::upload::{UploadAck, UploadError};

/// Everything a front end hears from a [`crate::Session`].
///
/// Calls come from worker tasks, never from the thread that started the
/// operation.
pub trait SessionObserver: CompileObserver {
    fn on_save_finished(&self, saved: usize, total: usize, last_path: Option<&Path>);

    fn on_upload_finished(&self, result: &Result<UploadAck, UploadError>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Diagnostic(String),
    CompileFinished { success: bool },
    SaveFinished {
        saved: usize,
        total: usize,
        last_path: Option<PathBuf>,
    },
    UploadFinished(Result<UploadAck, UploadError>),
}

/// Observer that turns every callback into a [`SessionEvent`] on a channel.
#[derive(Debug, Clone)]
pub struct EventObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventObserver {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SessionEvent) {
        // Nobody listening is fine.
        let _ = self.tx.send(event);
    }
}

impl CompileObserver for EventObserver {
    fn on_diagnostic(&self, line: &str) {
        self.send(SessionEvent::Diagnostic(line.to_string()));
    }

    fn on_compile_finished(&self, outcome: &CompileOutcome) {
        self.send(SessionEvent::CompileFinished {
            success: outcome.is_success(),
        });
    }
}

impl SessionObserver for EventObserver {
    fn on_save_finished(&self, saved: usize, total: usize, last_path: Option<&Path>) {
        self.send(SessionEvent::SaveFinished {
            saved,
            total,
            last_path: last_path.map(Path::to_path_buf),
        });
    }

    fn on_upload_finished(&self, result: &Result<UploadAck, UploadError>) {
        self.send(SessionEvent::UploadFinished(result.clone()));
    }
}
