use tokio::sync::mpsc;

use crate::pipeline::CompileOutcome;

/// Receives the progress of one compilation.
///
/// `on_diagnostic` is called once per compiler output line, in emission
/// order. `on_compile_finished` is called exactly once, after every
/// diagnostic, whatever the outcome.
pub trait CompileObserver: Send + Sync {
    fn on_diagnostic(&self, line: &str);

    fn on_compile_finished(&self, outcome: &CompileOutcome);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CompileObserver for NoopObserver {
    fn on_diagnostic(&self, _line: &str) {}

    fn on_compile_finished(&self, _outcome: &CompileOutcome) {}
}

/// Handle a backend uses to emit diagnostic lines while it runs.
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    tx: mpsc::UnboundedSender<String>,
}

impl DiagnosticSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A sink whose lines go nowhere.
    pub fn discard() -> Self {
        let (sink, _rx) = Self::channel();
        sink
    }

    pub fn emit(&self, line: impl Into<String>) {
        // The receiver only goes away once the compile is over.
        let _ = self.tx.send(line.into());
    }
}
