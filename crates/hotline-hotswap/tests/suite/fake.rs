use std::future::Future;
use std::sync::Arc;

use hotline_agent::{AgentChannel, ChannelConfig, StatusStore};
use hotline_compile::{
    ClassesProvider, CompilationPipeline, CompileError, CompilerBackend, DiagnosticSink,
};
use hotline_core::{BytecodeArtifact, SourceUnit, TargetHandle};
use hotline_hotswap::{EventObserver, Session, SessionEvent};
use tokio::sync::mpsc;

/// Compiles a unit to its own source text. Sources containing `syntax error`
/// fail the whole batch.
#[derive(Debug, Default)]
pub struct EchoBackend;

impl CompilerBackend for EchoBackend {
    fn compile<'a, P: ClassesProvider>(
        &'a self,
        _provider: &'a P,
        units: &'a [SourceUnit],
        sink: &'a DiagnosticSink,
    ) -> impl Future<Output = Result<Vec<BytecodeArtifact>, CompileError>> + Send + 'a {
        async move {
            if let Some(bad) = units.iter().find(|u| u.text.contains("syntax error")) {
                sink.emit(format!("{}: error: syntax error", bad.class));
                return Err(CompileError::Failed {
                    message: format!("{}: error: syntax error", bad.class),
                });
            }
            Ok(units
                .iter()
                .map(|unit| {
                    sink.emit(format!("compiled {}", unit.class));
                    BytecodeArtifact::new(unit.class.clone(), unit.text.clone().into_bytes())
                })
                .collect())
        }
    }
}

/// Reports how many loaded classes the compiler can see, then compiles
/// nothing.
#[derive(Debug, Default)]
pub struct VisibleClassesBackend;

impl CompilerBackend for VisibleClassesBackend {
    fn compile<'a, P: ClassesProvider>(
        &'a self,
        provider: &'a P,
        _units: &'a [SourceUnit],
        sink: &'a DiagnosticSink,
    ) -> impl Future<Output = Result<Vec<BytecodeArtifact>, CompileError>> + Send + 'a {
        async move {
            sink.emit(format!("visible={}", provider.class_names().len()));
            Ok(Vec::new())
        }
    }
}

pub fn session(target: TargetHandle) -> (Session<EchoBackend>, mpsc::UnboundedReceiver<SessionEvent>) {
    session_with(target, EchoBackend)
}

pub fn session_with<B: CompilerBackend>(
    target: TargetHandle,
    backend: B,
) -> (Session<B>, mpsc::UnboundedReceiver<SessionEvent>) {
    let channel = AgentChannel::new(Arc::new(StatusStore::new()), ChannelConfig::default());
    let (observer, events) = EventObserver::channel();
    let session = Session::new(
        channel,
        target,
        CompilationPipeline::new(backend),
        Arc::new(observer),
    );
    (session, events)
}

pub fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
