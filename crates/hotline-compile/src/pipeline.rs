use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use hotline_core::{BytecodeArtifact, SourceUnit};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::classpath::ClassesProvider;
use crate::observer::{CompileObserver, DiagnosticSink};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("invalid compile input: {0}")]
    InvalidInput(String),
    /// The compiler ran and rejected the sources.
    #[error("compilation failed:\n{message}")]
    Failed { message: String },
    /// Dependencies could not be materialized from the target.
    #[error("could not build the classpath: {0}")]
    Classpath(String),
    /// The backend itself broke (spawn failure, panic, I/O on its scratch
    /// space).
    #[error("compiler backend error: {0}")]
    Internal(String),
}

/// Result of one compilation: artifacts or an error, plus every diagnostic
/// line that was emitted on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Compiled {
        /// Never empty; sorted by class name.
        artifacts: Vec<BytecodeArtifact>,
        log: Vec<String>,
    },
    Failed {
        error: CompileError,
        log: Vec<String>,
    },
}

impl CompileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Compiled { .. })
    }

    pub fn artifacts(&self) -> &[BytecodeArtifact] {
        match self {
            Self::Compiled { artifacts, .. } => artifacts,
            Self::Failed { .. } => &[],
        }
    }

    pub fn error(&self) -> Option<&CompileError> {
        match self {
            Self::Compiled { .. } => None,
            Self::Failed { error, .. } => Some(error),
        }
    }

    pub fn log(&self) -> &[String] {
        match self {
            Self::Compiled { log, .. } | Self::Failed { log, .. } => log,
        }
    }

    pub fn into_result(self) -> Result<Vec<BytecodeArtifact>, CompileError> {
        match self {
            Self::Compiled { artifacts, .. } => Ok(artifacts),
            Self::Failed { error, .. } => Err(error),
        }
    }
}

/// A compiler Hotline can drive.
pub trait CompilerBackend: Send + Sync + 'static {
    /// Compile `units`, resolving dependencies through `provider` and
    /// emitting compiler output through `sink`.
    ///
    /// One unit may produce several artifacts (nested classes).
    fn compile<'a, P: ClassesProvider>(
        &'a self,
        provider: &'a P,
        units: &'a [SourceUnit],
        sink: &'a DiagnosticSink,
    ) -> impl Future<Output = Result<Vec<BytecodeArtifact>, CompileError>> + Send + 'a;
}

#[derive(Debug)]
pub struct CompilationPipeline<B> {
    backend: Arc<B>,
}

impl<B> Clone for CompilationPipeline<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

impl<B: CompilerBackend> CompilationPipeline<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Compile `units` on a worker task and report through `observer`.
    ///
    /// Never panics and never returns early without calling
    /// `on_compile_finished`.
    pub async fn compile<P>(
        &self,
        provider: Arc<P>,
        units: Vec<SourceUnit>,
        observer: &dyn CompileObserver,
    ) -> CompileOutcome
    where
        P: ClassesProvider + 'static,
    {
        let outcome = self.run(provider, units, observer).await;
        match &outcome {
            CompileOutcome::Compiled { artifacts, .. } => {
                tracing::info!(target: "hotline.compile", artifacts = artifacts.len(), "compilation finished");
            }
            CompileOutcome::Failed { error, .. } => {
                tracing::info!(target: "hotline.compile", error = %error, "compilation finished with errors");
            }
        }
        observer.on_compile_finished(&outcome);
        outcome
    }

    async fn run<P>(
        &self,
        provider: Arc<P>,
        units: Vec<SourceUnit>,
        observer: &dyn CompileObserver,
    ) -> CompileOutcome
    where
        P: ClassesProvider + 'static,
    {
        if units.is_empty() {
            return CompileOutcome::Failed {
                error: CompileError::InvalidInput("nothing to compile".into()),
                log: Vec::new(),
            };
        }

        let classes: Vec<_> = units.iter().map(|u| u.class.as_str()).collect();
        tracing::debug!(target: "hotline.compile", classes = ?classes, "compiling");

        let (sink, mut lines) = DiagnosticSink::channel();
        let backend = self.backend.clone();
        let mut task = tokio::spawn(async move {
            let result = backend.compile(&*provider, &units, &sink).await;
            drop(sink);
            result
        });

        let mut log = Vec::new();
        let joined = loop {
            tokio::select! {
                biased;
                Some(line) = lines.recv() => {
                    observer.on_diagnostic(&line);
                    log.push(line);
                }
                joined = &mut task => break joined,
            }
        };
        // The sink may have been cloned by the backend; drain what is left.
        while let Ok(line) = lines.try_recv() {
            observer.on_diagnostic(&line);
            log.push(line);
        }

        let result = match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => {
                let message = panic_payload_to_string(&*err.into_panic())
                    .unwrap_or_else(|| "<non-string panic payload>".into());
                tracing::error!(target: "hotline.compile", %message, "compiler backend panicked");
                Err(CompileError::Internal(format!("compiler panicked: {message}")))
            }
            Err(err) => Err(CompileError::Internal(err.to_string())),
        };

        match result {
            Ok(artifacts) if artifacts.is_empty() => CompileOutcome::Failed {
                error: CompileError::Failed {
                    message: "compiler produced no class files".into(),
                },
                log,
            },
            Ok(mut artifacts) => {
                artifacts.sort_by(|a, b| a.class.cmp(&b.class));
                CompileOutcome::Compiled { artifacts, log }
            }
            Err(error) => CompileOutcome::Failed { error, log },
        }
    }
}

/// Run [`CompilationPipeline::compile`] on its own task so the caller never
/// waits on the compiler.
pub fn spawn_compile<B, P>(
    pipeline: CompilationPipeline<B>,
    provider: Arc<P>,
    units: Vec<SourceUnit>,
    observer: Arc<dyn CompileObserver>,
) -> JoinHandle<CompileOutcome>
where
    B: CompilerBackend,
    P: ClassesProvider + 'static,
{
    tokio::spawn(async move { pipeline.compile(provider, units, &*observer).await })
}

fn panic_payload_to_string(payload: &(dyn Any + Send)) -> Option<String> {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return Some((*message).to_string());
    }
    payload.downcast_ref::<String>().cloned()
}
