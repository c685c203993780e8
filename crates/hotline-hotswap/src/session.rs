use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hotline_agent::{AgentChannel, ChannelError, FetchedClass};
use hotline_artifact::{
    write_artifacts, write_sources, NamingStrategy, SaveReport, WriteError, CLASS_SUFFIX,
};
use hotline_compile::{
    CompilationPipeline, CompileError, CompileOutcome, CompilerBackend, RuntimeClasspath,
};
use hotline_core::{BytecodeArtifact, ClassIdentifier, Endpoint, SourceUnit, TargetHandle};
use hotline_proto::ClassEntry;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::observer::SessionObserver;
use crate::report::HotSwapReport;
use crate::upload::{UploadAck, UploadError, UploadPipeline};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("worker task failed: {0}")]
    Worker(String),
}

/// Where `compile_and_save` puts class files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSettings {
    pub strategy: NamingStrategy,
    pub class_suffix: String,
}

impl Default for SaveSettings {
    fn default() -> Self {
        Self {
            strategy: NamingStrategy::default(),
            class_suffix: CLASS_SUFFIX.to_string(),
        }
    }
}

/// One operator session against one target.
///
/// Every operation is spawned onto the runtime and returns its
/// [`JoinHandle`] right away; results also reach the [`SessionObserver`].
/// A session on a filesystem-only target can compile and save, but every
/// agent operation fails with `Detached`.
pub struct Session<B> {
    target: TargetHandle,
    channel: AgentChannel,
    pipeline: CompilationPipeline<B>,
    uploads: Arc<UploadPipeline>,
    observer: Arc<dyn SessionObserver>,
    save: SaveSettings,
}

impl<B> Clone for Session<B> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            channel: self.channel.clone(),
            pipeline: self.pipeline.clone(),
            uploads: self.uploads.clone(),
            observer: self.observer.clone(),
            save: self.save.clone(),
        }
    }
}

impl<B: CompilerBackend> Session<B> {
    pub fn new(
        channel: AgentChannel,
        target: TargetHandle,
        pipeline: CompilationPipeline<B>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let uploads = Arc::new(UploadPipeline::new(
            channel.clone(),
            channel.config().request_timeout,
        ));
        Self {
            target,
            channel,
            pipeline,
            uploads,
            observer,
            save: SaveSettings::default(),
        }
    }

    pub fn with_save_settings(mut self, save: SaveSettings) -> Self {
        self.save = save;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.uploads = Arc::new(UploadPipeline::new(self.channel.clone(), timeout));
        self
    }

    pub fn target(&self) -> &TargetHandle {
        &self.target
    }

    pub fn channel(&self) -> &AgentChannel {
        &self.channel
    }

    pub fn save_settings(&self) -> &SaveSettings {
        &self.save
    }

    /// Bind the session to the agent at `endpoint`, or at the endpoint the
    /// target handle implies. A no-op for filesystem-only targets.
    pub async fn attach(&self, endpoint: Option<Endpoint>) -> Result<(), ChannelError> {
        if self.target.is_fs() {
            return Ok(());
        }
        let endpoint = endpoint
            .or_else(|| self.target.endpoint_hint())
            .ok_or_else(|| ChannelError::Detached(self.target.clone()))?;
        self.channel.attach(&self.target, endpoint).await
    }

    pub fn list_classes(&self) -> JoinHandle<Result<Arc<[ClassEntry]>, ChannelError>> {
        let (channel, target) = (self.channel.clone(), self.target.clone());
        tokio::spawn(async move { channel.list_classes(&target).await })
    }

    pub fn fetch_bytes(&self, class: ClassIdentifier) -> JoinHandle<Result<FetchedClass, ChannelError>> {
        let (channel, target) = (self.channel.clone(), self.target.clone());
        tokio::spawn(async move { channel.fetch_bytes(&target, &class).await })
    }

    pub fn init_class(&self, class: ClassIdentifier) -> JoinHandle<Result<(), ChannelError>> {
        let (channel, target) = (self.channel.clone(), self.target.clone());
        tokio::spawn(async move { channel.init_class(&target, &class).await })
    }

    /// Compile against the target's loaded classes.
    pub fn compile(&self, units: Vec<SourceUnit>) -> JoinHandle<CompileOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.run_compile(units).await })
    }

    /// Compile, then write the artifacts under `base` with the session's
    /// [`SaveSettings`].
    pub fn compile_and_save(
        &self,
        units: Vec<SourceUnit>,
        base: PathBuf,
    ) -> JoinHandle<Result<SaveReport, SessionError>> {
        let this = self.clone();
        tokio::spawn(async move {
            let artifacts = this.run_compile(units).await.into_result()?;
            let save = this.save.clone();
            this.run_save(artifacts.len(), move || {
                write_artifacts(&base, save.strategy, &save.class_suffix, &artifacts)
            })
            .await
        })
    }

    /// Write source buffers under `base` (suffix `.java`).
    pub fn save_sources(
        &self,
        units: Vec<SourceUnit>,
        base: PathBuf,
    ) -> JoinHandle<Result<SaveReport, SessionError>> {
        let this = self.clone();
        tokio::spawn(async move {
            let strategy = this.save.strategy;
            this.run_save(units.len(), move || write_sources(&base, strategy, &units))
                .await
        })
    }

    pub fn upload(
        &self,
        boot: bool,
        artifacts: Vec<BytecodeArtifact>,
    ) -> JoinHandle<Result<UploadAck, UploadError>> {
        let this = self.clone();
        tokio::spawn(async move { this.run_upload(boot, &artifacts).await })
    }

    /// Compile and redefine in one go.
    pub fn compile_and_upload(&self, units: Vec<SourceUnit>, boot: bool) -> JoinHandle<HotSwapReport> {
        let this = self.clone();
        tokio::spawn(async move {
            let classes: Vec<ClassIdentifier> = units.iter().map(|u| u.class.clone()).collect();
            let artifacts = match this.run_compile(units).await.into_result() {
                Ok(artifacts) => artifacts,
                Err(err) => return HotSwapReport::compile_failed(&classes, err.to_string()),
            };
            let result = this.run_upload(boot, &artifacts).await;
            let uploaded: Vec<ClassIdentifier> =
                artifacts.iter().map(|a| a.class.clone()).collect();
            HotSwapReport::from_upload(&uploaded, &result)
        })
    }

    /// Ask the agent to close its socket. The session is detached afterwards
    /// even if the agent never answers.
    pub fn halt(&self) -> JoinHandle<()> {
        let (channel, target) = (self.channel.clone(), self.target.clone());
        tokio::spawn(async move { channel.halt(&target).await })
    }

    async fn run_compile(&self, units: Vec<SourceUnit>) -> CompileOutcome {
        self.ensure_class_list().await;
        let provider = Arc::new(RuntimeClasspath::new(
            self.channel.clone(),
            self.target.clone(),
        ));
        self.pipeline
            .compile(provider, units, &*self.observer)
            .await
    }

    /// The compiler only sees classes the target has listed, so a target
    /// with no listing yet is asked for one first.
    async fn ensure_class_list(&self) {
        let target = &self.target;
        let status = self.channel.status();
        if target.is_fs() || !status.is_attached(target) || status.generation(target) > 0 {
            return;
        }
        if let Err(err) = self.channel.list_classes(target).await {
            tracing::warn!(
                target: "hotline.hotswap",
                %target,
                error = %err,
                "could not list loaded classes; compiling without them"
            );
        }
    }

    async fn run_save<F>(&self, total: usize, write: F) -> Result<SaveReport, SessionError>
    where
        F: FnOnce() -> Result<SaveReport, WriteError> + Send + 'static,
    {
        let result = match tokio::task::spawn_blocking(write).await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(err)) => Err(SessionError::Write(err)),
            Err(err) => Err(SessionError::Worker(err.to_string())),
        };
        match &result {
            Ok(report) => {
                self.observer
                    .on_save_finished(report.saved, report.total, report.last_path.as_deref());
            }
            Err(err) => {
                tracing::warn!(target: "hotline.hotswap", error = %err, "save failed");
                self.observer.on_save_finished(0, total, None);
            }
        }
        result
    }

    async fn run_upload(
        &self,
        boot: bool,
        artifacts: &[BytecodeArtifact],
    ) -> Result<UploadAck, UploadError> {
        let result = self.uploads.upload(&self.target, boot, artifacts).await;
        self.observer.on_upload_finished(&result);
        result
    }
}
