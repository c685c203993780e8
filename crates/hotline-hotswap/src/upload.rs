use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hotline_agent::{AgentChannel, AgentReply, ChannelError};
use hotline_artifact::{build_jar, CLASS_SUFFIX};
use hotline_core::{BytecodeArtifact, ClassIdentifier, ClassloaderScope, Endpoint, TargetHandle};
use hotline_proto::{encode_body, AgentCommand};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("nothing to upload")]
    EmptyBatch,
    #[error("connection to agent at {endpoint} refused")]
    ConnectionRefused { endpoint: Endpoint },
    #[error("agent did not acknowledge the upload within {after:?}")]
    Timeout { after: Duration },
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),
    #[error("target {0} is not attached to an agent")]
    Detached(TargetHandle),
    /// The agent refused the new definition; the message is the agent's own.
    #[error("redefinition rejected: {message}")]
    RedefinitionRejected { message: String },
    #[error("failed to package classes: {0}")]
    Archive(String),
    #[error("agent connection failed: {0}")]
    Transport(String),
}

impl From<ChannelError> for UploadError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::ConnectionRefused { endpoint } => Self::ConnectionRefused { endpoint },
            ChannelError::Timeout { after, .. } => Self::Timeout { after },
            ChannelError::ProtocolMismatch(message) => Self::ProtocolMismatch(message),
            ChannelError::Detached(target) => Self::Detached(target),
            ChannelError::Agent { message, .. } => Self::RedefinitionRejected { message },
            other @ (ChannelError::ConnectionClosed | ChannelError::Io(_)) => {
                Self::Transport(other.to_string())
            }
        }
    }
}

/// What the agent accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadAck {
    /// Name the payload was sent under (`app/a.b.C.class`, `boot/hotline-0-classes.jar`).
    pub name: String,
    pub classes: Vec<ClassIdentifier>,
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One transmission: a single class file, or a jar holding several.
#[derive(Clone, PartialEq, Eq)]
pub enum UploadPayload {
    Class { name: String, bytes: Vec<u8> },
    Archive { name: String, bytes: Vec<u8> },
}

impl std::fmt::Debug for UploadPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, name, len) = match self {
            Self::Class { name, bytes } => ("Class", name, bytes.len()),
            Self::Archive { name, bytes } => ("Archive", name, bytes.len()),
        };
        f.debug_struct(kind)
            .field("name", name)
            .field("len", &len)
            .finish()
    }
}

impl UploadPayload {
    /// Package `artifacts` for `scope`. `archive_seq` numbers the jar name
    /// when more than one class is sent.
    pub fn build(
        scope: ClassloaderScope,
        artifacts: &[BytecodeArtifact],
        archive_seq: u64,
    ) -> Result<Self, UploadError> {
        match artifacts {
            [] => Err(UploadError::EmptyBatch),
            [single] => Ok(Self::Class {
                name: format!("{}/{}{CLASS_SUFFIX}", scope.prefix(), single.class),
                bytes: single.bytes.clone(),
            }),
            many => {
                let bytes =
                    build_jar(many).map_err(|err| UploadError::Archive(err.to_string()))?;
                Ok(Self::Archive {
                    name: format!("{}/hotline-{archive_seq}-classes.jar", scope.prefix()),
                    bytes,
                })
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Class { name, .. } | Self::Archive { name, .. } => name,
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Archive { .. })
    }

    pub fn into_command(self) -> AgentCommand {
        match self {
            Self::Class { name, bytes } => AgentCommand::UploadClass {
                name,
                body: encode_body(&bytes),
            },
            Self::Archive { name, bytes } => AgentCommand::UploadArchive {
                name,
                body: encode_body(&bytes),
            },
        }
    }
}

/// Sends compiled classes to the agent for redefinition.
///
/// The agent's acknowledgement is the only success signal; no bytecode
/// verification happens on this side.
#[derive(Debug)]
pub struct UploadPipeline {
    channel: AgentChannel,
    timeout: Duration,
    next_archive: AtomicU64,
}

impl UploadPipeline {
    pub fn new(channel: AgentChannel, timeout: Duration) -> Self {
        Self {
            channel,
            timeout,
            next_archive: AtomicU64::new(0),
        }
    }

    pub async fn upload(
        &self,
        target: &TargetHandle,
        boot: bool,
        artifacts: &[BytecodeArtifact],
    ) -> Result<UploadAck, UploadError> {
        if artifacts.is_empty() {
            return Err(UploadError::EmptyBatch);
        }
        let scope = ClassloaderScope::from_boot(boot);
        let seq = if artifacts.len() > 1 {
            self.next_archive.fetch_add(1, Ordering::Relaxed)
        } else {
            0
        };
        let payload = UploadPayload::build(scope, artifacts, seq)?;
        let name = payload.name().to_string();
        let archived = payload.is_archive();

        tracing::info!(
            target: "hotline.hotswap",
            %target,
            %scope,
            name = %name,
            classes = artifacts.len(),
            "uploading classes"
        );

        let reply = self
            .channel
            .send(target, payload.into_command(), self.timeout)
            .await
            .map_err(|err| {
                let err = UploadError::from(err);
                tracing::warn!(target: "hotline.hotswap", %target, name = %name, error = %err, "upload failed");
                err
            })?;

        match reply {
            AgentReply::Ack { message } => Ok(UploadAck {
                name,
                classes: artifacts.iter().map(|a| a.class.clone()).collect(),
                archived,
                message,
            }),
            other => Err(UploadError::ProtocolMismatch(format!(
                "unexpected reply to upload: {other:?}"
            ))),
        }
    }
}
