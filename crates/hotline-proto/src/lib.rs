//! Request/response schema spoken between Hotline and the in-process agent.
//!
//! Every message travels as one frame (see [`codec`]). Requests are a closed
//! set of commands, each carrying its own typed payload; responses echo the
//! request id and action so the client can reject replies that do not belong
//! to the outstanding request.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod codec;

pub use codec::{
    decode_body, decode_frame, encode_body, encode_frame, read_frame, write_frame, CodecError,
};

/// Maximum size of a single frame payload (not including the 4-byte length
/// prefix). Uploaded archives are base64-encoded inside a frame, so this also
/// bounds upload size.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024; // 64 MiB

pub type RequestId = u64;

/// One request to the agent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentRequest {
    pub id: RequestId,
    /// Listen host of the agent the request is addressed to.
    pub host: String,
    /// Listen port of the agent the request is addressed to.
    pub port: u16,
    #[serde(flatten)]
    pub command: AgentCommand,
}

/// The closed set of things the agent can be asked to do.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentCommand {
    /// Enumerate every loaded class.
    ListClasses,
    /// Fetch the current bytecode of one loaded class.
    FetchBytes { class: String },
    /// Close the agent's socket; the session ends.
    Halt,
    /// Load and initialize a class so it becomes visible to later requests.
    InitClass { class: String },
    /// Redefine (or define) one class. `name` is `<scope>/<fqn>.class`.
    UploadClass { name: String, body: String },
    /// Redefine a batch of classes packed in one jar. `name` is
    /// `<scope>/<archive>.jar`.
    UploadArchive { name: String, body: String },
}

impl AgentCommand {
    pub fn action(&self) -> Action {
        match self {
            Self::ListClasses => Action::ListClasses,
            Self::FetchBytes { .. } => Action::FetchBytes,
            Self::Halt => Action::Halt,
            Self::InitClass { .. } => Action::InitClass,
            Self::UploadClass { .. } => Action::UploadClass,
            Self::UploadArchive { .. } => Action::UploadArchive,
        }
    }
}

impl fmt::Debug for AgentCommand {
    // Bodies can be megabytes of base64; keep them out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListClasses => f.write_str("ListClasses"),
            Self::FetchBytes { class } => f.debug_struct("FetchBytes").field("class", class).finish(),
            Self::Halt => f.write_str("Halt"),
            Self::InitClass { class } => f.debug_struct("InitClass").field("class", class).finish(),
            Self::UploadClass { name, body } => f
                .debug_struct("UploadClass")
                .field("name", name)
                .field("body_len", &body.len())
                .finish(),
            Self::UploadArchive { name, body } => f
                .debug_struct("UploadArchive")
                .field("name", name)
                .field("body_len", &body.len())
                .finish(),
        }
    }
}

/// Payload-free discriminant of [`AgentCommand`], echoed by responses.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ListClasses,
    FetchBytes,
    Halt,
    InitClass,
    UploadClass,
    UploadArchive,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListClasses => "list_classes",
            Self::FetchBytes => "fetch_bytes",
            Self::Halt => "halt",
            Self::InitClass => "init_class",
            Self::UploadClass => "upload_class",
            Self::UploadArchive => "upload_archive",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// A loaded class as reported by the agent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassEntry {
    pub name: String,
    /// Code source the class was loaded from, if the agent knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Name of the defining class loader, if the agent knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader: Option<String>,
}

impl ClassEntry {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
            loader: None,
        }
    }
}

/// One response from the agent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentResponse {
    pub id: RequestId,
    pub action: Action,
    pub status: ResponseStatus,
    /// Populated for `list_classes`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<ClassEntry>>,
    /// Echo of the requested class for `fetch_bytes`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Base64-encoded bytecode for `fetch_bytes`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AgentResponse {
    pub fn ok(id: RequestId, action: Action) -> Self {
        Self {
            id,
            action,
            status: ResponseStatus::Ok,
            classes: None,
            class: None,
            body: None,
            message: None,
        }
    }

    pub fn error(id: RequestId, action: Action, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            ..Self::ok(id, action)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}
