use std::fmt;

use hotline_core::ClassIdentifier;
use serde::{Deserialize, Serialize};

use crate::upload::{UploadAck, UploadError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HotSwapStatus {
    Success,
    CompileError,
    RedefinitionError,
    /// The agent could not be reached or answered garbage.
    AgentUnavailable,
}

impl HotSwapStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::CompileError => "compile_error",
            Self::RedefinitionError => "redefinition_error",
            Self::AgentUnavailable => "agent_unavailable",
        }
    }
}

impl fmt::Display for HotSwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HotSwapClassResult {
    pub class_name: String,
    pub status: HotSwapStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of one compile-and-upload round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HotSwapReport {
    pub status: HotSwapStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub classes: Vec<HotSwapClassResult>,
}

impl HotSwapReport {
    pub fn compile_failed(units: &[ClassIdentifier], message: String) -> Self {
        Self {
            status: HotSwapStatus::CompileError,
            classes: units
                .iter()
                .map(|class| HotSwapClassResult {
                    class_name: class.to_string(),
                    status: HotSwapStatus::CompileError,
                    message: None,
                })
                .collect(),
            message: Some(message),
        }
    }

    pub fn from_upload(classes: &[ClassIdentifier], result: &Result<UploadAck, UploadError>) -> Self {
        let (status, message) = match result {
            Ok(ack) => (HotSwapStatus::Success, ack.message.clone()),
            Err(
                err @ (UploadError::RedefinitionRejected { .. }
                | UploadError::EmptyBatch
                | UploadError::Archive(_)),
            ) => (HotSwapStatus::RedefinitionError, Some(err.to_string())),
            Err(err) => (HotSwapStatus::AgentUnavailable, Some(err.to_string())),
        };
        Self {
            status,
            message,
            classes: classes
                .iter()
                .map(|class| HotSwapClassResult {
                    class_name: class.to_string(),
                    status,
                    message: None,
                })
                .collect(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == HotSwapStatus::Success
    }
}
