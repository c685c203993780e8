use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ClassIdentifier;

/// One source buffer to compile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceUnit {
    pub class: ClassIdentifier,
    pub text: String,
    /// Where the buffer came from, if it was read from disk.
    pub origin: Option<PathBuf>,
}

impl SourceUnit {
    pub fn new(class: impl Into<ClassIdentifier>, text: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            text: text.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// A compiled class, the unit of persistence and upload.
#[derive(Clone, PartialEq, Eq)]
pub struct BytecodeArtifact {
    pub class: ClassIdentifier,
    pub bytes: Vec<u8>,
}

impl BytecodeArtifact {
    pub fn new(class: impl Into<ClassIdentifier>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            class: class.into(),
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for BytecodeArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BytecodeArtifact")
            .field("class", &self.class)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Class loading domain an upload targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassloaderScope {
    Boot,
    #[default]
    App,
}

impl ClassloaderScope {
    pub fn from_boot(boot: bool) -> Self {
        if boot {
            Self::Boot
        } else {
            Self::App
        }
    }

    /// Payload name prefix understood by the agent.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::App => "app",
        }
    }
}

impl fmt::Display for ClassloaderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}
