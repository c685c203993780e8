use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use hotline_core::ClassIdentifier;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a class name becomes a file path under a base.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingStrategy {
    /// `base/a.b.C<suffix>`
    #[default]
    FullyQualified,
    /// `base/a/b/C<suffix>`, the layout of a source or class-file tree.
    SrcSubdirs,
    /// `base` itself is the file. Only meaningful for a single artifact.
    Custom,
}

impl NamingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullyQualified => "fully-qualified",
            Self::SrcSubdirs => "src-subdirs",
            Self::Custom => "custom",
        }
    }

    /// Map `class` to its path. Pure: nothing is created on disk.
    pub fn resolve(self, base: &Path, class: &ClassIdentifier, suffix: &str) -> PathBuf {
        match self {
            Self::FullyQualified => base.join(format!("{class}{suffix}")),
            Self::SrcSubdirs => {
                base.join(format!("{}{suffix}", class.as_str().replace('.', "/")))
            }
            Self::Custom => base.to_path_buf(),
        }
    }
}

impl fmt::Display for NamingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown naming strategy `{0}` (expected fully-qualified, src-subdirs or custom)")]
pub struct ParseNamingStrategyError(String);

impl FromStr for NamingStrategy {
    type Err = ParseNamingStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fully-qualified" | "fq" => Ok(Self::FullyQualified),
            "src-subdirs" | "subdirs" => Ok(Self::SrcSubdirs),
            "custom" => Ok(Self::Custom),
            _ => Err(ParseNamingStrategyError(s.to_string())),
        }
    }
}
