//! Hotline configuration, loaded from TOML.
//!
//! Every section and every field has a default, so an empty file (or no file
//! at all) is a valid configuration. Unknown keys are rejected.

mod logging;

use std::path::{Path, PathBuf};
use std::time::Duration;

use hotline_agent::ChannelConfig;
use hotline_artifact::{NamingStrategy, CLASS_SUFFIX};
use hotline_compile::JavacConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use logging::{init_tracing, LoggingConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid value for `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Toml(err.message().to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HotlineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub compile: CompileConfig,
    #[serde(default)]
    pub save: SaveConfig,
}

impl HotlineConfig {
    /// Read and validate the config file at `path`.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: HotlineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic checks serde cannot express. Reports the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, message: &str| {
            Err(ConfigError::Invalid {
                field,
                message: message.to_string(),
            })
        };

        if self.agent.host.trim().is_empty() {
            return invalid("agent.host", "must not be empty");
        }
        if self.agent.connect_timeout_ms == 0 {
            return invalid("agent.connect_timeout_ms", "must be greater than zero");
        }
        if self.agent.request_timeout_ms == 0 {
            return invalid("agent.request_timeout_ms", "must be greater than zero");
        }
        if self.agent.upload_timeout_ms == 0 {
            return invalid("agent.upload_timeout_ms", "must be greater than zero");
        }
        if self.compile.javac.trim().is_empty() {
            return invalid("compile.javac", "must not be empty");
        }
        if self.compile.timeout_secs == 0 {
            return invalid("compile.timeout_secs", "must be greater than zero");
        }
        if self.save.class_suffix.is_empty() {
            return invalid("save.class_suffix", "must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Host used when a target is given by port only.
    #[serde(default = "AgentConfig::default_host")]
    pub host: String,
    #[serde(default = "AgentConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "AgentConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Redefinition can take much longer than a listing.
    #[serde(default = "AgentConfig::default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,
}

impl AgentConfig {
    fn default_host() -> String {
        "127.0.0.1".to_owned()
    }

    fn default_connect_timeout_ms() -> u64 {
        5_000
    }

    fn default_request_timeout_ms() -> u64 {
        10_000
    }

    fn default_upload_timeout_ms() -> u64 {
        30_000
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            request_timeout_ms: Self::default_request_timeout_ms(),
            upload_timeout_ms: Self::default_upload_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompileConfig {
    /// `javac` executable; looked up on `PATH` unless absolute.
    #[serde(default = "CompileConfig::default_javac")]
    pub javac: String,
    /// Passed as `--release`.
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "CompileConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl CompileConfig {
    fn default_javac() -> String {
        "javac".to_owned()
    }

    fn default_timeout_secs() -> u64 {
        60
    }

    pub fn javac_config(&self) -> JavacConfig {
        JavacConfig {
            javac: self.javac.clone(),
            release: self.release.clone(),
            extra_args: self.extra_args.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            scratch_root: self.scratch_dir.clone(),
        }
    }
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            javac: Self::default_javac(),
            release: None,
            extra_args: Vec::new(),
            timeout_secs: Self::default_timeout_secs(),
            scratch_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveConfig {
    #[serde(default)]
    pub naming: NamingStrategy,
    #[serde(default = "SaveConfig::default_class_suffix")]
    pub class_suffix: String,
    /// Used when no output path is given on the command line.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl SaveConfig {
    fn default_class_suffix() -> String {
        CLASS_SUFFIX.to_owned()
    }
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            naming: NamingStrategy::default(),
            class_suffix: Self::default_class_suffix(),
            output_dir: None,
        }
    }
}
