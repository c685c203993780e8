use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Once};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit one JSON object per event.
    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to this file as well. If it cannot be opened, file
    /// logging is skipped and the other sinks stay active.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    /// `level` as filter directives. Bare level names are matched without
    /// case and `warning` is accepted for `warn`.
    fn directives(&self) -> String {
        let level = self.level.trim();
        match level.to_ascii_lowercase().as_str() {
            "" => Self::default_level(),
            "warning" => "warn".to_owned(),
            name @ ("trace" | "debug" | "info" | "warn" | "error" | "off") => name.to_owned(),
            _ => level.to_owned(),
        }
    }

    /// The effective filter: `RUST_LOG`, when set, adds directives after the
    /// configured ones. A directive string that does not parse falls back to
    /// `info`.
    pub fn env_filter(&self) -> EnvFilter {
        let from_env = std::env::var("RUST_LOG").ok();
        Self::filter_from(self.directives(), from_env.as_deref())
    }

    fn filter_from(configured: String, from_env: Option<&str>) -> EnvFilter {
        let mut parts = vec![configured];
        parts.extend(
            from_env
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_owned),
        );
        EnvFilter::try_new(parts.join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

struct FileMakeWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = FileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        FileWriter {
            guard: self.file.lock(),
        }
    }
}

struct FileWriter<'a> {
    guard: MutexGuard<'a, std::fs::File>,
}

impl Write for FileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}

static TRACING_INIT: Once = Once::new();

/// Install the global `tracing` subscriber.
///
/// Safe to call more than once; only the first call has an effect.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();

        let file = config.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        let file_failed = config.file.is_some() && file.is_none();

        let mut make_writer = if config.stderr {
            BoxMakeWriter::new(io::stderr)
        } else {
            BoxMakeWriter::new(io::sink)
        };
        if let Some(file) = file {
            make_writer = BoxMakeWriter::new(make_writer.and(FileMakeWriter {
                file: Arc::new(Mutex::new(file)),
            }));
        }

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() && file_failed {
            if let Some(path) = config.file.as_ref() {
                tracing::warn!(
                    target: "hotline.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
}
