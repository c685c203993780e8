use std::path::{Path, PathBuf};

use hotline_core::{BytecodeArtifact, ClassIdentifier, SourceUnit};
use thiserror::Error;

use crate::naming::NamingStrategy;
use crate::SOURCE_SUFFIX;

#[derive(Debug, Error)]
pub enum WriteError {
    /// `Custom` names exactly one file; several artifacts would overwrite
    /// each other.
    #[error("custom naming writes a single file, but {count} items were given")]
    AmbiguousTarget { count: usize },
}

/// What happened to one artifact of a batch.
#[derive(Debug)]
pub struct SaveResult {
    pub class: ClassIdentifier,
    pub path: PathBuf,
    pub error: Option<std::io::Error>,
}

impl SaveResult {
    pub fn is_saved(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    AllSaved,
    PartiallySaved,
    NoneSaved,
}

#[derive(Debug)]
pub struct SaveReport {
    pub saved: usize,
    pub total: usize,
    /// Path of the last artifact that was written successfully.
    pub last_path: Option<PathBuf>,
    /// One entry per input, in input order.
    pub results: Vec<SaveResult>,
}

impl SaveReport {
    pub fn outcome(&self) -> SaveOutcome {
        if self.saved == 0 {
            SaveOutcome::NoneSaved
        } else if self.saved == self.total {
            SaveOutcome::AllSaved
        } else {
            SaveOutcome::PartiallySaved
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &SaveResult> {
        self.results.iter().filter(|result| !result.is_saved())
    }

    /// One-line human summary, e.g. `Saved all 3 classes to /out/p/C.class`.
    pub fn status_line(&self) -> String {
        let last = self
            .last_path
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        match self.outcome() {
            SaveOutcome::AllSaved => format!("Saved all {} classes to {last}", self.total),
            SaveOutcome::PartiallySaved => format!(
                "Saved only {} from total of {} classes to {last}",
                self.saved, self.total
            ),
            SaveOutcome::NoneSaved if self.total == 0 => "Nothing to save".to_string(),
            SaveOutcome::NoneSaved => format!("Saved none of {} classes", self.total),
        }
    }
}

/// Write every artifact to the path `strategy` gives it under `base`.
///
/// Each artifact is written independently; an I/O failure is recorded in its
/// [`SaveResult`] and the batch continues. Parent directories are created as
/// needed.
pub fn write_artifacts(
    base: &Path,
    strategy: NamingStrategy,
    suffix: &str,
    artifacts: &[BytecodeArtifact],
) -> Result<SaveReport, WriteError> {
    write_batch(
        base,
        strategy,
        suffix,
        artifacts
            .iter()
            .map(|artifact| (&artifact.class, artifact.bytes.as_slice())),
    )
}

/// Like [`write_artifacts`], for source buffers with the `.java` suffix.
pub fn write_sources(
    base: &Path,
    strategy: NamingStrategy,
    units: &[SourceUnit],
) -> Result<SaveReport, WriteError> {
    write_batch(
        base,
        strategy,
        SOURCE_SUFFIX,
        units.iter().map(|unit| (&unit.class, unit.text.as_bytes())),
    )
}

fn write_batch<'a, I>(
    base: &Path,
    strategy: NamingStrategy,
    suffix: &str,
    items: I,
) -> Result<SaveReport, WriteError>
where
    I: ExactSizeIterator<Item = (&'a ClassIdentifier, &'a [u8])>,
{
    let total = items.len();
    if strategy == NamingStrategy::Custom && total > 1 {
        return Err(WriteError::AmbiguousTarget { count: total });
    }

    let mut report = SaveReport {
        saved: 0,
        total,
        last_path: None,
        results: Vec::with_capacity(total),
    };

    for (class, bytes) in items {
        let path = strategy.resolve(base, class, suffix);
        let error = write_one(&path, bytes).err();
        match &error {
            None => {
                tracing::debug!(target: "hotline.artifact", %class, path = %path.display(), "saved");
                report.saved += 1;
                report.last_path = Some(path.clone());
            }
            Some(err) => {
                tracing::warn!(
                    target: "hotline.artifact",
                    %class,
                    path = %path.display(),
                    error = %err,
                    "failed to save"
                );
            }
        }
        report.results.push(SaveResult {
            class: class.clone(),
            path,
            error,
        });
    }

    tracing::info!(
        target: "hotline.artifact",
        saved = report.saved,
        total = report.total,
        "{}",
        report.status_line()
    );
    Ok(report)
}

fn write_one(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}
