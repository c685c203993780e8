use std::collections::HashSet;
use std::io::{Cursor, Read, Write};

use hotline_core::{BytecodeArtifact, ClassIdentifier};
use thiserror::Error;

use crate::CLASS_SUFFIX;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("class {0} appears more than once in the batch")]
    DuplicateEntry(ClassIdentifier),
}

/// Pack `artifacts` into an in-memory jar, one `a/b/C.class` entry each.
///
/// Entries are stored in input order with a fixed timestamp, so the same
/// input always produces the same bytes. No manifest is added.
pub fn build_jar(artifacts: &[BytecodeArtifact]) -> Result<Vec<u8>, ArchiveError> {
    let mut seen = HashSet::with_capacity(artifacts.len());
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for artifact in artifacts {
        if !seen.insert(&artifact.class) {
            return Err(ArchiveError::DuplicateEntry(artifact.class.clone()));
        }
        zip.start_file(artifact.class.class_file_path(), options)?;
        zip.write_all(&artifact.bytes)?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

/// Every file entry of a jar, as `(entry name, contents)` in archive order.
pub fn read_entries(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>, ArchiveError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf)?;
        entries.push((entry.name().to_string(), buf));
    }
    Ok(entries)
}

/// `a/b/C.class` -> `a.b.C`. Returns `None` for anything that is not a class
/// file entry.
pub fn class_name_from_entry(entry: &str) -> Option<ClassIdentifier> {
    let internal = entry.strip_suffix(CLASS_SUFFIX)?;
    if internal.is_empty() || internal.ends_with('/') {
        return None;
    }
    Some(ClassIdentifier::from_internal(internal))
}
