//! Where compiled classes and sources end up: on disk through a
//! [`NamingStrategy`], or packed into an in-memory jar for upload.

mod archive;
mod naming;
mod writer;

pub use archive::{build_jar, class_name_from_entry, read_entries, ArchiveError};
pub use naming::{NamingStrategy, ParseNamingStrategyError};
pub use writer::{
    write_artifacts, write_sources, SaveOutcome, SaveReport, SaveResult, WriteError,
};

/// Suffix of compiled class files.
pub const CLASS_SUFFIX: &str = ".class";
/// Suffix of Java source files.
pub const SOURCE_SUFFIX: &str = ".java";
