//! Core data types shared by every Hotline crate.
//!
//! Everything in here is plain data: class identifiers, the handle of the
//! process we are attached to, source buffers and compiled artifacts. The
//! protocol, compilation and upload crates build on these types without
//! depending on each other.

mod class_id;
mod target;
mod unit;

pub use class_id::ClassIdentifier;
pub use target::{Endpoint, TargetHandle, TargetKind};
pub use unit::{BytecodeArtifact, ClassloaderScope, SourceUnit};

/// Class name prefixes served by the compiler's own platform classes.
///
/// Classes in these packages are never materialized from the target; javac
/// already has them and fetching them would only duplicate the JDK.
pub const PLATFORM_PACKAGE_PREFIXES: &[&str] = &["java.", "javax.", "jdk.", "sun.", "com.sun."];

/// Returns `true` if `class` belongs to the platform (JDK) namespace.
pub fn is_platform_class(class: &str) -> bool {
    PLATFORM_PACKAGE_PREFIXES
        .iter()
        .any(|prefix| class.starts_with(prefix))
}
