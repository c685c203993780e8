use std::path::Path;
use std::sync::OnceLock;

use hotline_core::{ClassIdentifier, SourceUnit};
use regex::Regex;

fn package_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*package\s+([A-Za-z_$][\w$]*(?:\s*\.\s*[A-Za-z_$][\w$]*)*)\s*;")
            .expect("valid regex")
    })
}

/// Fully qualified name of the class declared by `text`, given its simple
/// name (usually the file stem).
pub fn class_from_source(text: &str, simple_name: &str) -> ClassIdentifier {
    match package_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
    {
        Some(package) => {
            let package: String = package
                .as_str()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            ClassIdentifier::new(format!("{package}.{simple_name}"))
        }
        None => ClassIdentifier::new(simple_name),
    }
}

/// Read a `.java` file into a [`SourceUnit`] named after its package
/// declaration and file stem.
pub fn load_java_source(path: &Path) -> std::io::Result<SourceUnit> {
    let text = std::fs::read_to_string(path)?;
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no usable file name", path.display()),
            )
        })?;
    let class = class_from_source(&text, stem);
    Ok(SourceUnit::new(class, text).with_origin(path))
}
