use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Fully-qualified binary class name, e.g. `com.example.Foo$Bar`.
///
/// This is the key used everywhere a class is addressed: in source units,
/// compiled artifacts, agent requests and upload payload names.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassIdentifier(String);

impl ClassIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Build an identifier from a JVM internal name (`com/example/Foo`).
    pub fn from_internal(internal: &str) -> Self {
        Self(internal.replace('/', "."))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Package part of the name, or `None` for the default package.
    pub fn package(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(package, _)| package)
    }

    /// Name without the package, nested parts included (`Foo$Bar`).
    pub fn simple_name(&self) -> &str {
        match self.0.rsplit_once('.') {
            Some((_, simple)) => simple,
            None => &self.0,
        }
    }

    /// JVM internal form, `com/example/Foo$Bar`.
    pub fn internal_name(&self) -> String {
        self.0.replace('.', "/")
    }

    /// Relative path of the class file inside a class directory or jar.
    pub fn class_file_path(&self) -> String {
        format!("{}.class", self.internal_name())
    }

    /// `true` for nested, inner, local and anonymous classes.
    pub fn is_nested(&self) -> bool {
        self.simple_name().contains('$')
    }

    /// The top-level class that encloses this one. Returns `self` for
    /// top-level classes.
    pub fn top_level(&self) -> ClassIdentifier {
        let simple = self.simple_name();
        match simple.find('$') {
            Some(idx) => {
                let start = self.0.len() - simple.len();
                ClassIdentifier(self.0[..start + idx].to_string())
            }
            None => self.clone(),
        }
    }
}

impl fmt::Display for ClassIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassIdentifier {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClassIdentifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ClassIdentifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ClassIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
