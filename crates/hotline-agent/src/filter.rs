use hotline_proto::ClassEntry;
use regex::Regex;

/// Narrows a loaded-class listing by name and, optionally, by class loader.
#[derive(Clone, Debug)]
pub struct ClassFilter {
    name: Regex,
    loader: Option<Regex>,
}

impl ClassFilter {
    /// `pattern` is a regular expression searched anywhere in the class name.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: Regex::new(pattern)?,
            loader: None,
        })
    }

    /// Only keep classes whose loader name matches `pattern`. Classes with an
    /// unknown loader never match.
    pub fn with_loader(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.loader = Some(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn matches(&self, entry: &ClassEntry) -> bool {
        if !self.name.is_match(&entry.name) {
            return false;
        }
        match (&self.loader, &entry.loader) {
            (None, _) => true,
            (Some(pattern), Some(loader)) => pattern.is_match(loader),
            (Some(_), None) => false,
        }
    }

    pub fn apply<'a>(&self, entries: &'a [ClassEntry]) -> Vec<&'a ClassEntry> {
        entries.iter().filter(|entry| self.matches(entry)).collect()
    }
}
