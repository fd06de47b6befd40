//! Registry of extension packages referenced by bindings

use indexmap::IndexMap;
use serde::Serialize;

/// Latest declared version per extension name
///
/// Later writes overwrite earlier ones unconditionally; iteration follows
/// first-insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExtensionRegistry {
    entries: IndexMap<String, String>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `version` for `name`, returning the version it replaced
    pub fn upsert(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Option<String> {
        self.entries.insert(name.into(), version.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, version)| (name.as_str(), version.as_str()))
    }
}
