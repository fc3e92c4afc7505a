//! The set of files published to a repository.

use std::collections::BTreeMap;

/// Relative path -> content, iterated in path order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    files: BTreeMap<String, Vec<u8>>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), content.into());
    }

    /// Overlay `other` on top of this set (other wins on a clash)
    pub fn extend(&mut self, other: FileSet) {
        self.files.extend(other.files);
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Total content size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.files.values().map(|v| v.len() as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_overrides() {
        let mut base = FileSet::new();
        base.insert("index.html", "rendered");
        base.insert("README.md", "readme");

        let mut overlay = FileSet::new();
        overlay.insert("index.html", "attachment");

        base.extend(overlay);
        assert_eq!(base.len(), 2);
        assert_eq!(base.get("index.html"), Some(&b"attachment"[..]));
        assert_eq!(base.paths().collect::<Vec<_>>(), vec!["README.md", "index.html"]);
    }
}
