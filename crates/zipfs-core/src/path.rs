//! Rooted virtual paths.
//!
//! Every path starts with `/`. Directory paths keep a trailing `/`, file
//! paths have none, and the root `/` counts as a directory. The trailing
//! separator is load-bearing: `/archive` and `/archive/` name different
//! kinds of entities and never compare equal.

use std::fmt;

use crate::{Error, Result};

/// Separator used by all virtual paths.
pub const SEPARATOR: char = '/';

/// A rooted, `/`-separated virtual path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VfsPath(String);

impl VfsPath {
    /// The root directory path `/`.
    pub fn root() -> Self {
        VfsPath(String::from("/"))
    }

    /// Parses a path string.
    ///
    /// The string must start with `/` and contain no empty segments.
    pub fn parse(s: &str) -> Result<Self> {
        if !s.starts_with(SEPARATOR) {
            return Err(Error::InvalidPath(format!("{s:?} is not rooted")));
        }
        if s.contains("//") {
            return Err(Error::InvalidPath(format!(
                "{s:?} contains an empty segment"
            )));
        }
        Ok(VfsPath(s.to_string()))
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the root directory.
    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Whether this path names a directory (trailing separator).
    pub fn is_directory(&self) -> bool {
        self.0.ends_with(SEPARATOR)
    }

    /// Whether this path names a file.
    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    /// The last segment of the path, without any trailing separator.
    ///
    /// The root has no entity name.
    pub fn entity_name(&self) -> Option<&str> {
        let trimmed = self.0.trim_end_matches(SEPARATOR);
        let idx = trimmed.rfind(SEPARATOR)?;
        Some(&trimmed[idx + 1..])
    }

    /// The parent directory, or `None` for the root.
    pub fn parent(&self) -> Option<VfsPath> {
        if self.is_root() {
            return None;
        }
        let trimmed = self.0.trim_end_matches(SEPARATOR);
        let idx = trimmed.rfind(SEPARATOR)?;
        Some(VfsPath(self.0[..=idx].to_string()))
    }

    /// Appends a file name to this directory path.
    pub fn append_file(&self, name: &str) -> Result<VfsPath> {
        self.append(name)?;
        Ok(VfsPath(format!("{}{}", self.0, name)))
    }

    /// Appends a directory name to this directory path.
    pub fn append_directory(&self, name: &str) -> Result<VfsPath> {
        self.append(name)?;
        Ok(VfsPath(format!("{}{}{}", self.0, name, SEPARATOR)))
    }

    fn append(&self, name: &str) -> Result<()> {
        if !self.is_directory() {
            return Err(Error::NotADirectory(self.0.clone()));
        }
        if name.is_empty() || name.contains(SEPARATOR) {
            return Err(Error::InvalidPath(format!("{name:?} is not a valid name")));
        }
        Ok(())
    }

    /// Whether this directory is a proper ancestor of `other`.
    ///
    /// A path is never its own parent.
    pub fn is_parent_of(&self, other: &VfsPath) -> bool {
        self.is_directory() && other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    /// Whether this path lies strictly below `other`.
    pub fn is_child_of(&self, other: &VfsPath) -> bool {
        other.is_parent_of(self)
    }

    /// The immediate child of `directory` on the way to this path.
    ///
    /// Direct children map to themselves; deeper descendants map to their
    /// first-level directory under `directory`. Paths outside `directory`
    /// (including `directory` itself) map to `None`.
    pub fn immediate_child_of(&self, directory: &VfsPath) -> Option<VfsPath> {
        if !directory.is_parent_of(self) {
            return None;
        }
        let suffix = &self.0[directory.0.len()..];
        match suffix.find(SEPARATOR) {
            None => Some(self.clone()),
            Some(idx) if idx + 1 == suffix.len() => Some(self.clone()),
            Some(idx) => Some(VfsPath(format!("{}{}", directory.0, &suffix[..=idx]))),
        }
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VfsPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> VfsPath {
        VfsPath::parse(s).unwrap()
    }

    #[test]
    fn parse_requires_rooted_paths() {
        assert!(VfsPath::parse("relative/file.txt").is_err());
        assert!(VfsPath::parse("").is_err());
        assert!(VfsPath::parse("/a//b").is_err());
        assert!(VfsPath::parse("/").is_ok());
    }

    #[test]
    fn trailing_separator_distinguishes_directories() {
        assert!(p("/a/").is_directory());
        assert!(p("/a").is_file());
        assert!(VfsPath::root().is_directory());
        assert!(VfsPath::root().is_root());
        assert_ne!(p("/a"), p("/a/"));
    }

    #[test]
    fn entity_name_is_the_last_segment() {
        assert_eq!(p("/a/b.txt").entity_name(), Some("b.txt"));
        assert_eq!(p("/a/b/").entity_name(), Some("b"));
        assert_eq!(p("/a").entity_name(), Some("a"));
        assert_eq!(VfsPath::root().entity_name(), None);
    }

    #[test]
    fn parent_walks_up_one_level() {
        assert_eq!(p("/a/b.txt").parent(), Some(p("/a/")));
        assert_eq!(p("/a/b/").parent(), Some(p("/a/")));
        assert_eq!(p("/a.txt").parent(), Some(VfsPath::root()));
        assert_eq!(VfsPath::root().parent(), None);
    }

    #[test]
    fn append_builds_children() {
        let dir = p("/docs/");
        assert_eq!(dir.append_file("readme.txt").unwrap(), p("/docs/readme.txt"));
        assert_eq!(dir.append_directory("img").unwrap(), p("/docs/img/"));
    }

    #[test]
    fn append_rejects_bad_input() {
        assert!(p("/file.txt").append_file("x").is_err());
        assert!(p("/docs/").append_file("a/b").is_err());
        assert!(p("/docs/").append_directory("").is_err());
    }

    #[test]
    fn parenthood_is_proper() {
        let root = VfsPath::root();
        assert!(root.is_parent_of(&p("/a")));
        assert!(root.is_parent_of(&p("/a/b/c")));
        assert!(p("/a/").is_parent_of(&p("/a/b")));
        assert!(!p("/a/").is_parent_of(&p("/a/")));
        assert!(!p("/a/").is_parent_of(&p("/ab")));
        assert!(!p("/a").is_parent_of(&p("/a/b")));
        assert!(p("/a/b").is_child_of(&p("/a/")));
    }

    #[test]
    fn immediate_child_groups_descendants() {
        let root = VfsPath::root();
        assert_eq!(p("/a.txt").immediate_child_of(&root), Some(p("/a.txt")));
        assert_eq!(p("/dir/").immediate_child_of(&root), Some(p("/dir/")));
        assert_eq!(p("/dir/deep/x").immediate_child_of(&root), Some(p("/dir/")));
        assert_eq!(
            p("/dir/deep/x").immediate_child_of(&p("/dir/")),
            Some(p("/dir/deep/"))
        );
        assert_eq!(p("/dir/").immediate_child_of(&p("/dir/")), None);
        assert_eq!(p("/other").immediate_child_of(&p("/dir/")), None);
    }
}
