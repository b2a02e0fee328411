use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

use crate::path::{join, split, ROOT_SENTINEL};

/// An ordered sequence of path segments. When the first segment is the empty root sentinel the
/// sequence is anchored at the root, otherwise it is relative to whatever it gets resolved
/// against.
///
/// No normalization happens on construction, control segments (`.` and `..`) and empty segments
/// are carried as given until they pass through [`crate::path::normalize`] or
/// [`crate::path::resolve`].
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Segments(Vec<String>);

impl Segments {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// The single element `["."]` sequence, what resolution falls back to when nothing is left.
    pub fn current() -> Self {
        Self(vec![".".to_string()])
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self.0.first(), Some(first) if first == ROOT_SENTINEL)
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1 && self.is_absolute()
    }

    /// The final named segment of an absolute path, `None` for the root itself.
    pub fn leaf(&self) -> Option<&str> {
        match self.0.split_last() {
            Some((_, [])) if self.is_absolute() => None,
            Some((last, _)) => Some(last.as_str()),
            None => None,
        }
    }

    /// Everything but the final segment. The parent of the root is the root.
    pub fn parent(&self) -> Self {
        if self.is_root() || self.0.is_empty() {
            return self.clone();
        }

        Self(self.0[..self.0.len() - 1].to_vec())
    }

    pub fn root() -> Self {
        Self(vec![ROOT_SENTINEL.to_string()])
    }

    /// Element-wise prefix test, true when `self` is equal to or a descendant of `prefix`.
    pub fn starts_with(&self, prefix: &Segments) -> bool {
        prefix.0.len() <= self.0.len() && self.0.iter().zip(prefix.0.iter()).all(|(a, b)| a == b)
    }
}

impl Deref for Segments {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Segments {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&join(&self.0))
    }
}

impl From<&str> for Segments {
    fn from(path: &str) -> Self {
        split(path)
    }
}

impl From<String> for Segments {
    fn from(path: String) -> Self {
        split(&path)
    }
}

impl From<&String> for Segments {
    fn from(path: &String) -> Self {
        split(path)
    }
}

impl From<&Segments> for Segments {
    fn from(segments: &Segments) -> Self {
        segments.clone()
    }
}

impl From<Vec<String>> for Segments {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<Vec<&str>> for Segments {
    fn from(segments: Vec<&str>) -> Self {
        Self(segments.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for Segments {
    fn from(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&[String]> for Segments {
    fn from(segments: &[String]) -> Self {
        Self(segments.to_vec())
    }
}

impl<const N: usize> From<[&str; N]> for Segments {
    fn from(segments: [&str; N]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Segments> for Vec<String> {
    fn from(segments: Segments) -> Self {
        segments.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_and_parent() {
        let path = Segments::from("/notes/todo.txt");
        assert_eq!(path.leaf(), Some("todo.txt"));
        assert_eq!(path.parent(), Segments::from("/notes"));

        let root = Segments::root();
        assert_eq!(root.leaf(), None);
        assert_eq!(root.parent(), root);

        assert_eq!(Segments::from(["a"]).leaf(), Some("a"));
    }

    #[test]
    fn test_prefix_matching() {
        let cwd = Segments::from("/projects");

        assert!(Segments::from("/projects").starts_with(&cwd));
        assert!(Segments::from("/projects/dirnav/src").starts_with(&cwd));
        assert!(!Segments::from("/notes/todo.txt").starts_with(&cwd));
        assert!(!Segments::from("/projects-old").starts_with(&cwd));
        assert!(!Segments::root().starts_with(&cwd));
        assert!(cwd.starts_with(&Segments::root()));
    }

    #[test]
    fn test_absolute_detection() {
        assert!(Segments::root().is_absolute());
        assert!(Segments::root().is_root());
        assert!(Segments::from("/a").is_absolute());
        assert!(!Segments::from("/a").is_root());
        assert!(!Segments::from("a/b").is_absolute());
        assert!(!Segments::default().is_absolute());
    }
}
