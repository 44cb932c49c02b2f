//! Document Paths and Layout
//!
//! Slash-separated paths into the store, plus the logical layout:
//!
//! ```text
//! {root}/tournaments/{code}                    tournament document
//! {root}/tournaments/{code}/matches/{match_id} match documents
//! ```

use std::fmt;

use serde::{Serialize, Deserialize};

use crate::tournament::code::GameCode;
use crate::tournament::state::MatchId;

/// Normalized document or collection path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentPath(String);

impl DocumentPath {
    /// Build a path, dropping empty segments.
    pub fn new(path: &str) -> Self {
        let normalized = path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(normalized)
    }

    /// Append a segment.
    pub fn child(&self, segment: &str) -> Self {
        if self.0.is_empty() {
            Self::new(segment)
        } else {
            Self::new(&format!("{}/{}", self.0, segment))
        }
    }

    /// Path without its last segment.
    pub fn parent(&self) -> Option<Self> {
        self.0.rfind('/').map(|idx| Self(self.0[..idx].to_string()))
    }

    /// Last segment.
    pub fn leaf(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Check if `self` is `prefix` or lies beneath it.
    pub fn starts_with(&self, prefix: &DocumentPath) -> bool {
        prefix.0.is_empty()
            || self.0 == prefix.0
            || (self.0.starts_with(&prefix.0) && self.0.as_bytes().get(prefix.0.len()) == Some(&b'/'))
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where tournament documents live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    root: DocumentPath,
}

impl Layout {
    /// Layout under a root collection prefix.
    pub fn new(root: &str) -> Self {
        Self { root: DocumentPath::new(root) }
    }

    /// Collection holding every tournament.
    pub fn tournaments(&self) -> DocumentPath {
        self.root.child("tournaments")
    }

    /// One tournament document.
    pub fn tournament(&self, code: &GameCode) -> DocumentPath {
        self.tournaments().child(code.as_str())
    }

    /// Collection of a tournament's matches.
    pub fn matches(&self, code: &GameCode) -> DocumentPath {
        self.tournament(code).child("matches")
    }

    /// One match document.
    pub fn match_doc(&self, code: &GameCode, id: &MatchId) -> DocumentPath {
        self.matches(code).child(id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(DocumentPath::new("/a//b/").as_str(), "a/b");
        assert_eq!(DocumentPath::new("").child("x").as_str(), "x");
    }

    #[test]
    fn test_parent_and_leaf() {
        let p = DocumentPath::new("a/b/c");
        assert_eq!(p.parent(), Some(DocumentPath::new("a/b")));
        assert_eq!(p.leaf(), "c");
        assert_eq!(DocumentPath::new("a").parent(), None);
    }

    #[test]
    fn test_starts_with_respects_segments() {
        let p = DocumentPath::new("rps/tournaments/ABCDEF");
        assert!(p.starts_with(&DocumentPath::new("rps/tournaments")));
        assert!(p.starts_with(&p));
        assert!(!DocumentPath::new("rps/tournamentsX/A").starts_with(&DocumentPath::new("rps/tournaments")));
    }

    #[test]
    fn test_layout() {
        let layout = Layout::new("rps");
        let code = GameCode::parse("ABCDEF").unwrap();
        let id = MatchId::new(0, 1, 2);

        assert_eq!(layout.tournament(&code).as_str(), "rps/tournaments/ABCDEF");
        assert_eq!(
            layout.match_doc(&code, &id).as_str(),
            "rps/tournaments/ABCDEF/matches/e0-r1-m2"
        );
        assert_eq!(layout.match_doc(&code, &id).parent(), Some(layout.matches(&code)));
    }
}
