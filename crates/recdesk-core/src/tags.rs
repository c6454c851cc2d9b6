// ── Cache tags ──
//
// A tag labels what a cached query result depends on: either one entity
// (`Asset:a1`) or a whole collection (`Asset:LIST`). Queries provide tags,
// mutations invalidate them, and each cache entry matches invalidated
// tags against the ones its latest result provided.
// Matching is exact: `Asset:LIST` does not match `Asset:a1`.

use std::fmt;

/// The id half of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagId {
    /// The whole collection of a type.
    List,
    Id(String),
}

/// A `(type, id)` dependency label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub kind: String,
    pub id: TagId,
}

impl Tag {
    /// Tag for the whole collection of `kind`.
    pub fn list(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: TagId::List,
        }
    }

    /// Tag for one entity of `kind`.
    pub fn id(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: TagId::Id(id.into()),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            TagId::List => write!(f, "{}:LIST", self.kind),
            TagId::Id(id) => write!(f, "{}:{id}", self.kind),
        }
    }
}

/// Whether any tag in `a` equals a tag in `b`.
pub(crate) fn overlaps(a: &[Tag], b: &[Tag]) -> bool {
    a.iter().any(|tag| b.contains(tag))
}
