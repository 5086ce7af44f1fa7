use std::fmt::{self, Display, Formatter};

pub type DocResult<T> = Result<T, DocError>;

/// Boundary-level error for the document model. The history and operation
/// layers deliberately do not surface errors: inconsistent entries degrade to
/// a logged no-op, so this type only appears on APIs callers drive directly
/// (logical-index parsing, arena lookups).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocError {
    pub kind: DocErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocErrorKind {
    InvalidLogicalIndex(String),
    NodeNotFound,
    NotAParagraph,
    Unexpected(String),
}

impl Display for DocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DocErrorKind::InvalidLogicalIndex(raw) => {
                write!(f, "invalid logical index: {raw}")
            }
            DocErrorKind::NodeNotFound => write!(f, "node not found in arena"),
            DocErrorKind::NotAParagraph => write!(f, "position does not address a paragraph"),
            DocErrorKind::Unexpected(msg) => write!(f, "unexpected error: {msg}"),
        }
    }
}

impl std::error::Error for DocError {}

impl From<DocErrorKind> for DocError {
    fn from(kind: DocErrorKind) -> Self {
        Self { kind }
    }
}
