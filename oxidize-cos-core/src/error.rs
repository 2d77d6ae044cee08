use crate::objects::ObjectKey;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unresolvable reference {key}: {reason}")]
    UnresolvableReference { key: ObjectKey, reason: String },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Resource closed: {0}")]
    ResourceClosed(String),

    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("Filter error: {0}")]
    FilterError(String),

    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(usize),

    #[error("Observer error: {0}")]
    Observer(String),
}

impl PdfError {
    /// Whether the failure came from the backing store rather than from
    /// the document structure.
    pub fn is_io(&self) -> bool {
        matches!(self, PdfError::Io(_))
    }

    pub(crate) fn unresolvable(key: ObjectKey, reason: impl Into<String>) -> Self {
        PdfError::UnresolvableReference {
            key,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PdfError>;
