//! Errors reported by decoding engines

/// Opening a document failed
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OpenError {
    #[error("cannot fetch {location}: {detail}")]
    Fetch { location: String, detail: String },

    #[error("not a readable document: {0}")]
    Format(String),

    #[error("unsupported source: {0}")]
    Unsupported(String),

    #[error("engine: {0}")]
    Engine(String),
}

/// Loading a page from an open document failed
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("page {index} is out of range (document has {page_count} pages)")]
    InvalidIndex { index: usize, page_count: usize },

    #[error("cannot decode page {index}: {detail}")]
    Decode { index: usize, detail: String },

    #[error("engine: {0}")]
    Engine(String),
}

/// A render operation did not complete
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The render was cancelled before it finished
    #[error("rendering cancelled")]
    Cancelled,

    #[error("rendering failed: {0}")]
    Failed(String),

    #[error("engine: {0}")]
    Engine(String),
}

impl RenderError {
    /// Whether this is the cancellation outcome rather than a real failure
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
