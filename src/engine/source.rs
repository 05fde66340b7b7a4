//! What to open and how

use std::sync::Arc;

/// Where a document comes from
#[derive(Clone)]
pub enum Source {
    /// Location identifier (URL or path)
    Url(String),
    /// Document bytes already in memory
    Bytes(Arc<[u8]>),
}

impl Source {
    pub fn url(location: impl Into<String>) -> Self {
        Self::Url(location.into())
    }

    pub fn bytes(data: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes(data.into())
    }

    /// Identity comparison: equal locations, or the very same byte buffer.
    ///
    /// Two distinct buffers with equal contents are different sources.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Url(a), Self::Url(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Short description for logs
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Url(location) => location.clone(),
            Self::Bytes(data) => format!("<{} bytes>", data.len()),
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(location) => f.debug_tuple("Url").field(location).finish(),
            Self::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
        }
    }
}

/// Identity comparison for optional sources
#[must_use]
pub fn same_source(a: Option<&Source>, b: Option<&Source>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_identity(b),
        (None, None) => true,
        _ => false,
    }
}

/// Options passed to the engine when opening a document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Send credentials (cookies, auth headers) with cross-origin requests
    pub with_credentials: bool,
    /// Location of character maps for non-embedded CJK fonts
    pub cmap_url: Option<String>,
    /// Whether the character maps at `cmap_url` are packed
    pub cmap_packed: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_compare_by_value() {
        assert!(Source::url("a.pdf").same_identity(&Source::url(String::from("a.pdf"))));
        assert!(!Source::url("a.pdf").same_identity(&Source::url("b.pdf")));
    }

    #[test]
    fn byte_buffers_compare_by_allocation() {
        let data: Arc<[u8]> = Arc::from(&b"%PDF-1.7"[..]);
        let same = Source::Bytes(Arc::clone(&data));
        let copy = Source::bytes(data.to_vec());

        assert!(Source::Bytes(data).same_identity(&same));
        assert!(!same.same_identity(&copy));
    }

    #[test]
    fn url_and_bytes_never_match() {
        let bytes = Source::bytes(b"a.pdf".to_vec());
        assert!(!Source::url("a.pdf").same_identity(&bytes));
        assert!(same_source(None, None));
        assert!(!same_source(Some(&bytes), None));
    }
}
