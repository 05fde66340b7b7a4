//! Request ids and completion events

use crate::engine::{OpenError, PageError, RenderError};

/// Unique identifier for engine requests issued by one display
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Completion of an engine request, queued for the display to process
#[derive(Debug)]
pub(crate) enum Event<D, P> {
    DocumentOpened {
        id: RequestId,
        result: Result<D, OpenError>,
    },
    PageLoaded {
        id: RequestId,
        result: Result<P, PageError>,
    },
    RenderFinished {
        id: RequestId,
        result: Result<(), RenderError>,
    },
}
