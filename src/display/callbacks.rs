//! Reaction hooks supplied by the embedding shell
//!
//! Replacing callbacks never re-runs a pipeline stage; the latest set is
//! simply used for the next notification.

use log::{debug, warn};

use crate::engine::{OpenError, PageError, RenderError};

type Hook<T> = Option<Box<dyn FnMut(&T)>>;

/// The six optional notification hooks
pub struct Callbacks<D, P> {
    on_document_load_success: Hook<D>,
    on_document_load_fail: Hook<OpenError>,
    on_page_load_success: Hook<P>,
    on_page_load_fail: Hook<PageError>,
    on_page_render_success: Hook<P>,
    on_page_render_fail: Hook<RenderError>,
}

impl<D, P> Default for Callbacks<D, P> {
    fn default() -> Self {
        Self {
            on_document_load_success: None,
            on_document_load_fail: None,
            on_page_load_success: None,
            on_page_load_fail: None,
            on_page_render_success: None,
            on_page_render_fail: None,
        }
    }
}

impl<D, P> Callbacks<D, P> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_document_load_success(mut self, f: impl FnMut(&D) + 'static) -> Self {
        self.on_document_load_success = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_document_load_fail(mut self, f: impl FnMut(&OpenError) + 'static) -> Self {
        self.on_document_load_fail = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_page_load_success(mut self, f: impl FnMut(&P) + 'static) -> Self {
        self.on_page_load_success = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_page_load_fail(mut self, f: impl FnMut(&PageError) + 'static) -> Self {
        self.on_page_load_fail = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_page_render_success(mut self, f: impl FnMut(&P) + 'static) -> Self {
        self.on_page_render_success = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_page_render_fail(mut self, f: impl FnMut(&RenderError) + 'static) -> Self {
        self.on_page_render_fail = Some(Box::new(f));
        self
    }

    pub(crate) fn document_loaded(&mut self, document: &D) {
        if let Some(f) = self.on_document_load_success.as_mut() {
            f(document);
        }
    }

    pub(crate) fn document_failed(&mut self, error: &OpenError) {
        match self.on_document_load_fail.as_mut() {
            Some(f) => f(error),
            None => warn!("Document failed to open: {error}"),
        }
    }

    pub(crate) fn page_loaded(&mut self, page: &P) {
        if let Some(f) = self.on_page_load_success.as_mut() {
            f(page);
        }
    }

    pub(crate) fn page_failed(&mut self, error: &PageError) {
        match self.on_page_load_fail.as_mut() {
            Some(f) => f(error),
            None => warn!("Page failed to load: {error}"),
        }
    }

    pub(crate) fn render_succeeded(&mut self, page: &P) {
        match self.on_page_render_success.as_mut() {
            Some(f) => f(page),
            None => debug!("Page rendered"),
        }
    }

    pub(crate) fn render_failed(&mut self, error: &RenderError) {
        match self.on_page_render_fail.as_mut() {
            Some(f) => f(error),
            None => warn!("Page failed to render: {error}"),
        }
    }
}

impl<D, P> std::fmt::Debug for Callbacks<D, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_document_load_success", &self.on_document_load_success.is_some())
            .field("on_document_load_fail", &self.on_document_load_fail.is_some())
            .field("on_page_load_success", &self.on_page_load_success.is_some())
            .field("on_page_load_fail", &self.on_page_load_fail.is_some())
            .field("on_page_render_success", &self.on_page_render_success.is_some())
            .field("on_page_render_fail", &self.on_page_render_fail.is_some())
            .finish()
    }
}
