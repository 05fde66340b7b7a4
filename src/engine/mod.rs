//! Interface to the document decoding engine
//!
//! The display pipeline never parses documents itself. It drives an
//! [`Engine`] through three asynchronous operations (open a document, load a
//! page, render a page) and learns about their outcome through [`Reply`]
//! values the engine completes, possibly from another thread.

mod error;
#[cfg(feature = "mupdf")]
pub mod mupdf;
mod source;

pub use error::{OpenError, PageError, RenderError};
pub use source::{OpenOptions, Source, same_source};

use crate::canvas::RenderContext;
use crate::viewport::Viewport;

/// One-shot completion slot for an asynchronous engine operation.
///
/// Engines call [`Reply::send`] exactly once. Dropping a reply without
/// sending leaves the operation outstanding forever.
pub struct Reply<T> {
    deliver: Box<dyn FnOnce(T) + Send>,
}

impl<T: 'static> Reply<T> {
    pub fn new(deliver: impl FnOnce(T) + Send + 'static) -> Self {
        Self {
            deliver: Box::new(deliver),
        }
    }

    /// Complete the operation
    pub fn send(self, value: T) {
        (self.deliver)(value);
    }

    /// Reply that accepts a `U` and converts it before delivering
    pub fn map<U: 'static>(self, f: impl FnOnce(U) -> T + Send + 'static) -> Reply<U> {
        Reply::new(move |value| self.send(f(value)))
    }
}

impl<T> std::fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reply").finish_non_exhaustive()
    }
}

/// Handle to an in-flight render
pub trait RenderTask {
    /// Ask the engine to stop. The render's reply then completes with
    /// [`RenderError::Cancelled`], unless it already completed. Calling this
    /// more than once is harmless.
    fn cancel(&self);
}

/// A decoding engine (pdf.js, MuPDF, ...)
pub trait Engine {
    type Document: DocumentHandle<Page = Self::Page>;
    type Page: PageHandle;

    /// Version string, used to template the default worker location
    fn version(&self) -> &str;

    /// Point the engine at its background worker
    fn set_worker_source(&mut self, worker_src: &str);

    /// Start opening a document
    fn open(
        &mut self,
        source: &Source,
        options: &OpenOptions,
        reply: Reply<Result<Self::Document, OpenError>>,
    );
}

/// An opened document
pub trait DocumentHandle: Send + 'static {
    type Page: PageHandle;

    fn page_count(&self) -> usize;

    /// Start loading page `number` (1-based)
    fn load_page(&self, number: usize, reply: Reply<Result<Self::Page, PageError>>);
}

/// A loaded page
pub trait PageHandle: Send + 'static {
    /// 1-based page number within its document
    fn number(&self) -> usize;

    /// Rotation the document itself asks for, in degrees
    fn intrinsic_rotation(&self) -> i32;

    /// Viewport of this page at the given scale and absolute rotation
    fn viewport(&self, scale: f64, rotation: i32) -> Viewport;

    /// Start drawing the page into `context`
    fn render(
        &self,
        context: RenderContext,
        viewport: Viewport,
        reply: Reply<Result<(), RenderError>>,
    ) -> Box<dyn RenderTask>;
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn reply_delivers_once() {
        let (tx, rx) = mpsc::channel();
        let reply = Reply::new(move |value: u32| tx.send(value).unwrap());
        reply.send(7);
        assert_eq!(rx.try_recv(), Ok(7));
    }

    #[test]
    fn mapped_reply_converts_value() {
        let (tx, rx) = mpsc::channel();
        let reply: Reply<String> = Reply::new(move |value| tx.send(value).unwrap());
        let mapped = reply.map(|n: usize| format!("{n} pages"));
        mapped.send(3);
        assert_eq!(rx.try_recv().as_deref(), Ok("3 pages"));
    }
}
