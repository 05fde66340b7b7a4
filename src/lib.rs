//! Single-page document display
//!
//! Opens a document through a decoding [`engine`], loads one page and draws
//! it onto a [`canvas::Canvas`], re-running only the stages whose parameters
//! changed and keeping at most one render in flight.

pub mod canvas;
pub mod config;
pub mod display;
pub mod engine;
pub mod panic_handler;
pub mod viewport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use canvas::{Bitmap, Canvas, RenderContext};
pub use display::{Callbacks, DisplayParams, OpenOrdering, PdfDisplay, PipelineOptions};
pub use engine::{Engine, Source};
pub use viewport::Viewport;
