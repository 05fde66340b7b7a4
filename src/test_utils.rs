//! Scripted decoding engine for tests
//!
//! Every engine call is recorded. In [`Mode::Manual`] nothing completes until
//! the test resolves it, which makes interleavings (a render still pending
//! while parameters change) reproducible. [`Mode::Immediate`] completes every
//! operation inside the call itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::canvas::RenderContext;
use crate::engine::{
    DocumentHandle, Engine, OpenError, OpenOptions, PageError, PageHandle, RenderError,
    RenderTask, Reply, Source,
};
use crate::viewport::Viewport;

/// Version reported by the scripted engine
pub const SCRIPTED_VERSION: &str = "2.16.105";

/// Unscaled size and own rotation of a scripted page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSpec {
    pub width: f64,
    pub height: f64,
    pub rotation: i32,
}

impl PageSpec {
    /// US Letter in points
    pub const LETTER: Self = Self::new(612.0, 792.0);

    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            rotation: 0,
        }
    }

    #[must_use]
    pub const fn rotated(mut self, rotation: i32) -> Self {
        self.rotation = rotation;
        self
    }
}

/// When scripted operations complete
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Only when the test resolves them
    Manual,
    /// Inside the engine call
    Immediate,
}

/// Where a scripted render ended up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderStatus {
    Pending,
    Completed,
    Cancelled,
    Failed,
}

/// A recorded `open` call
#[derive(Clone, Debug)]
pub struct OpenRecord {
    pub source: Source,
    pub options: OpenOptions,
    pub settled: bool,
}

/// A recorded `render` call
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderRecord {
    pub page: usize,
    pub viewport: Viewport,
    pub status: RenderStatus,
}

struct OpenCall {
    source: Source,
    options: OpenOptions,
    reply: Option<Reply<Result<ScriptedDocument, OpenError>>>,
}

struct PageLoadCall {
    number: usize,
    pages: Arc<[PageSpec]>,
    reply: Option<Reply<Result<ScriptedPage, PageError>>>,
}

struct RenderCall {
    page: usize,
    viewport: Viewport,
    context: RenderContext,
    reply: Option<Reply<Result<(), RenderError>>>,
    status: RenderStatus,
}

struct Script {
    mode: Mode,
    worker_sources: Vec<String>,
    documents: HashMap<String, Arc<[PageSpec]>>,
    byte_pages: Arc<[PageSpec]>,
    opens: Vec<OpenCall>,
    page_loads: Vec<PageLoadCall>,
    renders: Vec<RenderCall>,
}

type Shared = Arc<Mutex<Script>>;

fn lock(script: &Shared) -> MutexGuard<'_, Script> {
    script.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Color a scripted render paints for a page
#[must_use]
pub fn page_color(number: usize) -> [u8; 4] {
    [(number % 256) as u8, 0x40, 0x80, 0xFF]
}

/// Engine whose behaviour is driven by the test
#[derive(Clone)]
pub struct ScriptedEngine {
    script: Shared,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new(Mode::Manual)
    }
}

impl ScriptedEngine {
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                mode,
                worker_sources: Vec::new(),
                documents: HashMap::new(),
                byte_pages: Arc::from(vec![PageSpec::LETTER]),
                opens: Vec::new(),
                page_loads: Vec::new(),
                renders: Vec::new(),
            })),
        }
    }

    #[must_use]
    pub fn manual() -> Self {
        Self::new(Mode::Manual)
    }

    #[must_use]
    pub fn immediate() -> Self {
        Self::new(Mode::Immediate)
    }

    /// Make `location` open successfully with these pages
    #[must_use]
    pub fn with_document(self, location: &str, pages: Vec<PageSpec>) -> Self {
        lock(&self.script)
            .documents
            .insert(location.to_string(), Arc::from(pages));
        self
    }

    /// Pages of any in-memory document
    #[must_use]
    pub fn with_byte_pages(self, pages: Vec<PageSpec>) -> Self {
        lock(&self.script).byte_pages = Arc::from(pages);
        self
    }

    #[must_use]
    pub fn worker_sources(&self) -> Vec<String> {
        lock(&self.script).worker_sources.clone()
    }

    #[must_use]
    pub fn opens(&self) -> Vec<OpenRecord> {
        lock(&self.script)
            .opens
            .iter()
            .map(|call| OpenRecord {
                source: call.source.clone(),
                options: call.options.clone(),
                settled: call.reply.is_none(),
            })
            .collect()
    }

    /// Page numbers requested so far, in order
    #[must_use]
    pub fn page_loads(&self) -> Vec<usize> {
        lock(&self.script)
            .page_loads
            .iter()
            .map(|call| call.number)
            .collect()
    }

    #[must_use]
    pub fn renders(&self) -> Vec<RenderRecord> {
        lock(&self.script)
            .renders
            .iter()
            .map(|call| RenderRecord {
                page: call.page,
                viewport: call.viewport,
                status: call.status,
            })
            .collect()
    }

    /// Number of renders neither completed, failed nor cancelled
    #[must_use]
    pub fn pending_renders(&self) -> usize {
        lock(&self.script)
            .renders
            .iter()
            .filter(|call| call.status == RenderStatus::Pending)
            .count()
    }

    /// Complete open `index` according to the scripted documents
    pub fn resolve_open(&self, index: usize) {
        let (reply, result) = {
            let mut script = lock(&self.script);
            let call = &mut script.opens[index];
            let source = call.source.clone();
            let reply = call.reply.take();
            (reply, script.open_result(&source, &self.script))
        };
        if let Some(reply) = reply {
            reply.send(result);
        }
    }

    /// Fail open `index` regardless of the script
    pub fn fail_open(&self, index: usize) {
        let reply = lock(&self.script).opens[index].reply.take();
        if let Some(reply) = reply {
            reply.send(Err(OpenError::Format("scripted failure".into())));
        }
    }

    /// Complete page load `index`
    pub fn resolve_page(&self, index: usize) {
        let (reply, result) = {
            let mut script = lock(&self.script);
            let call = &mut script.page_loads[index];
            let result = page_result(call.number, &call.pages, &self.script);
            (call.reply.take(), result)
        };
        if let Some(reply) = reply {
            reply.send(result);
        }
    }

    /// Fail page load `index` regardless of the script
    pub fn fail_page(&self, index: usize) {
        let (reply, number) = {
            let mut script = lock(&self.script);
            let call = &mut script.page_loads[index];
            (call.reply.take(), call.number)
        };
        if let Some(reply) = reply {
            reply.send(Err(PageError::Decode {
                index: number,
                detail: "scripted failure".into(),
            }));
        }
    }

    /// Paint render `index` and report success, unless it already settled
    pub fn complete_render(&self, index: usize) {
        let reply = {
            let mut script = lock(&self.script);
            let call = &mut script.renders[index];
            let reply = call.reply.take();
            if reply.is_some() {
                paint(&call.context, call.page);
                call.status = RenderStatus::Completed;
            }
            reply
        };
        if let Some(reply) = reply {
            reply.send(Ok(()));
        }
    }

    /// Report a render failure for render `index`, unless it already settled
    pub fn fail_render(&self, index: usize, detail: &str) {
        let reply = {
            let mut script = lock(&self.script);
            let call = &mut script.renders[index];
            let reply = call.reply.take();
            if reply.is_some() {
                call.status = RenderStatus::Failed;
            }
            reply
        };
        if let Some(reply) = reply {
            reply.send(Err(RenderError::Failed(detail.to_string())));
        }
    }
}

impl Script {
    fn open_result(&self, source: &Source, shared: &Shared) -> Result<ScriptedDocument, OpenError> {
        match source {
            Source::Url(location) => match self.documents.get(location) {
                Some(pages) => Ok(ScriptedDocument {
                    location: Some(location.clone()),
                    pages: Arc::clone(pages),
                    script: Arc::clone(shared),
                }),
                None => Err(OpenError::Fetch {
                    location: location.clone(),
                    detail: "404 Not Found".into(),
                }),
            },
            Source::Bytes(_) => Ok(ScriptedDocument {
                location: None,
                pages: Arc::clone(&self.byte_pages),
                script: Arc::clone(shared),
            }),
        }
    }
}

fn page_result(number: usize, pages: &[PageSpec], shared: &Shared) -> Result<ScriptedPage, PageError> {
    match number.checked_sub(1).and_then(|i| pages.get(i)) {
        Some(spec) => Ok(ScriptedPage {
            number,
            spec: *spec,
            script: Arc::clone(shared),
        }),
        None => Err(PageError::InvalidIndex {
            index: number,
            page_count: pages.len(),
        }),
    }
}

fn paint(context: &RenderContext, page: usize) {
    context.with_bitmap(|bitmap| bitmap.fill(page_color(page)));
}

impl Engine for ScriptedEngine {
    type Document = ScriptedDocument;
    type Page = ScriptedPage;

    fn version(&self) -> &str {
        SCRIPTED_VERSION
    }

    fn set_worker_source(&mut self, worker_src: &str) {
        lock(&self.script)
            .worker_sources
            .push(worker_src.to_string());
    }

    fn open(
        &mut self,
        source: &Source,
        options: &OpenOptions,
        reply: Reply<Result<ScriptedDocument, OpenError>>,
    ) {
        let mut script = lock(&self.script);
        if script.mode == Mode::Immediate {
            let result = script.open_result(source, &self.script);
            script.opens.push(OpenCall {
                source: source.clone(),
                options: options.clone(),
                reply: None,
            });
            drop(script);
            reply.send(result);
            return;
        }
        script.opens.push(OpenCall {
            source: source.clone(),
            options: options.clone(),
            reply: Some(reply),
        });
    }
}

/// Document produced by [`ScriptedEngine`]
pub struct ScriptedDocument {
    location: Option<String>,
    pages: Arc<[PageSpec]>,
    script: Shared,
}

impl ScriptedDocument {
    /// Location it was opened from; `None` for in-memory sources
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

impl std::fmt::Debug for ScriptedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedDocument")
            .field("location", &self.location)
            .field("pages", &self.pages.len())
            .finish()
    }
}

impl DocumentHandle for ScriptedDocument {
    type Page = ScriptedPage;

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn load_page(&self, number: usize, reply: Reply<Result<ScriptedPage, PageError>>) {
        let mut script = lock(&self.script);
        if script.mode == Mode::Immediate {
            script.page_loads.push(PageLoadCall {
                number,
                pages: Arc::clone(&self.pages),
                reply: None,
            });
            drop(script);
            reply.send(page_result(number, &self.pages, &self.script));
            return;
        }
        script.page_loads.push(PageLoadCall {
            number,
            pages: Arc::clone(&self.pages),
            reply: Some(reply),
        });
    }
}

/// Page produced by [`ScriptedEngine`]
pub struct ScriptedPage {
    number: usize,
    spec: PageSpec,
    script: Shared,
}

impl std::fmt::Debug for ScriptedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedPage")
            .field("number", &self.number)
            .field("spec", &self.spec)
            .finish()
    }
}

impl PageHandle for ScriptedPage {
    fn number(&self) -> usize {
        self.number
    }

    fn intrinsic_rotation(&self) -> i32 {
        self.spec.rotation
    }

    fn viewport(&self, scale: f64, rotation: i32) -> Viewport {
        Viewport::for_page(self.spec.width, self.spec.height, scale, rotation)
    }

    fn render(
        &self,
        context: RenderContext,
        viewport: Viewport,
        reply: Reply<Result<(), RenderError>>,
    ) -> Box<dyn RenderTask> {
        let mut script = lock(&self.script);
        let index = script.renders.len();

        if script.mode == Mode::Immediate {
            paint(&context, self.number);
            script.renders.push(RenderCall {
                page: self.number,
                viewport,
                context,
                reply: None,
                status: RenderStatus::Completed,
            });
            drop(script);
            reply.send(Ok(()));
        } else {
            script.renders.push(RenderCall {
                page: self.number,
                viewport,
                context,
                reply: Some(reply),
                status: RenderStatus::Pending,
            });
        }

        Box::new(ScriptedRenderTask {
            index,
            script: Arc::clone(&self.script),
        })
    }
}

struct ScriptedRenderTask {
    index: usize,
    script: Shared,
}

impl RenderTask for ScriptedRenderTask {
    fn cancel(&self) {
        let reply = {
            let mut script = lock(&self.script);
            let call = &mut script.renders[self.index];
            let reply = call.reply.take();
            if reply.is_some() {
                call.status = RenderStatus::Cancelled;
            }
            reply
        };
        if let Some(reply) = reply {
            reply.send(Err(RenderError::Cancelled));
        }
    }
}
