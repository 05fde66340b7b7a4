//! Document → page → render pipeline for one canvas
//!
//! [`PdfDisplay`] owns the current document and page handles, the canvas,
//! and the single pending render session. Engine operations complete into
//! an event queue; nothing changes until the owner pumps it with
//! [`PdfDisplay::poll`] or [`PdfDisplay::wait`], so every state transition
//! happens on the owner's thread between engine suspensions.

mod callbacks;
mod params;
mod request;
mod session;
mod state;

use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info};

use crate::canvas::Canvas;
use crate::engine::{DocumentHandle, Engine, PageError, PageHandle, RenderError, Reply};

pub use callbacks::Callbacks;
pub use params::{
    DEFAULT_PAGE, DEFAULT_SCALE, DisplayParams, OpenOrdering, default_worker_src,
};
pub use request::RequestId;
use request::Event;
pub use session::{DrawPlan, Outcome, RenderSession, SessionSlot, SessionState};
pub use state::{Command, Effect, WatchState};

type EngineEvent<E> = Event<<E as Engine>::Document, <E as Engine>::Page>;

/// Pipeline behaviour that is not part of the display parameters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub open_ordering: OpenOrdering,
}

/// Displays one page of one document on a canvas
pub struct PdfDisplay<E: Engine> {
    engine: E,
    options: PipelineOptions,
    watch: WatchState,
    callbacks: Callbacks<E::Document, E::Page>,
    canvas: Option<Canvas>,
    document: Option<Arc<E::Document>>,
    page: Option<Arc<E::Page>>,
    session: SessionSlot,
    event_tx: Sender<EngineEvent<E>>,
    event_rx: Receiver<EngineEvent<E>>,
    next_request_id: u64,
    /// Most recently issued open
    latest_open: Option<RequestId>,
    /// Opens issued before this id belong to a released source
    open_floor: RequestId,
    /// Only the completion of this page request is accepted
    latest_page: Option<RequestId>,
    /// Requests whose completion has not been processed yet
    outstanding: usize,
}

impl<E: Engine> PdfDisplay<E> {
    /// Create a display with default pipeline options
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self::with_options(engine, PipelineOptions::default())
    }

    #[must_use]
    pub fn with_options(engine: E, options: PipelineOptions) -> Self {
        let (event_tx, event_rx) = flume::unbounded();
        Self {
            engine,
            options,
            watch: WatchState::new(),
            callbacks: Callbacks::default(),
            canvas: None,
            document: None,
            page: None,
            session: SessionSlot::new(),
            event_tx,
            event_rx,
            next_request_id: 1,
            latest_open: None,
            open_floor: RequestId::new(0),
            latest_page: None,
            outstanding: 0,
        }
    }

    /// Apply new parameters, re-running only the stages whose inputs changed
    pub fn update(&mut self, params: DisplayParams) {
        let effects = self.watch.update(params);
        self.execute_effects(effects);
    }

    /// Apply a single parameter change
    pub fn apply_command(&mut self, cmd: Command) {
        let effects = state::normalize(self.watch.apply(cmd));
        self.execute_effects(effects);
    }

    /// Replace the notification hooks. Never re-runs a stage.
    pub fn set_callbacks(&mut self, callbacks: Callbacks<E::Document, E::Page>) {
        self.callbacks = callbacks;
    }

    /// Mount a canvas, returning the previous one. Draws the current page
    /// onto it if one is loaded.
    pub fn attach_canvas(&mut self, canvas: Canvas) -> Option<Canvas> {
        let previous = self.detach_canvas();
        self.canvas = Some(canvas);
        self.draw();
        previous
    }

    /// Unmount the canvas. A pending render is cancelled.
    pub fn detach_canvas(&mut self) -> Option<Canvas> {
        let canvas = self.canvas.take();
        if canvas.is_some() {
            self.session.supersede();
        }
        canvas
    }

    #[must_use]
    pub fn canvas(&self) -> Option<&Canvas> {
        self.canvas.as_ref()
    }

    pub fn canvas_mut(&mut self) -> Option<&mut Canvas> {
        self.canvas.as_mut()
    }

    /// Currently open document
    #[must_use]
    pub fn document(&self) -> Option<&E::Document> {
        self.document.as_deref()
    }

    /// Currently loaded page
    #[must_use]
    pub fn page(&self) -> Option<&E::Page> {
        self.page.as_deref()
    }

    #[must_use]
    pub fn params(&self) -> &DisplayParams {
        self.watch.params()
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Whether a render session is pending
    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.session.is_pending()
    }

    #[must_use]
    pub fn render_session(&self) -> Option<&RenderSession> {
        self.session.pending()
    }

    /// Most recent render session that has finished, with its final state
    #[must_use]
    pub fn last_render_session(&self) -> Option<&RenderSession> {
        self.session.last_finished()
    }

    /// No engine request is waiting to be processed
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.outstanding == 0
    }

    /// Process every completion already queued. Returns how many were
    /// processed.
    pub fn poll(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
            processed += 1;
        }
        processed
    }

    /// Block up to `timeout` for one completion, then drain the queue.
    /// Returns false when nothing arrived in time.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                self.poll();
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            debug!("Executing {effect:?}");
            match effect {
                Effect::ConfigureWorker => {
                    let worker_src = self.watch.params().resolved_worker_src(self.engine.version());
                    self.engine.set_worker_source(&worker_src);
                }
                Effect::OpenDocument => self.open_document(),
                Effect::ReleaseDocument => self.release_document(),
                Effect::LoadPage => self.load_page(),
                Effect::RenderCurrentPage => self.draw(),
            }
        }
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }

    fn reply<T: 'static>(
        &mut self,
        wrap: impl FnOnce(T) -> EngineEvent<E> + Send + 'static,
    ) -> Reply<T> {
        let tx = self.event_tx.clone();
        self.outstanding += 1;
        Reply::new(move |value| {
            // The display may already be gone.
            let _ = tx.send(wrap(value));
        })
    }

    fn open_document(&mut self) {
        let params = self.watch.params();
        let Some(source) = params.source.clone() else {
            return;
        };
        let options = params.open_options();

        let id = self.next_id();
        self.latest_open = Some(id);
        info!("Opening {} ({id:?})", source.describe());
        let reply = self.reply(move |result| Event::DocumentOpened { id, result });
        self.engine.open(&source, &options, reply);
    }

    fn release_document(&mut self) {
        debug!("Source cleared, releasing document");
        self.open_floor = RequestId::new(self.next_request_id);
        self.latest_open = None;
        self.latest_page = None;
        self.document = None;
        self.discard_page();
    }

    /// Forget the current page; a pending render is cancelled and its retry
    /// finds nothing to draw.
    fn discard_page(&mut self) {
        self.page = None;
        self.session.supersede();
    }

    fn accepts_open(&self, id: RequestId) -> bool {
        if id < self.open_floor {
            return false;
        }
        match self.options.open_ordering {
            OpenOrdering::CompletionOrder => true,
            OpenOrdering::RequestOrder => self.latest_open == Some(id),
        }
    }

    fn load_page(&mut self) {
        let Some(document) = self.document.clone() else {
            return;
        };
        let number = self.watch.params().page;
        if number == 0 {
            self.latest_page = None;
            self.discard_page();
            self.callbacks.page_failed(&PageError::InvalidIndex {
                index: 0,
                page_count: document.page_count(),
            });
            return;
        }

        let id = self.next_id();
        self.latest_page = Some(id);
        debug!("Loading page {number} ({id:?})");
        let reply = self.reply(move |result| Event::PageLoaded { id, result });
        document.load_page(number, reply);
    }

    /// Draw the current page with current parameters, or cancel the render
    /// in flight so that its retry does.
    fn draw(&mut self) {
        let Some(page) = self.page.clone() else {
            return;
        };
        let Some(canvas) = self.canvas.as_mut() else {
            return;
        };

        if self.session.supersede() {
            return;
        }

        let params = self.watch.params();
        let plan = DrawPlan::compute(
            page.as_ref(),
            params.scale,
            params.rotation,
            canvas.device_pixel_ratio(),
        );
        if let Err(error) = canvas.apply_layout(&plan.layout) {
            self.callbacks
                .render_failed(&RenderError::Failed(error.to_string()));
            return;
        }
        let context = canvas.context();

        let id = self.next_id();
        let reply = self.reply(move |result| Event::RenderFinished { id, result });
        let task = page.render(context, plan.viewport, reply);
        self.session
            .begin(RenderSession::new(id, page.number(), plan.viewport, task));
    }

    fn handle_event(&mut self, event: EngineEvent<E>) {
        self.outstanding = self.outstanding.saturating_sub(1);

        match event {
            Event::DocumentOpened { id, result } => {
                if !self.accepts_open(id) {
                    debug!("Discarding superseded open {id:?}");
                    return;
                }
                match result {
                    Ok(document) => {
                        info!("Document opened with {} pages", document.page_count());
                        let document = Arc::new(document);
                        self.discard_page();
                        self.document = Some(Arc::clone(&document));
                        self.callbacks.document_loaded(&document);
                        self.load_page();
                    }
                    Err(error) => self.callbacks.document_failed(&error),
                }
            }

            Event::PageLoaded { id, result } => {
                if self.latest_page != Some(id) {
                    debug!("Discarding superseded page load {id:?}");
                    return;
                }
                match result {
                    Ok(page) => {
                        let page = Arc::new(page);
                        self.page = Some(Arc::clone(&page));
                        self.callbacks.page_loaded(&page);
                        self.draw();
                    }
                    Err(error) => {
                        self.discard_page();
                        self.callbacks.page_failed(&error);
                    }
                }
            }

            Event::RenderFinished { id, result } => match self.session.finish(id, result) {
                Outcome::Completed => {
                    if let Some(page) = self.page.clone() {
                        self.callbacks.render_succeeded(&page);
                    }
                }
                Outcome::Retry => self.draw(),
                Outcome::Failed(error) => self.callbacks.render_failed(&error),
                Outcome::Stale => {}
            },
        }
    }
}

impl<E: Engine> std::fmt::Debug for PdfDisplay<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDisplay")
            .field("params", self.watch.params())
            .field("has_document", &self.document.is_some())
            .field("page", &self.page.as_ref().map(|p| p.number()))
            .field("session", &self.session)
            .field("outstanding", &self.outstanding)
            .finish_non_exhaustive()
    }
}
