//! Single-flight render sessions
//!
//! A display has at most one pending render. Asking to draw while one is
//! pending cancels it instead of starting a second; the cancellation then
//! comes back as the signal to draw again with whatever parameters are
//! current by then.

use log::debug;

use crate::engine::{PageHandle, RenderError, RenderTask};
use crate::viewport::{SurfaceLayout, Viewport, effective_rotation, effective_scale};

use super::request::RequestId;

/// Viewport and canvas layout for one render attempt
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawPlan {
    pub viewport: Viewport,
    pub layout: SurfaceLayout,
}

impl DrawPlan {
    /// Compose the page's rotation with the override and scale the raster
    /// to the display's pixel density.
    #[must_use]
    pub fn compute<P: PageHandle + ?Sized>(
        page: &P,
        scale: f64,
        rotation: i32,
        device_pixel_ratio: f64,
    ) -> Self {
        let rotation = effective_rotation(page.intrinsic_rotation(), rotation);
        let viewport = page.viewport(effective_scale(scale, device_pixel_ratio), rotation);
        Self {
            viewport,
            layout: SurfaceLayout::for_viewport(&viewport, device_pixel_ratio),
        }
    }
}

/// Lifecycle of one render session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Completed,
    Cancelled,
    Failed,
}

/// One in-flight render attempt
pub struct RenderSession {
    id: RequestId,
    page: usize,
    viewport: Viewport,
    task: Box<dyn RenderTask>,
    state: SessionState,
    superseded: bool,
}

impl RenderSession {
    #[must_use]
    pub fn new(id: RequestId, page: usize, viewport: Viewport, task: Box<dyn RenderTask>) -> Self {
        Self {
            id,
            page,
            viewport,
            task,
            state: SessionState::Pending,
            superseded: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    #[must_use]
    pub fn page(&self) -> usize {
        self.page
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a newer draw request asked this session to stop
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.superseded
    }
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("id", &self.id)
            .field("page", &self.page)
            .field("viewport", &self.viewport)
            .field("state", &self.state)
            .field("superseded", &self.superseded)
            .finish_non_exhaustive()
    }
}

/// What to do after a render completion was recorded
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Report success for the session's page
    Completed,
    /// Draw again with current parameters
    Retry,
    /// Report the failure
    Failed(RenderError),
    /// Completion of a session that is no longer tracked; ignore it
    Stale,
}

/// Holder of the display's one pending render session
#[derive(Debug, Default)]
pub struct SessionSlot {
    pending: Option<RenderSession>,
    /// Most recently finished session, kept for inspection
    last: Option<RenderSession>,
}

impl SessionSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub fn pending(&self) -> Option<&RenderSession> {
        self.pending.as_ref()
    }

    /// Last session that received its completion
    #[must_use]
    pub fn last_finished(&self) -> Option<&RenderSession> {
        self.last.as_ref()
    }

    /// Track a newly started render.
    ///
    /// Callers must check [`SessionSlot::is_pending`] first; starting over a
    /// pending session would break single-flight.
    pub fn begin(&mut self, session: RenderSession) {
        debug_assert!(self.pending.is_none(), "render already in flight");
        debug!(
            "Render {:?} started for page {} at {:.0}x{:.0}",
            session.id, session.page, session.viewport.width, session.viewport.height
        );
        self.pending = Some(session);
    }

    /// Cancel the pending session because a newer draw was requested.
    ///
    /// Returns false when nothing is pending.
    pub fn supersede(&mut self) -> bool {
        let Some(session) = self.pending.as_mut() else {
            return false;
        };
        if !session.superseded {
            debug!("Render {:?} superseded, cancelling", session.id);
            session.superseded = true;
        }
        session.task.cancel();
        true
    }

    /// Record the engine's answer for render `id`
    pub fn finish(&mut self, id: RequestId, result: Result<(), RenderError>) -> Outcome {
        if self.pending.as_ref().map(RenderSession::id) != Some(id) {
            debug!("Ignoring completion of untracked render {id:?}");
            return Outcome::Stale;
        }
        let Some(mut session) = self.pending.take() else {
            return Outcome::Stale;
        };

        let (state, outcome) = match result {
            // The engine finished before our cancel reached it; a newer draw
            // is waiting on this completion either way.
            _ if session.superseded => (SessionState::Cancelled, Outcome::Retry),
            Ok(()) => (SessionState::Completed, Outcome::Completed),
            Err(RenderError::Cancelled) => (SessionState::Cancelled, Outcome::Retry),
            Err(error) => (SessionState::Failed, Outcome::Failed(error)),
        };
        session.state = state;
        debug!(
            "Render {id:?} for page {} ended {:?}",
            session.page, session.state
        );
        self.last = Some(session);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    struct CountingTask(Rc<Cell<u32>>);

    impl RenderTask for CountingTask {
        fn cancel(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn session(id: u64, cancels: &Rc<Cell<u32>>) -> RenderSession {
        RenderSession::new(
            RequestId::new(id),
            1,
            Viewport::for_page(10.0, 10.0, 1.0, 0),
            Box::new(CountingTask(Rc::clone(cancels))),
        )
    }

    #[test]
    fn success_completes_session() {
        let cancels = Rc::new(Cell::new(0));
        let mut slot = SessionSlot::new();
        slot.begin(session(1, &cancels));

        assert_eq!(slot.finish(RequestId::new(1), Ok(())), Outcome::Completed);
        assert!(!slot.is_pending());
        assert_eq!(cancels.get(), 0);
    }

    #[test]
    fn supersede_cancels_and_cancellation_retries() {
        let cancels = Rc::new(Cell::new(0));
        let mut slot = SessionSlot::new();
        slot.begin(session(1, &cancels));

        assert!(slot.supersede());
        assert!(slot.supersede());
        assert_eq!(cancels.get(), 2);
        assert!(slot.pending().is_some_and(RenderSession::is_superseded));

        let outcome = slot.finish(RequestId::new(1), Err(RenderError::Cancelled));
        assert_eq!(outcome, Outcome::Retry);
        assert!(!slot.is_pending());
    }

    #[test]
    fn late_success_of_superseded_session_retries() {
        let cancels = Rc::new(Cell::new(0));
        let mut slot = SessionSlot::new();
        slot.begin(session(1, &cancels));
        slot.supersede();

        assert_eq!(slot.finish(RequestId::new(1), Ok(())), Outcome::Retry);
    }

    #[test]
    fn failure_is_reported_without_retry() {
        let cancels = Rc::new(Cell::new(0));
        let mut slot = SessionSlot::new();
        slot.begin(session(1, &cancels));

        let outcome = slot.finish(RequestId::new(1), Err(RenderError::Failed("boom".into())));
        assert_eq!(outcome, Outcome::Failed(RenderError::Failed("boom".into())));
        assert!(!slot.is_pending());
        assert_eq!(
            slot.last_finished().map(RenderSession::state),
            Some(SessionState::Failed)
        );
    }

    #[test]
    fn late_failure_of_superseded_session_retries() {
        let cancels = Rc::new(Cell::new(0));
        let mut slot = SessionSlot::new();
        slot.begin(session(1, &cancels));
        slot.supersede();

        let outcome = slot.finish(RequestId::new(1), Err(RenderError::Failed("boom".into())));
        assert_eq!(outcome, Outcome::Retry);
        assert_eq!(
            slot.last_finished().map(RenderSession::state),
            Some(SessionState::Cancelled)
        );
    }

    #[test]
    fn finished_session_keeps_its_final_state() {
        let cancels = Rc::new(Cell::new(0));
        let mut slot = SessionSlot::new();
        assert!(slot.last_finished().is_none());

        slot.begin(session(1, &cancels));
        assert_eq!(slot.pending().map(RenderSession::state), Some(SessionState::Pending));
        slot.finish(RequestId::new(1), Ok(()));

        let last = slot.last_finished().unwrap();
        assert_eq!(last.id(), RequestId::new(1));
        assert_eq!(last.state(), SessionState::Completed);
    }

    #[test]
    fn unknown_completion_is_stale() {
        let cancels = Rc::new(Cell::new(0));
        let mut slot = SessionSlot::new();
        assert_eq!(slot.finish(RequestId::new(9), Ok(())), Outcome::Stale);
        assert!(!slot.supersede());

        slot.begin(session(2, &cancels));
        assert_eq!(slot.finish(RequestId::new(1), Ok(())), Outcome::Stale);
        assert!(slot.is_pending());
    }
}
