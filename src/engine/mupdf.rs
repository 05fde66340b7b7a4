//! MuPDF backed engine
//!
//! All MuPDF objects live on one worker thread. Handles returned to the
//! pipeline only carry ids and a request sender, and every operation is a
//! message on a flume channel answered through the operation's [`Reply`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender};
use log::{debug, error, warn};
use mupdf::{Colorspace, Document, Matrix, Page};

use super::{
    DocumentHandle, Engine, OpenError, OpenOptions, PageError, PageHandle, RenderError,
    RenderTask, Reply, Source,
};
use crate::canvas::RenderContext;
use crate::viewport::{Viewport, normalize_rotation};

/// Reported engine version
pub const MUPDF_VERSION: &str = "1.26";

const PDF_MAGIC: &str = "application/pdf";

type DocumentId = u64;

enum WorkerRequest {
    Open {
        id: DocumentId,
        source: Source,
        reply: Reply<Result<usize, OpenError>>,
    },
    LoadPage {
        id: DocumentId,
        number: usize,
        reply: Reply<Result<(f64, f64), PageError>>,
    },
    Render {
        id: DocumentId,
        number: usize,
        viewport: Viewport,
        context: RenderContext,
        cancelled: Arc<AtomicBool>,
        reply: Reply<Result<(), RenderError>>,
    },
    Close(DocumentId),
    Shutdown,
}

/// Engine running MuPDF on a dedicated thread
pub struct MupdfEngine {
    request_tx: Sender<WorkerRequest>,
    worker: Option<JoinHandle<()>>,
    next_document_id: DocumentId,
}

impl MupdfEngine {
    /// Spawn the worker thread
    pub fn new() -> std::io::Result<Self> {
        let (request_tx, request_rx) = flume::unbounded();
        let worker = thread::Builder::new()
            .name("mupdf-worker".to_string())
            .spawn(move || worker_loop(&request_rx))?;

        Ok(Self {
            request_tx,
            worker: Some(worker),
            next_document_id: 1,
        })
    }
}

impl Drop for MupdfEngine {
    fn drop(&mut self) {
        let _ = self.request_tx.send(WorkerRequest::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("MuPDF worker panicked");
            }
        }
    }
}

impl Engine for MupdfEngine {
    type Document = MupdfDocument;
    type Page = MupdfPage;

    fn version(&self) -> &str {
        MUPDF_VERSION
    }

    fn set_worker_source(&mut self, worker_src: &str) {
        // MuPDF runs in-process; the location is only informational.
        debug!("Ignoring worker source {worker_src}");
    }

    fn open(
        &mut self,
        source: &Source,
        options: &OpenOptions,
        reply: Reply<Result<MupdfDocument, OpenError>>,
    ) {
        if options.with_credentials || options.cmap_url.is_some() {
            debug!("MuPDF ignores credential and cmap options: {options:?}");
        }

        let id = self.next_document_id;
        self.next_document_id += 1;

        let worker = self.request_tx.clone();
        let reply = reply.map(move |result: Result<usize, OpenError>| {
            result.map(|page_count| MupdfDocument {
                id,
                page_count,
                worker,
            })
        });

        let request = WorkerRequest::Open {
            id,
            source: source.clone(),
            reply,
        };
        if let Err(flume::SendError(request)) = self.request_tx.send(request) {
            if let WorkerRequest::Open { reply, .. } = request {
                reply.send(Err(OpenError::Engine("worker is not running".to_string())));
            }
        }
    }
}

impl std::fmt::Debug for MupdfEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MupdfEngine")
            .field("next_document_id", &self.next_document_id)
            .finish_non_exhaustive()
    }
}

/// Document opened on the worker thread. Dropping it closes the document.
pub struct MupdfDocument {
    id: DocumentId,
    page_count: usize,
    worker: Sender<WorkerRequest>,
}

impl DocumentHandle for MupdfDocument {
    type Page = MupdfPage;

    fn page_count(&self) -> usize {
        self.page_count
    }

    fn load_page(&self, number: usize, reply: Reply<Result<MupdfPage, PageError>>) {
        let id = self.id;
        let worker = self.worker.clone();
        let reply = reply.map(move |result: Result<(f64, f64), PageError>| {
            result.map(|(width, height)| MupdfPage {
                document: id,
                number,
                width,
                height,
                worker,
            })
        });

        let request = WorkerRequest::LoadPage { id, number, reply };
        if let Err(flume::SendError(request)) = self.worker.send(request) {
            if let WorkerRequest::LoadPage { reply, .. } = request {
                reply.send(Err(PageError::Engine("worker is not running".to_string())));
            }
        }
    }
}

impl Drop for MupdfDocument {
    fn drop(&mut self) {
        let _ = self.worker.send(WorkerRequest::Close(self.id));
    }
}

impl std::fmt::Debug for MupdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MupdfDocument")
            .field("id", &self.id)
            .field("page_count", &self.page_count)
            .finish_non_exhaustive()
    }
}

/// Page of a [`MupdfDocument`], sized in points
pub struct MupdfPage {
    document: DocumentId,
    number: usize,
    width: f64,
    height: f64,
    worker: Sender<WorkerRequest>,
}

impl PageHandle for MupdfPage {
    fn number(&self) -> usize {
        self.number
    }

    fn intrinsic_rotation(&self) -> i32 {
        // Page bounds already have /Rotate applied.
        0
    }

    fn viewport(&self, scale: f64, rotation: i32) -> Viewport {
        Viewport::for_page(self.width, self.height, scale, rotation)
    }

    fn render(
        &self,
        context: RenderContext,
        viewport: Viewport,
        reply: Reply<Result<(), RenderError>>,
    ) -> Box<dyn RenderTask> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let request = WorkerRequest::Render {
            id: self.document,
            number: self.number,
            viewport,
            context,
            cancelled: Arc::clone(&cancelled),
            reply,
        };
        if let Err(flume::SendError(request)) = self.worker.send(request) {
            if let WorkerRequest::Render { reply, .. } = request {
                reply.send(Err(RenderError::Engine("worker is not running".to_string())));
            }
        }
        Box::new(MupdfRenderTask { cancelled })
    }
}

impl std::fmt::Debug for MupdfPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MupdfPage")
            .field("document", &self.document)
            .field("number", &self.number)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

struct MupdfRenderTask {
    cancelled: Arc<AtomicBool>,
}

impl RenderTask for MupdfRenderTask {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

fn worker_loop(requests: &Receiver<WorkerRequest>) {
    let mut documents: HashMap<DocumentId, Document> = HashMap::new();

    for request in requests {
        match request {
            WorkerRequest::Open { id, source, reply } => match open_source(&source) {
                Ok(document) => match document.page_count() {
                    Ok(count) => {
                        debug!("Opened {} as document {id}", source.describe());
                        documents.insert(id, document);
                        reply.send(Ok(usize::try_from(count).unwrap_or(0)));
                    }
                    Err(e) => reply.send(Err(OpenError::Format(e.to_string()))),
                },
                Err(e) => {
                    warn!("Failed to open {}: {e}", source.describe());
                    reply.send(Err(e));
                }
            },

            WorkerRequest::LoadPage { id, number, reply } => {
                let result = match documents.get(&id) {
                    Some(document) => page_size(document, number),
                    None => Err(PageError::Engine(format!("document {id} is closed"))),
                };
                reply.send(result);
            }

            WorkerRequest::Render {
                id,
                number,
                viewport,
                context,
                cancelled,
                reply,
            } => {
                let result = match documents.get(&id) {
                    Some(document) => render(document, number, &viewport, &context, &cancelled),
                    None => Err(RenderError::Engine(format!("document {id} is closed"))),
                };
                reply.send(result);
            }

            WorkerRequest::Close(id) => {
                documents.remove(&id);
            }

            WorkerRequest::Shutdown => break,
        }
    }
}

fn open_source(source: &Source) -> Result<Document, OpenError> {
    match source {
        Source::Bytes(bytes) => Document::from_bytes(bytes, PDF_MAGIC)
            .map_err(|e| OpenError::Format(e.to_string())),
        Source::Url(url) => {
            let path = local_path(url)?;
            if !path.exists() {
                return Err(OpenError::Fetch {
                    location: url.clone(),
                    detail: "no such file".to_string(),
                });
            }
            Document::open(path.to_string_lossy().as_ref())
                .map_err(|e| OpenError::Format(e.to_string()))
        }
    }
}

/// Filesystem path for a `file://` URL or a plain path
fn local_path(url: &str) -> Result<&Path, OpenError> {
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(Path::new(path));
    }
    if url.contains("://") {
        return Err(OpenError::Unsupported(format!(
            "{url}: only local files can be opened"
        )));
    }
    Ok(Path::new(url))
}

fn load(document: &Document, number: usize) -> Result<Page, PageError> {
    let count = document
        .page_count()
        .map_err(|e| PageError::Engine(e.to_string()))?;
    let page_count = usize::try_from(count).unwrap_or(0);
    if number == 0 || number > page_count {
        return Err(PageError::InvalidIndex {
            index: number,
            page_count,
        });
    }
    let index = i32::try_from(number - 1).map_err(|e| PageError::Engine(e.to_string()))?;
    document.load_page(index).map_err(|e| PageError::Decode {
        index: number,
        detail: e.to_string(),
    })
}

fn page_size(document: &Document, number: usize) -> Result<(f64, f64), PageError> {
    let page = load(document, number)?;
    let bounds = page.bounds().map_err(|e| PageError::Decode {
        index: number,
        detail: e.to_string(),
    })?;
    Ok((
        f64::from(bounds.x1 - bounds.x0),
        f64::from(bounds.y1 - bounds.y0),
    ))
}

fn render(
    document: &Document,
    number: usize,
    viewport: &Viewport,
    context: &RenderContext,
    cancelled: &AtomicBool,
) -> Result<(), RenderError> {
    if cancelled.load(Ordering::Acquire) {
        return Err(RenderError::Cancelled);
    }

    let page = load(document, number).map_err(|e| RenderError::Failed(e.to_string()))?;
    let bounds = page
        .bounds()
        .map_err(|e| RenderError::Failed(e.to_string()))?;
    let transform = page_transform(
        (bounds.x0, bounds.y0, bounds.x1, bounds.y1),
        viewport.scale as f32,
        viewport.rotation,
    );

    let rgb = Colorspace::device_rgb();
    let pixmap = page
        .to_pixmap(&transform, &rgb, false, false)
        .map_err(|e| RenderError::Failed(e.to_string()))?;

    if cancelled.load(Ordering::Acquire) {
        return Err(RenderError::Cancelled);
    }

    let channels = pixmap.n() as usize;
    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * channels;
    if channels < 3 || row_bytes > stride || samples.len() < stride * height {
        return Err(RenderError::Failed(format!(
            "unsupported pixmap layout: {channels} channels, stride {stride}"
        )));
    }

    context.with_bitmap(|bitmap| {
        bitmap.fill([0xFF, 0xFF, 0xFF, 0xFF]);
        for y in 0..height {
            let start = y * stride;
            let Ok(row) = u32::try_from(y) else { break };
            bitmap.write_row(row, &samples[start..start + row_bytes], channels);
        }
    });
    Ok(())
}

/// Maps page space onto a `scale`d, clockwise `rotation`ed raster whose top
/// left corner is the origin.
fn page_transform(bounds: (f32, f32, f32, f32), scale: f32, rotation: i32) -> Matrix {
    let (x0, y0, x1, y1) = bounds;
    let s = scale;
    match normalize_rotation(rotation) / 90 {
        1 => Matrix::new(0.0, s, -s, 0.0, y1 * s, -x0 * s),
        2 => Matrix::new(-s, 0.0, 0.0, -s, x1 * s, y1 * s),
        3 => Matrix::new(0.0, -s, s, 0.0, -y0 * s, x1 * s),
        _ => Matrix::new(s, 0.0, 0.0, s, -x0 * s, -y0 * s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
        (m.a * x + m.c * y + m.e, m.b * x + m.d * y + m.f)
    }

    #[test]
    fn transform_maps_page_corners_into_raster() {
        let bounds = (0.0, 0.0, 100.0, 50.0);

        let upright = page_transform(bounds, 2.0, 0);
        assert_eq!(apply(&upright, 100.0, 50.0), (200.0, 100.0));

        // Clockwise: the top left corner becomes the top right one.
        let quarter = page_transform(bounds, 1.0, 90);
        assert_eq!(apply(&quarter, 0.0, 0.0), (50.0, 0.0));
        assert_eq!(apply(&quarter, 100.0, 50.0), (0.0, 100.0));

        let half = page_transform(bounds, 1.0, -180);
        assert_eq!(apply(&half, 0.0, 0.0), (100.0, 50.0));

        let three = page_transform(bounds, 1.0, 270);
        assert_eq!(apply(&three, 0.0, 0.0), (0.0, 100.0));
    }

    #[test]
    fn only_local_urls_are_opened() {
        assert_eq!(local_path("file:///tmp/a.pdf").unwrap(), Path::new("/tmp/a.pdf"));
        assert_eq!(local_path("docs/a.pdf").unwrap(), Path::new("docs/a.pdf"));
        assert!(matches!(
            local_path("https://example.com/a.pdf"),
            Err(OpenError::Unsupported(_))
        ));
    }
}
