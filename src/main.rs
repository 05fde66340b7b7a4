use std::cell::RefCell;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info, warn};
use simplelog::{ColorChoice, TermLogger, TerminalMode, WriteLogger};

use pdf_display::canvas::Canvas;
use pdf_display::config;
use pdf_display::display::{Callbacks, PdfDisplay};
use pdf_display::engine::{OpenError, PageError, RenderError, Source};
use pdf_display::engine::mupdf::MupdfEngine;
use pdf_display::panic_handler;

/// Render one page of a PDF document to a PNG file
#[derive(Parser, Debug)]
#[command(name = "pdf-display", version, about)]
struct Args {
    /// Path or file:// URL of the document
    document: String,

    /// 1-based page number
    #[arg(long, short, default_value_t = 1)]
    page: usize,

    /// Scale factor (overrides the config file)
    #[arg(long, short)]
    scale: Option<f64>,

    /// Extra clockwise rotation in degrees
    #[arg(long)]
    rotate: Option<i32>,

    /// Device pixel ratio of the target display
    #[arg(long)]
    dpr: Option<f64>,

    /// Where to write the rendered page
    #[arg(long, short, default_value = "page.png")]
    output: PathBuf,

    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log to this file instead of the terminal
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long, short)]
    verbose: bool,

    /// Send credentials with remote requests
    #[arg(long)]
    with_credentials: bool,

    /// Base location of character maps
    #[arg(long)]
    cmap_url: Option<String>,

    /// Load the document in memory before handing it to the engine
    #[arg(long)]
    read_bytes: bool,
}

fn init_logging(args: &Args) -> Result<()> {
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let log_config = simplelog::Config::default();

    match &args.log_file {
        Some(path) => WriteLogger::init(
            level,
            log_config,
            File::create(path).with_context(|| format!("creating log file {path:?}"))?,
        )?,
        None => TermLogger::init(level, log_config, TerminalMode::Stderr, ColorChoice::Auto)?,
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    panic_handler::initialize_panic_handler();

    let config = config::load(args.config.as_deref());

    let source = if args.read_bytes {
        let bytes = std::fs::read(&args.document)
            .with_context(|| format!("reading {}", args.document))?;
        Source::bytes(bytes)
    } else {
        Source::Url(args.document.clone())
    };

    let mut params = config.display_params();
    params.source = Some(source);
    params.page = args.page;
    if let Some(scale) = args.scale {
        params.scale = scale;
    }
    if let Some(rotation) = args.rotate {
        params.rotation = rotation;
    }
    if args.with_credentials {
        params.with_credentials = true;
    }
    if let Some(cmap_url) = &args.cmap_url {
        params.cmap_url = Some(cmap_url.clone());
    }
    let dpr = args.dpr.unwrap_or(config.device_pixel_ratio);

    let engine = MupdfEngine::new().context("starting the MuPDF worker")?;
    let mut display = PdfDisplay::with_options(engine, config.pipeline_options());
    display.attach_canvas(Canvas::new(dpr));

    let failure: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
    let rendered = Rc::new(RefCell::new(false));
    display.set_callbacks(
        Callbacks::new()
            .on_document_load_fail({
                let failure = Rc::clone(&failure);
                move |e: &OpenError| *failure.borrow_mut() = Some(format!("cannot open document: {e}"))
            })
            .on_page_load_fail({
                let failure = Rc::clone(&failure);
                move |e: &PageError| *failure.borrow_mut() = Some(format!("cannot load page: {e}"))
            })
            .on_page_render_fail({
                let failure = Rc::clone(&failure);
                move |e: &RenderError| *failure.borrow_mut() = Some(format!("cannot render page: {e}"))
            })
            .on_page_render_success({
                let rendered = Rc::clone(&rendered);
                move |_: &_| *rendered.borrow_mut() = true
            }),
    );

    display.update(params);

    let deadline = Instant::now() + Duration::from_millis(config.settle_timeout_ms);
    while !display.is_idle() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!("timed out after {} ms", config.settle_timeout_ms);
        }
        display.wait(remaining);
    }

    if let Some(message) = failure.borrow_mut().take() {
        bail!(message);
    }
    if !*rendered.borrow() {
        warn!("Pipeline settled without a rendered page");
        bail!("nothing was rendered");
    }

    let Some(canvas) = display.canvas() else {
        bail!("canvas was detached");
    };
    let bitmap = canvas.snapshot();
    let out = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    bitmap.write_png(BufWriter::new(out))?;

    let size = canvas.display_size();
    info!(
        "Wrote {}x{} page to {} (displayed at {}x{})",
        bitmap.width(),
        bitmap.height(),
        args.output.display(),
        size.width,
        size.height
    );
    Ok(())
}
