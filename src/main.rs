//! folio-sim: headless scroll simulation over a synthetic document.
//!
//! Drives the full render pipeline the way a viewer would: set a
//! viewport, scroll through the document in steps, wait for the visible
//! pages to settle, and report cache behavior at the end. Optionally
//! dumps the final composed frame as a PNG.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info};
use simplelog::{Config as LogConfig, WriteLogger};

use folio::{
    Command, RenderConfig, RenderService, SlotState, Surface, SyntheticSource, ViewerEvent,
};

#[derive(Parser, Debug)]
#[command(
    name = "folio-sim",
    about = "Scroll-simulation harness for the folio render pipeline"
)]
struct Args {
    /// Number of synthetic pages
    #[arg(long, default_value_t = 40)]
    pages: usize,

    /// Intrinsic page width in document units
    #[arg(long, default_value_t = 800.0)]
    page_width: f32,

    /// Intrinsic page height in document units
    #[arg(long, default_value_t = 1000.0)]
    page_height: f32,

    /// Viewport width in logical pixels
    #[arg(long, default_value_t = 800)]
    width: u32,

    /// Viewport height in logical pixels
    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Scroll step between frames, in layout pixels
    #[arg(long, default_value_t = 400)]
    step: u64,

    /// Per-page render latency in milliseconds
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Cache budget in mebibytes
    #[arg(long)]
    budget_mb: Option<usize>,

    /// Lookahead/lookbehind in viewport heights
    #[arg(long)]
    buffer_pages: Option<u32>,

    /// Render worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Device pixel scale
    #[arg(long)]
    scale: Option<f32>,

    /// Optional YAML config file; flags above override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the final composed frame to this PNG file
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Log file path
    #[arg(long, default_value = "folio-sim.log")]
    log_file: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    WriteLogger::init(
        LevelFilter::Debug,
        LogConfig::default(),
        File::create(&args.log_file).context("creating log file")?,
    )
    .context("initializing logger")?;

    let mut config = match &args.config {
        Some(path) => RenderConfig::load(path),
        None => RenderConfig::default(),
    };
    if let Some(mb) = args.budget_mb {
        config.cache_budget_bytes = mb * 1024 * 1024;
    }
    if let Some(buffer) = args.buffer_pages {
        config.buffer_pages = buffer;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(scale) = args.scale {
        config.device_pixel_scale = scale;
    }
    let config = config.sanitized();

    let mut source = SyntheticSource::uniform(args.pages, args.page_width, args.page_height);
    if args.delay_ms > 0 {
        source = source.with_delay(Duration::from_millis(args.delay_ms));
    }
    let renders = source.render_counter();

    let mut service = RenderService::open(Arc::new(source), config);
    service.apply(Command::SetViewport {
        width: args.width,
        height: args.height,
    });

    pump_until(&mut service, Duration::from_secs(10), |svc, _| {
        svc.layout().is_some()
    })?;
    let total_height = service.view().total_height;
    info!("layout ready: total height {total_height}px");

    let started = Instant::now();
    let mut frames = 0u64;
    let mut scroll = 0u64;
    loop {
        service.apply(Command::SetScroll(scroll));
        pump_until(&mut service, Duration::from_secs(30), |svc, fatal| {
            fatal
                || svc
                    .view()
                    .slots
                    .iter()
                    .all(|s| s.state != SlotState::Pending)
        })?;
        if service.fatal_error().is_some() {
            bail!("document became unusable mid-scroll");
        }
        frames += 1;

        let max_scroll = service.state().max_scroll();
        if scroll >= max_scroll {
            break;
        }
        scroll = (scroll + args.step).min(max_scroll);
    }

    let stats = service.cache_stats();
    let rendered = renders.load(std::sync::atomic::Ordering::SeqCst);
    println!("scrolled {frames} frames in {:.2?}", started.elapsed());
    println!(
        "source renders: {rendered} ({} pages, {:.1} renders/page)",
        args.pages,
        rendered as f64 / args.pages as f64
    );
    println!(
        "cache: {} hits, {} misses, {} evictions",
        stats.hits, stats.misses, stats.evictions
    );

    if let Some(path) = &args.dump {
        let frame = compose_frame(&service);
        write_png(path, &frame).with_context(|| format!("writing {}", path.display()))?;
        println!("final frame written to {}", path.display());
    }

    service.close();
    Ok(())
}

/// Pump worker responses until `done` returns true or the deadline passes
fn pump_until(
    service: &mut RenderService,
    deadline: Duration,
    done: impl Fn(&RenderService, bool) -> bool,
) -> Result<()> {
    let started = Instant::now();
    let mut fatal = false;
    loop {
        for event in service.pump() {
            if event == ViewerEvent::Fatal {
                fatal = true;
            }
        }
        if done(service, fatal) {
            return Ok(());
        }
        if started.elapsed() > deadline {
            bail!("timed out waiting for the pipeline to settle");
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Compose the visible pages into one viewport-sized frame, in device
/// pixels, the way a display layer would.
fn compose_frame(service: &RenderService) -> Surface {
    let view = service.view();
    let dps = f64::from(service.state().device_pixel_scale);
    let scale = |v: u64| (v as f64 * dps).round() as i64;

    let mut frame = Surface::new(
        (f64::from(view.viewport_width) * dps).round() as u32,
        (f64::from(view.viewport_height) * dps).round() as u32,
    );
    for slot in &view.slots {
        if let Some(surface) = service.page_surface(slot.page) {
            let y = scale(slot.offset) - scale(view.scroll_top);
            frame.blit_surface(surface, 0, y);
        }
    }
    frame
}

fn write_png(path: &std::path::Path, frame: &Surface) -> Result<()> {
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width(), frame.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(frame.pixels())?;
    Ok(())
}
