//! Simulate command - fly in over a point and stream tiles frame by frame.
//!
//! The camera descends geometrically from `--start-altitude` to
//! `--end-altitude` (in degrees, the unit of the view space) over `--frames`
//! frames. Each frame runs a full selection pass and dispatches loads; the
//! progress line shows what the frame drew and what is still loading.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tilestream::config::StreamConfig;
use tilestream::coord::Sector;
use tilestream::provider::{UrlBuilder, WmsUrlBuilder, XyzUrlBuilder};
use tilestream::pyramid::LevelSet;
use tilestream::view::RegionView;
use tilestream::{LayerStats, TiledLayer};
use tracing::info;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Remote source protocol.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum SourceKind {
    /// `{z}/{x}/{y}` URL template
    Xyz,
    /// OGC WMS GetMap endpoint
    Wms,
}

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Source protocol
    #[arg(long, value_enum, default_value = "xyz")]
    pub source: SourceKind,

    /// URL template (xyz) or service URL (wms)
    #[arg(long)]
    pub url: Option<String>,

    /// WMS layer names
    #[arg(long, default_value = "")]
    pub layers: String,

    /// Latitude of the target point
    #[arg(long, default_value_t = 46.5, allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude of the target point
    #[arg(long, default_value_t = 7.9, allow_hyphen_values = true)]
    pub lon: f64,

    /// Initial eye altitude
    #[arg(long, default_value_t = 400.0)]
    pub start_altitude: f64,

    /// Final eye altitude
    #[arg(long, default_value_t = 0.5)]
    pub end_altitude: f64,

    /// Half-width of the visible region in degrees
    #[arg(long, default_value_t = 2.0)]
    pub half_extent: f64,

    /// Number of frames to run
    #[arg(long, default_value_t = 300)]
    pub frames: u64,

    /// Delay between frames in milliseconds
    #[arg(long, default_value_t = 33)]
    pub frame_interval_ms: u64,

    /// Number of pyramid levels
    #[arg(long, default_value_t = 12)]
    pub levels: u32,

    /// Level-0 tile size in degrees
    #[arg(long, default_value_t = 36.0)]
    pub level_zero_delta: f64,

    /// Tile size in pixels
    #[arg(long, default_value_t = 512)]
    pub tile_size: u32,

    /// Serve only what is in the local cache
    #[arg(long)]
    pub offline: bool,

    /// Override the configured detail hint
    #[arg(long, allow_hyphen_values = true)]
    pub detail_hint: Option<f64>,
}

/// Eye altitude for `frame` of `frames`, descending geometrically.
pub fn altitude_at(start: f64, end: f64, frame: u64, frames: u64) -> f64 {
    if frames <= 1 || start <= 0.0 || end <= 0.0 {
        return end;
    }
    let t = frame.min(frames - 1) as f64 / (frames - 1) as f64;
    start * (end / start).powf(t)
}

fn build_url_builder(args: &SimulateArgs) -> Result<Option<Arc<dyn UrlBuilder>>, CliError> {
    let Some(url) = args.url.clone() else {
        return Ok(None);
    };
    let builder: Arc<dyn UrlBuilder> = match args.source {
        SourceKind::Xyz => {
            if !url.contains("{z}") || !url.contains("{x}") || !url.contains("{y}") {
                return Err(CliError::Config(format!(
                    "XYZ template must contain {{z}}, {{x}} and {{y}}: {}",
                    url
                )));
            }
            Arc::new(XyzUrlBuilder::new(url).with_max_level(args.levels.saturating_sub(1)))
        }
        SourceKind::Wms => {
            if args.layers.is_empty() {
                return Err(CliError::Config("WMS source requires --layers".to_string()));
            }
            Arc::new(WmsUrlBuilder::new(url, args.layers.clone(), args.tile_size, args.tile_size))
        }
    };
    Ok(Some(builder))
}

fn stream_config(args: &SimulateArgs, base: &StreamConfig) -> StreamConfig {
    let mut config = base.clone();
    if args.offline || args.url.is_none() {
        config.retrieval.enabled = false;
    }
    if let Some(hint) = args.detail_hint {
        config.selection.detail_hint = hint;
    }
    config
}

/// Run the simulate command.
pub fn run(args: SimulateArgs, config_path: Option<&Path>, verbose: bool) -> Result<(), CliError> {
    if args.frames == 0 {
        return Err(CliError::Config("--frames must be at least 1".to_string()));
    }
    let runner = CliRunner::new(config_path, verbose)?;
    runner.log_startup("simulate");

    let config = stream_config(&args, &runner.config().stream);
    let url_builder = build_url_builder(&args)?;
    let pyramid = LevelSet::uniform(
        Sector::FULL_SPHERE,
        args.level_zero_delta,
        args.levels,
        args.tile_size,
        args.tile_size,
    )?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tilestream-worker")
        .build()
        .map_err(CliError::Runtime)?;

    let mut builder = TiledLayer::builder(config.clone(), pyramid).runtime(runtime.handle().clone());
    if let Some(url_builder) = url_builder {
        builder = builder.url_builder(url_builder);
    }
    let mut layer = builder.build()?;

    println!("tilestream simulate v{}", tilestream::VERSION);
    println!("=========================");
    println!();
    println!("Target:     {:.4}, {:.4}", args.lat, args.lon);
    println!("Altitude:   {} -> {}", args.start_altitude, args.end_altitude);
    println!("Pyramid:    {} levels, {}px tiles", args.levels, args.tile_size);
    match &args.url {
        Some(url) if config.retrieval.enabled => println!("Source:     {:?} {}", args.source, url),
        _ => println!("Source:     local cache only"),
    }
    println!("Cache dir:  {}", config.cache.disk_directory.display());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let changes = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&changes);
    layer.on_change(move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    let progress = ProgressBar::new(args.frames);
    progress.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let started = Instant::now();
    let interval = Duration::from_millis(args.frame_interval_ms);
    let mut frames_run = 0;
    for frame in 0..args.frames {
        if shutdown.load(Ordering::SeqCst) {
            progress.println("Interrupted, stopping");
            break;
        }

        let altitude = altitude_at(args.start_altitude, args.end_altitude, frame, args.frames);
        let view = RegionView::looking_down(args.lat, args.lon, altitude, args.half_extent);
        let tiles = layer.frame(&view);
        let deepest = tiles.iter().map(|t| t.key.level()).max().unwrap_or(0);

        let stats = layer.stats();
        progress.set_message(format!(
            "alt {:>8.3} | draw {:>3} ({} fallback) L{} | req {:>3} sent {:>2} | in flight {:>3}",
            altitude,
            stats.render_tiles,
            stats.fallback_tiles,
            deepest,
            stats.last_schedule.unique,
            stats.last_schedule.dispatched,
            stats.loader.in_flight,
        ));
        progress.inc(1);
        frames_run += 1;

        std::thread::sleep(interval);
    }
    progress.finish_and_clear();

    let stats = layer.stats();
    layer.shutdown();
    runtime.shutdown_timeout(Duration::from_secs(2));

    info!(frames = frames_run, elapsed_ms = started.elapsed().as_millis() as u64, "Simulation finished");
    print_summary(&stats, frames_run, changes.load(Ordering::Relaxed), started.elapsed());
    Ok(())
}

fn print_summary(stats: &LayerStats, frames: u64, changes: u64, elapsed: Duration) {
    println!("{}", style("Session Summary").bold());
    println!("───────────────");
    println!("  Frames:          {} in {:.1}s", frames, elapsed.as_secs_f64());
    println!(
        "  Last frame:      {} tiles drawn, {} from ancestors",
        stats.render_tiles, stats.fallback_tiles
    );
    println!(
        "  Loads:           {} dispatched, {} local, {} retrieved",
        stats.loader.dispatched, stats.loader.local_hits, stats.loader.retrieved
    );
    println!(
        "  Absent:          {} tiles ({} no-data, {} undecodable)",
        stats.absent_tiles, stats.loader.no_data, stats.loader.decode_failures
    );
    println!(
        "  Failures:        {} transport, {} corrupt local files removed",
        stats.loader.transport_failures, stats.loader.corrupt_removed
    );
    println!(
        "  Retrieval queue: {} submitted, {} stale, {} rejected",
        stats.retrieval.submitted, stats.retrieval.abandoned_stale, stats.retrieval.rejected
    );
    println!(
        "  Memory cache:    {} tiles, {:.1} MB of {:.1} MB, {:.0}% hit rate, {} evictions",
        stats.cache.entry_count,
        stats.cache.used_bytes as f64 / (1024.0 * 1024.0),
        stats.cache.capacity_bytes as f64 / (1024.0 * 1024.0),
        stats.cache.hit_rate() * 100.0,
        stats.cache.evictions
    );
    println!("  Change events:   {}", changes);
}
