use anyhow::{bail, Context, Result};
use clap::Parser;
use geo::Rect;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

mod input;
mod output;

use input::{read_snapshot, read_static};
use livetrack_core::prelude::*;
use output::write_snapshot_geojson;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "tracker-sim",
    author,
    version,
    about = "Replay recorded feed snapshots through the live vehicle tracker",
    long_about = "Loads a static network, resolves shared-track offsets, then replays \
                  recorded feed snapshots one refresh cycle at a time on a simulated \
                  clock. The offset routes and the vehicle footprints of the final \
                  frame are written as a GeoJSON FeatureCollection.\n\n\
                  Snapshots are consumed in the order given, per vehicle class, \
                  following the configured refresh cadence."
)]
struct Args {
    /// Static network JSON (routes, stops, shapes)
    #[arg(short = 's', long = "static")]
    static_path: PathBuf,

    /// Recorded feed snapshot JSON; repeat for each cycle
    #[arg(long = "snapshot", required = true)]
    snapshots: Vec<PathBuf>,

    /// Tracker configuration JSON (defaults apply to missing keys)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera bounds as min_lon,min_lat,max_lon,max_lat (default: service bounds)
    #[arg(long, value_parser = parse_bbox)]
    bbox: Option<Rect>,

    /// Camera zoom level
    #[arg(short, long, default_value_t = 14.0)]
    zoom: f64,

    /// Time after the last refresh at which the frame is rendered
    /// (default: one animation duration, so vehicles have settled)
    #[arg(long)]
    elapsed_ms: Option<u64>,

    /// Output GeoJSON file
    #[arg(short, long)]
    output: PathBuf,

    /// Verbose output (show debug messages)
    #[arg(short, long)]
    verbose: bool,
}

fn parse_bbox(value: &str) -> std::result::Result<Rect, String> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in bbox: {e}"))?;

    match parts[..] {
        [min_lon, min_lat, max_lon, max_lat] if min_lon < max_lon && min_lat < max_lat => {
            Ok(Rect::new((min_lon, min_lat), (max_lon, max_lat)))
        }
        [_, _, _, _] => Err("bbox minimum must be below maximum".to_owned()),
        _ => Err(format!("bbox needs 4 values, got {}", parts.len())),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<TrackerConfig> {
    let Some(path) = path else {
        return Ok(TrackerConfig::default());
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    TrackerConfig::from_json_str(&text).with_context(|| format!("Invalid configuration in {}", path.display()))
}

/// Run every recorded snapshot through the store, one refresh cycle per
/// simulated refresh interval, and render a single frame at the end
async fn replay(
    config: &TrackerConfig,
    network: Arc<StaticNetwork>,
    feed: &ReplayFeed,
    camera: &CameraState,
    elapsed: Duration,
) -> Result<RenderFrame> {
    let store = VehicleStore::new(network.clone(), config);
    let mut policy = RefreshPolicy::new(config.refresh_cadence.clone());

    let start = Instant::now();
    let mut last_refresh = start;

    while VehicleClass::ALL.iter().any(|&class| feed.remaining(class) > 0) {
        let at = start + Duration::from_millis(config.refresh_interval_ms.saturating_mul(policy.cycle()));
        let report = refresh_cycle(&store, feed, &mut policy, move || at).await;

        if !report.reconciled.is_empty() {
            last_refresh = at;
        }

        for (class, summary) in &report.reconciled {
            tracing::info!(
                cycle = report.cycle,
                %class,
                added = summary.added,
                updated = summary.updated,
                removed = summary.removed,
                rejected = summary.rejected,
                "replayed snapshot"
            );
        }
    }

    let set = store.current();
    if set.is_empty() {
        bail!("No vehicles were tracked from the recorded snapshots");
    }

    let frame = RenderScheduler::new(config.clone()).frame(&set, camera, network.as_ref(), last_refresh + elapsed);
    tracing::info!(
        drawn = frame.footprints.len(),
        culled_viewport = frame.stats.culled_viewport,
        culled_lod = frame.stats.culled_lod,
        skipped = frame.stats.skipped,
        scale = frame.scale,
        "rendered final frame"
    );

    Ok(frame)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    tracing::info!("=== Tracker Simulator ===");
    tracing::info!("Static: {}", args.static_path.display());
    tracing::info!("Snapshots: {}", args.snapshots.len());
    tracing::info!("Output: {}", args.output.display());

    if !args.static_path.exists() {
        bail!("Static network file not found: {}", args.static_path.display());
    }

    let config = load_config(args.config.as_ref())?;

    let feed = read_static(&args.static_path)?;
    let raw = StaticNetwork::from_feed(&feed);
    tracing::info!(routes = raw.routes().len(), stops = raw.stops().len(), "loaded static network");

    let (network, diagnostics) = apply_offsets(&raw, &config.offsets, config.service_bounds);
    let network = Arc::new(network);

    let replay_feed = ReplayFeed::default();
    for path in &args.snapshots {
        replay_feed.push(read_snapshot(path)?);
    }

    let bounds = args.bbox.unwrap_or_else(|| {
        let b = config.service_bounds;
        Rect::new((b.min_lon, b.min_lat), (b.max_lon, b.max_lat))
    });
    let camera = CameraState::from_bounds(bounds, args.zoom);
    let elapsed = args
        .elapsed_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.animation_duration());

    let frame = replay(&config, network.clone(), &replay_feed, &camera, elapsed).await?;

    write_snapshot_geojson(&network, Some(&frame), &diagnostics, &args.output)?;

    tracing::info!("=== Done ===");
    Ok(())
}
