//! The running tracker.
//!
//! Two cooperative tasks share one published vehicle set:
//!
//! - **refresh** fetches due classes on a fixed timer and reconciles them
//!   into the store, which swaps in a new set when done
//! - **frames** ticks at the frame budget, reads whichever set is current
//!   and hands the resulting frame to the host
//!
//! Animations are plain data evaluated against the frame clock, so there
//! is nothing per vehicle to schedule or tear down beyond the set itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use livetrack_transit::{StaticNetwork, VehicleClass};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::host::MapHost;
use crate::render::RenderScheduler;
use crate::source::FeedSource;
use crate::store::{ReconcileSummary, RefreshPolicy, VehicleSetReader, VehicleStore};

/// Clock reading that follows tokio's paused time in tests
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Outcome of one refresh cycle
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub reconciled: Vec<(VehicleClass, ReconcileSummary)>,
    pub failed: Vec<VehicleClass>,
}

/// Fetch and reconcile every class due this cycle, then advance the policy.
///
/// `clock` is read once per class after its fetch resolves, so new
/// animations start from where each vehicle is drawn at that moment.
/// A failed fetch leaves that class's vehicles as they were.
pub async fn refresh_cycle(
    store: &VehicleStore,
    feed: &dyn FeedSource,
    policy: &mut RefreshPolicy,
    clock: impl Fn() -> Instant,
) -> CycleReport {
    let mut report = CycleReport {
        cycle: policy.cycle(),
        ..Default::default()
    };

    for class in policy.due_classes() {
        match feed.fetch(class).await {
            Ok(snapshot) => {
                let summary = store.reconcile(&snapshot, clock());
                report.reconciled.push((snapshot.class, summary));
            }
            Err(err) => {
                warn!(%class, %err, "feed refresh failed, keeping previous vehicles");
                report.failed.push(class);
            }
        }
    }

    policy.advance();
    report
}

pub struct Tracker<H: MapHost + 'static> {
    store: Arc<VehicleStore>,
    shutdown: watch::Sender<bool>,
    refresh: JoinHandle<()>,
    frames: JoinHandle<H>,
}

impl<H: MapHost + 'static> Tracker<H> {
    /// Start both loops on the current tokio runtime.
    ///
    /// `network` should already have track offsets applied.
    pub fn spawn(
        config: TrackerConfig,
        network: Arc<StaticNetwork>,
        feed: Arc<dyn FeedSource>,
        host: H,
    ) -> Self {
        let store = Arc::new(VehicleStore::new(network.clone(), &config));
        let (shutdown, shutdown_rx) = watch::channel(false);

        info!(
            refresh_ms = config.refresh_interval_ms,
            frame_ms = config.frame_interval_ms,
            routes = network.routes().len(),
            "starting tracker"
        );

        let refresh = tokio::spawn(refresh_loop(
            store.clone(),
            feed,
            RefreshPolicy::new(config.refresh_cadence.clone()),
            config.refresh_interval(),
            shutdown_rx.clone(),
        ));

        let frames = tokio::spawn(frame_loop(
            host,
            store.subscribe(),
            network,
            RenderScheduler::new(config.clone()),
            config.frame_interval(),
            shutdown_rx,
        ));

        Self {
            store,
            shutdown,
            refresh,
            frames,
        }
    }

    pub fn vehicles(&self) -> VehicleSetReader {
        self.store.subscribe()
    }

    /// Stop both loops, freeze every vehicle where it is and hand back the host
    pub async fn shutdown(self) -> Result<H> {
        self.shutdown.send_replace(true);

        self.refresh
            .await
            .map_err(|err| TrackerError::TaskFailed(err.to_string()))?;
        let host = self
            .frames
            .await
            .map_err(|err| TrackerError::TaskFailed(err.to_string()))?;

        self.store.cancel_all(now());
        info!("tracker stopped");

        Ok(host)
    }
}

async fn refresh_loop(
    store: Arc<VehicleStore>,
    feed: Arc<dyn FeedSource>,
    mut policy: RefreshPolicy,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = interval.tick() => {}
        }

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            report = refresh_cycle(&store, feed.as_ref(), &mut policy, now) => {
                debug!(cycle = report.cycle, failed = report.failed.len(), "refresh cycle done");
            }
        }
    }

    debug!("refresh loop stopped");
}

async fn frame_loop<H: MapHost>(
    mut host: H,
    vehicles: VehicleSetReader,
    network: Arc<StaticNetwork>,
    mut scheduler: RenderScheduler,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> H {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = interval.tick() => {}
        }

        let Some(camera) = host.camera() else {
            continue;
        };

        let set = vehicles.current();
        let frame = scheduler.frame(&set, &camera, network.as_ref(), now());
        host.present(frame);
    }

    debug!("frame loop stopped");
    host
}
