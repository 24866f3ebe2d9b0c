//! Upstream feed collaborator.
//!
//! Implementations fetch one vehicle class at a time and return the
//! normalized snapshot; the wire format is theirs to deal with.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use livetrack_transit::{FeedSnapshot, VehicleClass};

use crate::error::{Result, TrackerError};

/// Fetch the latest positions for a vehicle class
pub trait FeedSource: Send + Sync {
    fn fetch<'a>(
        &'a self,
        class: VehicleClass,
    ) -> Pin<Box<dyn Future<Output = Result<FeedSnapshot>> + Send + 'a>>;
}

/// Serves recorded snapshots in order, one queue per class.
///
/// Once a class's queue runs dry every fetch for it fails, which the
/// tracker treats like an upstream outage.
#[derive(Debug, Default)]
pub struct ReplayFeed {
    queues: Mutex<HashMap<VehicleClass, VecDeque<FeedSnapshot>>>,
}

impl ReplayFeed {
    pub fn new(snapshots: impl IntoIterator<Item = FeedSnapshot>) -> Self {
        let feed = Self::default();
        for snapshot in snapshots {
            feed.push(snapshot);
        }
        feed
    }

    pub fn push(&self, snapshot: FeedSnapshot) {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.entry(snapshot.class).or_default().push_back(snapshot);
    }

    pub fn remaining(&self, class: VehicleClass) -> usize {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.get(&class).map_or(0, VecDeque::len)
    }

    fn next(&self, class: VehicleClass) -> Result<FeedSnapshot> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .get_mut(&class)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| TrackerError::FeedUnavailable {
                class,
                reason: "no recorded snapshot left".to_owned(),
            })
    }
}

impl FeedSource for ReplayFeed {
    fn fetch<'a>(
        &'a self,
        class: VehicleClass,
    ) -> Pin<Box<dyn Future<Output = Result<FeedSnapshot>> + Send + 'a>> {
        let next = self.next(class);
        Box::pin(async move { next })
    }
}
