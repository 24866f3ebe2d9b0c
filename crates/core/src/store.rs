//! Vehicle state store.
//!
//! Reconciles each feed snapshot against the tracked set and publishes the
//! result as a new immutable [`VehicleSet`]. Readers hold an `Arc` to
//! whichever set was current when they looked, so a frame sees either the
//! set before a reconciliation or the one after, never a mix.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use livetrack_transit::spatial::geometry::{compass_bearing, is_valid_coordinate};
use livetrack_transit::{
    FeedSnapshot, ServiceBounds, StaticNetwork, StopIdentifier, TripIdentifier, TripUpdate,
    VehicleClass, VehicleIdentifier, VehicleObservation,
};
use tokio::sync::watch;

use crate::config::{RefreshCadence, TrackerConfig};
use crate::vehicle::{Animation, TrackedVehicle, Vehicle};

// ============================================================================
// Vehicle set
// ============================================================================

/// Immutable snapshot of every tracked vehicle
#[derive(Clone, Debug, Default)]
pub struct VehicleSet {
    vehicles: HashMap<TripIdentifier, Arc<TrackedVehicle>>,
    generation: u64,
}

impl VehicleSet {
    /// Build a set directly, bypassing reconciliation
    pub fn from_tracked(vehicles: impl IntoIterator<Item = TrackedVehicle>) -> Self {
        Self {
            vehicles: vehicles
                .into_iter()
                .map(|tracked| (tracked.vehicle.trip_id.clone(), Arc::new(tracked)))
                .collect(),
            generation: 0,
        }
    }

    /// Number of reconciliations that produced this set
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn contains(&self, trip_id: &TripIdentifier) -> bool {
        self.vehicles.contains_key(trip_id)
    }

    pub fn get(&self, trip_id: &TripIdentifier) -> Option<&Arc<TrackedVehicle>> {
        self.vehicles.get(trip_id)
    }

    pub fn by_vehicle_id(&self, vehicle_id: &VehicleIdentifier) -> Option<&Arc<TrackedVehicle>> {
        self.vehicles
            .values()
            .find(|tracked| &tracked.vehicle.vehicle_id == vehicle_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TrackedVehicle>> {
        self.vehicles.values()
    }

    pub fn count_of(&self, class: VehicleClass) -> usize {
        self.iter().filter(|t| t.vehicle.class == class).count()
    }

    /// Vehicles whose animation is still running at `now`
    pub fn active_animations(&self, now: Instant) -> usize {
        self.iter().filter(|t| t.animation.is_active(now)).count()
    }

    /// Vehicles heading for `stop` that arrive within `[now, now + horizon]`,
    /// soonest first
    pub fn approaching(
        &self,
        stop: &StopIdentifier,
        now: DateTime<Utc>,
        horizon: chrono::Duration,
    ) -> Vec<Arc<TrackedVehicle>> {
        let until = now + horizon;
        self.iter()
            .filter(|t| t.vehicle.next_stop_id.as_ref() == Some(stop))
            .filter_map(|t| {
                let arrival = t.vehicle.next_stop_arrival?;
                (arrival >= now && arrival <= until).then_some((arrival, t))
            })
            .sorted_by(|(a, x), (b, y)| (a, &x.vehicle.trip_id).cmp(&(b, &y.vehicle.trip_id)))
            .map(|(_, t)| t.clone())
            .collect()
    }
}

/// Read side of the store. Cheap to clone, one per consumer.
#[derive(Clone, Debug)]
pub struct VehicleSetReader {
    receiver: watch::Receiver<Arc<VehicleSet>>,
}

impl VehicleSetReader {
    pub fn current(&self) -> Arc<VehicleSet> {
        self.receiver.borrow().clone()
    }
}

// ============================================================================
// Refresh policy
// ============================================================================

/// Decides which classes are reconciled on a given refresh cycle.
///
/// High-priority classes update every cycle; others every Nth. A skipped
/// class keeps animating toward its last known target.
#[derive(Clone, Debug)]
pub struct RefreshPolicy {
    cadence: RefreshCadence,
    cycle: u64,
}

impl RefreshPolicy {
    pub fn new(cadence: RefreshCadence) -> Self {
        Self { cadence, cycle: 0 }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn is_due(&self, class: VehicleClass) -> bool {
        let every = u64::from((*self.cadence.get(class)).max(1));
        self.cycle % every == 0
    }

    pub fn due_classes(&self) -> Vec<VehicleClass> {
        VehicleClass::ALL
            .into_iter()
            .filter(|&class| self.is_due(class))
            .collect()
    }

    pub fn advance(&mut self) {
        self.cycle += 1;
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    /// Observations with unusable coordinates; the vehicle is kept as it was
    pub rejected: usize,
}

/// Single writer of the tracked vehicle set
pub struct VehicleStore {
    network: Arc<StaticNetwork>,
    animation_duration: Duration,
    bounds: ServiceBounds,
    published: watch::Sender<Arc<VehicleSet>>,
}

impl VehicleStore {
    pub fn new(network: Arc<StaticNetwork>, config: &TrackerConfig) -> Self {
        let (published, _) = watch::channel(Arc::new(VehicleSet::default()));

        Self {
            network,
            animation_duration: config.animation_duration(),
            bounds: config.service_bounds,
            published,
        }
    }

    pub fn subscribe(&self) -> VehicleSetReader {
        VehicleSetReader {
            receiver: self.published.subscribe(),
        }
    }

    pub fn current(&self) -> Arc<VehicleSet> {
        self.published.borrow().clone()
    }

    /// Merge one class's snapshot into the tracked set and publish the result.
    ///
    /// Tracked vehicles animate from where they are at `now` toward the new
    /// report, replacing any animation in flight. New vehicles appear at
    /// their reported position. Vehicles of the snapshot's class that are
    /// missing from it are dropped.
    pub fn reconcile(&self, snapshot: &FeedSnapshot, now: Instant) -> ReconcileSummary {
        let previous = self.current();
        let mut vehicles = previous.vehicles.clone();
        let mut summary = ReconcileSummary::default();

        let updates: HashMap<&TripIdentifier, &TripUpdate> = snapshot
            .trip_updates
            .iter()
            .map(|update| (&update.trip_id, update))
            .collect();

        let mut seen: HashSet<&TripIdentifier> = HashSet::with_capacity(snapshot.observations.len());

        for observation in &snapshot.observations {
            seen.insert(&observation.trip_id);

            let position = observation.position;
            if !is_valid_coordinate(position.x(), position.y(), &self.bounds) {
                tracing::trace!(trip = %observation.trip_id, "rejected observation with invalid coordinates");
                summary.rejected += 1;
                continue;
            }

            let target = position.0;
            let update = updates.get(&observation.trip_id).copied();
            let reported = reported_bearing(observation);

            let tracked = match vehicles.get(&observation.trip_id) {
                Some(current) => {
                    summary.updated += 1;
                    let start = current.position_at(now);
                    let bearing = reported
                        .or_else(|| compass_bearing(start, target))
                        .unwrap_or(current.vehicle.bearing);

                    TrackedVehicle {
                        vehicle: self.describe(snapshot.class, observation, update, bearing),
                        animation: Animation::new(start, target, now, self.animation_duration),
                    }
                }
                None => {
                    summary.added += 1;
                    TrackedVehicle {
                        vehicle: self.describe(snapshot.class, observation, update, reported.unwrap_or(0.0)),
                        animation: Animation::stationary(target, now),
                    }
                }
            };

            vehicles.insert(observation.trip_id.clone(), Arc::new(tracked));
        }

        let before = vehicles.len();
        vehicles.retain(|trip_id, tracked| {
            tracked.vehicle.class != snapshot.class || seen.contains(trip_id)
        });
        summary.removed = before - vehicles.len();

        let generation = previous.generation + 1;
        self.published.send_replace(Arc::new(VehicleSet {
            vehicles,
            generation,
        }));

        tracing::debug!(
            class = %snapshot.class,
            generation,
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            rejected = summary.rejected,
            "reconciled feed snapshot"
        );

        summary
    }

    /// Stop every animation where it stands
    pub fn cancel_all(&self, now: Instant) {
        let previous = self.current();
        let vehicles = previous
            .vehicles
            .iter()
            .map(|(trip_id, tracked)| {
                let frozen = TrackedVehicle {
                    vehicle: tracked.vehicle.clone(),
                    animation: tracked.animation.cancelled(now),
                };
                (trip_id.clone(), Arc::new(frozen))
            })
            .collect();

        self.published.send_replace(Arc::new(VehicleSet {
            vehicles,
            generation: previous.generation + 1,
        }));
    }

    fn describe(
        &self,
        class: VehicleClass,
        observation: &VehicleObservation,
        update: Option<&TripUpdate>,
        bearing: f64,
    ) -> Vehicle {
        let route = self.network.route_record(&observation.route_id);
        let next_stop_id = update.and_then(|u| u.next_stop_id.clone());
        let next_stop = next_stop_id
            .as_ref()
            .and_then(|id| self.network.stop_record(id))
            .map(|stop| stop.name.clone());

        Vehicle {
            trip_id: observation.trip_id.clone(),
            vehicle_id: observation.vehicle_id.clone(),
            route_id: observation.route_id.clone(),
            class,
            line_name: route
                .map(|r| r.short_name.clone())
                .unwrap_or_else(|| observation.route_id.as_str().into()),
            color: route.map(|r| r.color).unwrap_or_else(|| class.default_color()),
            bearing,
            speed: observation.speed,
            next_stop_id,
            next_stop,
            next_stop_arrival: update.and_then(|u| u.next_stop_arrival),
            delay_seconds: update.and_then(|u| u.delay_seconds),
            occupancy: observation.occupancy,
            observed_at: observation.timestamp,
        }
    }
}

/// Telemetry bearing, if the feed actually reported one
fn reported_bearing(observation: &VehicleObservation) -> Option<f64> {
    (observation.bearing.is_finite() && observation.bearing != 0.0).then_some(observation.bearing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo::{Coord, LineString, Point};
    use livetrack_transit::spatial::geometry::lerp_coordinate;
    use livetrack_transit::{Rgb, RouteIdentifier, RouteRow, StaticFeed, StopImpl};

    fn network() -> Arc<StaticNetwork> {
        let mut feed = StaticFeed::default();
        feed.routes.push(RouteRow {
            id: RouteIdentifier::new("R96"),
            class: VehicleClass::Tram,
            short_name: "96".into(),
            long_name: "East Brunswick - St Kilda Beach".into(),
            color: Some("ED1C24".into()),
            text_color: None,
        });
        feed.shapes.insert(
            RouteIdentifier::new("R96"),
            vec![LineString::from(vec![(144.95, -37.81), (144.98, -37.81)])],
        );
        feed.stops.push(StopImpl {
            id: StopIdentifier::new("S1"),
            name: "Bourke St".into(),
            location: Point::new(144.965, -37.8135),
        });
        Arc::new(StaticNetwork::from_feed(&feed))
    }

    fn store() -> VehicleStore {
        VehicleStore::new(network(), &TrackerConfig::default())
    }

    fn tram(trip: &str, lon: f64, lat: f64) -> VehicleObservation {
        VehicleObservation::new(trip, format!("v-{trip}"), "R96", Point::new(lon, lat))
    }

    fn trams(observations: Vec<VehicleObservation>) -> FeedSnapshot {
        FeedSnapshot::new(VehicleClass::Tram, observations)
    }

    #[test]
    fn test_new_vehicle_appears_in_place() {
        let store = store();
        let t0 = Instant::now();

        let summary = store.reconcile(&trams(vec![tram("t1", 144.96, -37.81)]), t0);
        assert_eq!(summary.added, 1);

        let set = store.current();
        let tracked = set.get(&TripIdentifier::new("t1")).unwrap();
        assert_eq!(tracked.animation.start, tracked.animation.target);
        assert_eq!(tracked.position_at(t0), Coord { x: 144.96, y: -37.81 });
        assert_eq!(&*tracked.vehicle.line_name, "96");
        assert_eq!(tracked.vehicle.color, Rgb::new(237, 28, 36));
        assert_eq!(set.active_animations(t0), 0);
    }

    #[test]
    fn test_update_animates_from_current_position() {
        let store = store();
        let t0 = Instant::now();
        let a = Coord { x: 144.96, y: -37.81 };
        let b = Coord { x: 144.97, y: -37.81 };

        store.reconcile(&trams(vec![tram("t1", a.x, a.y)]), t0);
        let summary = store.reconcile(&trams(vec![tram("t1", b.x, b.y)]), t0);
        assert_eq!(summary.updated, 1);

        let set = store.current();
        let tracked = set.get(&TripIdentifier::new("t1")).unwrap();
        let mid = tracked.position_at(t0 + Duration::from_millis(2_500));
        assert_eq!(mid, lerp_coordinate(a, b, 0.5));
        assert_eq!(tracked.position_at(t0 + Duration::from_millis(5_000)), b);

        // Movement due east, no telemetry bearing
        assert_abs_diff_eq!(tracked.vehicle.bearing, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_update_replaces_in_flight_animation() {
        let store = store();
        let t0 = Instant::now();

        store.reconcile(&trams(vec![tram("t1", 144.96, -37.81)]), t0);
        store.reconcile(&trams(vec![tram("t1", 144.98, -37.81)]), t0);

        // Halfway through, a new report arrives
        let t1 = t0 + Duration::from_millis(2_500);
        store.reconcile(&trams(vec![tram("t1", 144.97, -37.80)]), t1);

        let set = store.current();
        let tracked = set.get(&TripIdentifier::new("t1")).unwrap();
        assert_eq!(set.len(), 1);
        let halfway = lerp_coordinate(Coord { x: 144.96, y: -37.81 }, Coord { x: 144.98, y: -37.81 }, 0.5);
        assert_eq!(tracked.animation.start, halfway);
        assert_eq!(tracked.animation.target, Coord { x: 144.97, y: -37.80 });
        assert_eq!(tracked.animation.started_at, t1);
    }

    #[test]
    fn test_telemetry_bearing_wins_when_reported() {
        let store = store();
        let t0 = Instant::now();

        store.reconcile(&trams(vec![tram("t1", 144.96, -37.81)]), t0);
        store.reconcile(&trams(vec![tram("t1", 144.97, -37.81).with_bearing(135.0)]), t0);

        let set = store.current();
        assert_eq!(set.get(&TripIdentifier::new("t1")).unwrap().vehicle.bearing, 135.0);
    }

    #[test]
    fn test_absent_vehicle_is_removed() {
        let store = store();
        let t0 = Instant::now();

        store.reconcile(&trams(vec![tram("t1", 144.96, -37.81), tram("t2", 144.95, -37.81)]), t0);
        store.reconcile(&trams(vec![tram("t1", 144.97, -37.81), tram("t2", 144.96, -37.81)]), t0);
        let t1 = t0 + Duration::from_millis(1_000);
        assert_eq!(store.current().active_animations(t1), 2);

        let summary = store.reconcile(&trams(vec![tram("t1", 144.98, -37.81)]), t1);
        assert_eq!(summary.removed, 1);

        let set = store.current();
        assert!(!set.contains(&TripIdentifier::new("t2")));
        assert_eq!(set.active_animations(t1), 1);
    }

    #[test]
    fn test_other_classes_survive_snapshot() {
        let store = store();
        let t0 = Instant::now();

        store.reconcile(&trams(vec![tram("t1", 144.96, -37.81)]), t0);
        let bus = VehicleObservation::new("b1", "bus-1", "R200", Point::new(144.90, -37.85));
        store.reconcile(&FeedSnapshot::new(VehicleClass::Bus, vec![bus]), t0);

        // Empty tram snapshot clears trams only
        store.reconcile(&trams(Vec::new()), t0);

        let set = store.current();
        assert_eq!(set.count_of(VehicleClass::Tram), 0);
        assert_eq!(set.count_of(VehicleClass::Bus), 1);
        let bus = set.get(&TripIdentifier::new("b1")).unwrap();
        assert_eq!(&*bus.vehicle.line_name, "R200");
        assert_eq!(bus.vehicle.color, VehicleClass::Bus.default_color());
    }

    #[test]
    fn test_unknown_route_id_does_not_borrow_unnamed_route() {
        let mut feed = StaticFeed::default();
        feed.routes.push(RouteRow {
            id: RouteIdentifier::new("SHUTTLE"),
            class: VehicleClass::Bus,
            short_name: "".into(),
            long_name: "Replacement shuttle".into(),
            color: Some("112233".into()),
            text_color: None,
        });
        let store = VehicleStore::new(Arc::new(StaticNetwork::from_feed(&feed)), &TrackerConfig::default());

        let bus = VehicleObservation::new("b1", "bus-1", "R200", Point::new(144.90, -37.85));
        store.reconcile(&FeedSnapshot::new(VehicleClass::Bus, vec![bus]), Instant::now());

        let set = store.current();
        let bus = set.get(&TripIdentifier::new("b1")).unwrap();
        assert_eq!(&*bus.vehicle.line_name, "R200");
        assert_eq!(bus.vehicle.color, VehicleClass::Bus.default_color());
    }

    #[test]
    fn test_invalid_observation_keeps_last_known_position() {
        let store = store();
        let t0 = Instant::now();

        store.reconcile(&trams(vec![tram("t1", 144.96, -37.81)]), t0);
        let summary = store.reconcile(&trams(vec![tram("t1", 0.0, 0.0), tram("t2", f64::NAN, -37.8)]), t0);

        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.removed, 0);

        let set = store.current();
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.get(&TripIdentifier::new("t1")).unwrap().position_at(t0),
            Coord { x: 144.96, y: -37.81 }
        );
    }

    #[test]
    fn test_readers_see_whole_sets() {
        let store = store();
        let reader = store.subscribe();
        let t0 = Instant::now();

        store.reconcile(&trams(vec![tram("t1", 144.96, -37.81)]), t0);
        let held = reader.current();

        store.reconcile(&trams(vec![tram("t2", 144.95, -37.81)]), t0);

        // The earlier set is unaffected by the later reconciliation
        assert!(held.contains(&TripIdentifier::new("t1")));
        assert!(!held.contains(&TripIdentifier::new("t2")));

        let latest = reader.current();
        assert_eq!(latest.generation(), held.generation() + 1);
        assert!(!latest.contains(&TripIdentifier::new("t1")));
        assert!(latest.contains(&TripIdentifier::new("t2")));
    }

    #[test]
    fn test_trip_updates_fill_schedule_context() {
        let store = store();
        let t0 = Instant::now();
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let snapshot = trams(vec![tram("t1", 144.96, -37.81), tram("t2", 144.95, -37.81)])
            .with_trip_updates(vec![
                TripUpdate::from_epoch("t1", Some(StopIdentifier::new("S1")), Some(1_700_000_120), Some(60)),
                TripUpdate::from_epoch("t2", Some(StopIdentifier::new("S1")), Some(1_700_000_060), None),
            ]);
        store.reconcile(&snapshot, t0);

        let set = store.current();
        let t1 = set.get(&TripIdentifier::new("t1")).unwrap();
        assert_eq!(t1.vehicle.next_stop.as_deref(), Some("Bourke St"));
        assert_eq!(t1.vehicle.delay_seconds, Some(60));

        let approaching = set.approaching(&StopIdentifier::new("S1"), now, chrono::Duration::minutes(5));
        let trips: Vec<_> = approaching.iter().map(|t| t.vehicle.trip_id.as_str()).collect();
        assert_eq!(trips, vec!["t2", "t1"]);

        let soon = set.approaching(&StopIdentifier::new("S1"), now, chrono::Duration::seconds(90));
        assert_eq!(soon.len(), 1);
    }

    #[test]
    fn test_by_vehicle_id() {
        let store = store();
        store.reconcile(&trams(vec![tram("t1", 144.96, -37.81)]), Instant::now());

        let set = store.current();
        assert!(set.by_vehicle_id(&VehicleIdentifier::new("v-t1")).is_some());
        assert!(set.by_vehicle_id(&VehicleIdentifier::new("v-t9")).is_none());
    }

    #[test]
    fn test_cancel_all_freezes_animations() {
        let store = store();
        let t0 = Instant::now();

        store.reconcile(&trams(vec![tram("t1", 144.96, -37.81)]), t0);
        store.reconcile(&trams(vec![tram("t1", 144.98, -37.81)]), t0);

        let t1 = t0 + Duration::from_millis(2_500);
        store.cancel_all(t1);

        let set = store.current();
        assert_eq!(set.active_animations(t1), 0);
        let frozen = set.get(&TripIdentifier::new("t1")).unwrap();
        let halfway = lerp_coordinate(Coord { x: 144.96, y: -37.81 }, Coord { x: 144.98, y: -37.81 }, 0.5);
        assert_eq!(frozen.position_at(t1 + Duration::from_secs(30)), halfway);
    }

    #[test]
    fn test_refresh_policy_cadence() {
        let mut policy = RefreshPolicy::new(TrackerConfig::default().refresh_cadence);

        let mut due = Vec::new();
        for _ in 0..6 {
            due.push(policy.due_classes());
            policy.advance();
        }

        let count = |class| due.iter().filter(|classes| classes.contains(&class)).count();
        assert_eq!(count(VehicleClass::Metro), 6);
        assert_eq!(count(VehicleClass::Regional), 6);
        assert_eq!(count(VehicleClass::Tram), 3);
        assert_eq!(count(VehicleClass::Bus), 2);
        assert_eq!(policy.cycle(), 6);
    }
}
