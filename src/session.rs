//! Navigation session.
//!
//! `NavigationSession` owns the active route and all mutable navigation
//! state. The host pushes fixes in and receives events out; each fix is
//! processed end to end (progress, off-route, ETA, speech, display)
//! before the call returns, so the session needs no locking as long as a
//! single owner drives it.
//!
//! Reroutes never block fix processing. The session emits
//! `RerouteRequested`, keeps tracking against the stale route, and the
//! host later feeds the provider's answer to `complete_reroute`.

use chrono::{FixedOffset, Local, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::announce::{AnnouncementScheduler, SpeechIntent};
use crate::config::NavConfig;
use crate::display::DisplayUpdate;
use crate::error::{NavError, Result};
use crate::eta::EtaEstimator;
use crate::geometry::Point;
use crate::location::{LocationSource, PositionFix, SubscribeOptions, SubscriptionHandle};
use crate::off_route::OffRouteMonitor;
use crate::progress::ProgressTracker;
use crate::route::{Profile, Route, RouteResponse};
use crate::state::NavigationState;

/// Request for a new route from the current position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerouteRequest {
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub destination_lat: f64,
    pub destination_lon: f64,
    pub profile: Profile,
    /// Generation of the route that was abandoned.
    pub generation: u64,
}

/// Map camera target while following the traveler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraUpdate {
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
}

/// Output of the session, consumed by the host UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NavEvent {
    Display(DisplayUpdate),
    /// Speak, cancelling anything still playing.
    Speak(SpeechIntent),
    CancelSpeech { id: u64 },
    RerouteRequested(RerouteRequest),
    Camera(CameraUpdate),
    RouteInstalled { generation: u64 },
    Warning { message: String },
    Arrived,
}

/// A routing provider the host can hand to `resolve_reroute`.
pub trait RouteProvider {
    fn fetch_route(&mut self, request: &RerouteRequest) -> Result<RouteResponse>;
}

pub struct NavigationSession {
    config: NavConfig,
    route: Route,
    state: NavigationState,
    destination: Point,
    tracker: ProgressTracker,
    monitor: OffRouteMonitor,
    estimator: EtaEstimator,
    announcer: AnnouncementScheduler,
    subscription: Option<SubscriptionHandle>,
    active: bool,
    arrival_reported: bool,
    last_fix_ms: Option<u64>,
    utc_offset: FixedOffset,
}

impl NavigationSession {
    /// Subscribe to the location source and start navigating `route`.
    ///
    /// Fails with `PositionUnavailable` when the source refuses; nothing
    /// is retried. The returned events carry the start greeting and, for
    /// a route without steps, the arrival.
    pub fn start<S: LocationSource>(
        route: Route,
        destination: Point,
        config: NavConfig,
        source: &mut S,
        now_ms: u64,
    ) -> Result<(Self, Vec<NavEvent>)> {
        config.validate()?;

        let options = SubscribeOptions {
            high_accuracy: config.high_accuracy,
            max_fix_age_ms: config.max_fix_age_ms,
            timeout_ms: config.fix_timeout_ms,
        };
        let subscription = source.subscribe(options).map_err(|e| match e {
            NavError::PositionUnavailable(reason) => NavError::PositionUnavailable(reason),
            other => NavError::PositionUnavailable(other.to_string()),
        })?;

        let utc_offset = match config.utc_offset_minutes {
            Some(minutes) => minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .ok_or_else(|| NavError::Config(format!("utc offset {minutes} min out of range")))?,
            None => *Local::now().offset(),
        };

        info!(
            "Navigation started: {} steps, {:.0} m, {:?}",
            route.step_count(),
            route.total_distance_m(),
            route.profile()
        );

        let mut session = Self {
            tracker: ProgressTracker::new(config.advance_threshold_m),
            monitor: OffRouteMonitor::new(config.off_route_threshold_m),
            estimator: EtaEstimator::new(&config),
            announcer: AnnouncementScheduler::new(config.pre_announce_m, config.voice_enabled),
            state: NavigationState::new(now_ms, route.generation()),
            route,
            destination,
            config,
            subscription: Some(subscription),
            active: true,
            arrival_reported: false,
            last_fix_ms: None,
            utc_offset,
        };

        let mut events = Vec::new();
        if let Some(intent) = session.announcer.announce_start() {
            events.push(NavEvent::Speak(intent));
        }
        session.report_arrival_if_empty(&mut events);

        Ok((session, events))
    }

    /// Process a fix using the system clock for age checks.
    pub fn on_fix(&mut self, fix: PositionFix) -> Vec<NavEvent> {
        let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        self.on_fix_at(fix, now_ms)
    }

    /// Process one fix end to end.
    ///
    /// Invalid or stale fixes are dropped and logged; the session stays
    /// usable for the next one.
    pub fn on_fix_at(&mut self, fix: PositionFix, now_ms: u64) -> Vec<NavEvent> {
        if !self.active {
            debug!("Ignoring fix, session stopped");
            return Vec::new();
        }

        let fix = match self.accept(fix, now_ms) {
            Ok(fix) => fix,
            Err(e) => {
                warn!("Dropping fix: {e}");
                return Vec::new();
            }
        };
        self.last_fix_ms = Some(fix.timestamp_ms);

        let mut events = Vec::new();
        if self.state.following_camera {
            events.push(NavEvent::Camera(CameraUpdate {
                lat: fix.lat,
                lon: fix.lon,
                zoom: self.config.follow_zoom,
            }));
        }

        if self.arrival_reported {
            return events;
        }

        let progress = self.tracker.advance(&fix, &self.route, &mut self.state);

        let rerouting = !progress.arrived && self.monitor.evaluate(&fix, &self.route, &mut self.state);
        if rerouting {
            events.push(NavEvent::RerouteRequested(RerouteRequest {
                origin_lat: fix.lat,
                origin_lon: fix.lon,
                destination_lat: self.destination.lat,
                destination_lon: self.destination.lon,
                profile: self.route.profile(),
                generation: self.route.generation(),
            }));
        }

        let eta = self.estimator.estimate(&self.route, &self.state, &fix);

        if let Some(intent) = self.announcer.decide(&progress, &mut self.route, &self.state, rerouting) {
            events.push(NavEvent::Speak(intent));
        }

        events.push(NavEvent::Display(DisplayUpdate::build(
            &self.route,
            &self.state,
            &progress,
            &eta,
            &fix,
            &self.utc_offset,
        )));

        if progress.arrived {
            info!("Arrived, traveled {:.0} m", self.state.traveled_distance_m);
            self.arrival_reported = true;
            events.push(NavEvent::Arrived);
        }

        events
    }

    /// Feed the outcome of the reroute request issued for route
    /// `generation`.
    ///
    /// A success replaces the route and restarts step tracking; a failure
    /// keeps the stale route and re-arms the off-route monitor. Results
    /// arriving after `stop`, or for a route that has since been replaced,
    /// are dropped.
    pub fn complete_reroute(&mut self, generation: u64, result: Result<RouteResponse>) -> Vec<NavEvent> {
        if !self.active {
            info!("Dropping reroute result, session stopped");
            return Vec::new();
        }
        if generation != self.route.generation() {
            info!(
                "Dropping reroute result for generation {generation}, route is at {}",
                self.route.generation()
            );
            return Vec::new();
        }

        match result {
            Ok(response) => {
                let route = Route::from_response(&response, self.route.profile());
                self.install_route(route)
            }
            Err(e) => {
                warn!("Reroute failed, keeping current route: {e}");
                self.state.pending_reroute = false;
                vec![NavEvent::Warning { message: e.to_string() }]
            }
        }
    }

    /// Fetch a new route synchronously through `provider` and apply it.
    ///
    /// For hosts that run the request off the fix path themselves.
    pub fn resolve_reroute<P: RouteProvider>(&mut self, request: &RerouteRequest, provider: &mut P) -> Vec<NavEvent> {
        let result = provider.fetch_route(request);
        self.complete_reroute(request.generation, result)
    }

    /// Replace the active route atomically and restart step tracking.
    pub fn install_route(&mut self, route: Route) -> Vec<NavEvent> {
        if !self.active {
            return Vec::new();
        }

        let generation = self.route.generation() + 1;
        let now_ms = self.last_fix_ms.unwrap_or(self.state.session_start_ms);

        self.route = route.with_generation(generation);
        self.state.reset_for(generation, now_ms);
        self.announcer.reset_for_new_route();
        self.arrival_reported = false;

        info!(
            "Installed route generation {generation}: {} steps, {:.0} m",
            self.route.step_count(),
            self.route.total_distance_m()
        );

        let mut events = vec![NavEvent::RouteInstalled { generation }];
        self.report_arrival_if_empty(&mut events);
        events
    }

    /// Stop navigating: unsubscribe and silence any utterance.
    pub fn stop<S: LocationSource>(&mut self, source: &mut S) -> Vec<NavEvent> {
        if !self.active {
            return Vec::new();
        }

        self.active = false;
        if let Some(handle) = self.subscription.take() {
            source.unsubscribe(handle);
        }
        info!("Navigation stopped");

        self.announcer
            .cancel()
            .map(|id| vec![NavEvent::CancelSpeech { id }])
            .unwrap_or_default()
    }

    /// Follow the traveler with the map camera, or stop following after a
    /// manual pan.
    pub fn set_camera_follow(&mut self, follow: bool) {
        self.state.following_camera = follow;
    }

    pub fn set_voice_enabled(&mut self, enabled: bool) -> Vec<NavEvent> {
        self.announcer
            .set_voice_enabled(enabled)
            .map(|id| vec![NavEvent::CancelSpeech { id }])
            .unwrap_or_default()
    }

    /// The host finished speaking utterance `id`, or failed to. Either
    /// way navigation is unaffected.
    pub fn speech_finished(&mut self, id: u64) {
        self.announcer.finished(id);
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn destination(&self) -> Point {
        self.destination
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_arrived(&self) -> bool {
        self.state.current_step_index >= self.route.step_count()
    }

    fn accept(&self, fix: PositionFix, now_ms: u64) -> Result<PositionFix> {
        let fix = fix.validated()?;

        let age_ms = now_ms.saturating_sub(fix.timestamp_ms);
        if age_ms > self.config.max_fix_age_ms {
            return Err(NavError::StaleFix { age_ms });
        }

        match self.last_fix_ms {
            Some(last) if fix.timestamp_ms < last => Err(NavError::StaleFix {
                age_ms: last - fix.timestamp_ms,
            }),
            _ => Ok(fix),
        }
    }

    fn report_arrival_if_empty(&mut self, events: &mut Vec<NavEvent>) {
        if self.route.step_count() > 0 {
            return;
        }

        warn!("Route has no steps, treating as arrived");
        if let Some(intent) = self.announcer.announce_arrival() {
            events.push(NavEvent::Speak(intent));
        }
        self.arrival_reported = true;
        events.push(NavEvent::Arrived);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyline;
    use crate::route::parse_directions;

    const M_PER_DEG: f64 = 111_194.93;

    #[derive(Default)]
    struct MockSource {
        denied: bool,
        subscribed: Vec<SubscriptionHandle>,
        unsubscribed: Vec<SubscriptionHandle>,
    }

    impl LocationSource for MockSource {
        fn subscribe(&mut self, _options: SubscribeOptions) -> Result<SubscriptionHandle> {
            if self.denied {
                return Err(NavError::PositionUnavailable("permission denied".to_string()));
            }
            let handle = SubscriptionHandle(self.subscribed.len() as u64 + 1);
            self.subscribed.push(handle);
            Ok(handle)
        }

        fn unsubscribe(&mut self, handle: SubscriptionHandle) {
            self.unsubscribed.push(handle);
        }
    }

    struct FailingProvider;

    impl RouteProvider for FailingProvider {
        fn fetch_route(&mut self, _request: &RerouteRequest) -> Result<RouteResponse> {
            Err(NavError::RouteFetch("HTTP 503".to_string()))
        }
    }

    fn config() -> NavConfig {
        NavConfig {
            utc_offset_minutes: Some(0),
            ..NavConfig::default()
        }
    }

    fn lat_for(meters: f64) -> f64 {
        meters / M_PER_DEG
    }

    /// Two steps heading north: depart at 0 m, turn at 500 m, destination
    /// at 800 m.
    fn two_step_route() -> Route {
        let geometry = vec![
            Point::new(lat_for(-600.0), 0.0),
            Point::new(0.0, 0.0),
            Point::new(lat_for(500.0), 0.0),
            Point::new(lat_for(800.0), 0.0),
        ];
        let json = format!(
            r#"{{"routes": [{{
                "distance": 800.0, "duration": 120.0, "geometry": {},
                "legs": [{{"steps": [
                    {{"maneuver": {{"location": [0.0, 0.0], "type": "depart"}}, "name": "Ring", "distance": 500.0}},
                    {{"maneuver": {{"location": [0.0, {}], "type": "turn", "modifier": "left"}}, "name": "Main St", "distance": 300.0}}
                ]}}]
            }}]}}"#,
            serde_json::to_string(&polyline::encode(&geometry)).unwrap(),
            lat_for(500.0)
        );
        Route::from_response(&parse_directions(&json).unwrap(), Profile::Driving)
    }

    fn start(route: Route) -> (NavigationSession, MockSource, Vec<NavEvent>) {
        let mut source = MockSource::default();
        let (session, events) =
            NavigationSession::start(route, Point::new(lat_for(800.0), 0.0), config(), &mut source, 0).unwrap();
        (session, source, events)
    }

    fn fix_at(meters_north: f64, t_ms: u64) -> PositionFix {
        PositionFix::new(lat_for(meters_north), 0.0, t_ms)
    }

    fn speech(events: &[NavEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                NavEvent::Speak(intent) => Some(intent.text.clone()),
                _ => None,
            })
            .collect()
    }

    fn reroutes(events: &[NavEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, NavEvent::RerouteRequested(_)))
            .count()
    }

    #[test]
    fn start_greets_and_subscribes() {
        let (session, source, events) = start(two_step_route());
        assert_eq!(speech(&events), vec!["Starting navigation."]);
        assert_eq!(source.subscribed.len(), 1);
        assert!(session.is_active());
        assert!(!session.is_arrived());
    }

    #[test]
    fn start_fails_without_position() {
        let mut source = MockSource {
            denied: true,
            ..MockSource::default()
        };
        let result = NavigationSession::start(two_step_route(), Point::new(0.0, 0.0), config(), &mut source, 0);
        assert!(matches!(result, Err(NavError::PositionUnavailable(_))));
    }

    #[test]
    fn end_to_end_two_steps() {
        let (mut session, _source, _) = start(two_step_route());
        let mut t = 0;
        let mut last_index = 0;
        let mut all_events = Vec::new();

        // 503 m -> 3 m before the first anchor, then 303 m -> 3 m before the second
        let approach_first = (0..=50).rev().map(|i| -((i * 10 + 3) as f64));
        let approach_second = (0..=30).rev().map(|i| 500.0 - (i * 10 + 3) as f64);

        for meters in approach_first.chain(approach_second) {
            t += 1_000;
            let events = session.on_fix_at(fix_at(meters, t), t);
            let index = session.state().current_step_index();
            assert!(index >= last_index && index <= last_index + 1);
            last_index = index;
            all_events.extend(events);
        }

        assert_eq!(session.state().current_step_index(), 2);
        assert!(session.is_arrived());
        assert_eq!(session.state().traveled_distance_m(), 800.0);
        assert_eq!(reroutes(&all_events), 0);
        assert_eq!(all_events.iter().filter(|e| matches!(e, NavEvent::Arrived)).count(), 1);

        let spoken = speech(&all_events);
        assert!(spoken.contains(&"In 70 meters, depart".to_string()), "{spoken:?}");
        assert!(spoken.contains(&"Now, depart".to_string()), "{spoken:?}");
        assert!(spoken.contains(&"In 70 meters, turn left onto Main St".to_string()), "{spoken:?}");
        assert_eq!(spoken.last().map(String::as_str), Some("You have arrived at your destination."));
    }

    #[test]
    fn display_after_first_fix() {
        let (mut session, _source, _) = start(two_step_route());
        let events = session.on_fix_at(fix_at(-200.0, 0), 0);

        let display = events
            .iter()
            .find_map(|e| match e {
                NavEvent::Display(d) => Some(d.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(display.maneuver_instruction, "depart");
        assert_eq!(display.distance_to_next_maneuver, "200m");
        assert_eq!(display.next_maneuver_preview, "Then: turn left onto Main St");
        assert_eq!(display.remaining_distance, "0.8 km");
        // 1000 m of 800 m planned remain: 120 s scaled by 1.25
        assert!((display.eta_seconds - 150.0).abs() < 0.01, "got {}", display.eta_seconds);
        assert_eq!(display.eta_clock, "0:02");
    }

    #[test]
    fn off_route_single_flight_then_install() {
        let (mut session, _source, _) = start(two_step_route());

        let off = |m: f64, t: u64| PositionFix::new(lat_for(-300.0), m / M_PER_DEG, t);

        let events = session.on_fix_at(off(41.0, 1_000), 1_000);
        assert_eq!(reroutes(&events), 1);
        assert!(session.state().pending_reroute());
        assert_eq!(speech(&events), vec!["Rerouting."]);

        let events = session.on_fix_at(off(45.0, 2_000), 2_000);
        assert_eq!(reroutes(&events), 0);

        let response = parse_directions(
            r#"{"routes": [{"distance": 300.0, "duration": 40.0, "legs": [{"steps": [
                {"maneuver": {"location": [0.0004, -0.0027], "type": "depart"}, "distance": 300.0},
                {"maneuver": {"location": [0.0, 0.0], "type": "arrive"}, "distance": 0.0}
            ]}]}]}"#,
        );
        let events = session.complete_reroute(0, response);
        assert_eq!(events, vec![NavEvent::RouteInstalled { generation: 1 }]);
        assert_eq!(session.route().generation(), 1);
        assert_eq!(session.state().route_generation(), 1);
        assert_eq!(session.state().current_step_index(), 0);
        assert!(!session.state().pending_reroute());
    }

    #[test]
    fn late_reroute_does_not_replace_newer_route() {
        let (mut session, _source, _) = start(two_step_route());
        let off = PositionFix::new(lat_for(-300.0), 100.0 / M_PER_DEG, 1_000);
        assert_eq!(reroutes(&session.on_fix_at(off, 1_000)), 1);

        // The host installs a route of its own while the request is out
        let events = session.install_route(two_step_route());
        assert_eq!(events, vec![NavEvent::RouteInstalled { generation: 1 }]);

        let events = session.complete_reroute(0, Ok(RouteResponse::default()));
        assert!(events.is_empty());
        assert_eq!(session.route().generation(), 1);
        assert_eq!(session.route().step_count(), 2);

        let events = session.complete_reroute(0, Err(NavError::RouteFetch("timeout".to_string())));
        assert!(events.is_empty());
    }

    #[test]
    fn huge_utc_offset_is_rejected_at_start() {
        let config = NavConfig {
            utc_offset_minutes: Some(i32::MAX),
            ..NavConfig::default()
        };
        let result = NavigationSession::start(two_step_route(), Point::new(0.0, 0.0), config, &mut MockSource::default(), 0);
        assert!(matches!(result, Err(NavError::Config(_))));
    }

    #[test]
    fn failed_reroute_keeps_route_and_rearms() {
        let (mut session, _source, _) = start(two_step_route());
        let off = PositionFix::new(lat_for(-300.0), 100.0 / M_PER_DEG, 1_000);

        assert_eq!(reroutes(&session.on_fix_at(off, 1_000)), 1);
        let request = RerouteRequest {
            origin_lat: off.lat,
            origin_lon: off.lon,
            destination_lat: lat_for(800.0),
            destination_lon: 0.0,
            profile: Profile::Driving,
            generation: 0,
        };

        let events = session.resolve_reroute(&request, &mut FailingProvider);
        assert!(matches!(events.as_slice(), [NavEvent::Warning { .. }]));
        assert_eq!(session.route().generation(), 0);
        assert!(!session.state().pending_reroute());

        // A later divergence can retry
        let mut again = off;
        again.timestamp_ms = 2_000;
        assert_eq!(reroutes(&session.on_fix_at(again, 2_000)), 1);
    }

    #[test]
    fn reroute_after_stop_is_dropped() {
        let (mut session, mut source, _) = start(two_step_route());
        session.stop(&mut source);
        assert_eq!(source.unsubscribed, source.subscribed);

        let events = session.complete_reroute(0, Ok(RouteResponse::default()));
        assert!(events.is_empty());
        assert_eq!(session.route().generation(), 0);
        assert!(session.on_fix_at(fix_at(0.0, 10), 10).is_empty());
    }

    #[test]
    fn stop_cancels_active_utterance() {
        let (mut session, mut source, events) = start(two_step_route());
        let NavEvent::Speak(greeting) = &events[0] else {
            panic!("expected greeting, got {events:?}");
        };
        assert_eq!(session.stop(&mut source), vec![NavEvent::CancelSpeech { id: greeting.id }]);
        assert!(session.stop(&mut source).is_empty());
    }

    #[test]
    fn malformed_route_arrives_immediately() {
        let route = Route::from_response(&RouteResponse::default(), Profile::Walking);
        let (mut session, _source, events) = start(route);

        assert!(session.is_arrived());
        assert!(events.contains(&NavEvent::Arrived));
        assert!(speech(&events).contains(&"You have arrived at your destination.".to_string()));

        // Only camera updates from here on
        let events = session.on_fix_at(fix_at(10.0, 1_000), 1_000);
        assert!(events.iter().all(|e| matches!(e, NavEvent::Camera(_))));
    }

    #[test]
    fn stale_and_invalid_fixes_are_contained() {
        let (mut session, _source, _) = start(two_step_route());

        assert!(session.on_fix_at(fix_at(-400.0, 0), 6_000).is_empty());
        assert!(session.on_fix_at(PositionFix::new(f64::NAN, 0.0, 6_000), 6_000).is_empty());

        assert!(!session.on_fix_at(fix_at(-400.0, 7_000), 7_000).is_empty());
        // Older than the last accepted fix
        assert!(session.on_fix_at(fix_at(-390.0, 6_500), 7_000).is_empty());
        assert!(!session.on_fix_at(fix_at(-380.0, 8_000), 8_000).is_empty());
    }

    #[test]
    fn camera_follow_toggle() {
        let (mut session, _source, _) = start(two_step_route());

        let events = session.on_fix_at(fix_at(-400.0, 1_000), 1_000);
        assert!(events.iter().any(|e| matches!(e, NavEvent::Camera(c) if c.zoom == 18)));

        session.set_camera_follow(false);
        let events = session.on_fix_at(fix_at(-390.0, 2_000), 2_000);
        assert!(!events.iter().any(|e| matches!(e, NavEvent::Camera(_))));
    }

    #[test]
    fn announced_once_across_many_fixes() {
        let (mut session, _source, _) = start(two_step_route());
        let mut pre_announcements = 0;

        // 50 fixes hovering between 70 m and 21 m before the first anchor
        for i in 0..50u64 {
            let meters = -(70.0 - (i % 50) as f64);
            let events = session.on_fix_at(fix_at(meters, 1_000 + i), 1_000 + i);
            pre_announcements += speech(&events).iter().filter(|t| t.starts_with("In ")).count();
        }

        assert_eq!(pre_announcements, 1);
        assert!(session.route().step(0).unwrap().is_announced());
        assert_eq!(session.state().current_step_index(), 0);
    }

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_value(NavEvent::RouteInstalled { generation: 3 }).unwrap();
        assert_eq!(json["event"], "route_installed");
        assert_eq!(json["generation"], 3);

        let json = serde_json::to_value(NavEvent::Arrived).unwrap();
        assert_eq!(json["event"], "arrived");
    }
}
