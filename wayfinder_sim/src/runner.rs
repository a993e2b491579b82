//! Scenario runner - executes navigation scenarios against in-memory services.

use crate::oracle::Oracle;
use crate::scenarios::ScenarioId;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use wayfinder_core::{
    to_display, ChannelEvent, FetchOutcome, MapView, ReconnectPolicy, RegistrationOutcome,
    SessionConfig, SessionController, SessionState, SessionUpdate, Viewport,
};
use wayfinder_env::{
    DeviceId, MapId, MapMetadata, MemoryBackend, MemoryTransport, Point, RouteType,
    WayfinderError,
};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioMetrics {
    /// Positions pushed onto the live stream
    pub positions_sent: u64,

    /// Positions that reached the navigation state
    pub positions_applied: u64,

    /// Garbage payloads pushed onto the live stream
    pub malformed_sent: u64,

    /// Times the session switched into the deviated state
    pub deviations_raised: u64,

    /// Successful reroutes
    pub reroutes: u64,

    /// Events and fetch responses discarded as stale
    pub stale_discarded: u64,

    /// Successful channel reopens
    pub reconnects: u64,

    /// Heat spots produced by the last heatmap
    pub heat_spots: u64,
}

const CAFE: &str = "Cafe";
const ATRIUM: &str = "Atrium";

/// Waypoints of the museum route to the cafe, in map pixels.
const MUSEUM_ROUTE: [Point; 4] = [
    Point { x: 20.0, y: 20.0 },
    Point { x: 20.0, y: 200.0 },
    Point { x: 150.0, y: 200.0 },
    Point { x: 150.0, y: 400.0 },
];

/// Waypoints of the gallery route to the atrium on the second map.
const GALLERY_ROUTE: [Point; 3] = [
    Point { x: 40.0, y: 40.0 },
    Point { x: 400.0, y: 40.0 },
    Point { x: 400.0, y: 300.0 },
];

fn gallery_metadata() -> MapMetadata {
    MapMetadata {
        map_width_px: 512.0,
        map_height_px: 512.0,
        tile_width: 16.0,
        tile_height: 16.0,
        landmarks: HashMap::from([(ATRIUM.to_string(), serde_json::json!(7))]),
    }
}

/// Expands waypoints into a pixel path with a point every `spacing` pixels,
/// the way the planner returns routes.
pub fn densify(waypoints: &[Point], spacing: f64) -> Vec<Point> {
    let mut points: Vec<Point> = waypoints.first().copied().into_iter().collect();
    for leg in waypoints.windows(2) {
        let (from, to) = (leg[0], leg[1]);
        let steps = (from.distance_to(&to) / spacing).ceil().max(1.0) as usize;
        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            points.push(Point::new(
                from.x + (to.x - from.x) * t,
                from.y + (to.y - from.y) * t,
            ));
        }
    }
    points
}

macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err(format!($($arg)+));
        }
    };
}

fn describe(e: WayfinderError) -> String {
    e.to_string()
}

/// One device session wired to in-memory services.
struct Harness {
    controller: SessionController<MemoryBackend, MemoryTransport>,
    backend: MemoryBackend,
    transport: MemoryTransport,
    device: DeviceId,
    metrics: ScenarioMetrics,
    timeout: Duration,
}

impl Harness {
    fn new(config: SessionConfig, timeout: Duration) -> Result<Self, String> {
        let backend = MemoryBackend::new()
            .with_map(MapId::new("map_01").map_err(describe)?, MapMetadata::default())
            .with_map(MapId::new("map_02").map_err(describe)?, gallery_metadata());
        backend.set_route(CAFE, densify(&MUSEUM_ROUTE, 4.0));
        backend.set_route(ATRIUM, densify(&GALLERY_ROUTE, 4.0));
        let transport = MemoryTransport::new();

        Ok(Self {
            controller: SessionController::new(
                Arc::new(backend.clone()),
                Arc::new(transport.clone()),
                config,
            ),
            backend,
            transport,
            device: DeviceId::new("jetson_01").map_err(describe)?,
            metrics: ScenarioMetrics::default(),
            timeout,
        })
    }

    async fn register(&mut self, map: &str) -> Result<(), String> {
        let map = MapId::new(map).map_err(describe)?;
        let outcome = self
            .controller
            .register(self.device.clone(), map)
            .await
            .map_err(describe)?;
        ensure!(
            outcome
                == RegistrationOutcome::Registered {
                    backend_registered: true,
                    channel_open: true
                },
            "unexpected registration outcome {:?}",
            outcome
        );
        Ok(())
    }

    async fn terminate(&mut self) -> Result<(), String> {
        self.controller.terminate(&self.device).await.map_err(describe)?;
        ensure!(
            self.transport.open_connections() == 0,
            "{} connections left open after terminate",
            self.transport.open_connections()
        );
        Ok(())
    }

    async fn next_event(&mut self) -> Result<ChannelEvent, String> {
        match tokio::time::timeout(self.timeout, self.controller.next_event()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err("channel event queue closed".to_string()),
            Err(_) => Err("timed out waiting for a channel event".to_string()),
        }
    }

    async fn next_update(&mut self) -> Result<Option<SessionUpdate>, String> {
        let event = self.next_event().await?;
        Ok(self.controller.handle_event(event).await)
    }

    /// Pushes one position and waits for it to be applied.
    async fn feed(&mut self, position: Point) -> Result<(), String> {
        ensure!(self.transport.push_position(position), "no live connection to push to");
        self.metrics.positions_sent += 1;

        match self.next_update().await? {
            Some(SessionUpdate::Position {
                position: applied,
                deviation_raised,
                ..
            }) => {
                ensure!(
                    applied.distance_to(&position) < 1e-6,
                    "applied {:?}, sent {:?}",
                    applied,
                    position
                );
                self.metrics.positions_applied += 1;
                if deviation_raised {
                    self.metrics.deviations_raised += 1;
                }
                Ok(())
            }
            other => Err(format!("expected a position update, got {:?}", other)),
        }
    }

    async fn feed_all(&mut self, samples: &[Point]) -> Result<(), String> {
        for sample in samples {
            self.feed(*sample).await?;
        }
        Ok(())
    }
}

/// Runs navigation scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Position samples per route leg
    steps_per_leg: usize,

    /// Maximum wait for a single channel event
    event_timeout: Duration,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            steps_per_leg: 20,
            event_timeout: Duration::from_secs(2),
        }
    }

    /// Sets the number of samples per route leg.
    pub fn with_steps(mut self, steps_per_leg: usize) -> Self {
        self.steps_per_leg = steps_per_leg.max(1);
        self
    }

    /// Sets the maximum wait for a single channel event.
    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = timeout;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let outcome = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(async {
                match scenario {
                    ScenarioId::OnRoute => self.run_on_route().await,
                    ScenarioId::DetourReroute => self.run_detour_reroute().await,
                    ScenarioId::MapSwitch => self.run_map_switch().await,
                    ScenarioId::LateEvent => self.run_late_event().await,
                    ScenarioId::StreamDropout => self.run_stream_dropout().await,
                    ScenarioId::MalformedStream => self.run_malformed_stream().await,
                    ScenarioId::CrowdHeatmap => self.run_crowd_heatmap().await,
                }
            }),
            Err(e) => Err(format!("failed to build runtime: {}", e)),
        };

        match outcome {
            Ok(metrics) => {
                debug!(?metrics, "Scenario metrics");
                ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: true,
                    failure_reason: None,
                    metrics,
                }
            }
            Err(reason) => {
                warn!("{} failed: {}", scenario.name(), reason);
                ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: false,
                    failure_reason: Some(reason),
                    metrics: ScenarioMetrics::default(),
                }
            }
        }
    }

    fn harness(&self, config: SessionConfig) -> Result<Harness, String> {
        Harness::new(config, self.event_timeout)
    }

    /// WF-001: OnRoute - noisy walk stays within the threshold.
    async fn run_on_route(&self) -> Result<ScenarioMetrics, String> {
        info!("WF-001: OnRoute - walk the route with position noise");

        let mut h = self.harness(SessionConfig::default())?;
        let mut oracle = Oracle::new(self.seed);
        let mut view = MapView::new(Viewport::new(360.0, 640.0));

        h.register("map_01").await?;
        h.controller.request_route(CAFE, RouteType::Fast).await.map_err(describe)?;

        let samples = oracle.walk(&MUSEUM_ROUTE, self.steps_per_leg);
        for sample in &samples {
            h.feed(*sample).await?;
            let state = h.controller.state();
            view.display_path(state);
            let shown = view.display_position(state);
            let expected = to_display(&state.position(), state.metadata(), &view.viewport());
            ensure!(shown == expected, "display position {:?} != {:?}", shown, expected);
        }

        let state = h.controller.state();
        ensure!(
            h.metrics.deviations_raised == 0,
            "visitor flagged off-route {} times while on it",
            h.metrics.deviations_raised
        );
        ensure!(!state.is_deviated(), "deviation set at the end of an on-route walk");
        ensure!(
            samples
                .last()
                .is_some_and(|last| last.distance_to(&state.position()) < 1e-6),
            "final position {:?} is not the last sample",
            state.position()
        );
        // one path projection, then one per distinct sample
        ensure!(
            view.recomputations() <= samples.len() as u64 + 1,
            "{} projections for {} samples",
            view.recomputations(),
            samples.len()
        );

        h.terminate().await?;
        info!("✓ OnRoute complete: {} positions applied", h.metrics.positions_applied);
        Ok(h.metrics)
    }

    /// WF-002: DetourReroute - leaving the route raises deviation once; a
    /// failed reroute keeps it; a successful one clears it.
    async fn run_detour_reroute(&self) -> Result<ScenarioMetrics, String> {
        info!("WF-002: DetourReroute - step off the route and reroute");

        let mut h = self.harness(SessionConfig::default())?;
        let mut oracle = Oracle::new(self.seed);

        h.register("map_01").await?;
        h.controller.request_route(CAFE, RouteType::LessCrowd).await.map_err(describe)?;

        let mut samples = oracle.walk(&MUSEUM_ROUTE[..1], 1);
        samples.extend(oracle.walk_to(Point::new(20.0, 110.0), self.steps_per_leg));
        samples.extend(oracle.detour(60.0, self.steps_per_leg / 2 + 1));
        h.feed_all(&samples).await?;

        ensure!(h.controller.state().is_deviated(), "60px detour was not flagged");
        ensure!(
            h.metrics.deviations_raised == 1,
            "deviation raised {} times, expected once",
            h.metrics.deviations_raised
        );

        h.backend.fail_routes(true);
        let path_before = h.controller.state().path().clone();
        match h.controller.reroute().await {
            Err(WayfinderError::RouteUnavailable(_)) => {}
            other => return Err(format!("expected RouteUnavailable, got {:?}", other)),
        }
        ensure!(h.controller.state().is_deviated(), "failed reroute cleared deviation");
        ensure!(h.controller.state().path() == &path_before, "failed reroute changed the path");
        h.backend.fail_routes(false);

        let detour_route = [oracle.position(), MUSEUM_ROUTE[2], MUSEUM_ROUTE[3]];
        h.backend.set_route(CAFE, densify(&detour_route, 4.0));
        let outcome = h.controller.reroute().await.map_err(describe)?;
        ensure!(outcome == FetchOutcome::Applied, "reroute outcome {:?}", outcome);
        h.metrics.reroutes += 1;
        ensure!(!h.controller.state().is_deviated(), "reroute did not clear deviation");

        let rest = oracle.walk(&detour_route, self.steps_per_leg);
        h.feed_all(&rest).await?;
        ensure!(
            h.metrics.deviations_raised == 1,
            "deviation raised again on the new route"
        );

        h.terminate().await?;
        info!("✓ DetourReroute complete: {} reroute(s)", h.metrics.reroutes);
        Ok(h.metrics)
    }

    /// WF-003: MapSwitch - nothing from the first map survives into the second.
    async fn run_map_switch(&self) -> Result<ScenarioMetrics, String> {
        info!("WF-003: MapSwitch - terminate and register on another map");

        let mut h = self.harness(SessionConfig::default())?;
        let mut oracle = Oracle::new(self.seed);

        h.register("map_01").await?;
        h.controller.request_route(CAFE, RouteType::Fast).await.map_err(describe)?;
        h.feed_all(&oracle.walk(&MUSEUM_ROUTE[..2], self.steps_per_leg)).await?;
        let generation = h.controller.state().generation();

        h.terminate().await?;
        let state = h.controller.state();
        ensure!(state.session() == SessionState::Unregistered, "session is {:?}", state.session());
        ensure!(state.position() == Point::ORIGIN, "position not reset: {:?}", state.position());
        ensure!(state.path().is_empty(), "path survived terminate");

        h.register("map_02").await?;
        let state = h.controller.state();
        ensure!(state.metadata() == &gallery_metadata(), "second map metadata not installed");
        ensure!(state.metadata().landmark_names() == vec![ATRIUM], "landmarks not loaded");
        ensure!(state.path().is_empty() && state.route().is_none(), "route leaked across maps");
        ensure!(state.generation() > generation, "generation not bumped");

        h.controller.request_route(ATRIUM, RouteType::Fast).await.map_err(describe)?;
        h.feed_all(&oracle.walk(&GALLERY_ROUTE, self.steps_per_leg)).await?;
        ensure!(h.metrics.deviations_raised == 0, "deviation on the second map");
        ensure!(
            (h.transport.opens(), h.transport.open_connections()) == (2, 1),
            "expected 2 opens and 1 live connection, got {} and {}",
            h.transport.opens(),
            h.transport.open_connections()
        );

        h.terminate().await?;
        info!("✓ MapSwitch complete");
        Ok(h.metrics)
    }

    /// WF-004: LateEvent - work that completes after terminate has no effect.
    async fn run_late_event(&self) -> Result<ScenarioMetrics, String> {
        info!("WF-004: LateEvent - deliveries after terminate");

        let mut h = self.harness(SessionConfig::default())?;
        let mut oracle = Oracle::new(self.seed);

        h.register("map_01").await?;
        h.controller.request_route(CAFE, RouteType::Fast).await.map_err(describe)?;
        h.feed_all(&oracle.walk(&MUSEUM_ROUTE[..2], self.steps_per_leg)).await?;

        // A position in flight and a route response in flight
        let late_position = oracle.walk_to(MUSEUM_ROUTE[2], 1)[0];
        ensure!(h.transport.push_position(late_position), "no live connection to push to");
        h.metrics.positions_sent += 1;
        let late_event = h.next_event().await?;

        let ticket = h
            .controller
            .begin_reroute()
            .map_err(describe)?
            .ok_or("reroute unexpectedly coalesced")?;
        let late_route = h.controller.fetch_route(&ticket).await;
        let density_ticket = h.controller.begin_density().map_err(describe)?;
        let late_density = h.controller.fetch_density(&density_ticket).await;

        h.terminate().await?;

        ensure!(
            h.controller.handle_event(late_event).await.is_none(),
            "late position was applied"
        );
        h.metrics.stale_discarded += 1;

        let outcome = h.controller.complete_route(ticket, late_route).map_err(describe)?;
        ensure!(outcome == FetchOutcome::Discarded, "late route outcome {:?}", outcome);
        h.metrics.stale_discarded += 1;

        let outcome = h
            .controller
            .complete_density(density_ticket, late_density)
            .map_err(describe)?;
        ensure!(outcome == FetchOutcome::Discarded, "late density outcome {:?}", outcome);
        h.metrics.stale_discarded += 1;

        let state = h.controller.state();
        ensure!(state.position() == Point::ORIGIN, "position moved after terminate");
        ensure!(state.path().is_empty(), "late route installed a path");
        ensure!(!state.is_deviated(), "deviation set after terminate");

        info!("✓ LateEvent complete: {} stale deliveries discarded", h.metrics.stale_discarded);
        Ok(h.metrics)
    }

    /// WF-005: StreamDropout - the channel is reopened with backoff.
    async fn run_stream_dropout(&self) -> Result<ScenarioMetrics, String> {
        info!("WF-005: StreamDropout - lose and recover the live stream");

        let config = SessionConfig {
            reconnect: ReconnectPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
            },
            ..SessionConfig::default()
        };
        let mut h = self.harness(config)?;
        let mut oracle = Oracle::new(self.seed);

        h.register("map_01").await?;
        h.controller.request_route(CAFE, RouteType::Fast).await.map_err(describe)?;
        h.feed_all(&oracle.walk(&MUSEUM_ROUTE[..2], self.steps_per_leg)).await?;

        h.transport.push_error("connection reset by peer");
        match h.next_update().await? {
            Some(SessionUpdate::Disconnected { retry_in: Some(_), .. }) => {}
            other => return Err(format!("expected a disconnect with retry, got {:?}", other)),
        }

        h.transport.fail_next_connects(1);
        match h.next_update().await? {
            Some(SessionUpdate::ReconnectFailed { attempt: 1, retry_in: Some(_) }) => {}
            other => return Err(format!("expected a failed first reopen, got {:?}", other)),
        }
        match h.next_update().await? {
            Some(SessionUpdate::Reconnected { attempt: 2 }) => h.metrics.reconnects += 1,
            other => return Err(format!("expected a reopen on attempt 2, got {:?}", other)),
        }
        ensure!(h.controller.link_up(), "link down after reopen");

        let rest = oracle.walk_to(MUSEUM_ROUTE[2], self.steps_per_leg);
        h.feed_all(&rest).await?;
        ensure!(
            h.metrics.positions_applied == h.metrics.positions_sent,
            "{} of {} positions applied",
            h.metrics.positions_applied,
            h.metrics.positions_sent
        );
        ensure!(
            (h.transport.opens(), h.transport.open_connections()) == (2, 1),
            "expected 2 opens and 1 live connection, got {} and {}",
            h.transport.opens(),
            h.transport.open_connections()
        );

        h.terminate().await?;
        info!("✓ StreamDropout complete: {} reconnect(s)", h.metrics.reconnects);
        Ok(h.metrics)
    }

    /// WF-006: MalformedStream - garbage never reaches the state.
    async fn run_malformed_stream(&self) -> Result<ScenarioMetrics, String> {
        info!("WF-006: MalformedStream - 30% garbage payloads");

        let mut h = self.harness(SessionConfig::default())?;
        let mut oracle = Oracle::new(self.seed);

        h.register("map_01").await?;
        h.controller.request_route(CAFE, RouteType::Fast).await.map_err(describe)?;

        let samples = oracle.walk(&MUSEUM_ROUTE, self.steps_per_leg);
        for sample in &samples {
            if oracle.chance(0.3) {
                let garbage = oracle.garbage_payload();
                ensure!(h.transport.push_text(garbage), "no live connection to push to");
                h.metrics.malformed_sent += 1;
            }
            h.feed(*sample).await?;
        }

        ensure!(h.controller.link_up(), "garbage took the stream down");
        ensure!(
            h.metrics.positions_applied == samples.len() as u64,
            "{} of {} positions applied",
            h.metrics.positions_applied,
            samples.len()
        );
        ensure!(h.metrics.deviations_raised == 0, "garbage caused a deviation");

        h.terminate().await?;
        info!(
            "✓ MalformedStream complete: {} garbage payloads dropped",
            h.metrics.malformed_sent
        );
        Ok(h.metrics)
    }

    /// WF-007: CrowdHeatmap - valid tiles become heat spots on the map.
    async fn run_crowd_heatmap(&self) -> Result<ScenarioMetrics, String> {
        info!("WF-007: CrowdHeatmap - density grid to heat spots");

        let config = SessionConfig::default();
        let radius = config.heat_radius_px;
        let mut h = self.harness(config)?;
        let mut oracle = Oracle::new(self.seed);
        let viewport = Viewport::new(360.0, 640.0);

        h.register("map_01").await?;
        let (grid, valid) = oracle.crowd_grid(h.controller.state().metadata(), 40, 6);
        h.backend.set_density(grid);

        let outcome = h.controller.refresh_density().await.map_err(describe)?;
        ensure!(outcome == FetchOutcome::Applied, "density outcome {:?}", outcome);

        let heat = h.controller.heatmap(&viewport);
        h.metrics.heat_spots = heat.len() as u64;
        ensure!(heat.len() == valid, "{} heat spots for {} valid tiles", heat.len(), valid);

        let (width, height) = viewport
            .display_size(h.controller.state().metadata())
            .ok_or("viewport cannot display the map")?;
        for spot in &heat {
            ensure!(
                (0.0..=1.0).contains(&spot.intensity),
                "intensity {} out of range",
                spot.intensity
            );
            ensure!(
                (0.0..=width).contains(&spot.center_display.x)
                    && (0.0..=height).contains(&spot.center_display.y),
                "heat spot {:?} outside the displayed map",
                spot.center_display
            );
            ensure!(spot.radius_px == radius, "radius {} != {}", spot.radius_px, radius);
        }

        h.terminate().await?;
        ensure!(
            h.controller.heatmap(&viewport).is_empty(),
            "density survived terminate"
        );
        info!("✓ CrowdHeatmap complete: {} heat spots", h.metrics.heat_spots);
        Ok(h.metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(scenario: ScenarioId) -> ScenarioResult {
        let result = ScenarioRunner::new(42).with_steps(8).run(scenario);
        assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
        result
    }

    #[test]
    fn test_on_route_scenario() {
        let result = run(ScenarioId::OnRoute);
        assert_eq!(result.metrics.positions_applied, 25);
        assert_eq!(result.metrics.deviations_raised, 0);
    }

    #[test]
    fn test_detour_reroute_scenario() {
        let result = run(ScenarioId::DetourReroute);
        assert_eq!(result.metrics.deviations_raised, 1);
        assert_eq!(result.metrics.reroutes, 1);
    }

    #[test]
    fn test_map_switch_scenario() {
        run(ScenarioId::MapSwitch);
    }

    #[test]
    fn test_late_event_scenario() {
        let result = run(ScenarioId::LateEvent);
        assert_eq!(result.metrics.stale_discarded, 3);
    }

    #[test]
    fn test_stream_dropout_scenario() {
        let result = run(ScenarioId::StreamDropout);
        assert_eq!(result.metrics.reconnects, 1);
    }

    #[test]
    fn test_malformed_stream_scenario() {
        let result = run(ScenarioId::MalformedStream);
        assert_eq!(result.metrics.positions_applied, result.metrics.positions_sent);
    }

    #[test]
    fn test_crowd_heatmap_scenario() {
        let result = run(ScenarioId::CrowdHeatmap);
        assert_eq!(result.metrics.heat_spots, 40);
    }

    #[test]
    fn test_same_seed_same_metrics() {
        let a = ScenarioRunner::new(9).run(ScenarioId::MalformedStream);
        let b = ScenarioRunner::new(9).run(ScenarioId::MalformedStream);
        assert_eq!(a.metrics, b.metrics);
    }

    #[test]
    fn test_densify_spacing() {
        let path = densify(&[Point::new(0.0, 0.0), Point::new(10.0, 0.0)], 4.0);
        assert_eq!(path.len(), 4);
        assert_eq!(path[3], Point::new(10.0, 0.0));
        assert!(path.windows(2).all(|w| w[0].distance_to(&w[1]) <= 4.0));
    }
}
