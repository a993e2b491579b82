//! Session Controller - orchestrates registration, live tracking and routes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SessionController                        │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │            Backend: NavigationBackend                │   │
//! │  │  • register / terminate / map metadata               │   │
//! │  │  • route + density fetches (ticketed)                │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                              │                              │
//! │  ┌─────────────┐  events  ┌──────────────────────────────┐  │
//! │  │ LivePosition│ ───────► │ NavigationState              │  │
//! │  │  Channel    │          │  position → deviation check  │  │
//! │  └─────────────┘          └──────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All state changes happen on the task that drives the controller. The
//! channel's pump task only forwards events; stale events (from a closed
//! connection) and stale fetch responses (from a terminated session) are
//! recognized by handle and generation and discarded.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use wayfinder_env::{
    DeviceId, MapId, NavigationBackend, Point, PositionTransport, RawDensityGrid, RouteType,
    WayfinderError,
};

use crate::channel::{ChannelEvent, ChannelHandle, LivePositionChannel};
use crate::coords::Viewport;
use crate::deviation::{DeviationTracker, DistanceMetric, Evaluation, Path, DEFAULT_THRESHOLD_PX};
use crate::heatmap::{aggregate, DensityGrid, HeatContribution, DEFAULT_HEAT_RADIUS_PX};
use crate::routing::{RouteFetchClient, RouteRequest};
use crate::state::{NavigationState, SessionState};

/// What happens when the backend rejects a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// Keep the session if the live channel opened anyway.
    #[default]
    BestEffort,

    /// Any registration failure closes the channel and reverts to `Unregistered`.
    Strict,
}

/// Backoff for reopening a lost live channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Reopen attempts after a disconnect; 0 disables reconnecting
    pub max_attempts: u32,

    /// Delay before the first attempt
    pub initial_delay: Duration,

    /// Upper bound for the doubled delays
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Configuration for a tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Deviation threshold in map pixels (default: 20)
    pub deviation_threshold_px: f64,

    /// Distance from position to path (default: nearest vertex)
    pub distance_metric: DistanceMetric,

    pub registration_policy: RegistrationPolicy,

    pub reconnect: ReconnectPolicy,

    /// Heat spot radius in display pixels (default: 60)
    pub heat_radius_px: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            deviation_threshold_px: DEFAULT_THRESHOLD_PX,
            distance_metric: DistanceMetric::default(),
            registration_policy: RegistrationPolicy::default(),
            reconnect: ReconnectPolicy::default(),
            heat_radius_px: DEFAULT_HEAT_RADIUS_PX,
        }
    }
}

/// Result of [`SessionController::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The session is now `Active`.
    Registered {
        backend_registered: bool,
        channel_open: bool,
    },

    /// A session was already active; nothing changed.
    AlreadyActive,
}

/// Observable effect of one handled channel event.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Position replaced and deviation re-evaluated.
    Position {
        position: Point,
        evaluation: Evaluation,
        /// True when this update switched the session into the deviated state
        deviation_raised: bool,
    },

    /// The live channel was lost; `retry_in` is `None` once attempts are exhausted.
    Disconnected {
        reason: String,
        retry_in: Option<Duration>,
    },

    /// The live channel was reopened.
    Reconnected { attempt: u32 },

    /// A reopen attempt failed.
    ReconnectFailed {
        attempt: u32,
        retry_in: Option<Duration>,
    },
}

/// Whether a route fetch is an initial request or a reroute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteFetchKind {
    Initial,
    Reroute,
}

/// Permission to apply one route response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTicket {
    id: u64,
    generation: u64,
    kind: RouteFetchKind,
    device: DeviceId,
    request: RouteRequest,
}

impl RouteTicket {
    pub fn kind(&self) -> RouteFetchKind {
        self.kind
    }

    pub fn request(&self) -> &RouteRequest {
        &self.request
    }
}

/// Permission to apply one density response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DensityTicket {
    generation: u64,
    device: DeviceId,
}

/// Effect of a completed route or density fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The response replaced the stored value.
    Applied,

    /// The session was reset while the fetch was in flight.
    Discarded,

    /// Another route fetch was already pending; this trigger was dropped.
    Coalesced,
}

/// Drives one tracking session for one device.
///
/// Generic over the backend and transport so the same controller runs
/// against the HTTP backend or in-memory services.
pub struct SessionController<B, T>
where
    B: NavigationBackend,
    T: PositionTransport,
{
    backend: Arc<B>,
    routes: RouteFetchClient<B>,
    channel: LivePositionChannel<T>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    state: NavigationState,
    config: SessionConfig,
    pending_route: Option<u64>,
    next_ticket: u64,
    reconnect_attempts: u32,
}

impl<B, T> SessionController<B, T>
where
    B: NavigationBackend,
    T: PositionTransport,
{
    pub fn new(backend: Arc<B>, transport: Arc<T>, config: SessionConfig) -> Self {
        let channel = LivePositionChannel::new(transport);
        let events = channel.subscribe();
        let tracker = DeviationTracker::new(config.deviation_threshold_px, config.distance_metric);

        Self {
            routes: RouteFetchClient::new(Arc::clone(&backend)),
            backend,
            channel,
            events,
            state: NavigationState::new(tracker),
            config,
            pending_route: None,
            next_ticket: 1,
            reconnect_attempts: 0,
        }
    }

    /// Read-only view of the session values.
    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// True while the live channel holds a streaming connection.
    pub fn link_up(&self) -> bool {
        self.channel.is_streaming()
    }

    /// Handle of the live connection, if any.
    pub fn channel_handle(&self) -> Option<ChannelHandle> {
        self.channel.current()
    }

    pub fn route_pending(&self) -> bool {
        self.pending_route.is_some()
    }

    /// Changes the device/map selection. Only allowed while unregistered.
    pub fn select(&mut self, device: DeviceId, map: MapId) -> Result<(), WayfinderError> {
        if self.state.session() != SessionState::Unregistered {
            return Err(WayfinderError::InvalidState(format!(
                "selection is fixed while {:?}",
                self.state.session()
            )));
        }
        self.state.select(device, map);
        Ok(())
    }

    /// Registers `device` on `map` and opens its live channel.
    ///
    /// The backend call and the channel open run concurrently; the channel is
    /// opened regardless of the registration result. The resulting state
    /// follows [`RegistrationPolicy`].
    pub async fn register(
        &mut self,
        device: DeviceId,
        map: MapId,
    ) -> Result<RegistrationOutcome, WayfinderError> {
        if self.state.session() != SessionState::Unregistered {
            warn!(device = %device, "Registration ignored: session already {:?}", self.state.session());
            return Ok(RegistrationOutcome::AlreadyActive);
        }

        self.select(device.clone(), map.clone())?;
        self.state.set_session(SessionState::Registering);
        info!(device = %device, map = %map, "Registering session");

        let (registered, opened) = tokio::join!(
            self.backend.register(&device, &map),
            self.channel.open(&device)
        );

        let registration_error = registered.err();
        if let Some(e) = &registration_error {
            error!(device = %device, "Registration failed: {}", e);
        }
        let connection_error = opened.err();
        if let Some(e) = &connection_error {
            error!(device = %device, "Live channel failed to open: {}", e);
        }

        let backend_registered = registration_error.is_none();
        let channel_open = connection_error.is_none();
        let keep = match self.config.registration_policy {
            RegistrationPolicy::BestEffort => backend_registered || channel_open,
            RegistrationPolicy::Strict => backend_registered,
        };

        if !keep {
            self.channel.shutdown().await;
            self.state.set_session(SessionState::Unregistered);
            let err = registration_error
                .or(connection_error)
                .unwrap_or_else(|| WayfinderError::backend("registration failed"));
            return Err(err);
        }

        let metadata = if backend_registered {
            match self.backend.map_metadata(&device).await {
                Ok(metadata) if metadata.is_valid() => metadata,
                Ok(_) => {
                    warn!(map = %map, "Map metadata has invalid dimensions, using defaults");
                    Default::default()
                }
                Err(e) => {
                    warn!(map = %map, "Map metadata unavailable, using defaults: {}", e);
                    Default::default()
                }
            }
        } else {
            Default::default()
        };
        self.state.install_metadata(metadata);

        self.reconnect_attempts = 0;
        self.state.set_session(SessionState::Active);
        if !channel_open {
            self.schedule_reconnect();
        }

        info!(device = %device, backend_registered, channel_open, "Session active");
        Ok(RegistrationOutcome::Registered {
            backend_registered,
            channel_open,
        })
    }

    /// Ends the active session for `device`.
    ///
    /// Closes the live channel, resets position to the origin and clears the
    /// path, deviation and density. Fetches still in flight are invalidated.
    /// A no-op when no session is active.
    pub async fn terminate(&mut self, device: &DeviceId) -> Result<(), WayfinderError> {
        if self.state.session() != SessionState::Active {
            debug!(device = %device, "Terminate ignored: session {:?}", self.state.session());
            return Ok(());
        }
        if self.state.device() != Some(device) {
            return Err(WayfinderError::InvalidSelection(format!(
                "{} is not the registered device",
                device
            )));
        }

        self.state.set_session(SessionState::Terminating);
        if let Err(e) = self.backend.terminate(device).await {
            warn!(device = %device, "Backend termination failed: {}", e);
        }

        self.channel.shutdown().await;
        self.state.reset_tracking();
        self.pending_route = None;
        self.reconnect_attempts = 0;
        self.state.set_session(SessionState::Unregistered);

        info!(device = %device, "Session terminated");
        Ok(())
    }

    /// Waits for the next channel event.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Returns an already queued channel event without waiting.
    pub fn try_next_event(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }

    /// Waits for the next event and handles it.
    ///
    /// Returns `None` for events that had no effect (stale or ignored).
    pub async fn step(&mut self) -> Option<SessionUpdate> {
        let event = self.next_event().await?;
        self.handle_event(event).await
    }

    /// Applies one channel event.
    pub async fn handle_event(&mut self, event: ChannelEvent) -> Option<SessionUpdate> {
        match event {
            ChannelEvent::Position { handle, position } => self.apply_position(handle, position),
            ChannelEvent::Disconnected { handle, reason } => {
                if self.state.session() != SessionState::Active
                    || self.channel.current() != Some(handle)
                {
                    debug!(handle = handle.id(), "Ignoring disconnect of stale connection");
                    return None;
                }
                warn!(%reason, "Live channel lost");
                let retry_in = self.schedule_reconnect();
                Some(SessionUpdate::Disconnected { reason, retry_in })
            }
            ChannelEvent::ReopenDue { device, attempt } => {
                if self.state.session() != SessionState::Active
                    || self.state.device() != Some(&device)
                    || attempt != self.reconnect_attempts
                    || self.channel.is_streaming()
                {
                    debug!(device = %device, attempt, "Ignoring stale reopen");
                    return None;
                }
                match self.channel.open(&device).await {
                    Ok(_) => {
                        info!(device = %device, attempt, "Live channel reopened");
                        Some(SessionUpdate::Reconnected { attempt })
                    }
                    Err(e) => {
                        warn!(device = %device, attempt, "Reopen failed: {}", e);
                        let retry_in = self.schedule_reconnect();
                        Some(SessionUpdate::ReconnectFailed { attempt, retry_in })
                    }
                }
            }
        }
    }

    /// Applies a position from connection `handle`.
    ///
    /// Overwrites the position, then re-runs the deviation check. Positions
    /// from a connection other than the current one, or outside an active
    /// session, are discarded.
    pub fn apply_position(
        &mut self,
        handle: ChannelHandle,
        position: Point,
    ) -> Option<SessionUpdate> {
        if self.state.session() != SessionState::Active || self.channel.current() != Some(handle) {
            debug!(handle = handle.id(), "Discarding position from stale connection");
            return None;
        }
        if !position.is_finite() {
            warn!(?position, "Discarding non-finite position");
            return None;
        }

        self.reconnect_attempts = 0;
        let (evaluation, deviation_raised) = self.state.update_position(position);
        if deviation_raised {
            warn!(
                distance = evaluation.nearest_distance,
                threshold = self.config.deviation_threshold_px,
                "Visitor left the route"
            );
        }

        Some(SessionUpdate::Position {
            position,
            evaluation,
            deviation_raised,
        })
    }

    fn schedule_reconnect(&mut self) -> Option<Duration> {
        let policy = self.config.reconnect;
        let next = self.reconnect_attempts + 1;
        if next > policy.max_attempts {
            warn!(attempts = self.reconnect_attempts, "Giving up on live channel until re-registration");
            return None;
        }
        let device = self.state.device()?.clone();

        self.reconnect_attempts = next;
        let delay = policy.delay_for(next);
        self.channel.schedule_reopen(device, next, delay);
        Some(delay)
    }

    /// Starts a fresh route fetch to `destination`.
    ///
    /// Returns `Ok(None)` when a route fetch is already pending.
    pub fn begin_route(
        &mut self,
        destination: impl Into<String>,
        route_type: RouteType,
    ) -> Result<Option<RouteTicket>, WayfinderError> {
        let request = RouteRequest::new(destination, route_type);
        self.issue_route_ticket(request, RouteFetchKind::Initial)
    }

    /// Starts a reroute to the current destination.
    ///
    /// Returns `Ok(None)` when a route fetch is already pending.
    pub fn begin_reroute(&mut self) -> Result<Option<RouteTicket>, WayfinderError> {
        let request = self
            .state
            .route()
            .cloned()
            .ok_or_else(|| WayfinderError::route_unavailable("no destination to reroute to"))?;
        self.issue_route_ticket(request, RouteFetchKind::Reroute)
    }

    fn issue_route_ticket(
        &mut self,
        request: RouteRequest,
        kind: RouteFetchKind,
    ) -> Result<Option<RouteTicket>, WayfinderError> {
        let device = self.active_device()?.clone();
        if self.pending_route.is_some() {
            debug!(destination = %request.destination, "Route fetch already pending, coalescing");
            return Ok(None);
        }

        let id = self.next_ticket;
        self.next_ticket += 1;
        self.pending_route = Some(id);

        Ok(Some(RouteTicket {
            id,
            generation: self.state.generation(),
            kind,
            device,
            request,
        }))
    }

    /// Performs the network part of a ticketed route fetch.
    pub async fn fetch_route(&self, ticket: &RouteTicket) -> Result<Path, WayfinderError> {
        self.routes.fetch_path(&ticket.request, &ticket.device).await
    }

    /// Applies the response of a ticketed route fetch.
    ///
    /// On success the path is replaced wholesale and deviation cleared. On
    /// failure the path and deviation are left untouched and the error is
    /// returned. Responses for a reset session are discarded.
    pub fn complete_route(
        &mut self,
        ticket: RouteTicket,
        result: Result<Path, WayfinderError>,
    ) -> Result<FetchOutcome, WayfinderError> {
        if self.pending_route == Some(ticket.id) {
            self.pending_route = None;
        }
        if ticket.generation != self.state.generation() {
            debug!(destination = %ticket.request.destination, "Discarding route for a reset session");
            return Ok(FetchOutcome::Discarded);
        }

        let path = result?;
        info!(
            destination = %ticket.request.destination,
            waypoints = path.len(),
            kind = ?ticket.kind,
            "Route applied"
        );
        self.state.replace_path(ticket.request, path);
        Ok(FetchOutcome::Applied)
    }

    /// Fetches and applies a route to `destination`.
    pub async fn request_route(
        &mut self,
        destination: impl Into<String>,
        route_type: RouteType,
    ) -> Result<FetchOutcome, WayfinderError> {
        match self.begin_route(destination, route_type)? {
            Some(ticket) => {
                let result = self.fetch_route(&ticket).await;
                self.complete_route(ticket, result)
            }
            None => Ok(FetchOutcome::Coalesced),
        }
    }

    /// Fetches a new route to the current destination and clears deviation.
    ///
    /// A failed reroute leaves the existing path and deviation state as they
    /// were, so it can simply be retried.
    pub async fn reroute(&mut self) -> Result<FetchOutcome, WayfinderError> {
        match self.begin_reroute()? {
            Some(ticket) => {
                let result = self.fetch_route(&ticket).await;
                self.complete_route(ticket, result)
            }
            None => Ok(FetchOutcome::Coalesced),
        }
    }

    /// Starts a crowd density fetch.
    pub fn begin_density(&self) -> Result<DensityTicket, WayfinderError> {
        Ok(DensityTicket {
            generation: self.state.generation(),
            device: self.active_device()?.clone(),
        })
    }

    pub async fn fetch_density(&self, ticket: &DensityTicket) -> Result<RawDensityGrid, WayfinderError> {
        self.backend.fetch_density(&ticket.device).await
    }

    /// Replaces the density grid with a fetched one. Malformed entries are
    /// skipped; responses for a reset session are discarded.
    pub fn complete_density(
        &mut self,
        ticket: DensityTicket,
        result: Result<RawDensityGrid, WayfinderError>,
    ) -> Result<FetchOutcome, WayfinderError> {
        if ticket.generation != self.state.generation() {
            debug!("Discarding density grid for a reset session");
            return Ok(FetchOutcome::Discarded);
        }
        let raw = result.map_err(|e| {
            warn!("Crowd density fetch failed: {}", e);
            e
        })?;
        let grid = DensityGrid::from_raw(&raw);
        debug!(tiles = grid.len(), skipped = raw.len() - grid.len(), "Density grid applied");
        self.state.replace_density(grid);
        Ok(FetchOutcome::Applied)
    }

    /// Fetches and applies the current crowd density grid.
    pub async fn refresh_density(&mut self) -> Result<FetchOutcome, WayfinderError> {
        let ticket = self.begin_density()?;
        let result = self.fetch_density(&ticket).await;
        self.complete_density(ticket, result)
    }

    /// Heat contributions for the stored density grid.
    pub fn heatmap(&self, viewport: &Viewport) -> Vec<HeatContribution> {
        aggregate(
            self.state.density(),
            self.state.metadata(),
            viewport,
            self.config.heat_radius_px,
        )
    }

    fn active_device(&self) -> Result<&DeviceId, WayfinderError> {
        match (self.state.session(), self.state.device()) {
            (SessionState::Active, Some(device)) => Ok(device),
            (session, _) => Err(WayfinderError::InvalidState(format!(
                "no active session ({:?})",
                session
            ))),
        }
    }
}
