//! Session state store.
//!
//! Holds the values shared between the session controller, the deviation
//! tracker and rendering. Readers get `&NavigationState`; every mutation goes
//! through the crate-private methods below, which keep these invariants:
//! - Position and Path are always in the space of the loaded metadata; a map
//!   switch clears the path and resets the position first.
//! - Deviation can only be set while a path is loaded.
//! - Every reset bumps `generation` so late fetch responses can be detected.

use serde::Serialize;
use wayfinder_env::{DeviceId, MapId, MapMetadata, Point};

use crate::deviation::{DeviationTracker, Evaluation, Path};
use crate::heatmap::DensityGrid;
use crate::routing::RouteRequest;

/// Lifecycle of a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionState {
    #[default]
    Unregistered,
    Registering,
    Active,
    Terminating,
}

/// Current navigation values for the single tracked device.
#[derive(Debug, Clone)]
pub struct NavigationState {
    session: SessionState,
    device: Option<DeviceId>,
    map: Option<MapId>,
    metadata: MapMetadata,
    metadata_revision: u64,
    position: Point,
    path: Path,
    path_revision: u64,
    route: Option<RouteRequest>,
    tracker: DeviationTracker,
    density: DensityGrid,
    generation: u64,
}

impl NavigationState {
    pub fn new(tracker: DeviationTracker) -> Self {
        Self {
            session: SessionState::Unregistered,
            device: None,
            map: None,
            metadata: MapMetadata::default(),
            metadata_revision: 0,
            position: Point::ORIGIN,
            path: Path::empty(),
            path_revision: 0,
            route: None,
            tracker,
            density: DensityGrid::new(),
            generation: 0,
        }
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn device(&self) -> Option<&DeviceId> {
        self.device.as_ref()
    }

    pub fn map(&self) -> Option<&MapId> {
        self.map.as_ref()
    }

    pub fn metadata(&self) -> &MapMetadata {
        &self.metadata
    }

    /// Incremented whenever metadata is replaced.
    pub fn metadata_revision(&self) -> u64 {
        self.metadata_revision
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Incremented whenever the path is replaced or cleared.
    pub fn path_revision(&self) -> u64 {
        self.path_revision
    }

    /// Destination of the active route.
    pub fn route(&self) -> Option<&RouteRequest> {
        self.route.as_ref()
    }

    pub fn is_deviated(&self) -> bool {
        self.tracker.is_deviated()
    }

    pub fn last_evaluation(&self) -> Option<Evaluation> {
        self.tracker.last_evaluation()
    }

    pub fn tracker(&self) -> &DeviationTracker {
        &self.tracker
    }

    pub fn density(&self) -> &DensityGrid {
        &self.density
    }

    /// Session generation; bumped on every reset.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_session(&mut self, session: SessionState) {
        self.session = session;
    }

    /// Records the device/map selection. Switching maps drops everything
    /// expressed in the old map's coordinates.
    pub(crate) fn select(&mut self, device: DeviceId, map: MapId) {
        if self.map.as_ref() != Some(&map) {
            self.reset_tracking();
            self.metadata = MapMetadata::default();
            self.metadata_revision += 1;
        }
        self.device = Some(device);
        self.map = Some(map);
    }

    /// Installs metadata for the selected map.
    pub(crate) fn install_metadata(&mut self, metadata: MapMetadata) {
        if metadata != self.metadata {
            self.reset_tracking();
            self.metadata = metadata;
            self.metadata_revision += 1;
        }
    }

    /// Overwrites the position and re-runs the deviation check, in that order.
    pub(crate) fn update_position(&mut self, position: Point) -> (Evaluation, bool) {
        self.position = position;
        self.tracker.observe(&self.position, &self.path)
    }

    /// Replaces the path wholesale and clears deviation unconditionally.
    pub(crate) fn replace_path(&mut self, route: RouteRequest, path: Path) {
        self.path = path;
        self.path_revision += 1;
        self.route = Some(route);
        self.tracker.clear();
    }

    pub(crate) fn replace_density(&mut self, density: DensityGrid) {
        self.density = density;
    }

    /// Resets position, path, deviation and density, invalidating in-flight
    /// fetches.
    pub(crate) fn reset_tracking(&mut self) {
        self.position = Point::ORIGIN;
        if !self.path.is_empty() || self.route.is_some() {
            self.path = Path::empty();
            self.path_revision += 1;
        }
        self.route = None;
        self.tracker.clear();
        self.density = DensityGrid::new();
        self.generation += 1;
    }
}

impl Default for NavigationState {
    fn default() -> Self {
        Self::new(DeviationTracker::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfinder_env::RouteType;

    fn ids(map: &str) -> (DeviceId, MapId) {
        (DeviceId::new("jetson_01").unwrap(), MapId::new(map).unwrap())
    }

    fn loaded_state() -> NavigationState {
        let mut state = NavigationState::default();
        let (device, map) = ids("map_01");
        state.select(device, map);
        state.replace_path(
            RouteRequest::new("Cafe", RouteType::Fast),
            Path::new(vec![Point::new(0.0, 0.0)]),
        );
        state.update_position(Point::new(100.0, 0.0));
        state
    }

    #[test]
    fn test_position_update_runs_tracker() {
        let state = loaded_state();
        assert_eq!(state.position(), Point::new(100.0, 0.0));
        assert!(state.is_deviated());
    }

    #[test]
    fn test_map_switch_clears_coordinates() {
        let mut state = loaded_state();
        let generation = state.generation();
        let revision = state.path_revision();

        let (device, map) = ids("map_02");
        state.select(device, map);

        assert_eq!(state.position(), Point::ORIGIN);
        assert!(state.path().is_empty());
        assert!(!state.is_deviated());
        assert!(state.route().is_none());
        assert!(state.generation() > generation);
        assert!(state.path_revision() > revision);
    }

    #[test]
    fn test_same_map_selection_keeps_state() {
        let mut state = loaded_state();
        let (device, map) = ids("map_01");
        state.select(device, map);
        assert_eq!(state.path().len(), 1);
    }

    #[test]
    fn test_new_metadata_resets_tracking() {
        let mut state = loaded_state();
        state.install_metadata(MapMetadata::default());
        assert_eq!(state.path().len(), 1, "identical metadata is not a map switch");

        state.install_metadata(MapMetadata {
            map_width_px: 512.0,
            ..MapMetadata::default()
        });
        assert!(state.path().is_empty());
        assert_eq!(state.position(), Point::ORIGIN);
    }

    #[test]
    fn test_replace_path_clears_deviation() {
        let mut state = loaded_state();
        state.replace_path(
            RouteRequest::new("Cafe", RouteType::Fast),
            Path::new(vec![Point::new(500.0, 500.0)]),
        );
        assert!(!state.is_deviated());
    }
}
