//! Display-space projections of the navigation state, recomputed only when
//! their inputs change.

use wayfinder_env::Point;

use crate::coords::{path_to_display, to_display, Viewport};
use crate::heatmap::{aggregate, HeatContribution};
use crate::state::NavigationState;

#[derive(Debug, Clone, Copy, PartialEq)]
struct PositionKey {
    metadata_revision: u64,
    viewport: Viewport,
    position: Point,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PathKey {
    metadata_revision: u64,
    path_revision: u64,
    viewport: Viewport,
}

/// Caches the display projections of position and path for one viewport.
#[derive(Debug, Clone)]
pub struct MapView {
    viewport: Viewport,
    position: Option<(PositionKey, Option<Point>)>,
    path: Option<(PathKey, Vec<Point>)>,
    recomputations: u64,
}

impl MapView {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            position: None,
            path: None,
            recomputations: 0,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Changes the rendering surface. Cached projections are invalidated.
    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Number of projections computed so far (cache misses).
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    /// Marker position in display space.
    pub fn display_position(&mut self, state: &NavigationState) -> Option<Point> {
        let key = PositionKey {
            metadata_revision: state.metadata_revision(),
            viewport: self.viewport,
            position: state.position(),
        };
        if let Some((cached, point)) = &self.position {
            if *cached == key {
                return *point;
            }
        }

        self.recomputations += 1;
        let point = to_display(&key.position, state.metadata(), &self.viewport);
        self.position = Some((key, point));
        point
    }

    /// Route polyline in display space.
    pub fn display_path(&mut self, state: &NavigationState) -> &[Point] {
        let key = PathKey {
            metadata_revision: state.metadata_revision(),
            path_revision: state.path_revision(),
            viewport: self.viewport,
        };
        let stale = self.path.as_ref().map_or(true, |(cached, _)| *cached != key);
        if stale {
            self.recomputations += 1;
            let points = path_to_display(state.path().points(), state.metadata(), &self.viewport);
            self.path = Some((key, points));
        }

        match &self.path {
            Some((_, points)) => points,
            None => &[],
        }
    }

    /// Heat contributions for the state's density grid. Not cached; the grid
    /// is replaced on every refresh.
    pub fn heatmap(&self, state: &NavigationState, radius_px: f64) -> Vec<HeatContribution> {
        aggregate(state.density(), state.metadata(), &self.viewport, radius_px)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deviation::Path;
    use crate::routing::RouteRequest;
    use wayfinder_env::{DeviceId, MapId, RouteType};

    fn state() -> NavigationState {
        let mut state = NavigationState::default();
        state.select(DeviceId::new("jetson_01").unwrap(), MapId::new("map_01").unwrap());
        state.replace_path(
            RouteRequest::new("Cafe", RouteType::Fast),
            Path::new(vec![Point::new(0.0, 0.0), Point::new(100.0, 200.0)]),
        );
        state
    }

    #[test]
    fn test_path_projection_is_memoized() {
        let state = state();
        let mut view = MapView::new(Viewport::new(148.0, 224.0));

        assert_eq!(view.display_path(&state), &[Point::new(0.0, 0.0), Point::new(50.0, 100.0)]);
        view.display_path(&state);
        assert_eq!(view.recomputations(), 1);

        view.resize(Viewport::new(296.0, 448.0));
        assert_eq!(view.display_path(&state)[1], Point::new(100.0, 200.0));
        assert_eq!(view.recomputations(), 2);
    }

    #[test]
    fn test_position_recomputed_only_on_move() {
        let mut state = state();
        let mut view = MapView::new(Viewport::new(148.0, 224.0));

        state.update_position(Point::new(20.0, 40.0));
        assert_eq!(view.display_position(&state), Some(Point::new(10.0, 20.0)));
        assert_eq!(view.display_position(&state), Some(Point::new(10.0, 20.0)));
        assert_eq!(view.recomputations(), 1);

        state.update_position(Point::new(40.0, 40.0));
        assert_eq!(view.display_position(&state), Some(Point::new(20.0, 20.0)));
        assert_eq!(view.recomputations(), 2);
    }

    #[test]
    fn test_path_replacement_invalidates_cache() {
        let mut state = state();
        let mut view = MapView::new(Viewport::new(296.0, 448.0));
        view.display_path(&state);

        state.replace_path(
            RouteRequest::new("Cafe", RouteType::Fast),
            Path::new(vec![Point::new(8.0, 8.0)]),
        );
        assert_eq!(view.display_path(&state), &[Point::new(8.0, 8.0)]);

        state.reset_tracking();
        assert!(view.display_path(&state).is_empty());
        assert_eq!(view.recomputations(), 3);
    }
}
