//! Path conformance: distance from the live position to the active route.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use wayfinder_env::Point;

/// Default deviation threshold in map-pixel units.
pub const DEFAULT_THRESHOLD_PX: f64 = 20.0;

/// Ordered waypoints of a route in map-pixel space.
///
/// Order is route order, not spatial order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Path(Vec<Point>);

impl Path {
    /// Builds a path, dropping non-finite waypoints.
    pub fn new(points: Vec<Point>) -> Self {
        Self(points.into_iter().filter(Point::is_finite).collect())
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn points(&self) -> &[Point] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Final waypoint, if any.
    pub fn destination(&self) -> Option<&Point> {
        self.0.last()
    }
}

impl From<Vec<Point>> for Path {
    fn from(points: Vec<Point>) -> Self {
        Self::new(points)
    }
}

/// How the distance from a position to a path is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Distance to the nearest waypoint.
    #[default]
    NearestVertex,

    /// Distance to the nearest point on any segment between consecutive
    /// waypoints. Never larger than `NearestVertex`.
    NearestSegment,
}

/// Result of one conformance check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Minimum distance to the path; `+inf` for an empty path.
    pub nearest_distance: f64,

    /// `nearest_distance > threshold`.
    pub deviated: bool,
}

/// Evaluates `position` against `path` using the nearest-vertex metric.
pub fn evaluate(position: &Point, path: &Path, threshold_px: f64) -> Evaluation {
    evaluate_with(position, path, threshold_px, DistanceMetric::NearestVertex)
}

/// Evaluates `position` against `path` with an explicit metric.
pub fn evaluate_with(
    position: &Point,
    path: &Path,
    threshold_px: f64,
    metric: DistanceMetric,
) -> Evaluation {
    let nearest_distance = nearest_distance(position, path, metric);
    Evaluation {
        nearest_distance,
        // An empty path yields +inf; there is no route to deviate from.
        deviated: !path.is_empty() && nearest_distance > threshold_px,
    }
}

fn nearest_distance(position: &Point, path: &Path, metric: DistanceMetric) -> f64 {
    let points = path.points();
    match metric {
        DistanceMetric::NearestVertex => points
            .iter()
            .map(|p| position.distance_to(p))
            .fold(f64::INFINITY, f64::min),
        DistanceMetric::NearestSegment if points.len() < 2 => {
            nearest_distance(position, path, DistanceMetric::NearestVertex)
        }
        DistanceMetric::NearestSegment => points
            .windows(2)
            .map(|w| segment_distance(position, &w[0], &w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

fn segment_distance(p: &Point, a: &Point, b: &Point) -> f64 {
    let p = Vector2::new(p.x, p.y);
    let a = Vector2::new(a.x, a.y);
    let b = Vector2::new(b.x, b.y);

    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq == 0.0 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Sticky deviation state for the active route.
///
/// Once a check reports deviation the flag stays set until [`clear`] is
/// called (reroute or fresh route fetch), regardless of later positions.
///
/// [`clear`]: DeviationTracker::clear
#[derive(Debug, Clone)]
pub struct DeviationTracker {
    threshold_px: f64,
    metric: DistanceMetric,
    deviated: bool,
    last: Option<Evaluation>,
}

impl DeviationTracker {
    pub fn new(threshold_px: f64, metric: DistanceMetric) -> Self {
        Self {
            threshold_px,
            metric,
            deviated: false,
            last: None,
        }
    }

    pub fn threshold_px(&self) -> f64 {
        self.threshold_px
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Current deviation state.
    pub fn is_deviated(&self) -> bool {
        self.deviated
    }

    /// Most recent evaluation, if any since the last clear.
    pub fn last_evaluation(&self) -> Option<Evaluation> {
        self.last
    }

    /// Re-runs the check for a new position.
    ///
    /// Returns the evaluation and whether this call raised the flag.
    pub fn observe(&mut self, position: &Point, path: &Path) -> (Evaluation, bool) {
        let evaluation = evaluate_with(position, path, self.threshold_px, self.metric);
        self.last = Some(evaluation);

        let raised = evaluation.deviated && !self.deviated;
        if evaluation.deviated {
            self.deviated = true;
        }
        (evaluation, raised)
    }

    /// Resets the flag. Called on reroute, fresh route and session reset.
    pub fn clear(&mut self) {
        self.deviated = false;
        self.last = None;
    }
}

impl Default for DeviationTracker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_PX, DistanceMetric::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn path(points: &[(f64, f64)]) -> Path {
        Path::new(points.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    #[test]
    fn test_empty_path_never_deviates() {
        for pos in [Point::new(0.0, 0.0), Point::new(1e9, -1e9)] {
            let eval = evaluate(&pos, &Path::empty(), 20.0);
            assert!(!eval.deviated);
            assert!(eval.nearest_distance.is_infinite());
        }
    }

    #[test]
    fn test_far_waypoint_deviates() {
        let eval = evaluate(&Point::new(0.0, 0.0), &path(&[(100.0, 0.0)]), 20.0);
        assert_relative_eq!(eval.nearest_distance, 100.0);
        assert!(eval.deviated);
    }

    #[test]
    fn test_near_waypoint_conforms() {
        let eval = evaluate(&Point::new(0.0, 0.0), &path(&[(10.0, 0.0)]), 20.0);
        assert_relative_eq!(eval.nearest_distance, 10.0);
        assert!(!eval.deviated);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let eval = evaluate(&Point::new(0.0, 0.0), &path(&[(20.0, 0.0)]), 20.0);
        assert!(!eval.deviated);
    }

    #[test]
    fn test_segment_metric_between_sparse_waypoints() {
        let route = path(&[(0.0, 0.0), (100.0, 0.0)]);
        let midpoint = Point::new(50.0, 5.0);

        let vertex = evaluate_with(&midpoint, &route, 20.0, DistanceMetric::NearestVertex);
        assert!(vertex.deviated);

        let segment = evaluate_with(&midpoint, &route, 20.0, DistanceMetric::NearestSegment);
        assert_relative_eq!(segment.nearest_distance, 5.0, epsilon = 1e-9);
        assert!(!segment.deviated);
    }

    #[test]
    fn test_segment_metric_clamps_to_endpoints() {
        let route = path(&[(0.0, 0.0), (10.0, 0.0), (10.0, 0.0)]);
        let eval = evaluate_with(&Point::new(13.0, 4.0), &route, 20.0, DistanceMetric::NearestSegment);
        assert_relative_eq!(eval.nearest_distance, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_path_drops_non_finite_waypoints() {
        let p = path(&[(1.0, 1.0), (f64::NAN, 0.0), (2.0, 2.0)]);
        assert_eq!(p.len(), 2);
        assert_eq!(p.destination(), Some(&Point::new(2.0, 2.0)));
    }

    #[test]
    fn test_tracker_is_sticky_until_cleared() {
        let mut tracker = DeviationTracker::default();
        let route = path(&[(0.0, 0.0)]);

        let (_, raised) = tracker.observe(&Point::new(50.0, 0.0), &route);
        assert!(raised);
        assert!(tracker.is_deviated());

        // Back on the route: still deviated, not raised again
        let (eval, raised) = tracker.observe(&Point::new(1.0, 0.0), &route);
        assert!(!eval.deviated);
        assert!(!raised);
        assert!(tracker.is_deviated());

        tracker.clear();
        assert!(!tracker.is_deviated());
        assert!(tracker.last_evaluation().is_none());
    }
}
