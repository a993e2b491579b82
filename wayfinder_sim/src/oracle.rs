//! Ground truth oracle for scenarios.
//!
//! The Oracle plays the visitor and the positioning backend:
//! - Walks a route leg by leg, emitting noisy position samples
//! - Steps off the route on request (detours)
//! - Produces garbage stream payloads and crowd density grids
//!
//! All randomness comes from one seed, so a scenario replays exactly.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde_json::json;
use wayfinder_env::{MapMetadata, Point, RawDensityGrid};

/// Payloads the positioning backend should never send.
const GARBAGE: &[&str] = &[
    "",
    "{",
    "null",
    "{\"x\": 1}",
    "{\"x\": \"left\", \"y\": 2}",
    "{\"lat\": 3, \"lng\": 4}",
    "position unavailable",
];

/// Seeded visitor model.
pub struct Oracle {
    rng: ChaCha8Rng,

    /// Gaussian position noise; `None` for exact samples
    noise: Option<Normal<f64>>,

    /// Ground truth position of the visitor
    position: Point,

    /// Unit direction of the last movement
    heading: Option<(f64, f64)>,
}

impl Oracle {
    /// Creates an oracle with 2px position noise.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            noise: Normal::new(0.0, 2.0).ok(),
            position: Point::ORIGIN,
            heading: None,
        }
    }

    /// Sets the position noise standard deviation in map pixels.
    pub fn set_position_noise(&mut self, std_dev: f64) {
        self.noise = if std_dev > 0.0 {
            Normal::new(0.0, std_dev).ok()
        } else {
            None
        };
    }

    pub fn position(&self) -> Point {
        self.position
    }

    /// Walks along `route` from its first waypoint, `steps_per_leg` samples
    /// per leg. Returns the noisy samples; ground truth ends on the last
    /// waypoint.
    pub fn walk(&mut self, route: &[Point], steps_per_leg: usize) -> Vec<Point> {
        let Some(start) = route.first() else {
            return Vec::new();
        };
        self.position = *start;

        let mut samples = vec![self.sample()];
        for leg in route.windows(2) {
            samples.extend(self.walk_to(leg[1], steps_per_leg));
        }
        samples
    }

    /// Walks in a straight line from the current position to `target`.
    pub fn walk_to(&mut self, target: Point, steps: usize) -> Vec<Point> {
        let from = self.position;
        let steps = steps.max(1);
        let length = from.distance_to(&target);
        if length > 0.0 {
            self.heading = Some(((target.x - from.x) / length, (target.y - from.y) / length));
        }
        (1..=steps)
            .map(|i| {
                let t = i as f64 / steps as f64;
                self.position = Point::new(
                    from.x + (target.x - from.x) * t,
                    from.y + (target.y - from.y) * t,
                );
                self.sample()
            })
            .collect()
    }

    /// Steps `offset` pixels sideways, to a random side of the current
    /// heading. Without a heading the direction is random.
    pub fn detour(&mut self, offset: f64, steps: usize) -> Vec<Point> {
        let (dx, dy) = match self.heading {
            Some((hx, hy)) if self.rng.gen_bool(0.5) => (-hy, hx),
            Some((hx, hy)) => (hy, -hx),
            None => {
                let angle = self.rng.gen_range(0.0..std::f64::consts::TAU);
                (angle.cos(), angle.sin())
            }
        };
        let target = Point::new(self.position.x + offset * dx, self.position.y + offset * dy);
        self.walk_to(target, steps)
    }

    /// A payload the stream decoder must reject.
    pub fn garbage_payload(&mut self) -> &'static str {
        GARBAGE[self.rng.gen_range(0..GARBAGE.len())]
    }

    /// Picks true with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Random crowd density over the map's tiles. Returns the grid and the
    /// number of well-formed entries in it; `malformed` extra entries have
    /// broken keys or non-numeric values.
    pub fn crowd_grid(
        &mut self,
        metadata: &MapMetadata,
        tiles: usize,
        malformed: usize,
    ) -> (RawDensityGrid, usize) {
        let cols = (metadata.map_width_px / metadata.tile_width).max(1.0) as i64;
        let rows = (metadata.map_height_px / metadata.tile_height).max(1.0) as i64;

        let mut grid = RawDensityGrid::new();
        while grid.len() < tiles && (grid.len() as i64) < cols * rows {
            let x = self.rng.gen_range(0..cols);
            let y = self.rng.gen_range(0..rows);
            // Occasionally out of range, the aggregator clamps
            let density: f64 = self.rng.gen_range(-0.2..1.3);
            grid.insert(format!("({}, {})", x, y), json!(density));
        }
        let valid = grid.len();

        for i in 0..malformed {
            if i % 2 == 0 {
                grid.insert(format!("(tile{}, ?)", i), json!(0.5));
            } else {
                grid.insert(format!("({}, 0)", cols + i as i64), json!("busy"));
            }
        }
        (grid, valid)
    }

    fn sample(&mut self) -> Point {
        match self.noise {
            Some(noise) => Point::new(
                self.position.x + noise.sample(&mut self.rng),
                self.position.y + noise.sample(&mut self.rng),
            ),
            None => self.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_ends_on_last_waypoint() {
        let mut oracle = Oracle::new(42);
        oracle.set_position_noise(0.0);

        let route = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 20.0)];
        let samples = oracle.walk(&route, 5);

        assert_eq!(samples.len(), 11);
        assert_eq!(samples[5], Point::new(10.0, 0.0));
        assert_eq!(oracle.position(), Point::new(10.0, 20.0));
    }

    #[test]
    fn test_oracle_deterministic_noise() {
        let route = [Point::new(0.0, 0.0), Point::new(100.0, 0.0)];
        let a = Oracle::new(7).walk(&route, 10);
        let b = Oracle::new(7).walk(&route, 10);
        let c = Oracle::new(8).walk(&route, 10);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_detour_moves_by_offset() {
        let mut oracle = Oracle::new(3);
        oracle.set_position_noise(0.0);
        oracle.walk(&[Point::new(50.0, 50.0)], 1);

        oracle.detour(40.0, 4);
        let moved = oracle.position().distance_to(&Point::new(50.0, 50.0));
        assert!((moved - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_detour_is_perpendicular_to_heading() {
        let mut oracle = Oracle::new(5);
        oracle.set_position_noise(0.0);
        oracle.walk(&[Point::new(20.0, 20.0), Point::new(20.0, 120.0)], 10);

        oracle.detour(60.0, 6);
        let end = oracle.position();
        assert!((end.y - 120.0).abs() < 1e-9);
        assert!(((end.x - 20.0).abs() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_crowd_grid_counts_valid_entries() {
        let mut oracle = Oracle::new(11);
        let (grid, valid) = oracle.crowd_grid(&MapMetadata::default(), 20, 4);
        assert_eq!(valid, 20);
        assert_eq!(grid.len(), 24);
    }
}
