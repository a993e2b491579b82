//! Coordinate mapping between grid, map-pixel and display space.
//!
//! Three spaces are involved:
//! - **Grid space**: integer tile indices `(gridX, gridY)`
//! - **Map-pixel space**: the original map image's pixels, used by the
//!   positioning backend and the planner
//! - **Display space**: the rendering surface, scaled to the viewport width
//!   with the map's own aspect ratio (never the viewport's)
//!
//! Everything here is pure. Non-finite inputs and degenerate metadata
//! produce `None` rather than NaN coordinates.

use serde::{Deserialize, Serialize};
use wayfinder_env::{MapMetadata, Point};

/// Size of the rendering surface in display pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width_px: f64,
    pub height_px: f64,
}

impl Viewport {
    pub fn new(width_px: f64, height_px: f64) -> Self {
        Self { width_px, height_px }
    }

    pub fn is_valid(&self) -> bool {
        self.width_px.is_finite()
            && self.width_px > 0.0
            && self.height_px.is_finite()
            && self.height_px >= 0.0
    }

    /// Size of the displayed map: full viewport width, height from the map
    /// aspect ratio.
    pub fn display_size(&self, metadata: &MapMetadata) -> Option<(f64, f64)> {
        if !self.is_valid() || !metadata.is_valid() {
            return None;
        }
        let width = self.width_px;
        let height = width * (metadata.map_height_px / metadata.map_width_px);
        if !height.is_finite() {
            return None;
        }
        Some((width, height))
    }

    /// Vertical padding above the displayed map when the viewport is taller
    /// than the map (letterboxing). Zero when the map overflows.
    pub fn vertical_inset(&self, metadata: &MapMetadata) -> f64 {
        match self.display_size(metadata) {
            Some((_, height)) => ((self.height_px - height) / 2.0).max(0.0),
            None => 0.0,
        }
    }
}

/// Integer tile coordinate in grid space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileIndex {
    pub x: i64,
    pub y: i64,
}

impl TileIndex {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Per-axis scale from map-pixel space to display space.
///
/// Both axes are computed independently; they coincide only when the
/// display keeps the map's aspect ratio exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayScale {
    pub x: f64,
    pub y: f64,
}

impl DisplayScale {
    pub fn new(metadata: &MapMetadata, viewport: &Viewport) -> Option<Self> {
        let (width, height) = viewport.display_size(metadata)?;
        let scale = Self {
            x: width / metadata.map_width_px,
            y: height / metadata.map_height_px,
        };
        (scale.x.is_finite() && scale.y.is_finite()).then_some(scale)
    }

    /// Scales a point, or `None` if the input or the result is not finite.
    pub fn apply(&self, point: &Point) -> Option<Point> {
        if !point.is_finite() {
            return None;
        }
        let scaled = Point::new(point.x * self.x, point.y * self.y);
        scaled.is_finite().then_some(scaled)
    }
}

/// Maps a map-pixel point into display space.
pub fn to_display(point: &Point, metadata: &MapMetadata, viewport: &Viewport) -> Option<Point> {
    DisplayScale::new(metadata, viewport)?.apply(point)
}

/// Maps a whole path into display space, dropping points that cannot be
/// mapped.
pub fn path_to_display(path: &[Point], metadata: &MapMetadata, viewport: &Viewport) -> Vec<Point> {
    match DisplayScale::new(metadata, viewport) {
        Some(scale) => path.iter().filter_map(|p| scale.apply(p)).collect(),
        None => Vec::new(),
    }
}

/// Map-pixel center of a tile.
pub fn tile_center(tile: TileIndex, metadata: &MapMetadata) -> Option<Point> {
    if !metadata.is_valid() {
        return None;
    }
    Some(Point::new(
        tile.x as f64 * metadata.tile_width + metadata.tile_width / 2.0,
        tile.y as f64 * metadata.tile_height + metadata.tile_height / 2.0,
    ))
}

/// Tile containing a map-pixel point.
pub fn tile_of(point: &Point, metadata: &MapMetadata) -> Option<TileIndex> {
    if !point.is_finite() || !metadata.is_valid() {
        return None;
    }
    Some(TileIndex::new(
        (point.x / metadata.tile_width).floor() as i64,
        (point.y / metadata.tile_height).floor() as i64,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn museum() -> MapMetadata {
        MapMetadata::default()
    }

    #[test]
    fn test_origin_tile_maps_to_four_four() {
        let meta = museum();
        let viewport = Viewport::new(296.0, 800.0);

        let center = tile_center(TileIndex::new(0, 0), &meta).unwrap();
        let display = to_display(&center, &meta, &viewport).unwrap();

        assert_relative_eq!(display.x, 4.0, epsilon = 1e-9);
        assert_relative_eq!(display.y, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_display_height_follows_map_aspect() {
        let meta = museum();
        let viewport = Viewport::new(592.0, 300.0);
        let (w, h) = viewport.display_size(&meta).unwrap();
        assert_relative_eq!(w, 592.0);
        assert_relative_eq!(h, 896.0);

        // Far corner lands on the far corner of the displayed map
        let corner = to_display(&Point::new(296.0, 448.0), &meta, &viewport).unwrap();
        assert_relative_eq!(corner.x, 592.0, epsilon = 1e-9);
        assert_relative_eq!(corner.y, 896.0, epsilon = 1e-9);
    }

    #[test]
    fn test_vertical_inset() {
        let meta = museum();
        // displayed height = 448 for a 296 wide viewport
        assert_relative_eq!(Viewport::new(296.0, 648.0).vertical_inset(&meta), 100.0);
        assert_relative_eq!(Viewport::new(296.0, 200.0).vertical_inset(&meta), 0.0);
    }

    #[test]
    fn test_non_finite_inputs_are_ignored() {
        let meta = museum();
        let viewport = Viewport::new(296.0, 448.0);

        assert!(to_display(&Point::new(f64::NAN, 1.0), &meta, &viewport).is_none());
        assert!(to_display(&Point::new(1.0, f64::INFINITY), &meta, &viewport).is_none());
        assert!(to_display(&Point::new(1.0, 1.0), &meta, &Viewport::new(f64::NAN, 1.0)).is_none());

        let broken = MapMetadata {
            map_width_px: 0.0,
            ..museum()
        };
        assert!(to_display(&Point::new(1.0, 1.0), &broken, &viewport).is_none());
        assert!(tile_center(TileIndex::new(1, 1), &broken).is_none());
    }

    #[test]
    fn test_overflowing_inputs_never_produce_nan() {
        let meta = museum();

        // Display height overflows to inf for a huge but finite width
        let huge = Viewport::new(1.5e308, 1.0);
        assert!(huge.display_size(&meta).is_none());
        assert!(to_display(&Point::new(0.0, 0.0), &meta, &huge).is_none());
        assert!(path_to_display(&[Point::new(0.0, 0.0)], &meta, &huge).is_empty());

        // Scale factor overflows for a tiny map
        let tiny = MapMetadata {
            map_width_px: 1e-300,
            map_height_px: 1e-300,
            ..meta.clone()
        };
        assert!(DisplayScale::new(&tiny, &Viewport::new(1e10, 1.0)).is_none());

        // Finite scale, point pushed past f64::MAX
        let viewport = Viewport::new(592.0, 896.0);
        assert!(to_display(&Point::new(1e308, 1.0), &meta, &viewport).is_none());
        let kept = path_to_display(&[Point::new(1e308, 0.0), Point::new(1.0, 1.0)], &meta, &viewport);
        assert_eq!(kept, vec![Point::new(2.0, 2.0)]);
    }

    #[test]
    fn test_path_to_display_skips_bad_points() {
        let meta = museum();
        let viewport = Viewport::new(148.0, 224.0);
        let path = vec![Point::new(0.0, 0.0), Point::new(f64::NAN, 2.0), Point::new(100.0, 200.0)];

        let display = path_to_display(&path, &meta, &viewport);
        assert_eq!(display, vec![Point::new(0.0, 0.0), Point::new(50.0, 100.0)]);
    }

    #[test]
    fn test_tile_of_roundtrips_center() {
        let meta = museum();
        let tile = TileIndex::new(3, 7);
        let center = tile_center(tile, &meta).unwrap();
        assert_eq!(tile_of(&center, &meta), Some(tile));
        assert_eq!(tile_of(&Point::new(-0.5, 0.0), &meta), Some(TileIndex::new(-1, 0)));
    }

    proptest! {
        #[test]
        fn prop_display_mapping_is_monotonic(
            a in -1000.0f64..1000.0,
            b in -1000.0f64..1000.0,
            width in 1.0f64..4000.0,
            map_w in 1.0f64..2000.0,
            map_h in 1.0f64..2000.0,
        ) {
            let meta = MapMetadata {
                map_width_px: map_w,
                map_height_px: map_h,
                ..museum()
            };
            let viewport = Viewport::new(width, 100.0);

            let pa = to_display(&Point::new(a, a), &meta, &viewport).unwrap();
            let pb = to_display(&Point::new(b, b), &meta, &viewport).unwrap();

            if a < b {
                prop_assert!(pa.x <= pb.x);
                prop_assert!(pa.y <= pb.y);
            } else if a > b {
                prop_assert!(pa.x >= pb.x);
                prop_assert!(pa.y >= pb.y);
            }
        }
    }
}
