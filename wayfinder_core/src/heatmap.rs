//! Crowd-density heatmap aggregation.
//!
//! Converts a sparse per-tile density grid into renderable heat
//! contributions in display space. Blending of overlapping contributions
//! happens at the rendering boundary, not here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;
use wayfinder_env::{MapMetadata, Point, RawDensityGrid, WayfinderError};

use crate::coords::{tile_center, DisplayScale, TileIndex, Viewport};

/// Radius of one heat spot in display pixels.
pub const DEFAULT_HEAT_RADIUS_PX: f64 = 60.0;

/// One heat spot to composite onto the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatContribution {
    pub center_display: Point,

    /// Density clamped to `[0, 1]`.
    pub intensity: f64,

    pub radius_px: f64,
}

/// Parses a textual tile key such as `"(3, 12)"`.
pub fn parse_grid_key(key: &str) -> Result<TileIndex, WayfinderError> {
    let malformed = || WayfinderError::MalformedGridKey(key.to_string());

    let inner = key.trim().trim_start_matches('(').trim_end_matches(')');
    let mut parts = inner.split(',');
    let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };
    let x = x.trim().parse::<i64>().map_err(|_| malformed())?;
    let y = y.trim().parse::<i64>().map_err(|_| malformed())?;
    Ok(TileIndex::new(x, y))
}

/// Density value per tile, replaced wholesale on every fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DensityGrid {
    cells: HashMap<TileIndex, f64>,
}

impl DensityGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a wire grid, skipping malformed keys and non-numeric values.
    pub fn from_raw(raw: &RawDensityGrid) -> Self {
        let mut cells = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            let tile = match parse_grid_key(key) {
                Ok(tile) => tile,
                Err(e) => {
                    warn!("Skipping density entry: {}", e);
                    continue;
                }
            };
            match value.as_f64().filter(|v| v.is_finite()) {
                Some(density) => {
                    cells.insert(tile, density);
                }
                None => warn!(key = %key, "Skipping non-numeric density value"),
            }
        }
        Self { cells }
    }

    pub fn insert(&mut self, tile: TileIndex, density: f64) {
        self.cells.insert(tile, density);
    }

    pub fn get(&self, tile: TileIndex) -> Option<f64> {
        self.cells.get(&tile).copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileIndex, f64)> + '_ {
        self.cells.iter().map(|(tile, density)| (*tile, *density))
    }
}

/// Converts a density grid into heat contributions. Output order is
/// unspecified.
pub fn aggregate(
    grid: &DensityGrid,
    metadata: &MapMetadata,
    viewport: &Viewport,
    radius_px: f64,
) -> Vec<HeatContribution> {
    let Some(scale) = DisplayScale::new(metadata, viewport) else {
        return Vec::new();
    };

    grid.iter()
        .filter_map(|(tile, density)| {
            let center = tile_center(tile, metadata)?;
            Some(HeatContribution {
                center_display: scale.apply(&center)?,
                intensity: density.clamp(0.0, 1.0),
                radius_px,
            })
        })
        .collect()
}

/// Decodes and aggregates a wire grid in one step.
pub fn aggregate_raw(
    raw: &RawDensityGrid,
    metadata: &MapMetadata,
    viewport: &Viewport,
    radius_px: f64,
) -> Vec<HeatContribution> {
    aggregate(&DensityGrid::from_raw(raw), metadata, viewport, radius_px)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn raw(entries: &[(&str, serde_json::Value)]) -> RawDensityGrid {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_parse_grid_key_variants() {
        assert_eq!(parse_grid_key("(1,2)").unwrap(), TileIndex::new(1, 2));
        assert_eq!(parse_grid_key("(1, 2)").unwrap(), TileIndex::new(1, 2));
        assert_eq!(parse_grid_key(" ( -3 ,  40 ) ").unwrap(), TileIndex::new(-3, 40));

        for bad in ["(x,y)", "(1)", "(1,2,3)", "", "(1.5, 2)", "(,)"] {
            assert!(
                matches!(parse_grid_key(bad), Err(WayfinderError::MalformedGridKey(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_single_entry_aggregates_to_tile_center() {
        let meta = MapMetadata::default();
        let viewport = Viewport::new(296.0, 448.0);

        let heat = aggregate_raw(&raw(&[("(1,2)", json!(0.5))]), &meta, &viewport, 60.0);

        assert_eq!(heat.len(), 1);
        assert_relative_eq!(heat[0].intensity, 0.5);
        assert_relative_eq!(heat[0].center_display.x, 12.0);
        assert_relative_eq!(heat[0].center_display.y, 20.0);
        assert_relative_eq!(heat[0].radius_px, 60.0);
    }

    #[test]
    fn test_overflowing_spots_are_dropped() {
        let grid = raw(&[("(1,0)", json!(0.5)), ("(0,1)", json!(0.7))]);

        let huge = Viewport::new(1.5e308, 1.0);
        assert!(aggregate_raw(&grid, &MapMetadata::default(), &huge, 60.0).is_empty());

        // (1,0) center lands at x = 1.5e308, which doubles past f64::MAX
        let wide_tiles = MapMetadata {
            tile_width: 1e308,
            ..MapMetadata::default()
        };
        let heat = aggregate_raw(&grid, &wide_tiles, &Viewport::new(592.0, 896.0), 60.0);
        assert_eq!(heat.len(), 1);
        assert!(heat[0].center_display.is_finite());
        assert_relative_eq!(heat[0].intensity, 0.7);
    }

    #[test]
    fn test_malformed_key_yields_nothing() {
        let meta = MapMetadata::default();
        let viewport = Viewport::new(296.0, 448.0);

        let heat = aggregate_raw(&raw(&[("(x,y)", json!(0.5))]), &meta, &viewport, 60.0);
        assert!(heat.is_empty());
    }

    #[test]
    fn test_intensity_is_clamped_and_bad_values_skipped() {
        let grid = DensityGrid::from_raw(&raw(&[
            ("(0, 0)", json!(1.7)),
            ("(1, 0)", json!(-0.2)),
            ("(2, 0)", json!("high")),
            ("(3, 0)", json!(null)),
        ]));
        assert_eq!(grid.len(), 2);

        let heat = aggregate(&grid, &MapMetadata::default(), &Viewport::new(296.0, 448.0), 60.0);
        let mut intensities: Vec<f64> = heat.iter().map(|h| h.intensity).collect();
        intensities.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(intensities, vec![0.0, 1.0]);
    }

    #[test]
    fn test_scaled_viewport() {
        let meta = MapMetadata::default();
        let viewport = Viewport::new(592.0, 900.0);
        let mut grid = DensityGrid::new();
        grid.insert(TileIndex::new(0, 0), 0.25);

        let heat = aggregate(&grid, &meta, &viewport, DEFAULT_HEAT_RADIUS_PX);
        assert_eq!(heat[0].center_display, Point::new(8.0, 8.0));
    }
}
