//! Common types for the Wayfinder environment abstraction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::WayfinderError;

/// Identifier of the tracked positioning device (e.g. `jetson_01`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device identifier, rejecting empty or blank strings.
    pub fn new(id: impl Into<String>) -> Result<Self, WayfinderError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(WayfinderError::InvalidSelection(
                "device id must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a facility map (e.g. `map_01`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(String);

impl MapId {
    /// Creates a map identifier, rejecting empty or blank strings.
    pub fn new(id: impl Into<String>) -> Result<Self, WayfinderError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(WayfinderError::InvalidSelection(
                "map id must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Route optimization requested from the planning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteType {
    /// Shortest route.
    #[default]
    Fast,
    /// Route that penalizes crowded tiles.
    LessCrowd,
}

impl RouteType {
    /// Returns the path segment used by the planning service.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Fast => "fast",
            RouteType::LessCrowd => "less_crowd",
        }
    }
}

impl std::fmt::Display for RouteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RouteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(RouteType::Fast),
            "less_crowd" | "less-crowd" => Ok(RouteType::LessCrowd),
            other => Err(format!("Unknown route type: {}", other)),
        }
    }
}

/// A point in a 2D coordinate space (map-pixel or display space).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns true if both coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Static description of a facility map, as served by the backend.
///
/// Immutable once fetched for a map; a new map selection replaces it
/// wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMetadata {
    #[serde(rename = "map_width_in_px")]
    pub map_width_px: f64,

    #[serde(rename = "map_height_in_px")]
    pub map_height_px: f64,

    pub tile_width: f64,

    pub tile_height: f64,

    /// Display name of a landmark -> landmark identifier on the backend.
    #[serde(rename = "landmarks_mapping", default)]
    pub landmarks: HashMap<String, serde_json::Value>,
}

impl MapMetadata {
    /// Returns true if all dimensions are finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        [
            self.map_width_px,
            self.map_height_px,
            self.tile_width,
            self.tile_height,
        ]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
    }

    /// Landmark names usable as route destinations, sorted.
    pub fn landmark_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.landmarks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for MapMetadata {
    /// Fallback used when the metadata source is unavailable: a 37x56 grid
    /// of 8px tiles.
    fn default() -> Self {
        Self {
            map_width_px: 296.0,
            map_height_px: 448.0,
            tile_width: 8.0,
            tile_height: 8.0,
            landmarks: HashMap::new(),
        }
    }
}

/// Density grid exactly as delivered on the wire: textual `"(x, y)"` keys.
pub type RawDensityGrid = HashMap<String, serde_json::Value>;

/// One item produced by a position transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportFrame {
    /// A text payload, expected to be a JSON `{x, y}` object.
    Text(String),

    /// A transport-level failure. The stream ends after this frame.
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_reject_blank() {
        assert!(DeviceId::new("").is_err());
        assert!(DeviceId::new("   ").is_err());
        assert!(MapId::new("").is_err());
        assert_eq!(DeviceId::new("jetson_01").unwrap().as_str(), "jetson_01");
    }

    #[test]
    fn test_route_type_parse() {
        assert_eq!("fast".parse::<RouteType>().unwrap(), RouteType::Fast);
        assert_eq!("LESS_CROWD".parse::<RouteType>().unwrap(), RouteType::LessCrowd);
        assert!("scenic".parse::<RouteType>().is_err());
        assert_eq!(RouteType::LessCrowd.to_string(), "less_crowd");
    }

    #[test]
    fn test_metadata_default_and_wire_names() {
        let meta = MapMetadata::default();
        assert!(meta.is_valid());
        assert_eq!(meta.map_width_px, 296.0);
        assert_eq!(meta.map_height_px, 448.0);

        let json = r#"{
            "map_width_in_px": 400,
            "map_height_in_px": 200,
            "tile_width": 10,
            "tile_height": 10,
            "landmarks_mapping": {"Cafe": 3, "Atrium": 2}
        }"#;
        let parsed: MapMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.map_width_px, 400.0);
        assert_eq!(parsed.map_height_px, 200.0);
        assert_eq!(parsed.landmark_names(), vec!["Atrium", "Cafe"]);
    }

    #[test]
    fn test_metadata_invalid_dimensions() {
        let meta = MapMetadata {
            map_width_px: 0.0,
            ..MapMetadata::default()
        };
        assert!(!meta.is_valid());

        let meta = MapMetadata {
            tile_height: f64::NAN,
            ..MapMetadata::default()
        };
        assert!(!meta.is_valid());
    }
}
