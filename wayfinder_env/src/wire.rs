//! JSON payloads exchanged with the navigation backend.

use serde::{Deserialize, Serialize};

use crate::error::WayfinderError;
use crate::types::{MapMetadata, Point, RawDensityGrid};

/// Body of `POST /register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub jetson_id: String,
    pub map_id: String,
}

/// Body of `GET /map-data/{jetson_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapInfoResponse {
    pub map_info: MapMetadata,
}

/// Body of `GET /route/{type}/{destination}/{jetson_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    #[serde(default)]
    pub path: Vec<[f64; 2]>,
}

impl RouteResponse {
    pub fn into_points(self) -> Vec<Point> {
        self.path.into_iter().map(|[x, y]| Point::new(x, y)).collect()
    }
}

/// Body of `GET /crowd-heatmap/{jetson_id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DensityResponse {
    #[serde(default)]
    pub density_grid: RawDensityGrid,
}

/// Decodes one live position payload.
///
/// Extra fields are ignored; missing or non-numeric `x`/`y` and non-finite
/// values are rejected.
pub fn decode_position(payload: &str) -> Result<Point, WayfinderError> {
    let point: Point = serde_json::from_str(payload.trim())
        .map_err(|e| WayfinderError::MalformedMessage(format!("{}: {:?}", e, payload)))?;

    if !point.is_finite() {
        return Err(WayfinderError::MalformedMessage(format!(
            "non-finite position: {:?}",
            payload
        )));
    }

    Ok(point)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_position() {
        let p = decode_position(r#"{"x": 12, "y": 40.5}"#).unwrap();
        assert_eq!(p, Point::new(12.0, 40.5));

        let p = decode_position(r#"{"x": 1, "y": 2, "timestamp": 99.1}"#).unwrap();
        assert_eq!(p, Point::new(1.0, 2.0));
    }

    #[test]
    fn test_decode_position_rejects_garbage() {
        for bad in ["", "not json", r#"{"x": 1}"#, r#"{"x": "a", "y": 2}"#, "null"] {
            let err = decode_position(bad).unwrap_err();
            assert!(matches!(err, WayfinderError::MalformedMessage(_)), "{bad}");
        }
    }

    #[test]
    fn test_route_response_points() {
        let body: RouteResponse = serde_json::from_str(r#"{"path": [[4, 4], [12, 4]]}"#).unwrap();
        assert_eq!(
            body.into_points(),
            vec![Point::new(4.0, 4.0), Point::new(12.0, 4.0)]
        );
    }
}
