//! Route Fetch Client - thin wrapper over the planning service.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use wayfinder_env::{DeviceId, NavigationBackend, RouteType, WayfinderError};

use crate::deviation::Path;

/// Destination and optimization of the active route, kept for rerouting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub destination: String,
    pub route_type: RouteType,
}

impl RouteRequest {
    pub fn new(destination: impl Into<String>, route_type: RouteType) -> Self {
        Self {
            destination: destination.into(),
            route_type,
        }
    }
}

/// Fetches paths and normalizes every failure to `RouteUnavailable`.
pub struct RouteFetchClient<B: NavigationBackend> {
    backend: Arc<B>,
}

impl<B: NavigationBackend> RouteFetchClient<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Requests a path for `request` from the device's current location.
    ///
    /// An empty answer from the planner means no route exists and is
    /// reported as `RouteUnavailable`, never as an empty path.
    pub async fn fetch_path(
        &self,
        request: &RouteRequest,
        device: &DeviceId,
    ) -> Result<Path, WayfinderError> {
        if request.destination.trim().is_empty() {
            return Err(WayfinderError::route_unavailable("destination must not be empty"));
        }

        let points = self
            .backend
            .fetch_route(&request.destination, request.route_type, device)
            .await
            .map_err(|e| {
                warn!(destination = %request.destination, "Route fetch failed: {}", e);
                if matches!(e, WayfinderError::RouteUnavailable(_)) {
                    e
                } else {
                    WayfinderError::route_unavailable(e.to_string())
                }
            })?;

        let path = Path::new(points);
        if path.is_empty() {
            return Err(WayfinderError::route_unavailable(format!(
                "no {} route to {}",
                request.route_type, request.destination
            )));
        }

        debug!(destination = %request.destination, waypoints = path.len(), "Route fetched");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfinder_env::{MapId, MapMetadata, MemoryBackend, Point};

    async fn registered_backend() -> (Arc<MemoryBackend>, DeviceId) {
        let map = MapId::new("map_01").unwrap();
        let device = DeviceId::new("jetson_01").unwrap();
        let backend = MemoryBackend::new().with_map(map.clone(), MapMetadata::default());
        backend.register(&device, &map).await.unwrap();
        (Arc::new(backend), device)
    }

    #[tokio::test]
    async fn test_fetch_path() {
        let (backend, device) = registered_backend().await;
        backend.set_route("Cafe", vec![Point::new(4.0, 4.0), Point::new(12.0, 4.0)]);

        let client = RouteFetchClient::new(backend);
        let path = client
            .fetch_path(&RouteRequest::new("Cafe", RouteType::Fast), &device)
            .await
            .unwrap();
        assert_eq!(path.len(), 2);
    }

    #[tokio::test]
    async fn test_failures_map_to_route_unavailable() {
        let (backend, device) = registered_backend().await;
        backend.set_route("Nowhere", Vec::new());
        let client = RouteFetchClient::new(Arc::clone(&backend));

        for destination in ["Unknown", "Nowhere", "  "] {
            let err = client
                .fetch_path(&RouteRequest::new(destination, RouteType::LessCrowd), &device)
                .await
                .unwrap_err();
            assert!(matches!(err, WayfinderError::RouteUnavailable(_)), "{destination}");
        }

        backend.fail_routes(true);
        backend.set_route("Cafe", vec![Point::new(1.0, 1.0)]);
        let err = client
            .fetch_path(&RouteRequest::new("Cafe", RouteType::Fast), &device)
            .await
            .unwrap_err();
        assert!(matches!(err, WayfinderError::RouteUnavailable(_)));
    }
}
