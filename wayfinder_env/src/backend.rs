//! Service abstractions consumed by the navigation engine.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::WayfinderError;
use crate::types::{DeviceId, MapId, MapMetadata, Point, RawDensityGrid, RouteType};

/// Ordered frames produced by one live position connection.
///
/// The stream ending means the remote side closed the connection.
/// Dropping the stream closes the connection.
pub type FrameStream = BoxStream<'static, crate::types::TransportFrame>;

/// Request/response services of the navigation backend.
///
/// # Implementations
///
/// - **Production**: `HttpBackend` - JSON over HTTP via `reqwest`
/// - **In-memory**: `MemoryBackend` - scripted responses with fault injection
///
/// # Call Flow
///
/// ```text
/// Session                      Backend
///   |-- register(dev, map) ------->|
///   |-- map_metadata(dev) -------->|
///   |-- fetch_route(dest, ..) ---->|   (on demand, reroute)
///   |-- fetch_density(dev) ------->|   (on demand)
///   |-- terminate(dev) ----------->|
/// ```
#[async_trait]
pub trait NavigationBackend: Send + Sync + 'static {
    /// Registers `device` for use on `map`.
    ///
    /// Only success/failure matters to the engine.
    async fn register(&self, device: &DeviceId, map: &MapId) -> Result<(), WayfinderError>;

    /// Ends the session for `device`.
    async fn terminate(&self, device: &DeviceId) -> Result<(), WayfinderError>;

    /// Fetches the metadata of the map `device` is registered on.
    async fn map_metadata(&self, device: &DeviceId) -> Result<MapMetadata, WayfinderError>;

    /// Requests a path in map-pixel space from the device's current location
    /// to `destination`.
    ///
    /// # Returns
    /// * `Ok(path)` - Waypoints in route order (may be empty if no route exists)
    /// * `Err(_)` - The planner could not be reached or refused the request
    async fn fetch_route(
        &self,
        destination: &str,
        route_type: RouteType,
        device: &DeviceId,
    ) -> Result<Vec<Point>, WayfinderError>;

    /// Fetches the current crowd density grid with textual tile keys.
    async fn fetch_density(&self, device: &DeviceId) -> Result<RawDensityGrid, WayfinderError>;
}

/// Push-based source of live position payloads for one device.
///
/// # Implementations
///
/// - **Production**: `WebSocketTransport` (`/ws/{id}`), `SseTransport` (`/sse/{id}`)
/// - **In-memory**: `MemoryTransport` - counts connects/closes, frames injected by tests
#[async_trait]
pub trait PositionTransport: Send + Sync + 'static {
    /// Opens a persistent connection for `device`.
    ///
    /// # Returns
    /// * `Ok(stream)` - Frames in the order the transport received them
    /// * `Err(WayfinderError::Connection)` - The connection could not be established
    async fn connect(&self, device: &DeviceId) -> Result<FrameStream, WayfinderError>;
}
