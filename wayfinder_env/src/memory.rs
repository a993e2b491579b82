//! In-memory implementations with call counting and fault injection.
//!
//! Used by unit tests and the scenario harness in place of the real
//! backend and push stream.

use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::backend::{FrameStream, NavigationBackend, PositionTransport};
use crate::error::WayfinderError;
use crate::types::{DeviceId, MapId, MapMetadata, Point, RawDensityGrid, RouteType, TransportFrame};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Push transport whose frames are injected by the caller.
///
/// Every `connect` creates a fresh connection; only the most recent one
/// receives injected frames. Dropping a connection's stream counts as a close.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<TransportInner>,
}

#[derive(Default)]
struct TransportInner {
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_connects: AtomicUsize,
    open_at_connect: Mutex<Vec<usize>>,
    current: Mutex<Option<mpsc::UnboundedSender<TransportFrame>>>,
    devices: Mutex<Vec<DeviceId>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `connect` calls.
    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Number of connection streams dropped so far.
    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> usize {
        self.opens() - self.closes()
    }

    /// For each successful `connect`, how many connections were still open
    /// when it was made.
    pub fn open_at_connect(&self) -> Vec<usize> {
        lock(&self.inner.open_at_connect).clone()
    }

    /// Devices passed to `connect`, in call order.
    pub fn connected_devices(&self) -> Vec<DeviceId> {
        lock(&self.inner.devices).clone()
    }

    /// Makes the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.inner.fail_connects.store(count, Ordering::SeqCst);
    }

    /// Delivers a text payload on the latest connection.
    ///
    /// Returns false if no connection is open.
    pub fn push_text(&self, payload: impl Into<String>) -> bool {
        self.push(TransportFrame::Text(payload.into()))
    }

    /// Delivers a `{x, y}` JSON position on the latest connection.
    pub fn push_position(&self, point: Point) -> bool {
        self.push_text(format!(r#"{{"x": {}, "y": {}}}"#, point.x, point.y))
    }

    /// Fails the latest connection with a transport error.
    pub fn push_error(&self, reason: impl Into<String>) -> bool {
        let sent = self.push(TransportFrame::Error(reason.into()));
        lock(&self.inner.current).take();
        sent
    }

    /// Ends the latest connection as if the server closed it.
    pub fn hang_up(&self) -> bool {
        lock(&self.inner.current).take().is_some()
    }

    fn push(&self, frame: TransportFrame) -> bool {
        match lock(&self.inner.current).as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl PositionTransport for MemoryTransport {
    async fn connect(&self, device: &DeviceId) -> Result<FrameStream, WayfinderError> {
        let should_fail = self
            .inner
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(WayfinderError::connection(format!("refused connection for {}", device)));
        }

        lock(&self.inner.open_at_connect).push(self.open_connections());
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.inner.current) = Some(tx);
        lock(&self.inner.devices).push(device.clone());
        self.inner.opens.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryStream {
            rx,
            inner: Arc::clone(&self.inner),
            ended: false,
        }
        .boxed())
    }
}

struct MemoryStream {
    rx: mpsc::UnboundedReceiver<TransportFrame>,
    inner: Arc<TransportInner>,
    ended: bool,
}

impl Stream for MemoryStream {
    type Item = TransportFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.ended {
            return Poll::Ready(None);
        }
        let polled = self.rx.poll_recv(cx);
        if let Poll::Ready(Some(TransportFrame::Error(_))) = &polled {
            self.ended = true;
        }
        polled
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted navigation backend.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<BackendInner>,
}

#[derive(Default)]
struct BackendInner {
    registrations: AtomicUsize,
    terminations: AtomicUsize,
    route_requests: AtomicUsize,
    density_requests: AtomicUsize,
    fail_register: AtomicBool,
    fail_metadata: AtomicBool,
    fail_routes: AtomicBool,
    registered: Mutex<HashMap<DeviceId, MapId>>,
    maps: Mutex<HashMap<MapId, MapMetadata>>,
    routes: Mutex<HashMap<String, Vec<Point>>>,
    density: Mutex<RawDensityGrid>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `metadata` for devices registered on `map`.
    pub fn with_map(self, map: MapId, metadata: MapMetadata) -> Self {
        lock(&self.inner.maps).insert(map, metadata);
        self
    }

    /// Sets the path returned for `destination`, for any route type.
    pub fn set_route(&self, destination: impl Into<String>, path: Vec<Point>) {
        lock(&self.inner.routes).insert(destination.into(), path);
    }

    /// Sets the raw density grid returned by `fetch_density`.
    pub fn set_density(&self, grid: RawDensityGrid) {
        *lock(&self.inner.density) = grid;
    }

    pub fn fail_register(&self, fail: bool) {
        self.inner.fail_register.store(fail, Ordering::SeqCst);
    }

    pub fn fail_metadata(&self, fail: bool) {
        self.inner.fail_metadata.store(fail, Ordering::SeqCst);
    }

    pub fn fail_routes(&self, fail: bool) {
        self.inner.fail_routes.store(fail, Ordering::SeqCst);
    }

    pub fn registrations(&self) -> usize {
        self.inner.registrations.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.inner.terminations.load(Ordering::SeqCst)
    }

    pub fn route_requests(&self) -> usize {
        self.inner.route_requests.load(Ordering::SeqCst)
    }

    pub fn density_requests(&self) -> usize {
        self.inner.density_requests.load(Ordering::SeqCst)
    }

    pub fn is_registered(&self, device: &DeviceId) -> bool {
        lock(&self.inner.registered).contains_key(device)
    }
}

#[async_trait]
impl NavigationBackend for MemoryBackend {
    async fn register(&self, device: &DeviceId, map: &MapId) -> Result<(), WayfinderError> {
        self.inner.registrations.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_register.load(Ordering::SeqCst) {
            return Err(WayfinderError::backend("registration rejected"));
        }
        let mut registered = lock(&self.inner.registered);
        if registered.contains_key(device) {
            return Err(WayfinderError::backend("jetson_id already registered."));
        }
        registered.insert(device.clone(), map.clone());
        Ok(())
    }

    async fn terminate(&self, device: &DeviceId) -> Result<(), WayfinderError> {
        self.inner.terminations.fetch_add(1, Ordering::SeqCst);
        match lock(&self.inner.registered).remove(device) {
            Some(_) => Ok(()),
            None => Err(WayfinderError::backend("jetson has not been registered.")),
        }
    }

    async fn map_metadata(&self, device: &DeviceId) -> Result<MapMetadata, WayfinderError> {
        if self.inner.fail_metadata.load(Ordering::SeqCst) {
            return Err(WayfinderError::backend("map data unavailable"));
        }
        let map = lock(&self.inner.registered)
            .get(device)
            .cloned()
            .ok_or_else(|| WayfinderError::backend(format!("{} is not registered", device)))?;
        lock(&self.inner.maps)
            .get(&map)
            .cloned()
            .ok_or_else(|| WayfinderError::backend(format!("unknown map {}", map)))
    }

    async fn fetch_route(
        &self,
        destination: &str,
        _route_type: RouteType,
        device: &DeviceId,
    ) -> Result<Vec<Point>, WayfinderError> {
        self.inner.route_requests.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_routes.load(Ordering::SeqCst) {
            return Err(WayfinderError::backend("planner unavailable"));
        }
        if !self.is_registered(device) {
            return Err(WayfinderError::backend(format!("{} is not registered", device)));
        }
        lock(&self.inner.routes)
            .get(destination)
            .cloned()
            .ok_or_else(|| WayfinderError::backend(format!("unknown destination {}", destination)))
    }

    async fn fetch_density(&self, _device: &DeviceId) -> Result<RawDensityGrid, WayfinderError> {
        self.inner.density_requests.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.inner.density).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceId {
        DeviceId::new("jetson_01").unwrap()
    }

    #[tokio::test]
    async fn test_memory_transport_counts_open_close() {
        let transport = MemoryTransport::new();
        let mut stream = transport.connect(&device()).await.unwrap();
        assert_eq!(transport.opens(), 1);
        assert_eq!(transport.open_connections(), 1);

        assert!(transport.push_text("hello"));
        assert_eq!(stream.next().await, Some(TransportFrame::Text("hello".into())));

        let second = transport.connect(&device()).await.unwrap();
        drop(stream);
        assert_eq!(transport.closes(), 1);
        assert_eq!(transport.open_connections(), 1);
        assert_eq!(transport.open_at_connect(), vec![0, 1]);
        drop(second);
        assert_eq!(transport.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_memory_transport_error_ends_stream() {
        let transport = MemoryTransport::new();
        let mut stream = transport.connect(&device()).await.unwrap();
        transport.push_error("reset by peer");
        assert_eq!(stream.next().await, Some(TransportFrame::Error("reset by peer".into())));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_memory_transport_injected_failures() {
        let transport = MemoryTransport::new();
        transport.fail_next_connects(1);
        assert!(transport.connect(&device()).await.is_err());
        assert!(transport.connect(&device()).await.is_ok());
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test]
    async fn test_memory_backend_registration_lifecycle() {
        let map = MapId::new("map_01").unwrap();
        let backend = MemoryBackend::new().with_map(map.clone(), MapMetadata::default());

        backend.register(&device(), &map).await.unwrap();
        assert!(backend.register(&device(), &map).await.is_err());
        assert_eq!(backend.map_metadata(&device()).await.unwrap(), MapMetadata::default());

        backend.terminate(&device()).await.unwrap();
        assert!(backend.terminate(&device()).await.is_err());
        assert_eq!(backend.terminations(), 2);
    }
}
