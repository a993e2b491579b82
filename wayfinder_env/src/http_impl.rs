//! Production implementations backed by `reqwest` and `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::backend::{FrameStream, NavigationBackend, PositionTransport};
use crate::config::{BackendConfig, StreamKind};
use crate::error::WayfinderError;
use crate::types::{DeviceId, MapId, MapMetadata, Point, RawDensityGrid, RouteType, TransportFrame};
use crate::wire::{DensityResponse, MapInfoResponse, RegisterRequest, RouteResponse};

/// REST client for the navigation backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackend {
    /// Creates a backend client from the given configuration.
    pub fn new(config: BackendConfig) -> Result<Self, WayfinderError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Builds `/route/{type}/{destination}/{device}`.
    fn route_url(
        &self,
        destination: &str,
        route_type: RouteType,
        device: &DeviceId,
    ) -> Result<reqwest::Url, WayfinderError> {
        self.config
            .api_url(&["route", route_type.as_str(), destination, device.as_str()])
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, WayfinderError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(WayfinderError::backend(format!("{} returned HTTP {}", resp.url().path(), status)))
    }
}

#[async_trait]
impl NavigationBackend for HttpBackend {
    async fn register(&self, device: &DeviceId, map: &MapId) -> Result<(), WayfinderError> {
        let body = RegisterRequest {
            jetson_id: device.to_string(),
            map_id: map.to_string(),
        };
        let resp = self
            .client
            .post(self.config.api_url(&["register"])?)
            .json(&body)
            .send()
            .await?;
        check_status(resp)?;
        info!(device = %device, map = %map, "Registered with backend");
        Ok(())
    }

    async fn terminate(&self, device: &DeviceId) -> Result<(), WayfinderError> {
        let resp = self
            .client
            .get(self.config.api_url(&["terminate"])?)
            .query(&[("jetson_id", device.as_str())])
            .send()
            .await?;
        check_status(resp)?;
        Ok(())
    }

    async fn map_metadata(&self, device: &DeviceId) -> Result<MapMetadata, WayfinderError> {
        let resp = self
            .client
            .get(self.config.api_url(&["map-data", device.as_str()])?)
            .send()
            .await?;
        let body: MapInfoResponse = check_status(resp)?.json().await?;
        Ok(body.map_info)
    }

    async fn fetch_route(
        &self,
        destination: &str,
        route_type: RouteType,
        device: &DeviceId,
    ) -> Result<Vec<Point>, WayfinderError> {
        let url = self.route_url(destination, route_type, device)?;
        debug!(%url, "Requesting route");
        let resp = self.client.get(url).send().await?;
        let body: RouteResponse = check_status(resp)?.json().await?;
        Ok(body.into_points())
    }

    async fn fetch_density(&self, device: &DeviceId) -> Result<RawDensityGrid, WayfinderError> {
        let resp = self
            .client
            .get(self.config.api_url(&["crowd-heatmap", device.as_str()])?)
            .send()
            .await?;
        let body: DensityResponse = check_status(resp)?.json().await?;
        Ok(body.density_grid)
    }
}

/// Live positions over a WebSocket at `/ws/{jetson_id}`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    config: BackendConfig,
}

impl WebSocketTransport {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PositionTransport for WebSocketTransport {
    async fn connect(&self, device: &DeviceId) -> Result<FrameStream, WayfinderError> {
        let url = self.config.stream_endpoint(device)?;
        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| WayfinderError::connection(format!("{}: {}", url, e)))?;
        info!(%url, "WebSocket connected");

        let frames = stream::unfold(Some(ws), |state| async move {
            let mut ws = state?;
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return Some((TransportFrame::Text(text.to_string()), Some(ws)))
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        return Some((TransportFrame::Text(text), Some(ws)));
                    }
                    Some(Ok(Message::Close(_))) | None => return None,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Some((TransportFrame::Error(e.to_string()), None)),
                }
            }
        });

        Ok(frames.boxed())
    }
}

/// Live positions over Server-Sent Events at `/sse/{jetson_id}`.
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: reqwest::Client,
    config: BackendConfig,
}

impl SseTransport {
    pub fn new(config: BackendConfig) -> Result<Self, WayfinderError> {
        // No total timeout: the response body is the stream.
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PositionTransport for SseTransport {
    async fn connect(&self, device: &DeviceId) -> Result<FrameStream, WayfinderError> {
        let url = self.config.stream_endpoint(device)?;
        let resp = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| WayfinderError::connection(format!("{}: {}", url, e)))?;
        if !resp.status().is_success() {
            return Err(WayfinderError::connection(format!(
                "{}: HTTP {}",
                url,
                resp.status()
            )));
        }
        info!(%url, "Event stream connected");

        let body = resp.bytes_stream().boxed();
        let state = (Some(body), SseDecoder::default(), VecDeque::<String>::new());
        let frames = stream::unfold(state, |(mut body, mut decoder, mut pending)| async move {
            loop {
                if let Some(data) = pending.pop_front() {
                    return Some((TransportFrame::Text(data), (body, decoder, pending)));
                }
                let chunks = body.as_mut()?;
                match chunks.next().await {
                    Some(Ok(bytes)) => pending.extend(decoder.push(&bytes)),
                    Some(Err(e)) => {
                        return Some((TransportFrame::Error(e.to_string()), (None, decoder, pending)))
                    }
                    None => return None,
                }
            }
        });

        Ok(frames.boxed())
    }
}

/// Incremental `text/event-stream` parser yielding the `data` of each event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feeds raw bytes, returning every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
            // `event:`, `id:`, `retry:` and `:` comments carry nothing we use
        }

        events
    }
}

/// Transport selected at runtime from [`BackendConfig::stream_kind`].
#[derive(Debug, Clone)]
pub enum StreamTransport {
    WebSocket(WebSocketTransport),
    Sse(SseTransport),
}

impl StreamTransport {
    pub fn from_config(config: &BackendConfig) -> Result<Self, WayfinderError> {
        Ok(match config.stream_kind {
            StreamKind::WebSocket => Self::WebSocket(WebSocketTransport::new(config.clone())),
            StreamKind::ServerSentEvents => Self::Sse(SseTransport::new(config.clone())?),
        })
    }
}

#[async_trait]
impl PositionTransport for StreamTransport {
    async fn connect(&self, device: &DeviceId) -> Result<FrameStream, WayfinderError> {
        match self {
            Self::WebSocket(t) => t.connect(device).await,
            Self::Sse(t) => t.connect(device).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_decoder_split_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"x\": 1,").is_empty());
        assert!(decoder.push(b" \"y\": 2}\n").is_empty());
        let events = decoder.push(b"\ndata: {\"x\": 3, \"y\": 4}\r\n\r\n");
        assert_eq!(events, vec![r#"{"x": 1, "y": 2}"#, r#"{"x": 3, "y": 4}"#]);
    }

    #[test]
    fn test_sse_decoder_ignores_comments_and_fields() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keepalive\n\nevent: pose\nid: 7\ndata:{\"x\":0,\"y\":0}\n\n");
        assert_eq!(events, vec![r#"{"x":0,"y":0}"#]);
    }

    #[test]
    fn test_route_url_encodes_destination() {
        let backend = HttpBackend::new(BackendConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        })
        .unwrap();
        let device = DeviceId::new("jetson_01").unwrap();
        let url = backend
            .route_url("Egyptian Hall/East", RouteType::LessCrowd, &device)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/route/less_crowd/Egyptian%20Hall%2FEast/jetson_01"
        );
    }
}
