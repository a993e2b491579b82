//! Connection settings for the navigation backend.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::WayfinderError;
use crate::types::DeviceId;

/// Default backend address: the host loopback as seen from an Android emulator.
pub const DEFAULT_BASE_URL: &str = "http://10.0.2.2:8000";

/// Which push transport carries live positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// `ws(s)://host/ws/{jetson_id}`
    #[default]
    WebSocket,
    /// `http(s)://host/sse/{jetson_id}` with `data:` lines
    ServerSentEvents,
}

impl std::str::FromStr for StreamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ws" | "websocket" => Ok(StreamKind::WebSocket),
            "sse" | "server_sent_events" => Ok(StreamKind::ServerSentEvents),
            other => Err(format!("Unknown stream kind: {}", other)),
        }
    }
}

/// Configuration for the HTTP backend and the live position stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the REST API (default: `http://10.0.2.2:8000`)
    pub base_url: String,

    /// Base URL of the push stream; derived from `base_url` when unset
    pub stream_url: Option<String>,

    /// Push transport flavor (default: WebSocket)
    pub stream_kind: StreamKind,

    /// Per-request timeout for REST calls (default: 10s)
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stream_url: None,
            stream_kind: StreamKind::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl BackendConfig {
    /// Builds a config from `WAYFINDER_BASE_URL`, `WAYFINDER_STREAM_URL` and
    /// `WAYFINDER_STREAM_KIND`, falling back to defaults.
    pub fn from_env() -> Result<Self, WayfinderError> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("WAYFINDER_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(url) = std::env::var("WAYFINDER_STREAM_URL") {
            config.stream_url = Some(url);
        }
        if let Ok(kind) = std::env::var("WAYFINDER_STREAM_KIND") {
            config.stream_kind = kind.parse().map_err(WayfinderError::InvalidSelection)?;
        }
        Ok(config)
    }

    /// REST base URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// REST endpoint made of `segments`, each percent-encoded.
    pub fn api_url(&self, segments: &[&str]) -> Result<reqwest::Url, WayfinderError> {
        join_segments(self.api_base(), segments)
    }

    /// Full URL of the live position stream for `device`.
    pub fn stream_endpoint(&self, device: &DeviceId) -> Result<reqwest::Url, WayfinderError> {
        let base = match &self.stream_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match self.stream_kind {
                StreamKind::WebSocket => to_ws_scheme(self.api_base()),
                StreamKind::ServerSentEvents => self.api_base().to_string(),
            },
        };
        let segment = match self.stream_kind {
            StreamKind::WebSocket => "ws",
            StreamKind::ServerSentEvents => "sse",
        };
        join_segments(&base, &[segment, device.as_str()])
    }
}

/// Appends `segments` to the path of `base`. Reserved characters such as
/// `/`, `?` and `#` inside a segment are percent-encoded.
fn join_segments(base: &str, segments: &[&str]) -> Result<reqwest::Url, WayfinderError> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| WayfinderError::backend(format!("invalid base url {:?}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| WayfinderError::backend(format!("base url {:?} cannot carry a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url.to_string()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_endpoint_derived_from_base() {
        let device = DeviceId::new("jetson_01").unwrap();
        let mut config = BackendConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.stream_endpoint(&device).unwrap().as_str(), "ws://localhost:8000/ws/jetson_01");

        config.base_url = "https://museum.example".to_string();
        assert_eq!(config.stream_endpoint(&device).unwrap().as_str(), "wss://museum.example/ws/jetson_01");

        config.stream_kind = StreamKind::ServerSentEvents;
        assert_eq!(config.stream_endpoint(&device).unwrap().as_str(), "https://museum.example/sse/jetson_01");
    }

    #[test]
    fn test_stream_endpoint_override() {
        let device = DeviceId::new("jetson_02").unwrap();
        let config = BackendConfig {
            stream_url: Some("ws://10.0.0.5:9000".to_string()),
            ..Default::default()
        };
        assert_eq!(config.stream_endpoint(&device).unwrap().as_str(), "ws://10.0.0.5:9000/ws/jetson_02");
    }

    #[test]
    fn test_endpoints_encode_reserved_characters() {
        let device = DeviceId::new("hall/2?floor#a").unwrap();
        let mut config = BackendConfig {
            base_url: "http://localhost:8000/api/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.api_url(&["map-data", device.as_str()]).unwrap().as_str(),
            "http://localhost:8000/api/map-data/hall%2F2%3Ffloor%23a"
        );
        assert_eq!(
            config.stream_endpoint(&device).unwrap().as_str(),
            "ws://localhost:8000/api/ws/hall%2F2%3Ffloor%23a"
        );

        config.stream_kind = StreamKind::ServerSentEvents;
        let url = config.stream_endpoint(&device).unwrap();
        assert_eq!(url.path_segments().unwrap().last(), Some("hall%2F2%3Ffloor%23a"));
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_invalid_base_url_is_an_error() {
        let config = BackendConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.api_url(&["register"]).is_err());
    }

    #[test]
    fn test_stream_kind_parse() {
        assert_eq!("sse".parse::<StreamKind>().unwrap(), StreamKind::ServerSentEvents);
        assert_eq!("WebSocket".parse::<StreamKind>().unwrap(), StreamKind::WebSocket);
        assert!("mqtt".parse::<StreamKind>().is_err());
    }
}
