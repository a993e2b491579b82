//! Wayfinder Environment Abstraction Layer
//!
//! This crate isolates everything the navigation engine consumes from the
//! outside world, so the engine can run against the real backend or against
//! scripted in-memory services:
//! - Request/response services (`register`, `terminate`, map metadata,
//!   route and crowd-density fetches) behind [`NavigationBackend`]
//! - The live position push stream behind [`PositionTransport`]
//!
//! # Example
//!
//! ```ignore
//! use wayfinder_env::{BackendConfig, HttpBackend, StreamTransport};
//!
//! let config = BackendConfig::from_env()?;
//! let backend = HttpBackend::new(config.clone())?;
//! let transport = StreamTransport::from_config(&config)?;
//! ```

mod backend;
mod config;
mod error;
mod http_impl;
mod memory;
mod types;
pub mod wire;

pub use backend::{FrameStream, NavigationBackend, PositionTransport};
pub use config::{BackendConfig, StreamKind, DEFAULT_BASE_URL};
pub use error::WayfinderError;
pub use http_impl::{HttpBackend, SseDecoder, SseTransport, StreamTransport, WebSocketTransport};
pub use memory::{MemoryBackend, MemoryTransport};
pub use types::{DeviceId, MapId, MapMetadata, Point, RawDensityGrid, RouteType, TransportFrame};
