//! Error types for the Wayfinder environment abstraction.

use thiserror::Error;

/// Errors that can occur at the boundary between the navigation engine and
/// the outside world (backend services, position streams, wire payloads).
///
/// None of these are fatal to the process. Each one is either recovered
/// locally (dropped, skipped, ignored) or surfaced as a transient condition
/// the caller can retry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WayfinderError {
    /// The live position stream could not be opened or was lost.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The planning service could not produce a route.
    #[error("Route unavailable: {0}")]
    RouteUnavailable(String),

    /// A stream payload could not be decoded as a position.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A density grid key was not a `(gridX, gridY)` tuple.
    #[error("Malformed grid key: {0}")]
    MalformedGridKey(String),

    /// A backend request failed (transport error or non-success status).
    #[error("Backend error: {0}")]
    Backend(String),

    /// Device or map selection was empty or not allowed in the current state.
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// The requested session transition is not allowed.
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

impl WayfinderError {
    /// Creates a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a route-unavailable error.
    pub fn route_unavailable(msg: impl Into<String>) -> Self {
        Self::RouteUnavailable(msg.into())
    }

    /// Creates a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<reqwest::Error> for WayfinderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Backend(err.to_string())
    }
}
