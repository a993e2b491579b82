//! Wayfinder Core - live indoor navigation tracking engine
//!
//! Turns a stream of raw visitor positions into navigation state:
//! 1. **Coordinate mapping**: grid tiles and map pixels into display space
//! 2. **Deviation tracking**: distance from the visitor to the active route
//! 3. **Crowd heatmaps**: per-tile density into renderable heat spots
//!
//! ```text
//!  backend ──► RouteFetchClient ─┐
//!                                ▼
//!  transport ─► LivePositionChannel ─► SessionController ─► NavigationState ─► MapView
//! ```

pub mod channel;
pub mod coords;
pub mod deviation;
pub mod heatmap;
pub mod routing;
pub mod session;
pub mod state;
pub mod view;

// Re-export key types for convenience
pub use channel::{ChannelEvent, ChannelHandle, LivePositionChannel};
pub use coords::{path_to_display, tile_center, tile_of, to_display, DisplayScale, TileIndex, Viewport};
pub use deviation::{evaluate, evaluate_with, DeviationTracker, DistanceMetric, Evaluation, Path};
pub use heatmap::{aggregate, aggregate_raw, parse_grid_key, DensityGrid, HeatContribution};
pub use routing::{RouteFetchClient, RouteRequest};
pub use session::{
    DensityTicket, FetchOutcome, ReconnectPolicy, RegistrationOutcome, RegistrationPolicy,
    RouteFetchKind, RouteTicket, SessionConfig, SessionController, SessionUpdate,
};
pub use state::{NavigationState, SessionState};
pub use view::MapView;
