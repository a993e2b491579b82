//! Wayfinder Scenario Harness
//!
//! Runs the full navigation engine against scripted, seeded visitors:
//! - **Backend**: in-memory registration, map metadata, routes and density
//! - **Stream**: in-memory push transport with fault injection
//! - **Visitor**: an [`Oracle`] walking routes with Gaussian position noise
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ tokio current-thread runtime (one per scenario)      │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                                                     │
//! │  ┌────▼──────────────┐   events   ┌──────────────────────┐  │
//! │  │ MemoryTransport   │──────────► │ SessionController    │  │
//! │  └────▲──────────────┘            └──────────▲───────────┘  │
//! │       │ positions, garbage, errors            │ routes      │
//! │  ┌────┴──────────────┐            ┌──────────┴───────────┐  │
//! │  │ Oracle (visitor)  │            │ MemoryBackend        │  │
//! │  └───────────────────┘            └──────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wayfinder_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::DetourReroute);
//! assert!(result.passed);
//! ```

mod oracle;
mod runner;
pub mod scenarios;

pub use oracle::Oracle;
pub use runner::{densify, ScenarioMetrics, ScenarioResult, ScenarioRunner};
