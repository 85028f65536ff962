//! # gordon-core
//!
//! The domain model, config and secret stores, route resolver, reverse
//! proxy, deployment orchestrator and admin HTTP surface for Gordon, a
//! single-host container deployment and routing daemon.
//!
//! ## Layer structure
//!
//! ```text
//! presentation/   ← axum HTTP listeners (admin API, reverse proxy)
//!     ↓
//! application/    ← service composition (GordonServices)
//!     ↓
//! domain/         ← routes, events, auth claims, the ContainerRuntime trait
//!     ↓
//! infrastructure/ ← TOML config store, file/external secret stores,
//!                   bollard-backed runtime, event bus, deploy orchestrator
//! ```
//!
//! The CLI crate (`gordon-cli`) depends on this crate for both the
//! `gordon daemon` command and the admin client used by every other
//! subcommand.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
