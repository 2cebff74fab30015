#![deny(unsafe_code)]

//! Typed client surface for the hoist package engine.
//!
//! Three layers over `hoist-session`:
//!
//! - [`types`]: the records the engine speaks, with declared wire shapes.
//! - [`EngineEvents`]: one overridable method per engine notification, and
//!   [`event_registry`] to build the capability registry over any handler.
//! - [`EngineClient`]: one method per engine request operation, collecting
//!   each call's notifications into its typed result.

pub mod types;

mod client;
mod events;

pub use client::EngineClient;
pub use events::{event_registry, EngineEvents, EngineFailure};
pub use types::{FeedInfo, PackageSummary, PolicyInfo, ScheduledTask};
