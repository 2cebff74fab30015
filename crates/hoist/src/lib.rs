#![deny(unsafe_code)]

//! Client core for the hoist package engine.
//!
//! This crate is the unified surface over the component crates; depend on
//! it rather than on the pieces individually.
//!
//! ```no_run
//! use std::io::Write;
//!
//! use hoist::{EngineClient, UnixConnector};
//!
//! # async fn demo() -> Result<(), hoist::CallError> {
//! let client = EngineClient::new(UnixConnector::well_known("hoist-cli"));
//!
//! for pkg in client.find_packages("z*").await? {
//!     println!("{} {}", pkg.name, pkg.version);
//! }
//!
//! client
//!     .install_package("zstd", |name, percent| {
//!         print!("\r{name}: {percent}%");
//!         let _ = std::io::stdout().flush();
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

// Wire format: messages, shapes, values, protocol constants.
pub use hoist_wire::{
    escape_component, protocol, unescape_component, FieldDef, Message, Shape, Value, WireRecord,
};

// Dispatch and session management.
pub use hoist_session::{
    dispatch_concurrent, dispatch_inline, encode_request, Arg, CallError, ConnectError,
    ConnectPolicy, Connector, DispatchError, HandlerError, ParamSpec, Registry, RegistryBuilder,
    ReplyMailbox, RequestSender, Session, Transport, TransportRx, TransportTx,
};

// Stream transports.
#[cfg(unix)]
pub use hoist_stream::UnixConnector;
pub use hoist_stream::{serve, LineFramed, LineReader, LineWriter, Responder};

// The typed engine surface.
pub use hoist_engine::{
    event_registry, EngineClient, EngineEvents, EngineFailure, FeedInfo, PackageSummary,
    PolicyInfo, ScheduledTask,
};
