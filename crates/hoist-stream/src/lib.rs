#![deny(unsafe_code)]

//! Stream transports for the hoist engine protocol.
//!
//! The wire format is one percent-encoded message per line, so framing over
//! a byte stream is newline splitting:
//!
//! - [`LineFramed`] wraps any `AsyncRead + AsyncWrite` stream and speaks
//!   whole [`Message`](hoist_wire::Message)s; it splits into the session
//!   layer's transport halves.
//! - [`UnixConnector`] opens connections to the engine's local socket and
//!   supplies the session-start handshake.
//! - [`serve`] runs the engine side of one accepted connection, dispatching
//!   each inbound message concurrently through a capability registry.

mod connector;
mod framing;
mod server;

#[cfg(unix)]
pub use connector::{UnixConnector, ENGINE_SOCKET_NAME};
pub use framing::{LineFramed, LineReader, LineWriter};
pub use server::{serve, Responder};
