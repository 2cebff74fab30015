#![deny(unsafe_code)]

//! Session layer for the hoist engine protocol.
//!
//! One physical duplex connection to the engine carries many concurrent
//! logical calls. Each call allocates a correlation id, registers a
//! [`ReplyMailbox`] under it, sends its request with the id stamped on, and
//! drains asynchronous reply notifications in arrival order until a
//! terminal message. A single reader pump routes every inbound message to
//! the mailbox matching its correlation id.
//!
//! The pieces:
//!
//! - [`Registry`] — command name → invocable operation with declared
//!   parameter shapes.
//! - [`dispatch_concurrent`] / [`dispatch_inline`] — the two incoming
//!   dispatch modes (engine-side fire-and-forget, client-side per-call).
//! - [`RequestSender`] / [`encode_request`] — outgoing dispatch.
//! - [`ReplyMailbox`] — the per-call inbound queue.
//! - [`Session`] — the connection manager: lazy connect with bounded
//!   retries, the reader pump, restart masking, disconnect.

mod dispatch;
mod errors;
mod mailbox;
mod registry;
mod session;
mod transport;

pub use dispatch::{dispatch_concurrent, dispatch_inline, encode_request, Arg, RequestSender};
pub use errors::{CallError, ConnectError, DispatchError, HandlerError};
pub use mailbox::ReplyMailbox;
pub use registry::{InvokeFn, InvokeFuture, OperationDescriptor, ParamSpec, Registry, RegistryBuilder};
pub use session::{ConnectPolicy, Session};
pub use transport::{Connector, Transport, TransportRx, TransportTx};
