//! Transport abstraction.
//!
//! The engine connection is a single duplex, message-preserving channel.
//! [`Transport`] splits it into independent read and write halves so the
//! session can run one reader pump and one writer task; framing specifics
//! live in `hoist-stream`.

use std::future::Future;
use std::io;

use hoist_wire::Message;

/// The receive half of a connection. `recv` returns one whole wire message
/// at a time; reads are strictly sequential by construction since exactly
/// one pump task owns this half.
pub trait TransportRx: Send + 'static {
    /// Receive the next message. `Ok(None)` means the peer closed cleanly.
    fn recv(&mut self) -> impl Future<Output = io::Result<Option<Message>>> + Send;
}

/// The send half of a connection. Owned by the single writer task, which
/// serializes all writes.
pub trait TransportTx: Send + 'static {
    fn send(&mut self, msg: &Message) -> impl Future<Output = io::Result<()>> + Send;
}

/// A duplex engine connection, splittable into its two halves.
pub trait Transport: Send + 'static {
    type Rx: TransportRx;
    type Tx: TransportTx;

    fn split(self) -> (Self::Rx, Self::Tx);
}

/// A factory that opens connections to the engine on demand: on first use
/// and again after every disconnect or engine restart.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// Open one connection attempt. The session bounds each attempt with a
    /// timeout and retries per its [`ConnectPolicy`](crate::ConnectPolicy).
    fn connect(&self) -> impl Future<Output = io::Result<Self::Transport>> + Send;

    /// The session-start handshake message, sent once per connection with
    /// no reply awaited. Carries the `client`/`id` identification pair.
    fn session_start(&self) -> Message;
}
