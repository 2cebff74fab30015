//! Outgoing and incoming dispatch.
//!
//! Outgoing: [`encode_request`] turns a named call into a wire message;
//! [`RequestSender`] hands it to the connection's writer. One-way — reply
//! correlation is layered on by the session, not here.
//!
//! Incoming, two modes over the same lookup/decode/invoke path:
//!
//! - [`dispatch_concurrent`] (engine side): each message becomes an
//!   independent task; handler failures are logged and swallowed so one bad
//!   call cannot stop the dispatch loop.
//! - [`dispatch_inline`] (client side): invoked on the caller's own task,
//!   one message at a time, handler failures propagate; reports whether the
//!   call's drain loop should keep going.

use std::sync::Arc;

use hoist_wire::{protocol, Message, Shape, Value};
use tokio::sync::mpsc;
use tracing::warn;

use crate::errors::{CallError, DispatchError};
use crate::registry::Registry;

/// One named argument of an outgoing call.
#[derive(Debug, Clone)]
pub struct Arg<'a> {
    pub name: &'a str,
    pub value: Value,
    pub shape: Shape,
}

impl<'a> Arg<'a> {
    pub fn new(name: &'a str, value: impl Into<Value>, shape: Shape) -> Self {
        Self {
            name,
            value: value.into(),
            shape,
        }
    }
}

/// Build the wire message for a call: command, correlation id, and each
/// argument flattened according to its shape.
pub fn encode_request(command: &str, correlation_id: u64, args: &[Arg<'_>]) -> Message {
    let mut msg = Message::new(command);
    msg.set(protocol::RQID, correlation_id.to_string());
    for arg in args {
        msg.append(arg.name, &arg.value, &arg.shape);
    }
    msg
}

/// Outgoing dispatcher: serializes calls into wire messages and hands them
/// to the injected write side (the connection's single writer task).
#[derive(Debug, Clone)]
pub struct RequestSender {
    outbound: mpsc::Sender<Message>,
}

impl RequestSender {
    pub fn new(outbound: mpsc::Sender<Message>) -> Self {
        Self { outbound }
    }

    /// Fire-and-forget send of one call. Does not wait for any reply.
    pub async fn send(
        &self,
        command: &str,
        correlation_id: u64,
        args: &[Arg<'_>],
    ) -> Result<(), CallError> {
        self.send_message(encode_request(command, correlation_id, args))
            .await
    }

    /// Send an already-built message.
    pub async fn send_message(&self, msg: Message) -> Result<(), CallError> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| CallError::ConnectionLost)
    }
}

/// Engine-side dispatch: look up the operation, decode its parameters, and
/// run it as an independent unit of concurrent work.
///
/// An unknown command is reported to the caller (fatal for the message, not
/// the process). Handler failures inside the spawned task are logged and
/// swallowed. No ordering is guaranteed between different commands.
pub fn dispatch_concurrent<T>(
    registry: &Registry<T>,
    target: &Arc<T>,
    msg: &Message,
) -> Result<(), DispatchError>
where
    T: Send + Sync + 'static,
{
    let op = registry.lookup(&msg.command)?;
    let args = op.decode_args(msg);
    let invocation = op.invoke(Arc::clone(target), args);
    let command = msg.command.clone();
    tokio::spawn(async move {
        if let Err(err) = invocation.await {
            warn!(command = %command, error = %err, "operation handler failed");
        }
    });
    Ok(())
}

/// Client-side dispatch: same lookup/decode path, but invoked synchronously
/// on the caller's own task; handler failures propagate.
///
/// Returns `false` exactly when the dispatched command is one of the three
/// terminal commands, which is how a call's drain loop knows to stop.
pub async fn dispatch_inline<T>(
    registry: &Registry<T>,
    target: &Arc<T>,
    msg: &Message,
) -> Result<bool, DispatchError>
where
    T: Send + Sync,
{
    let op = registry.lookup(&msg.command)?;
    let args = op.decode_args(msg);
    op.invoke(Arc::clone(target), args)
        .await
        .map_err(DispatchError::Handler)?;
    Ok(!protocol::is_terminal(&msg.command))
}
