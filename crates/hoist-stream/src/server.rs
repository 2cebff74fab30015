//! Engine-side serving: one connection, one concurrent dispatch loop.

use std::io;
use std::sync::Arc;

use hoist_session::{dispatch_concurrent, Registry};
use hoist_wire::{protocol, Message};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::framing::{LineReader, LineWriter};

/// The write side of a served connection, handed to operation handlers so
/// they can emit notifications and terminals. Cheap to clone; all clones
/// feed the connection's single writer task.
#[derive(Debug, Clone)]
pub struct Responder {
    outbound: mpsc::Sender<Message>,
}

impl Responder {
    pub async fn send(&self, msg: Message) -> io::Result<()> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))
    }

    /// A reply to `request`: given command, same correlation id.
    pub fn reply(request: &Message, command: &str) -> Message {
        let mut msg = Message::new(command);
        if let Some(rqid) = request.get(protocol::RQID) {
            msg.set(protocol::RQID, rqid);
        }
        msg
    }
}

/// Serve one accepted connection until the peer closes it.
///
/// `make_target` receives the connection's [`Responder`] and builds the
/// dispatch target; every inbound message then runs through the registry
/// as an independent unit of concurrent work. Session-start handshakes are
/// acknowledged by logging only, and an unknown command is logged and
/// skipped rather than ending the connection.
pub async fn serve<S, T, F>(stream: S, registry: &Registry<T>, make_target: F) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: Send + Sync + 'static,
    F: FnOnce(Responder) -> Arc<T>,
{
    let (read, write) = tokio::io::split(stream);
    let mut reader = LineReader::new(read);
    let mut writer = LineWriter::new(write);

    let (outbound, mut outbound_rx) = mpsc::channel::<Message>(64);
    let target = make_target(Responder { outbound });

    let write_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(err) = writer.send(&msg).await {
                warn!(error = %err, "write to client failed");
                break;
            }
        }
    });

    let served = async {
        while let Some(msg) = reader.recv().await? {
            if msg.command == protocol::START_SESSION {
                debug!(
                    client = msg.text(protocol::SESSION_CLIENT),
                    session = msg.text(protocol::SESSION_ID),
                    "session started"
                );
                continue;
            }
            if let Err(err) = dispatch_concurrent(registry, &target, &msg) {
                warn!(command = %msg.command, error = %err, "dropping message");
            }
        }
        Ok(())
    }
    .await;

    drop(target);
    write_task.abort();
    served
}
