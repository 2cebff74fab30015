//! Connecting to a local engine over a Unix domain socket.

#![cfg(unix)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use hoist_session::Connector;
use hoist_wire::{protocol, Message};
use tokio::net::UnixStream;

use crate::framing::LineFramed;

/// The engine's well-known socket filename, looked up under the runtime
/// directory (or the system temp directory as a fallback).
pub const ENGINE_SOCKET_NAME: &str = "hoist-engine.sock";

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Opens Unix-socket connections to the engine and identifies this client
/// in the session-start handshake.
///
/// Every connection gets a fresh session id, so the engine can tell a
/// reconnect apart from a duplicate.
pub struct UnixConnector {
    path: PathBuf,
    client: String,
}

impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>, client: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            client: client.into(),
        }
    }

    /// Connector for the engine's well-known local socket.
    pub fn well_known(client: impl Into<String>) -> Self {
        let dir = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        Self::new(dir.join(ENGINE_SOCKET_NAME), client)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for UnixConnector {
    type Transport = LineFramed<UnixStream>;

    async fn connect(&self) -> io::Result<Self::Transport> {
        let stream = UnixStream::connect(&self.path).await?;
        Ok(LineFramed::new(stream))
    }

    fn session_start(&self) -> Message {
        let session = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        let mut msg = Message::new(protocol::START_SESSION);
        msg.set(protocol::SESSION_CLIENT, &self.client);
        msg.set(protocol::SESSION_ID, format!("{}-{session}", std::process::id()));
        msg
    }
}
