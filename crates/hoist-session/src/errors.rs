//! Error taxonomy for dispatch and session operations.

use std::error::Error;
use std::fmt;
use std::io;

/// Boxed error returned by capability handlers.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Error from dispatching a single inbound message.
#[derive(Debug)]
pub enum DispatchError {
    /// The message's command has no registered operation. Fatal for that
    /// one message, never for the dispatcher.
    UnknownOperation { command: String },
    /// The invoked handler failed. Propagated in inline mode, logged and
    /// swallowed in concurrent mode.
    Handler(HandlerError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::UnknownOperation { command } => {
                write!(f, "no operation registered for command {command:?}")
            }
            DispatchError::Handler(err) => write!(f, "handler failed: {err}"),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DispatchError::UnknownOperation { .. } => None,
            DispatchError::Handler(err) => Some(err.as_ref()),
        }
    }
}

/// The engine could not be reached within the bounded connect attempts.
#[derive(Debug)]
pub struct ConnectError {
    /// How many attempts were made.
    pub attempts: u32,
    /// The last attempt's failure.
    pub source: io::Error,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "engine unreachable after {} connect attempts: {}",
            self.attempts, self.source
        )
    }
}

impl Error for ConnectError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Error from issuing one logical call.
#[derive(Debug)]
pub enum CallError {
    /// Connectivity failure: the engine was unreachable.
    Connect(ConnectError),
    /// The connection dropped while the call was awaiting replies.
    ConnectionLost,
    /// The engine canceled the call.
    Canceled { reason: String },
    /// Dispatching a reply failed (unknown operation or handler error).
    Dispatch(DispatchError),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Connect(err) => write!(f, "{err}"),
            CallError::ConnectionLost => write!(f, "connection to the engine was lost"),
            CallError::Canceled { reason } => write!(f, "operation canceled: {reason}"),
            CallError::Dispatch(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CallError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CallError::Connect(err) => Some(err),
            CallError::ConnectionLost => None,
            CallError::Canceled { .. } => None,
            CallError::Dispatch(err) => Some(err),
        }
    }
}

impl From<ConnectError> for CallError {
    fn from(err: ConnectError) -> Self {
        CallError::Connect(err)
    }
}

impl From<DispatchError> for CallError {
    fn from(err: DispatchError) -> Self {
        CallError::Dispatch(err)
    }
}
