//! Protocol-level constants shared by client and engine.

/// Correlation-id field stamped on every request and reply. The value is
/// the identity of the caller's logical call; the engine copies it onto
/// every reply so one connection can multiplex many calls.
pub const RQID: &str = "rqid";

/// Handshake command sent once per connection, immediately after connect.
/// No reply is awaited.
pub const START_SESSION: &str = "start-session";

/// Handshake field: the client's display name.
pub const SESSION_CLIENT: &str = "client";

/// Handshake field: the client's session identifier.
pub const SESSION_ID: &str = "id";

/// Terminal reply: the call finished normally.
pub const TASK_COMPLETE: &str = "task-complete";

/// Terminal reply: the engine canceled the call; a `reason` field says why.
pub const OPERATION_CANCELED: &str = "operation-canceled";

/// Reason field on [`OPERATION_CANCELED`] replies.
pub const CANCEL_REASON: &str = "reason";

/// Terminal reply: the engine is restarting. The session reissues the call
/// transparently once reconnected; callers never observe it.
pub const RESTARTING: &str = "restarting";

/// Whether `command` is one of the three terminal replies that end a call's
/// drain loop.
pub fn is_terminal(command: &str) -> bool {
    matches!(command, TASK_COMPLETE | OPERATION_CANCELED | RESTARTING)
}
