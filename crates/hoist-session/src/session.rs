//! The session/connection manager.
//!
//! Owns the single physical connection to the engine: lazy connect with
//! bounded retries, one reader pump routing replies to per-call mailboxes,
//! one writer task serializing outgoing messages, and the per-call drain
//! loop with transparent restart masking.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use hoist_wire::{protocol, Message};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dispatch::{dispatch_inline, Arg, RequestSender};
use crate::errors::{CallError, ConnectError};
use crate::mailbox::ReplyMailbox;
use crate::registry::Registry;
use crate::transport::{Connector, Transport, TransportRx, TransportTx};

/// How connect attempts are bounded. Only the initial connect is
/// time-bounded; once connected, waits are unbounded and rely on
/// disconnect or `restarting` signaling for termination.
#[derive(Debug, Clone)]
pub struct ConnectPolicy {
    /// Connection attempts before the whole connect fails.
    pub attempts: u32,
    /// Time bound on each individual attempt.
    pub attempt_timeout: Duration,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Cap on the delay between attempts.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            attempt_timeout: Duration::from_millis(500),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

impl ConnectPolicy {
    /// Backoff before the attempt after `attempt` (1-indexed) failed.
    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        self.initial_backoff.mul_f64(multiplier).min(self.max_backoff)
    }
}

/// Outcome of one drained call, before restart masking is applied.
enum CallOutcome {
    Complete,
    Canceled(String),
    Restarting,
}

/// A live connection: the writer's inbox plus the two task handles.
struct Link {
    outbound: mpsc::Sender<Message>,
    pump: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Link {
    // Either task finishing means the connection is unusable: a dead
    // writer can no longer send even while the read side still drains.
    fn is_alive(&self) -> bool {
        !self.pump.is_finished() && !self.writer.is_finished()
    }
}

/// State shared with the reader pump: the correlation table.
struct Shared {
    mailboxes: StdMutex<HashMap<u64, Arc<ReplyMailbox>>>,
    next_correlation: AtomicU64,
}

impl Shared {
    fn register(&self, mailbox: Arc<ReplyMailbox>) {
        self.mailboxes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(mailbox.id(), mailbox);
    }

    fn unregister(&self, id: u64) {
        self.mailboxes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
    }

    /// Route one inbound message to the mailbox matching its correlation
    /// id. Messages with no matching mailbox (stale replies after a call
    /// finished) are dropped silently.
    fn route(&self, msg: Message) {
        let Ok(id) = msg.text(protocol::RQID).parse::<u64>() else {
            debug!(command = %msg.command, "dropping message without correlation id");
            return;
        };
        let mailbox = self
            .mailboxes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned();
        match mailbox {
            Some(mailbox) => mailbox.push(msg),
            None => debug!(rqid = id, command = %msg.command, "dropping reply for finished call"),
        }
    }

    /// Wake every registered mailbox with the active flag cleared. Waiters
    /// observe it on next wake and exit their drain loop with a
    /// connectivity failure; the owning calls unregister themselves.
    fn deactivate_all(&self) {
        let mailboxes = self
            .mailboxes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for mailbox in mailboxes.values() {
            mailbox.deactivate();
        }
    }
}

/// The session: one physical connection, many concurrent logical calls.
///
/// Cheap to clone; all clones share the same connection and correlation
/// table. Connecting is lazy — the first call triggers it — and a dead
/// connection is replaced transparently on next use, which combined with
/// the `restarting` retry in [`invoke`](Session::invoke) masks engine
/// restarts entirely from callers.
pub struct Session<C: Connector> {
    connector: Arc<C>,
    policy: ConnectPolicy,
    link: Arc<Mutex<Option<Link>>>,
    shared: Arc<Shared>,
}

impl<C: Connector> Clone for Session<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            policy: self.policy.clone(),
            link: Arc::clone(&self.link),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> Session<C> {
    /// Create a session with the default connect policy. Does not connect.
    pub fn new(connector: C) -> Self {
        Self::with_policy(connector, ConnectPolicy::default())
    }

    pub fn with_policy(connector: C, policy: ConnectPolicy) -> Self {
        Self {
            connector: Arc::new(connector),
            policy,
            link: Arc::new(Mutex::new(None)),
            shared: Arc::new(Shared {
                mailboxes: StdMutex::new(HashMap::new()),
                next_correlation: AtomicU64::new(0),
            }),
        }
    }

    /// Whether a live connection currently exists.
    pub async fn is_connected(&self) -> bool {
        self.link
            .lock()
            .await
            .as_ref()
            .map(Link::is_alive)
            .unwrap_or(false)
    }

    /// Issue one logical call and drain its replies through `registry`
    /// against `handler` until a terminal message.
    ///
    /// A `restarting` terminal transparently reissues the whole call once
    /// reconnected; the caller observes a single logical outcome.
    pub async fn invoke<H>(
        &self,
        command: &str,
        args: &[Arg<'_>],
        registry: &Registry<H>,
        handler: &Arc<H>,
    ) -> Result<(), CallError>
    where
        H: Send + Sync + 'static,
    {
        loop {
            let outbound = self.ensure_connected().await?;
            let id = self.shared.next_correlation.fetch_add(1, Ordering::Relaxed) + 1;
            let mailbox = Arc::new(ReplyMailbox::new(id));
            self.shared.register(Arc::clone(&mailbox));

            let sender = RequestSender::new(outbound);
            let outcome = async {
                sender.send(command, id, args).await?;
                self.drain_replies(&mailbox, registry, handler).await
            }
            .await;
            self.shared.unregister(id);

            match outcome? {
                CallOutcome::Complete => return Ok(()),
                CallOutcome::Canceled(reason) => return Err(CallError::Canceled { reason }),
                CallOutcome::Restarting => {
                    debug!(command, rqid = id, "engine restarting; reissuing call");
                    self.await_link_death().await;
                }
            }
        }
    }

    /// The per-call drain loop: wait on the mailbox signal, take every
    /// queued message, dispatch each inline in strict arrival order, stop
    /// on the first terminal.
    async fn drain_replies<H>(
        &self,
        mailbox: &ReplyMailbox,
        registry: &Registry<H>,
        handler: &Arc<H>,
    ) -> Result<CallOutcome, CallError>
    where
        H: Send + Sync + 'static,
    {
        loop {
            mailbox.wait().await;
            // Drain before honoring deactivation: a terminal that was
            // queued before the connection died still decides the call.
            for msg in mailbox.drain() {
                let keep_going = dispatch_inline(registry, handler, &msg).await?;
                if !keep_going {
                    return Ok(match msg.command.as_str() {
                        protocol::TASK_COMPLETE => CallOutcome::Complete,
                        protocol::OPERATION_CANCELED => {
                            CallOutcome::Canceled(msg.text(protocol::CANCEL_REASON).to_owned())
                        }
                        _ => CallOutcome::Restarting,
                    });
                }
            }
            if !mailbox.is_active() {
                return Err(CallError::ConnectionLost);
            }
        }
    }

    /// After a `restarting` terminal the engine is about to drop the
    /// connection. Give it a bounded grace to do so; if it keeps the pipe
    /// open past that, drop it ourselves so the retry reconnects cleanly.
    async fn await_link_death(&self) {
        let deadline = tokio::time::Instant::now() + self.policy.attempt_timeout;
        loop {
            let dead = {
                let link = self.link.lock().await;
                link.as_ref().map(|l| !l.is_alive()).unwrap_or(true)
            };
            if dead {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                self.disconnect().await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Get the live connection's writer inbox, connecting if needed.
    /// Concurrent callers queue on the link lock, so exactly one physical
    /// connect runs at a time and the rest share its result.
    async fn ensure_connected(&self) -> Result<mpsc::Sender<Message>, CallError> {
        let mut link = self.link.lock().await;
        if let Some(current) = link.as_ref() {
            if current.is_alive() {
                return Ok(current.outbound.clone());
            }
            if let Some(dead) = link.take() {
                dead.pump.abort();
                dead.writer.abort();
            }
        }
        let fresh = self.connect_with_retries().await?;
        let outbound = fresh.outbound.clone();
        *link = Some(fresh);
        Ok(outbound)
    }

    /// Bounded connect attempts with per-attempt timeout and backoff.
    async fn connect_with_retries(&self) -> Result<Link, ConnectError> {
        let mut last_error: Option<io::Error> = None;
        for attempt in 1..=self.policy.attempts {
            let attempted =
                tokio::time::timeout(self.policy.attempt_timeout, self.connector.connect()).await;
            match attempted {
                Ok(Ok(transport)) => match self.start_link(transport).await {
                    Ok(link) => return Ok(link),
                    Err(err) => last_error = Some(err),
                },
                Ok(Err(err)) => last_error = Some(err),
                Err(_) => {
                    last_error = Some(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "connect attempt timed out",
                    ))
                }
            }
            if attempt < self.policy.attempts {
                tokio::time::sleep(self.policy.backoff_for_attempt(attempt)).await;
            }
        }
        Err(ConnectError {
            attempts: self.policy.attempts,
            source: last_error
                .unwrap_or_else(|| io::Error::other("connect failed with no attempts recorded")),
        })
    }

    /// Split the fresh transport, send the session-start handshake, and
    /// spawn the connection's two tasks: the writer (sole owner of the
    /// write half, draining the outbound channel) and the reader pump
    /// (sole owner of the read half, routing replies by correlation id).
    async fn start_link(&self, transport: C::Transport) -> io::Result<Link> {
        let (mut rx, mut tx) = transport.split();
        tx.send(&self.connector.session_start()).await?;

        let (outbound, mut outbound_rx) = mpsc::channel::<Message>(64);

        let writer_shared = Arc::clone(&self.shared);
        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(err) = tx.send(&msg).await {
                    warn!(error = %err, "write to engine failed");
                    writer_shared.deactivate_all();
                    break;
                }
            }
        });

        let pump_shared = Arc::clone(&self.shared);
        let pump = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(Some(msg)) => pump_shared.route(msg),
                    Ok(None) => {
                        debug!("engine closed the connection");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "read from engine failed");
                        break;
                    }
                }
            }
            pump_shared.deactivate_all();
        });

        Ok(Link {
            outbound,
            pump,
            writer,
        })
    }

    /// Tear down the connection. Idempotent. Every still-registered
    /// mailbox is deactivated (not unregistered) so no caller deadlocks;
    /// each observes a connectivity failure and unregisters itself.
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        if let Some(live) = link.take() {
            live.pump.abort();
            live.writer.abort();
        }
        drop(link);
        self.shared.deactivate_all();
    }
}
