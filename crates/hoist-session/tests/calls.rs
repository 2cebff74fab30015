//! End-to-end session tests over an in-memory channel transport.
//!
//! The fake engine is a task on the far side of a pair of mpsc channels,
//! driven by a per-test behavior function. Every behavior echoes the
//! request's `rqid` onto its replies, as the real engine does.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hoist_session::{
    Arg, CallError, ConnectPolicy, Connector, DispatchError, ParamSpec, Registry, Session,
    Transport, TransportRx, TransportTx,
};
use hoist_wire::{protocol, Message, Shape};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// In-memory transport
// ---------------------------------------------------------------------------

struct ChannelTransport {
    rx: mpsc::Receiver<Message>,
    tx: mpsc::Sender<Message>,
}

struct ChannelRx(mpsc::Receiver<Message>);
struct ChannelTx(mpsc::Sender<Message>);

impl TransportRx for ChannelRx {
    async fn recv(&mut self) -> io::Result<Option<Message>> {
        Ok(self.0.recv().await)
    }
}

impl TransportTx for ChannelTx {
    async fn send(&mut self, msg: &Message) -> io::Result<()> {
        self.0
            .send(msg.clone())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "engine side closed"))
    }
}

impl Transport for ChannelTransport {
    type Rx = ChannelRx;
    type Tx = ChannelTx;

    fn split(self) -> (Self::Rx, Self::Tx) {
        (ChannelRx(self.rx), ChannelTx(self.tx))
    }
}

// ---------------------------------------------------------------------------
// Fake engine
// ---------------------------------------------------------------------------

/// Given the request and the engine's reply sender plus the (1-indexed)
/// connection number, produce replies with `try_send`. Returning `false`
/// makes the engine drop the connection afterwards.
type Behavior = Arc<dyn Fn(&Message, &mpsc::Sender<Message>, u32) -> bool + Send + Sync>;

struct FakeEngine {
    connects: Arc<AtomicU32>,
    failing_connects: u32,
    behavior: Behavior,
}

impl FakeEngine {
    fn new(behavior: Behavior) -> Self {
        Self {
            connects: Arc::new(AtomicU32::new(0)),
            failing_connects: 0,
            behavior,
        }
    }

    fn failing_first(mut self, n: u32) -> Self {
        self.failing_connects = n;
        self
    }
}

impl Connector for FakeEngine {
    type Transport = ChannelTransport;

    async fn connect(&self) -> io::Result<ChannelTransport> {
        let n = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failing_connects {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "engine not running",
            ));
        }

        let (client_tx, mut engine_rx) = mpsc::channel::<Message>(64);
        let (engine_tx, client_rx) = mpsc::channel::<Message>(64);
        let behavior = Arc::clone(&self.behavior);
        tokio::spawn(async move {
            while let Some(msg) = engine_rx.recv().await {
                if msg.command == protocol::START_SESSION {
                    continue;
                }
                if !behavior(&msg, &engine_tx, n) {
                    break;
                }
            }
        });

        Ok(ChannelTransport {
            rx: client_rx,
            tx: client_tx,
        })
    }

    fn session_start(&self) -> Message {
        let mut msg = Message::new(protocol::START_SESSION);
        msg.set(protocol::SESSION_CLIENT, "calls-test");
        msg.set(protocol::SESSION_ID, "s1");
        msg
    }
}

fn reply(request: &Message, command: &str) -> Message {
    let mut msg = Message::new(command);
    msg.set(protocol::RQID, request.text(protocol::RQID));
    msg
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn fast_policy() -> ConnectPolicy {
    ConnectPolicy {
        attempts: 3,
        attempt_timeout: Duration::from_millis(200),
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        backoff_multiplier: 2.0,
    }
}

// ---------------------------------------------------------------------------
// Client-side handler
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Collector {
    packages: Mutex<Vec<String>>,
}

impl Collector {
    fn packages(&self) -> Vec<String> {
        self.packages.lock().unwrap().clone()
    }
}

fn collector_registry() -> Registry<Collector> {
    Registry::build()
        .op(
            "package-found",
            vec![ParamSpec::new("name", Shape::Text)],
            |target: Arc<Collector>, mut args| {
                Box::pin(async move {
                    target
                        .packages
                        .lock()
                        .unwrap()
                        .push(args.remove(0).as_str().to_owned());
                    Ok(())
                })
            },
        )
        .op(protocol::TASK_COMPLETE, Vec::new(), |_t, _a| {
            Box::pin(async move { Ok(()) })
        })
        .op(protocol::OPERATION_CANCELED, Vec::new(), |_t, _a| {
            Box::pin(async move { Ok(()) })
        })
        // a restart means the reissued call delivers everything again, so
        // partial results collected before it are dropped
        .op(protocol::RESTARTING, Vec::new(), |target, _a| {
            Box::pin(async move {
                target.packages.lock().unwrap().clear();
                Ok(())
            })
        })
        .finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn call_collects_notifications_until_complete() {
    let behavior: Behavior = Arc::new(|req, tx, _conn| {
        for name in ["zlib", "openssl"] {
            let mut found = reply(req, "package-found");
            found.set("name", name);
            tx.try_send(found).unwrap();
        }
        tx.try_send(reply(req, protocol::TASK_COMPLETE)).unwrap();
        true
    });
    let session = Session::with_policy(FakeEngine::new(behavior), fast_policy());
    let registry = collector_registry();
    let handler = Arc::new(Collector::default());

    session
        .invoke(
            "find-packages",
            &[Arg::new("name", "z*", Shape::Text)],
            &registry,
            &handler,
        )
        .await
        .unwrap();

    assert_eq!(handler.packages(), vec!["zlib", "openssl"]);
    assert!(session.is_connected().await);
}

#[tokio::test]
async fn correlated_replies_stay_isolated_across_concurrent_calls() {
    // Each request gets three replies tagged with its own name, plus one
    // stray reply with a correlation id nothing is waiting on.
    let behavior: Behavior = Arc::new(|req, tx, _conn| {
        let mut stray = Message::new("package-found");
        stray.set(protocol::RQID, "999999");
        stray.set("name", "stray");
        tx.try_send(stray).unwrap();

        let name = req.text("name").to_owned();
        for i in 0..3 {
            let mut found = reply(req, "package-found");
            found.set("name", format!("{name}-{i}"));
            tx.try_send(found).unwrap();
        }
        tx.try_send(reply(req, protocol::TASK_COMPLETE)).unwrap();
        true
    });
    let session = Session::with_policy(FakeEngine::new(behavior), fast_policy());

    let mut calls = Vec::new();
    for caller in 0..8 {
        let session = session.clone();
        calls.push(tokio::spawn(async move {
            let registry = collector_registry();
            let handler = Arc::new(Collector::default());
            let name = format!("pkg{caller}");
            session
                .invoke(
                    "find-packages",
                    &[Arg::new("name", name.as_str(), Shape::Text)],
                    &registry,
                    &handler,
                )
                .await
                .unwrap();
            (name, handler.packages())
        }));
    }

    for call in calls {
        let (name, seen) = call.await.unwrap();
        assert_eq!(
            seen,
            vec![format!("{name}-0"), format!("{name}-1"), format!("{name}-2")],
            "call {name} must see exactly its own replies, in arrival order"
        );
    }
}

#[tokio::test]
async fn disconnect_unblocks_every_waiter() {
    init_tracing();
    // The engine swallows requests: callers block awaiting replies.
    let behavior: Behavior = Arc::new(|_req, _tx, _conn| true);
    let session = Session::with_policy(FakeEngine::new(behavior), fast_policy());

    let mut blocked = Vec::new();
    for _ in 0..3 {
        let session = session.clone();
        blocked.push(tokio::spawn(async move {
            let registry = collector_registry();
            let handler = Arc::new(Collector::default());
            session
                .invoke("find-packages", &[], &registry, &handler)
                .await
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    session.disconnect().await;

    for call in blocked {
        let result = tokio::time::timeout(Duration::from_secs(1), call)
            .await
            .expect("waiter must not hang after disconnect")
            .unwrap();
        assert!(matches!(result, Err(CallError::ConnectionLost)));
    }
}

#[tokio::test]
async fn restarting_engine_is_invisible_to_the_caller() {
    init_tracing();
    // First connection: a partial answer, then `restarting` and a dropped
    // link, as a restarting engine does. Second connection: the full
    // answer. The caller must observe the second answer only.
    let behavior: Behavior = Arc::new(|req, tx, conn| {
        if conn == 1 {
            let mut stale = reply(req, "package-found");
            stale.set("name", "zlib-stale");
            tx.try_send(stale).unwrap();
            tx.try_send(reply(req, protocol::RESTARTING)).unwrap();
            false
        } else {
            let mut found = reply(req, "package-found");
            found.set("name", "zlib");
            tx.try_send(found).unwrap();
            tx.try_send(reply(req, protocol::TASK_COMPLETE)).unwrap();
            true
        }
    });
    let engine = FakeEngine::new(behavior);
    let connects = Arc::clone(&engine.connects);
    let session = Session::with_policy(engine, fast_policy());
    let registry = collector_registry();
    let handler = Arc::new(Collector::default());

    session
        .invoke("find-packages", &[], &registry, &handler)
        .await
        .expect("restart must be masked, not surfaced");

    assert_eq!(handler.packages(), vec!["zlib"]);
    assert_eq!(connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancellation_surfaces_the_reason() {
    let behavior: Behavior = Arc::new(|req, tx, _conn| {
        let mut canceled = reply(req, protocol::OPERATION_CANCELED);
        canceled.set(protocol::CANCEL_REASON, "blocked by policy");
        tx.try_send(canceled).unwrap();
        true
    });
    let session = Session::with_policy(FakeEngine::new(behavior), fast_policy());
    let registry = collector_registry();
    let handler = Arc::new(Collector::default());

    let err = session
        .invoke("remove-package", &[], &registry, &handler)
        .await
        .unwrap_err();
    match err {
        CallError::Canceled { reason } => assert_eq!(reason, "blocked by policy"),
        other => panic!("expected cancellation, got {other}"),
    }
}

#[tokio::test]
async fn connect_failure_is_bounded_and_reported() {
    let behavior: Behavior = Arc::new(|_req, _tx, _conn| true);
    let engine = FakeEngine::new(behavior).failing_first(u32::MAX);
    let connects = Arc::clone(&engine.connects);
    let session = Session::with_policy(engine, fast_policy());
    let registry = collector_registry();
    let handler = Arc::new(Collector::default());

    let err = session
        .invoke("find-packages", &[], &registry, &handler)
        .await
        .unwrap_err();
    match err {
        CallError::Connect(connect) => assert_eq!(connect.attempts, 3),
        other => panic!("expected connectivity failure, got {other}"),
    }
    assert_eq!(connects.load(Ordering::SeqCst), 3);
}

/// A write half with a send budget; once spent, every send fails while the
/// read half stays open.
struct FlakyTx {
    sends_left: u32,
    inner: mpsc::Sender<Message>,
}

impl TransportTx for FlakyTx {
    async fn send(&mut self, msg: &Message) -> io::Result<()> {
        if self.sends_left == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write side failed"));
        }
        self.sends_left -= 1;
        self.inner
            .send(msg.clone())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "engine side closed"))
    }
}

struct FlakyTransport {
    rx: ChannelRx,
    tx: FlakyTx,
}

impl Transport for FlakyTransport {
    type Rx = ChannelRx;
    type Tx = FlakyTx;

    fn split(self) -> (Self::Rx, Self::Tx) {
        (self.rx, self.tx)
    }
}

/// First connection: the write half dies right after the handshake while
/// the read half stays open. Second connection: a healthy engine.
struct FlakyEngine {
    connects: Arc<AtomicU32>,
}

impl Connector for FlakyEngine {
    type Transport = FlakyTransport;

    async fn connect(&self) -> io::Result<FlakyTransport> {
        let n = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        let (client_tx, mut engine_rx) = mpsc::channel::<Message>(64);
        let (engine_tx, client_rx) = mpsc::channel::<Message>(64);

        if n == 1 {
            // keep both far ends open so the read side never signals EOF
            tokio::spawn(async move {
                let _keep = (engine_rx, engine_tx);
                std::future::pending::<()>().await;
            });
            return Ok(FlakyTransport {
                rx: ChannelRx(client_rx),
                tx: FlakyTx {
                    sends_left: 1,
                    inner: client_tx,
                },
            });
        }

        tokio::spawn(async move {
            while let Some(msg) = engine_rx.recv().await {
                if msg.command == protocol::START_SESSION {
                    continue;
                }
                engine_tx
                    .try_send(reply(&msg, protocol::TASK_COMPLETE))
                    .unwrap();
            }
        });
        Ok(FlakyTransport {
            rx: ChannelRx(client_rx),
            tx: FlakyTx {
                sends_left: u32::MAX,
                inner: client_tx,
            },
        })
    }

    fn session_start(&self) -> Message {
        let mut msg = Message::new(protocol::START_SESSION);
        msg.set(protocol::SESSION_CLIENT, "calls-test");
        msg.set(protocol::SESSION_ID, "s1");
        msg
    }
}

#[tokio::test]
async fn dead_writer_triggers_reconnect_on_next_call() {
    let engine = FlakyEngine {
        connects: Arc::new(AtomicU32::new(0)),
    };
    let connects = Arc::clone(&engine.connects);
    let session = Session::with_policy(engine, fast_policy());
    let registry = collector_registry();
    let handler = Arc::new(Collector::default());

    // The handshake spends the write budget, so this call's request write
    // fails and the call surfaces the lost connection.
    let err = session
        .invoke("get-policy", &[], &registry, &handler)
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::ConnectionLost));

    // Let the failed writer task wind down; the pump is still running.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The next call must notice the half-dead link and reconnect.
    session
        .invoke("get-policy", &[], &registry, &handler)
        .await
        .unwrap();
    assert_eq!(connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_first_calls_share_one_connect() {
    let behavior: Behavior = Arc::new(|req, tx, _conn| {
        tx.try_send(reply(req, protocol::TASK_COMPLETE)).unwrap();
        true
    });
    let engine = FakeEngine::new(behavior);
    let connects = Arc::clone(&engine.connects);
    let session = Session::with_policy(engine, fast_policy());

    let mut calls = Vec::new();
    for _ in 0..4 {
        let session = session.clone();
        calls.push(tokio::spawn(async move {
            let registry = collector_registry();
            let handler = Arc::new(Collector::default());
            session.invoke("get-policy", &[], &registry, &handler).await
        }));
    }
    for call in calls {
        call.await.unwrap().unwrap();
    }
    assert_eq!(connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unregistered_notification_fails_only_that_call() {
    let behavior: Behavior = Arc::new(|req, tx, _conn| {
        if req.command == "first" {
            tx.try_send(reply(req, "no-such-notification")).unwrap();
        } else {
            tx.try_send(reply(req, protocol::TASK_COMPLETE)).unwrap();
        }
        true
    });
    let session = Session::with_policy(FakeEngine::new(behavior), fast_policy());
    let registry = collector_registry();
    let handler = Arc::new(Collector::default());

    let err = session
        .invoke("first", &[], &registry, &handler)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CallError::Dispatch(DispatchError::UnknownOperation { .. })
    ));

    // the session survives and serves the next call
    session
        .invoke("second", &[], &registry, &handler)
        .await
        .unwrap();
}
