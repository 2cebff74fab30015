//! The engine-notification surface.
//!
//! Every notification the engine can send during a call is one method on
//! [`EngineEvents`], all default-implemented: a handler overrides only what
//! it cares about. Failure notifications default to returning an error, so
//! through the inline dispatcher they become the owning call's failure
//! without any per-handler code.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use hoist_session::{HandlerError, ParamSpec, Registry};
use hoist_wire::{protocol, Shape, Value, WireRecord};
use tracing::warn;

use crate::types::{FeedInfo, PackageSummary, PolicyInfo};

/// A failure the engine reported as a notification.
#[derive(Debug)]
pub struct EngineFailure {
    /// Which notification carried it (`error`, `unknown-package`, ...).
    pub kind: &'static str,
    pub message: String,
}

impl EngineFailure {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "engine reported {}", self.kind)
        } else {
            write!(f, "engine reported {}: {}", self.kind, self.message)
        }
    }
}

impl Error for EngineFailure {}

macro_rules! ignore_event {
    ($($arg:ident),*) => {{
        $(let _ = $arg;)*
        async { Ok(()) }
    }};
}

macro_rules! fail_event {
    ($kind:literal, $message:expr) => {{
        let failure = EngineFailure::new($kind, $message);
        async move { Err(failure.into()) }
    }};
}

/// Handler for the notifications a call can receive.
pub trait EngineEvents: Send + Sync + 'static {
    fn package_found(
        &self,
        package: PackageSummary,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        ignore_event!(package)
    }

    fn package_details(
        &self,
        package: PackageSummary,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        ignore_event!(package)
    }

    fn feed_details(
        &self,
        feed: FeedInfo,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        ignore_event!(feed)
    }

    fn policy(&self, policy: PolicyInfo) -> impl Future<Output = Result<(), HandlerError>> + Send {
        ignore_event!(policy)
    }

    fn installing_progress(
        &self,
        name: String,
        percent: u64,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        ignore_event!(name, percent)
    }

    fn removing_progress(
        &self,
        name: String,
        percent: u64,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        ignore_event!(name, percent)
    }

    fn installed(&self, name: String) -> impl Future<Output = Result<(), HandlerError>> + Send {
        ignore_event!(name)
    }

    fn removed(&self, name: String) -> impl Future<Output = Result<(), HandlerError>> + Send {
        ignore_event!(name)
    }

    fn feed_added(&self, feed: FeedInfo) -> impl Future<Output = Result<(), HandlerError>> + Send {
        ignore_event!(feed)
    }

    fn feed_removed(&self, name: String) -> impl Future<Output = Result<(), HandlerError>> + Send {
        ignore_event!(name)
    }

    fn feed_suppressed(
        &self,
        name: String,
        suppressed: bool,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        ignore_event!(name, suppressed)
    }

    fn telemetry(&self, enabled: bool) -> impl Future<Output = Result<(), HandlerError>> + Send {
        ignore_event!(enabled)
    }

    fn warning(&self, message: String) -> impl Future<Output = Result<(), HandlerError>> + Send {
        warn!(message, "engine warning");
        async { Ok(()) }
    }

    fn error(&self, message: String) -> impl Future<Output = Result<(), HandlerError>> + Send {
        fail_event!("error", message)
    }

    fn permission_required(
        &self,
        action: String,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        fail_event!("permission-required", action)
    }

    fn unknown_package(
        &self,
        name: String,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        fail_event!("unknown-package", name)
    }

    fn package_blocked(
        &self,
        name: String,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        fail_event!("package-blocked", name)
    }

    fn unknown_command(
        &self,
        command: String,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        fail_event!("unknown-command", command)
    }

    /// The engine announced a restart; the owning call is about to be
    /// reissued from scratch and will receive its replies again. Discard
    /// any state accumulated for the call so far.
    fn restarting(&self) -> impl Future<Output = Result<(), HandlerError>> + Send {
        async { Ok(()) }
    }
}

/// Build the capability registry over [`EngineEvents`] for handler type
/// `H`. Callers that dispatch many calls should build this once and reuse
/// it (typically cached in a `OnceLock`).
pub fn event_registry<H: EngineEvents>() -> Registry<H> {
    Registry::build()
        .op(
            "package-found",
            vec![ParamSpec::new("package", PackageSummary::shape())],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move {
                    h.package_found(PackageSummary::from_value(&args.remove(0)))
                        .await
                })
            },
        )
        .op(
            "package-details",
            vec![ParamSpec::new("package", PackageSummary::shape())],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move {
                    h.package_details(PackageSummary::from_value(&args.remove(0)))
                        .await
                })
            },
        )
        .op(
            "feed-details",
            vec![ParamSpec::new("feed", FeedInfo::shape())],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move { h.feed_details(FeedInfo::from_value(&args.remove(0))).await })
            },
        )
        .op(
            "policy",
            vec![ParamSpec::new("policy", PolicyInfo::shape())],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move { h.policy(PolicyInfo::from_value(&args.remove(0))).await })
            },
        )
        .op(
            "installing-progress",
            vec![
                ParamSpec::new("name", Shape::Text),
                ParamSpec::new("percent", Shape::Scalar),
            ],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move {
                    let name = args.remove(0).as_str().to_owned();
                    let percent = args.remove(0).as_u64();
                    h.installing_progress(name, percent).await
                })
            },
        )
        .op(
            "removing-progress",
            vec![
                ParamSpec::new("name", Shape::Text),
                ParamSpec::new("percent", Shape::Scalar),
            ],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move {
                    let name = args.remove(0).as_str().to_owned();
                    let percent = args.remove(0).as_u64();
                    h.removing_progress(name, percent).await
                })
            },
        )
        .op(
            "installed",
            vec![ParamSpec::new("name", Shape::Text)],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move { h.installed(args.remove(0).as_str().to_owned()).await })
            },
        )
        .op(
            "removed",
            vec![ParamSpec::new("name", Shape::Text)],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move { h.removed(args.remove(0).as_str().to_owned()).await })
            },
        )
        .op(
            "feed-added",
            vec![ParamSpec::new("feed", FeedInfo::shape())],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move { h.feed_added(FeedInfo::from_value(&args.remove(0))).await })
            },
        )
        .op(
            "feed-removed",
            vec![ParamSpec::new("name", Shape::Text)],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move { h.feed_removed(args.remove(0).as_str().to_owned()).await })
            },
        )
        .op(
            "feed-suppressed",
            vec![
                ParamSpec::new("name", Shape::Text),
                ParamSpec::new("suppressed", Shape::Scalar),
            ],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move {
                    let name = args.remove(0).as_str().to_owned();
                    let suppressed = args.remove(0).as_bool();
                    h.feed_suppressed(name, suppressed).await
                })
            },
        )
        .op(
            "telemetry",
            vec![ParamSpec::new("enabled", Shape::Scalar)],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move { h.telemetry(args.remove(0).as_bool()).await })
            },
        )
        .op(
            "warning",
            vec![ParamSpec::new("message", Shape::Text)],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move { h.warning(args.remove(0).as_str().to_owned()).await })
            },
        )
        .op(
            "error",
            vec![ParamSpec::new("message", Shape::Text)],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move { h.error(args.remove(0).as_str().to_owned()).await })
            },
        )
        .op(
            "permission-required",
            vec![ParamSpec::new("action", Shape::Text)],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move {
                    h.permission_required(args.remove(0).as_str().to_owned())
                        .await
                })
            },
        )
        .op(
            "unknown-package",
            vec![ParamSpec::new("name", Shape::Text)],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move { h.unknown_package(args.remove(0).as_str().to_owned()).await })
            },
        )
        .op(
            "package-blocked",
            vec![ParamSpec::new("name", Shape::Text)],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move { h.package_blocked(args.remove(0).as_str().to_owned()).await })
            },
        )
        .op(
            "unknown-command",
            vec![ParamSpec::new("command", Shape::Text)],
            |h: Arc<H>, mut args: Vec<Value>| {
                Box::pin(async move { h.unknown_command(args.remove(0).as_str().to_owned()).await })
            },
        )
        // the session classifies terminals after dispatch; `restarting`
        // additionally tells the handler to drop the call's partial state
        // before the reissue
        .op(protocol::TASK_COMPLETE, Vec::new(), |_h: Arc<H>, _a| {
            Box::pin(async { Ok(()) })
        })
        .op(protocol::OPERATION_CANCELED, Vec::new(), |_h: Arc<H>, _a| {
            Box::pin(async { Ok(()) })
        })
        .op(protocol::RESTARTING, Vec::new(), |h: Arc<H>, _a| {
            Box::pin(async move { h.restarting().await })
        })
        .finish()
}
