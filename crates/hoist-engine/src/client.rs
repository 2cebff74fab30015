//! The typed request surface.
//!
//! [`EngineClient`] wraps a [`Session`] and exposes one method per engine
//! request operation. Each call runs with a private event log as its
//! handler; the log accumulates the typed notifications that make up the
//! call's result and the method returns them once the call completes.

use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};

use hoist_session::{
    Arg, CallError, ConnectPolicy, Connector, HandlerError, Registry, Session,
};
use hoist_wire::{Shape, WireRecord};

use crate::events::{event_registry, EngineEvents};
use crate::types::{FeedInfo, PackageSummary, PolicyInfo, ScheduledTask};

type ProgressFn = Box<dyn Fn(&str, u64) + Send + Sync>;

/// Per-call accumulator for reply notifications.
#[derive(Default)]
struct EventLog {
    packages: Mutex<Vec<PackageSummary>>,
    feeds: Mutex<Vec<FeedInfo>>,
    policy: Mutex<Option<PolicyInfo>>,
    telemetry: Mutex<Option<bool>>,
    progress: Option<ProgressFn>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EventLog {
    fn with_progress(progress: ProgressFn) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    fn take_packages(&self) -> Vec<PackageSummary> {
        std::mem::take(&mut *lock(&self.packages))
    }

    fn take_feeds(&self) -> Vec<FeedInfo> {
        std::mem::take(&mut *lock(&self.feeds))
    }

    fn report(&self, name: &str, percent: u64) {
        if let Some(progress) = &self.progress {
            progress(name, percent);
        }
    }
}

impl EngineEvents for EventLog {
    fn package_found(
        &self,
        package: PackageSummary,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        lock(&self.packages).push(package);
        async { Ok(()) }
    }

    fn package_details(
        &self,
        package: PackageSummary,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        lock(&self.packages).push(package);
        async { Ok(()) }
    }

    fn feed_details(
        &self,
        feed: FeedInfo,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        lock(&self.feeds).push(feed);
        async { Ok(()) }
    }

    fn feed_added(&self, feed: FeedInfo) -> impl Future<Output = Result<(), HandlerError>> + Send {
        lock(&self.feeds).push(feed);
        async { Ok(()) }
    }

    fn policy(&self, policy: PolicyInfo) -> impl Future<Output = Result<(), HandlerError>> + Send {
        *lock(&self.policy) = Some(policy);
        async { Ok(()) }
    }

    fn telemetry(&self, enabled: bool) -> impl Future<Output = Result<(), HandlerError>> + Send {
        *lock(&self.telemetry) = Some(enabled);
        async { Ok(()) }
    }

    fn installing_progress(
        &self,
        name: String,
        percent: u64,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        self.report(&name, percent);
        async { Ok(()) }
    }

    fn removing_progress(
        &self,
        name: String,
        percent: u64,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        self.report(&name, percent);
        async { Ok(()) }
    }

    // The reissued call receives its replies from scratch; anything
    // collected before the restart would otherwise be double counted.
    fn restarting(&self) -> impl Future<Output = Result<(), HandlerError>> + Send {
        lock(&self.packages).clear();
        lock(&self.feeds).clear();
        *lock(&self.policy) = None;
        *lock(&self.telemetry) = None;
        async { Ok(()) }
    }
}

fn log_registry() -> &'static Registry<EventLog> {
    static REGISTRY: OnceLock<Registry<EventLog>> = OnceLock::new();
    REGISTRY.get_or_init(event_registry::<EventLog>)
}

/// Typed client for the package engine. One instance per engine; cheap to
/// clone, all clones share the underlying session.
pub struct EngineClient<C: Connector> {
    session: Session<C>,
}

impl<C: Connector> Clone for EngineClient<C> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}

impl<C: Connector> EngineClient<C> {
    pub fn new(connector: C) -> Self {
        Self {
            session: Session::new(connector),
        }
    }

    pub fn with_policy(connector: C, policy: ConnectPolicy) -> Self {
        Self {
            session: Session::with_policy(connector, policy),
        }
    }

    /// The underlying session, for raw calls and disconnect control.
    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    async fn call(&self, command: &str, args: &[Arg<'_>]) -> Result<Arc<EventLog>, CallError> {
        let log = Arc::new(EventLog::default());
        self.session
            .invoke(command, args, log_registry(), &log)
            .await?;
        Ok(log)
    }

    /// A call whose only interesting outcome is completing.
    async fn call_unit(&self, command: &str, args: &[Arg<'_>]) -> Result<(), CallError> {
        self.call(command, args).await.map(|_| ())
    }

    pub async fn find_packages(&self, pattern: &str) -> Result<Vec<PackageSummary>, CallError> {
        let log = self
            .call("find-packages", &[Arg::new("name", pattern, Shape::Text)])
            .await?;
        Ok(log.take_packages())
    }

    pub async fn get_package_details(
        &self,
        name: &str,
    ) -> Result<Option<PackageSummary>, CallError> {
        let log = self
            .call(
                "get-package-details",
                &[Arg::new("name", name, Shape::Text)],
            )
            .await?;
        Ok(log.take_packages().into_iter().next())
    }

    /// Install a package, reporting progress through `progress` as
    /// `(package name, percent)` notifications arrive.
    pub async fn install_package(
        &self,
        name: &str,
        progress: impl Fn(&str, u64) + Send + Sync + 'static,
    ) -> Result<(), CallError> {
        let log = Arc::new(EventLog::with_progress(Box::new(progress)));
        self.session
            .invoke(
                "install-package",
                &[Arg::new("name", name, Shape::Text)],
                log_registry(),
                &log,
            )
            .await
    }

    pub async fn remove_package(&self, name: &str) -> Result<(), CallError> {
        self.call_unit("remove-package", &[Arg::new("name", name, Shape::Text)])
            .await
    }

    pub async fn list_feeds(&self) -> Result<Vec<FeedInfo>, CallError> {
        let log = self.call("list-feeds", &[]).await?;
        Ok(log.take_feeds())
    }

    pub async fn add_feed(&self, name: &str, uri: &str) -> Result<(), CallError> {
        self.call_unit(
            "add-feed",
            &[
                Arg::new("name", name, Shape::Text),
                Arg::new("uri", uri, Shape::Text),
            ],
        )
        .await
    }

    pub async fn remove_feed(&self, name: &str) -> Result<(), CallError> {
        self.call_unit("remove-feed", &[Arg::new("name", name, Shape::Text)])
            .await
    }

    pub async fn set_feed_suppression(
        &self,
        name: &str,
        suppressed: bool,
    ) -> Result<(), CallError> {
        self.call_unit(
            "set-feed-suppression",
            &[
                Arg::new("name", name, Shape::Text),
                Arg::new("suppressed", suppressed, Shape::Scalar),
            ],
        )
        .await
    }

    pub async fn set_package_wanted(&self, name: &str, wanted: bool) -> Result<(), CallError> {
        self.call_unit(
            "set-package-wanted",
            &[
                Arg::new("name", name, Shape::Text),
                Arg::new("wanted", wanted, Shape::Scalar),
            ],
        )
        .await
    }

    pub async fn block_package(&self, name: &str) -> Result<(), CallError> {
        self.call_unit("block-package", &[Arg::new("name", name, Shape::Text)])
            .await
    }

    pub async fn unblock_package(&self, name: &str) -> Result<(), CallError> {
        self.call_unit("unblock-package", &[Arg::new("name", name, Shape::Text)])
            .await
    }

    pub async fn get_policy(&self) -> Result<PolicyInfo, CallError> {
        let log = self.call("get-policy", &[]).await?;
        let policy = lock(&log.policy).take();
        Ok(policy.unwrap_or_default())
    }

    pub async fn add_to_policy(&self, name: &str) -> Result<(), CallError> {
        self.call_unit("add-to-policy", &[Arg::new("name", name, Shape::Text)])
            .await
    }

    pub async fn remove_from_policy(&self, name: &str) -> Result<(), CallError> {
        self.call_unit(
            "remove-from-policy",
            &[Arg::new("name", name, Shape::Text)],
        )
        .await
    }

    pub async fn schedule_task(&self, task: &ScheduledTask) -> Result<(), CallError> {
        self.call_unit(
            "schedule-task",
            &[Arg::new("task", task.to_value(), ScheduledTask::shape())],
        )
        .await
    }

    pub async fn set_telemetry(&self, enabled: bool) -> Result<(), CallError> {
        self.call_unit(
            "set-telemetry",
            &[Arg::new("enabled", enabled, Shape::Scalar)],
        )
        .await
    }

    pub async fn get_telemetry(&self) -> Result<bool, CallError> {
        let log = self.call("get-telemetry", &[]).await?;
        let enabled = lock(&log.telemetry).take();
        Ok(enabled.unwrap_or(false))
    }
}
