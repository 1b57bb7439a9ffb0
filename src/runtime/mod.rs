//! Runtime: dispatchers that drive orchestration turns and activity execution
//! on top of a [`Provider`].
//!
//! The orchestration dispatcher fetches locked instance batches, replays the
//! orchestration and commits the turn atomically. The worker dispatcher runs
//! activities and acks each one together with its completion message.
use crate::OrchestrationContext;
use crate::providers::Provider;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

mod dispatchers;
pub mod observability;
pub mod registry;
pub mod replay_engine;
mod state_helpers;

pub use observability::{RuntimeStats, StatsSnapshot};
pub use registry::{OrchestrationRegistry, OrchestrationRegistryBuilder, VersionPolicy};
pub use state_helpers::HistoryManager;

/// Configuration options for the Runtime.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Polling interval in milliseconds when dispatcher queues are empty.
    /// Default: 10ms
    pub dispatcher_idle_sleep_ms: u64,
    /// Concurrent orchestration dispatchers. Each instance is still processed
    /// by at most one of them at a time.
    pub orchestration_concurrency: usize,
    /// Concurrent activity workers.
    pub worker_concurrency: usize,
    /// How long a fetched orchestration batch stays locked.
    pub orchestrator_lock_timeout: Duration,
    /// How long a fetched activity stays locked. An activity running longer
    /// than this is redelivered to another worker.
    pub worker_lock_timeout: Duration,
    /// Retries for a failed ack before the item is abandoned.
    pub max_ack_attempts: u32,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            dispatcher_idle_sleep_ms: 10,
            orchestration_concurrency: 2,
            worker_concurrency: 4,
            orchestrator_lock_timeout: Duration::from_secs(5),
            worker_lock_timeout: Duration::from_secs(300),
            max_ack_attempts: 5,
        }
    }
}

/// Instance status as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationStatus {
    NotFound,
    Running {
        custom_status: Option<String>,
    },
    Completed {
        output: String,
        custom_status: Option<String>,
    },
    Failed {
        details: crate::ErrorDetails,
        custom_status: Option<String>,
    },
    Terminated {
        reason: String,
        custom_status: Option<String>,
    },
}

impl OrchestrationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestrationStatus::Completed { .. }
                | OrchestrationStatus::Failed { .. }
                | OrchestrationStatus::Terminated { .. }
        )
    }

    /// Short label matching the stored instance status.
    pub fn label(&self) -> &'static str {
        match self {
            OrchestrationStatus::NotFound => "NotFound",
            OrchestrationStatus::Running { .. } => "Running",
            OrchestrationStatus::Completed { .. } => "Completed",
            OrchestrationStatus::Failed { .. } => "Failed",
            OrchestrationStatus::Terminated { .. } => "Terminated",
        }
    }

    pub fn custom_status(&self) -> Option<&str> {
        match self {
            OrchestrationStatus::NotFound => None,
            OrchestrationStatus::Running { custom_status }
            | OrchestrationStatus::Completed { custom_status, .. }
            | OrchestrationStatus::Failed { custom_status, .. }
            | OrchestrationStatus::Terminated { custom_status, .. } => custom_status.as_deref(),
        }
    }
}

/// Trait implemented by orchestration handlers that can be invoked by the runtime.
#[async_trait]
pub trait OrchestrationHandler: Send + Sync {
    async fn invoke(&self, ctx: OrchestrationContext, input: String) -> Result<String, String>;
}

/// Function wrapper that implements `OrchestrationHandler`.
pub struct FnOrchestration<F, Fut>(pub F)
where
    F: Fn(OrchestrationContext, String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String, String>> + Send + 'static;

#[async_trait]
impl<F, Fut> OrchestrationHandler for FnOrchestration<F, Fut>
where
    F: Fn(OrchestrationContext, String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
{
    async fn invoke(&self, ctx: OrchestrationContext, input: String) -> Result<String, String> {
        (self.0)(ctx, input).await
    }
}

/// Context handed to activity code.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    instance_id: String,
    activity_id: u64,
    activity_name: String,
    orchestration_name: String,
}

impl ActivityContext {
    pub(crate) fn new(
        instance_id: impl Into<String>,
        activity_id: u64,
        activity_name: impl Into<String>,
        orchestration_name: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            activity_id,
            activity_name: activity_name.into(),
            orchestration_name: orchestration_name.into(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Event id of the `ActivityScheduled` event this execution answers.
    pub fn activity_id(&self) -> u64 {
        self.activity_id
    }

    pub fn activity_name(&self) -> &str {
        &self.activity_name
    }

    pub fn orchestration_name(&self) -> &str {
        &self.orchestration_name
    }

    pub fn trace_info(&self, message: impl Into<String>) {
        tracing::info!(
            target: "durafan::activity",
            instance_id = %self.instance_id,
            activity_name = %self.activity_name,
            activity_id = self.activity_id,
            "{}",
            message.into()
        );
    }

    pub fn trace_warn(&self, message: impl Into<String>) {
        tracing::warn!(
            target: "durafan::activity",
            instance_id = %self.instance_id,
            activity_name = %self.activity_name,
            activity_id = self.activity_id,
            "{}",
            message.into()
        );
    }

    pub fn trace_error(&self, message: impl Into<String>) {
        tracing::error!(
            target: "durafan::activity",
            instance_id = %self.instance_id,
            activity_name = %self.activity_name,
            activity_id = self.activity_id,
            "{}",
            message.into()
        );
    }

    pub fn trace_debug(&self, message: impl Into<String>) {
        tracing::debug!(
            target: "durafan::activity",
            instance_id = %self.instance_id,
            activity_name = %self.activity_name,
            activity_id = self.activity_id,
            "{}",
            message.into()
        );
    }
}

#[async_trait]
pub trait ActivityHandler: Send + Sync {
    async fn invoke(&self, ctx: ActivityContext, input: String) -> Result<String, String>;
}

pub struct FnActivity<F, Fut>(pub F)
where
    F: Fn(ActivityContext, String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String, String>> + Send + 'static;

#[async_trait]
impl<F, Fut> ActivityHandler for FnActivity<F, Fut>
where
    F: Fn(ActivityContext, String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
{
    async fn invoke(&self, ctx: ActivityContext, input: String) -> Result<String, String> {
        (self.0)(ctx, input).await
    }
}

/// In-process runtime that executes orchestrations, activities and timers and
/// persists history via a `Provider`.
pub struct Runtime {
    joins: Mutex<Vec<JoinHandle<()>>>,
    history_store: Arc<dyn Provider>,
    orchestration_registry: OrchestrationRegistry,
    options: RuntimeOptions,
    shutdown_flag: Arc<AtomicBool>,
    stats: Arc<RuntimeStats>,
    runtime_id: String,
}

impl Runtime {
    /// Start a new runtime backed by an in-memory SQLite database.
    pub async fn start(
        activity_registry: Arc<registry::ActivityRegistry>,
        orchestration_registry: OrchestrationRegistry,
    ) -> Result<Arc<Self>, crate::providers::ProviderError> {
        let store = crate::providers::sqlite::SqliteProvider::new_in_memory()
            .await
            .map_err(|e| crate::providers::ProviderError::from_sqlx("connect", e))?;
        let history_store: Arc<dyn Provider> = Arc::new(store);
        Ok(Self::start_with_store(history_store, activity_registry, orchestration_registry).await)
    }

    /// Start a new runtime with a custom `Provider` implementation.
    pub async fn start_with_store(
        history_store: Arc<dyn Provider>,
        activity_registry: Arc<registry::ActivityRegistry>,
        orchestration_registry: OrchestrationRegistry,
    ) -> Arc<Self> {
        Self::start_with_options(
            history_store,
            activity_registry,
            orchestration_registry,
            RuntimeOptions::default(),
        )
        .await
    }

    pub async fn start_with_options(
        history_store: Arc<dyn Provider>,
        activity_registry: Arc<registry::ActivityRegistry>,
        orchestration_registry: OrchestrationRegistry,
        options: RuntimeOptions,
    ) -> Arc<Self> {
        let runtime_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        debug!(
            target: "durafan::runtime",
            runtime_id = %runtime_id,
            provider = history_store.name(),
            orchestrations = ?orchestration_registry.list_names(),
            activities = ?activity_registry.list_names(),
            "Starting runtime"
        );

        let runtime = Arc::new(Self {
            joins: Mutex::new(Vec::new()),
            history_store,
            orchestration_registry,
            options,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(RuntimeStats::default()),
            runtime_id,
        });

        let orch_handles = runtime.clone().start_orchestration_dispatcher();
        let work_handles = runtime.clone().start_work_dispatcher(activity_registry);
        {
            let mut joins = runtime.joins.lock().await;
            joins.extend(orch_handles);
            joins.extend(work_handles);
        }

        runtime
    }

    pub fn store(&self) -> Arc<dyn Provider> {
        Arc::clone(&self.history_store)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the dispatchers.
    ///
    /// With a timeout, dispatchers finish the item they are processing and
    /// exit; any still running after the timeout are aborted. Without one they
    /// are aborted immediately. Unacked items become visible again once their
    /// locks expire.
    pub async fn shutdown(self: Arc<Self>, timeout: Option<Duration>) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
        let handles: Vec<JoinHandle<()>> = self.joins.lock().await.drain(..).collect();

        let Some(timeout) = timeout else {
            for h in handles {
                h.abort();
            }
            return;
        };

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(
                target: "durafan::runtime",
                runtime_id = %self.runtime_id,
                "Dispatchers did not stop within {:?}; aborting",
                timeout
            );
            for a in aborts {
                a.abort();
            }
        }
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    async fn idle(&self) {
        tokio::time::sleep(Duration::from_millis(self.options.dispatcher_idle_sleep_ms)).await;
    }

    /// Run a provider call, retrying retryable failures with exponential backoff.
    async fn execute_with_retry<F, R>(&self, operation: F, operation_tag: &str) -> Result<(), crate::providers::ProviderError>
    where
        F: Fn() -> R,
        R: std::future::Future<Output = Result<(), crate::providers::ProviderError>>,
    {
        let mut attempts: u32 = 0;
        loop {
            match operation().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempts + 1 < self.options.max_ack_attempts => {
                    let backoff_ms = 10u64.saturating_mul(1 << attempts.min(16));
                    warn!(
                        target: "durafan::runtime",
                        attempts,
                        backoff_ms,
                        error = %e,
                        "{} failed; retrying",
                        operation_tag
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempts += 1;
                }
                Err(e) => {
                    self.stats.record_ack_failure();
                    warn!(target: "durafan::runtime", attempts, error = %e, "Failed to {}", operation_tag);
                    return Err(e);
                }
            }
        }
    }
}
