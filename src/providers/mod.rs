//! Storage contract for the runtime.
//!
//! A provider owns three things for every instance: its history log, its
//! queued messages, and an instance lock. The runtime never holds state of its
//! own between turns; everything it needs is fetched under a peek-lock and
//! committed back atomically.
//!
//! - Orchestrator queue: start, completion, timer and terminate messages, batched
//!   per instance and handed out together with the instance history.
//! - Worker queue: `ActivityExecute` items, one per scheduled activity.
//! - Timers: `TimerFired` messages on the orchestrator queue whose visibility
//!   is delayed until `fire_at_ms`.
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ErrorDetails, Event};

pub mod error;
pub mod in_memory;
pub mod sqlite;

pub use error::ProviderError;

/// Queue message exchanged between the client, dispatchers and provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkItem {
    StartOrchestration {
        instance: String,
        orchestration: String,
        /// Pin to an exact version; `None` resolves the latest registered one.
        version: Option<String>,
        input: String,
    },
    ActivityExecute {
        instance: String,
        /// Event id of the `ActivityScheduled` event (the sequence id).
        id: u64,
        name: String,
        input: String,
    },
    ActivityCompleted {
        instance: String,
        id: u64,
        result: String,
    },
    ActivityFailed {
        instance: String,
        id: u64,
        details: ErrorDetails,
    },
    TimerFired {
        instance: String,
        id: u64,
        fire_at_ms: u64,
    },
    TerminateInstance {
        instance: String,
        reason: String,
    },
}

impl WorkItem {
    pub fn instance(&self) -> &str {
        match self {
            WorkItem::StartOrchestration { instance, .. }
            | WorkItem::ActivityExecute { instance, .. }
            | WorkItem::ActivityCompleted { instance, .. }
            | WorkItem::ActivityFailed { instance, .. }
            | WorkItem::TimerFired { instance, .. }
            | WorkItem::TerminateInstance { instance, .. } => instance,
        }
    }

    /// Earliest time the message may be delivered, if later than now.
    pub(crate) fn visible_at(&self, now_ms: u64) -> u64 {
        match self {
            WorkItem::TimerFired { fire_at_ms, .. } => (*fire_at_ms).max(now_ms),
            _ => now_ms,
        }
    }
}

/// Locked batch of orchestrator messages for one instance.
#[derive(Debug, Clone)]
pub struct OrchestrationItem {
    pub instance: String,
    /// Empty when the instance has never been created.
    pub orchestration_name: String,
    pub version: Option<String>,
    pub history: Vec<Event>,
    pub messages: Vec<WorkItem>,
    pub lock_token: String,
}

/// Instance metadata written alongside a turn's history delta.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetadata {
    pub orchestration_name: Option<String>,
    pub orchestration_version: Option<String>,
    /// `Running`, `Completed`, `Failed` or `Terminated`; `None` leaves it unchanged.
    pub status: Option<String>,
    pub output: Option<String>,
    /// `Some(None)` clears the custom status, `None` leaves it unchanged.
    pub custom_status: Option<Option<String>>,
}

/// Stored summary of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub instance_id: String,
    pub orchestration_name: String,
    pub orchestration_version: Option<String>,
    pub status: String,
    pub output: Option<String>,
    pub custom_status: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl InstanceInfo {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "Completed" | "Failed" | "Terminated")
    }
}

pub const STATUS_PENDING: &str = "Pending";
pub const STATUS_RUNNING: &str = "Running";
pub const STATUS_COMPLETED: &str = "Completed";
pub const STATUS_FAILED: &str = "Failed";
pub const STATUS_TERMINATED: &str = "Terminated";

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Register a new instance. Returns `false` when the id is already taken.
    async fn create_instance(
        &self,
        instance: &str,
        orchestration_name: &str,
        version: Option<&str>,
    ) -> Result<bool, ProviderError>;

    /// Lock the next instance with visible messages and return its batch.
    ///
    /// Instances whose lock is still held by another dispatcher are skipped.
    /// The lock expires after `lock_timeout` unless acked or abandoned first.
    async fn fetch_orchestration_item(&self, lock_timeout: Duration) -> Result<Option<OrchestrationItem>, ProviderError>;

    /// Commit one turn atomically: append `history_delta`, delete the fetched
    /// messages, enqueue new work and release the instance lock.
    ///
    /// Fails without side effects when the lock has expired or the delta does
    /// not continue the stored history.
    async fn ack_orchestration_item(
        &self,
        lock_token: &str,
        history_delta: Vec<Event>,
        worker_items: Vec<WorkItem>,
        orchestrator_items: Vec<WorkItem>,
        metadata: ExecutionMetadata,
    ) -> Result<(), ProviderError>;

    /// Release the lock and make the batch visible again after `delay`.
    async fn abandon_orchestration_item(&self, lock_token: &str, delay: Option<Duration>) -> Result<(), ProviderError>;

    async fn fetch_work_item(&self, lock_timeout: Duration) -> Result<Option<(WorkItem, String)>, ProviderError>;

    /// Delete a worker item and enqueue its completion in one step.
    /// `None` drops the item without notifying the orchestration.
    async fn ack_work_item(&self, token: &str, completion: Option<WorkItem>) -> Result<(), ProviderError>;

    async fn abandon_work_item(&self, token: &str, delay: Option<Duration>) -> Result<(), ProviderError>;

    async fn enqueue_for_orchestrator(&self, item: WorkItem, delay: Option<Duration>) -> Result<(), ProviderError>;

    /// Full history of an instance; empty when unknown.
    async fn read(&self, instance: &str) -> Result<Vec<Event>, ProviderError>;

    /// Append events outside of a turn. Ids must continue the stored history.
    async fn append(&self, instance: &str, events: Vec<Event>) -> Result<(), ProviderError>;

    async fn get_instance_info(&self, instance: &str) -> Result<Option<InstanceInfo>, ProviderError>;

    async fn list_instances(&self) -> Result<Vec<String>, ProviderError>;
}
