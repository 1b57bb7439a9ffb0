//! Orchestration dispatcher: fetches locked instance batches, runs one replay
//! turn per batch and commits the result atomically.

use crate::providers::{
    ExecutionMetadata, OrchestrationItem, STATUS_COMPLETED, STATUS_FAILED, STATUS_RUNNING, STATUS_TERMINATED, WorkItem,
};
use crate::runtime::OrchestrationHandler;
use crate::runtime::replay_engine::{ReplayEngine, TurnResult};
use crate::{Action, ConfigErrorKind, ErrorDetails, Event};
use semver::Version;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::super::{HistoryManager, Runtime};

/// Name, version and input of the instance being processed.
struct StartInfo {
    name: String,
    /// Version recorded in history, or requested by the start message
    version: Option<String>,
    input: String,
    is_new: bool,
}

fn start_info(history: &HistoryManager, messages: &[WorkItem]) -> Option<StartInfo> {
    if let (Some(name), Some(input)) = (&history.orchestration_name, &history.orchestration_input) {
        return Some(StartInfo {
            name: name.clone(),
            version: history.orchestration_version.clone(),
            input: input.clone(),
            is_new: false,
        });
    }
    messages.iter().find_map(|m| match m {
        WorkItem::StartOrchestration {
            orchestration,
            version,
            input,
            ..
        } => Some(StartInfo {
            name: orchestration.clone(),
            version: version.clone(),
            input: input.clone(),
            is_new: true,
        }),
        _ => None,
    })
}

impl Runtime {
    pub(in crate::runtime) fn start_orchestration_dispatcher(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.options.orchestration_concurrency.max(1))
            .map(|worker_idx| {
                let rt = Arc::clone(&self);
                let worker_id = format!("orch-{worker_idx}-{}", rt.runtime_id);
                tokio::spawn(async move {
                    debug!(target: "durafan::runtime", worker_id = %worker_id, "Orchestration dispatcher started");
                    while !rt.is_shutting_down() {
                        match rt
                            .history_store
                            .fetch_orchestration_item(rt.options.orchestrator_lock_timeout)
                            .await
                        {
                            Ok(Some(item)) => rt.process_orchestration_item(item).await,
                            Ok(None) => rt.idle().await,
                            Err(e) => {
                                warn!(target: "durafan::runtime", worker_id = %worker_id, error = %e, "fetch_orchestration_item failed");
                                rt.idle().await;
                            }
                        }
                    }
                })
            })
            .collect()
    }

    /// Resolve the handler for an instance: the exact recorded version when
    /// one is known, otherwise the registry policy.
    fn resolve_orchestration(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<(Version, Arc<dyn OrchestrationHandler>), ErrorDetails> {
        let missing = |message: Option<String>| ErrorDetails::Configuration {
            kind: if self.orchestration_registry.has(name) {
                ConfigErrorKind::MissingVersion
            } else {
                ConfigErrorKind::UnregisteredOrchestration
            },
            resource: match version {
                Some(v) => format!("{name}@{v}"),
                None => name.to_string(),
            },
            message,
        };

        match version {
            Some(v) => {
                let parsed = Version::parse(v).map_err(|e| missing(Some(e.to_string())))?;
                let handler = self
                    .orchestration_registry
                    .resolve_handler_exact(name, &parsed)
                    .ok_or_else(|| missing(None))?;
                Ok((parsed, handler))
            }
            None => self.orchestration_registry.resolve_handler(name).ok_or_else(|| missing(None)),
        }
    }

    pub(in crate::runtime) async fn process_orchestration_item(self: &Arc<Self>, item: OrchestrationItem) {
        let instance = item.instance.clone();
        let history_mgr = HistoryManager::from_history(&item.history);

        if history_mgr.is_terminal() {
            debug!(
                target: "durafan::runtime",
                instance_id = %instance,
                dropped = item.messages.len(),
                "Instance is terminal, acking batch without processing"
            );
            self.ack_orchestration(&item.lock_token, Vec::new(), Vec::new(), Vec::new(), ExecutionMetadata::default())
                .await;
            return;
        }

        let Some(start) = start_info(&history_mgr, &item.messages) else {
            warn!(
                target: "durafan::runtime",
                instance_id = %instance,
                messages = item.messages.len(),
                "Messages for an instance that was never started; dropping"
            );
            self.ack_orchestration(&item.lock_token, Vec::new(), Vec::new(), Vec::new(), ExecutionMetadata::default())
                .await;
            return;
        };

        let terminate_reason = item.messages.iter().find_map(|m| match m {
            WorkItem::TerminateInstance { reason, .. } => Some(reason.clone()),
            _ => None,
        });

        let resolved = self.resolve_orchestration(&start.name, start.version.as_deref());
        let version = match (&resolved, &start.version) {
            (Ok((v, _)), _) => v.to_string(),
            (Err(_), Some(v)) => v.clone(),
            (Err(_), None) => "0.0.0".to_string(),
        };

        let mut engine = ReplayEngine::new(instance.clone(), item.history);
        if start.is_new {
            engine.record_started(&start.name, &version, &start.input);
            debug!(
                target: "durafan::runtime",
                instance_id = %instance,
                orchestration_name = %start.name,
                orchestration_version = %version,
                "Starting orchestration"
            );
        }

        let result = match (terminate_reason, resolved) {
            (Some(reason), _) => TurnResult::Terminated(reason),
            (None, Err(details)) => TurnResult::Failed(details),
            (None, Ok((_, handler))) => {
                engine.prep_completions(item.messages);
                engine.execute_orchestration(handler, start.input.clone())
            }
        };
        engine.finish(&result);

        let mut worker_items = Vec::new();
        let mut orchestrator_items = Vec::new();
        if result == TurnResult::Continue {
            for action in engine.pending_actions() {
                match action {
                    Action::CallActivity {
                        scheduling_event_id,
                        name,
                        input,
                    } => worker_items.push(WorkItem::ActivityExecute {
                        instance: instance.clone(),
                        id: *scheduling_event_id,
                        name: name.clone(),
                        input: input.clone(),
                    }),
                    Action::CreateTimer {
                        scheduling_event_id,
                        fire_at_ms,
                    } => orchestrator_items.push(WorkItem::TimerFired {
                        instance: instance.clone(),
                        id: *scheduling_event_id,
                        fire_at_ms: *fire_at_ms,
                    }),
                    Action::SystemCall { .. } => {}
                }
            }
        }

        let (status, output) = match &result {
            TurnResult::Continue => (STATUS_RUNNING, None),
            TurnResult::Completed(output) => {
                self.stats.record_orchestration_completion();
                info!(
                    target: "durafan::runtime",
                    instance_id = %instance,
                    orchestration_name = %start.name,
                    "Orchestration completed"
                );
                (STATUS_COMPLETED, Some(output.clone()))
            }
            TurnResult::Failed(details) => {
                self.stats.record_orchestration_failure(details);
                warn!(
                    target: "durafan::runtime",
                    instance_id = %instance,
                    orchestration_name = %start.name,
                    error_type = details.category(),
                    error = %details,
                    "Orchestration failed"
                );
                (STATUS_FAILED, Some(details.display_message()))
            }
            TurnResult::Terminated(reason) => {
                self.stats.record_orchestration_termination();
                info!(
                    target: "durafan::runtime",
                    instance_id = %instance,
                    orchestration_name = %start.name,
                    reason = %reason,
                    "Orchestration terminated"
                );
                (STATUS_TERMINATED, Some(reason.clone()))
            }
        };

        let metadata = ExecutionMetadata {
            orchestration_name: Some(start.name.clone()),
            orchestration_version: Some(version),
            status: Some(status.to_string()),
            output,
            custom_status: engine.custom_status.clone(),
        };

        debug!(
            target: "durafan::runtime",
            instance_id = %instance,
            history_delta = engine.history_delta().len(),
            worker_items = worker_items.len(),
            orchestrator_items = orchestrator_items.len(),
            "Acking orchestration turn"
        );
        self.ack_orchestration(
            &item.lock_token,
            engine.into_delta(),
            worker_items,
            orchestrator_items,
            metadata,
        )
        .await;
    }

    async fn ack_orchestration(
        &self,
        lock_token: &str,
        history_delta: Vec<Event>,
        worker_items: Vec<WorkItem>,
        orchestrator_items: Vec<WorkItem>,
        metadata: ExecutionMetadata,
    ) {
        let acked = self
            .execute_with_retry(
                || {
                    self.history_store.ack_orchestration_item(
                        lock_token,
                        history_delta.clone(),
                        worker_items.clone(),
                        orchestrator_items.clone(),
                        metadata.clone(),
                    )
                },
                "ack_orchestration_item",
            )
            .await;

        if acked.is_err()
            && let Err(e) = self
                .history_store
                .abandon_orchestration_item(lock_token, Some(Duration::from_millis(50)))
                .await
        {
            warn!(target: "durafan::runtime", error = %e, "abandon_orchestration_item failed; lock will expire");
        }
    }
}
