//! Worker (activity) dispatcher: runs activities and acks each one together
//! with the completion message for its orchestration.

use crate::providers::WorkItem;
use crate::{ActivityContext, AppErrorKind, ConfigErrorKind, ErrorDetails};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

use super::super::{Runtime, registry};

enum ActivityOutcome {
    Success,
    AppError,
    ConfigError,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "activity panicked".to_string()
    }
}

impl Runtime {
    pub(in crate::runtime) fn start_work_dispatcher(
        self: Arc<Self>,
        activities: Arc<registry::ActivityRegistry>,
    ) -> Vec<JoinHandle<()>> {
        (0..self.options.worker_concurrency.max(1))
            .map(|worker_idx| {
                let rt = Arc::clone(&self);
                let activities = Arc::clone(&activities);
                let worker_id = format!("work-{worker_idx}-{}", rt.runtime_id);
                tokio::spawn(async move {
                    while !rt.is_shutting_down() {
                        match rt.history_store.fetch_work_item(rt.options.worker_lock_timeout).await {
                            Ok(Some((item, token))) => rt.execute_activity(&activities, item, &token, &worker_id).await,
                            Ok(None) => rt.idle().await,
                            Err(e) => {
                                warn!(target: "durafan::runtime", worker_id = %worker_id, error = %e, "fetch_work_item failed");
                                rt.idle().await;
                            }
                        }
                    }
                })
            })
            .collect()
    }

    async fn execute_activity(
        &self,
        activities: &registry::ActivityRegistry,
        item: WorkItem,
        token: &str,
        worker_id: &str,
    ) {
        let WorkItem::ActivityExecute { instance, id, name, input } = item else {
            warn!(target: "durafan::runtime", worker_id = %worker_id, ?item, "unexpected item on worker queue; dropping");
            self.ack_work(token, None).await;
            return;
        };

        let info = match self.history_store.get_instance_info(&instance).await {
            Ok(info) => info,
            Err(e) => {
                warn!(target: "durafan::runtime", instance_id = %instance, error = %e, "instance lookup failed");
                None
            }
        };
        if info.as_ref().is_some_and(|i| i.is_terminal()) {
            self.stats.record_activity_skipped();
            tracing::debug!(
                target: "durafan::runtime",
                instance_id = %instance,
                activity_name = %name,
                activity_id = id,
                "Instance already finished; skipping activity"
            );
            self.ack_work(token, None).await;
            return;
        }
        let orch_name = info.map(|i| i.orchestration_name).unwrap_or_default();

        tracing::debug!(
            target: "durafan::runtime",
            instance_id = %instance,
            activity_name = %name,
            activity_id = id,
            worker_id = %worker_id,
            "Activity started"
        );
        let start_time = std::time::Instant::now();

        let (completion, outcome) = match activities.resolve_handler(&name) {
            Some((_, handler)) => {
                let ctx = ActivityContext::new(instance.clone(), id, name.clone(), orch_name);
                match AssertUnwindSafe(handler.invoke(ctx, input)).catch_unwind().await {
                    Ok(Ok(result)) => (
                        WorkItem::ActivityCompleted {
                            instance: instance.clone(),
                            id,
                            result,
                        },
                        ActivityOutcome::Success,
                    ),
                    Ok(Err(message)) => (
                        WorkItem::ActivityFailed {
                            instance: instance.clone(),
                            id,
                            details: ErrorDetails::Application {
                                kind: AppErrorKind::ActivityFailed,
                                message,
                            },
                        },
                        ActivityOutcome::AppError,
                    ),
                    Err(payload) => (
                        WorkItem::ActivityFailed {
                            instance: instance.clone(),
                            id,
                            details: ErrorDetails::Application {
                                kind: AppErrorKind::Panicked,
                                message: panic_message(payload.as_ref()),
                            },
                        },
                        ActivityOutcome::AppError,
                    ),
                }
            }
            None => (
                WorkItem::ActivityFailed {
                    instance: instance.clone(),
                    id,
                    details: ErrorDetails::Configuration {
                        kind: ConfigErrorKind::UnregisteredActivity,
                        resource: name.clone(),
                        message: None,
                    },
                },
                ActivityOutcome::ConfigError,
            ),
        };

        let duration_ms = start_time.elapsed().as_millis() as u64;
        match outcome {
            ActivityOutcome::Success => {
                self.stats.record_activity_success();
                tracing::debug!(
                    target: "durafan::runtime",
                    instance_id = %instance,
                    activity_name = %name,
                    activity_id = id,
                    worker_id = %worker_id,
                    outcome = "success",
                    duration_ms,
                    "Activity completed"
                );
            }
            ActivityOutcome::AppError => {
                self.stats.record_activity_app_error();
                tracing::warn!(
                    target: "durafan::runtime",
                    instance_id = %instance,
                    activity_name = %name,
                    activity_id = id,
                    worker_id = %worker_id,
                    outcome = "app_error",
                    duration_ms,
                    "Activity failed (application error)"
                );
            }
            ActivityOutcome::ConfigError => {
                self.stats.record_activity_config_error();
                tracing::error!(
                    target: "durafan::runtime",
                    instance_id = %instance,
                    activity_name = %name,
                    activity_id = id,
                    worker_id = %worker_id,
                    outcome = "system_error",
                    error_type = "unregistered",
                    "Activity failed (unregistered)"
                );
            }
        }

        self.ack_work(token, Some(completion)).await;
    }

    async fn ack_work(&self, token: &str, completion: Option<WorkItem>) {
        let acked = self
            .execute_with_retry(
                || self.history_store.ack_work_item(token, completion.clone()),
                "ack_work_item",
            )
            .await;

        if acked.is_err()
            && let Err(e) = self
                .history_store
                .abandon_work_item(token, Some(Duration::from_millis(50)))
                .await
        {
            warn!(target: "durafan::runtime", error = %e, "abandon_work_item failed; lock will expire");
        }
    }
}
