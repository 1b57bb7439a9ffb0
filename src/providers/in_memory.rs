use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{
    ExecutionMetadata, InstanceInfo, OrchestrationItem, Provider, ProviderError, STATUS_PENDING, STATUS_RUNNING,
    WorkItem,
};
use crate::history::HistoryLog;
use crate::{Event, EventKind, now_ms};

struct InstanceRow {
    log: HistoryLog,
    info: InstanceInfo,
}

struct QueuedMessage {
    id: u64,
    item: WorkItem,
    visible_at: u64,
    lock_token: Option<String>,
}

struct QueuedWork {
    id: u64,
    item: WorkItem,
    visible_at: u64,
    lock_token: Option<String>,
    locked_until: u64,
}

#[derive(Default)]
struct State {
    instances: HashMap<String, InstanceRow>,
    orchestrator_queue: Vec<QueuedMessage>,
    worker_queue: Vec<QueuedWork>,
    // instance -> (lock token, locked until)
    instance_locks: HashMap<String, (String, u64)>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn push_orchestrator(&mut self, item: WorkItem, visible_at: u64) {
        let id = self.next_id();
        self.orchestrator_queue.push(QueuedMessage {
            id,
            item,
            visible_at,
            lock_token: None,
        });
    }

    fn push_worker(&mut self, item: WorkItem, visible_at: u64) {
        let id = self.next_id();
        self.worker_queue.push(QueuedWork {
            id,
            item,
            visible_at,
            lock_token: None,
            locked_until: 0,
        });
    }

    fn is_locked(&self, instance: &str, now: u64) -> bool {
        self.instance_locks
            .get(instance)
            .is_some_and(|(_, until)| *until > now)
    }
}

fn new_info(instance: &str, name: &str, version: Option<&str>, status: &str) -> InstanceInfo {
    let now = now_ms();
    InstanceInfo {
        instance_id: instance.to_string(),
        orchestration_name: name.to_string(),
        orchestration_version: version.map(str::to_string),
        status: status.to_string(),
        output: None,
        custom_status: None,
        created_at_ms: now,
        updated_at_ms: now,
    }
}

fn delay_ms(delay: Option<Duration>) -> u64 {
    delay.map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Process-local provider backed by tokio mutexes. State is lost on drop.
#[derive(Default)]
pub struct InMemoryProvider {
    state: Mutex<State>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting on each queue, including locked ones.
    pub async fn queue_depths(&self) -> (usize, usize) {
        let st = self.state.lock().await;
        (st.orchestrator_queue.len(), st.worker_queue.len())
    }
}

#[async_trait::async_trait]
impl Provider for InMemoryProvider {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_instance(
        &self,
        instance: &str,
        orchestration_name: &str,
        version: Option<&str>,
    ) -> Result<bool, ProviderError> {
        let mut st = self.state.lock().await;
        if st.instances.contains_key(instance) {
            return Ok(false);
        }
        st.instances.insert(
            instance.to_string(),
            InstanceRow {
                log: HistoryLog::new(instance),
                info: new_info(instance, orchestration_name, version, STATUS_PENDING),
            },
        );
        Ok(true)
    }

    async fn fetch_orchestration_item(&self, lock_timeout: Duration) -> Result<Option<OrchestrationItem>, ProviderError> {
        let mut st = self.state.lock().await;
        let now = now_ms();

        let candidate = st
            .orchestrator_queue
            .iter()
            .filter(|m| m.visible_at <= now)
            .map(|m| m.item.instance().to_string())
            .find(|instance| !st.is_locked(instance, now));
        let Some(instance) = candidate else {
            return Ok(None);
        };

        let token = uuid::Uuid::new_v4().to_string();
        let locked_until = now.saturating_add(lock_timeout.as_millis() as u64);
        st.instance_locks
            .insert(instance.clone(), (token.clone(), locked_until));

        let mut messages = Vec::new();
        let mut batch: Vec<&mut QueuedMessage> = st
            .orchestrator_queue
            .iter_mut()
            .filter(|m| m.item.instance() == instance && m.visible_at <= now)
            .collect();
        batch.sort_by_key(|m| m.id);
        for m in batch {
            m.lock_token = Some(token.clone());
            messages.push(m.item.clone());
        }

        let (orchestration_name, version, history) = match st.instances.get(&instance) {
            Some(row) => (
                row.info.orchestration_name.clone(),
                row.info.orchestration_version.clone(),
                row.log.to_vec(),
            ),
            None => match messages.iter().find_map(|m| match m {
                WorkItem::StartOrchestration {
                    orchestration, version, ..
                } => Some((orchestration.clone(), version.clone())),
                _ => None,
            }) {
                Some((name, version)) => (name, version, Vec::new()),
                None => (String::new(), None, Vec::new()),
            },
        };

        tracing::debug!(
            target: "durafan::providers::in_memory",
            instance = %instance,
            messages = messages.len(),
            history_len = history.len(),
            "Fetched orchestration item"
        );

        Ok(Some(OrchestrationItem {
            instance,
            orchestration_name,
            version,
            history,
            messages,
            lock_token: token,
        }))
    }

    async fn ack_orchestration_item(
        &self,
        lock_token: &str,
        history_delta: Vec<Event>,
        worker_items: Vec<WorkItem>,
        orchestrator_items: Vec<WorkItem>,
        metadata: ExecutionMetadata,
    ) -> Result<(), ProviderError> {
        const OP: &str = "ack_orchestration_item";
        let mut st = self.state.lock().await;
        let now = now_ms();

        let instance = st
            .instance_locks
            .iter()
            .find(|(_, (token, _))| token == lock_token)
            .map(|(instance, (_, until))| (instance.clone(), *until));
        let Some((instance, locked_until)) = instance else {
            return Err(ProviderError::permanent(OP, "Invalid lock token"));
        };
        if locked_until <= now {
            st.instance_locks.remove(&instance);
            return Err(ProviderError::permanent(OP, "Instance lock expired"));
        }

        // Validate the delta against a copy so a bad batch leaves no trace.
        let mut log = match st.instances.get(&instance) {
            Some(row) => row.log.clone(),
            None => HistoryLog::new(instance.clone()),
        };
        log.append_all(history_delta)
            .map_err(|e| ProviderError::from_history(OP, e))?;

        let row = st.instances.entry(instance.clone()).or_insert_with(|| {
            let name = metadata.orchestration_name.as_deref().unwrap_or_default();
            InstanceRow {
                log: HistoryLog::new(instance.clone()),
                info: new_info(&instance, name, metadata.orchestration_version.as_deref(), STATUS_RUNNING),
            }
        });
        row.log = log;
        if let Some(name) = metadata.orchestration_name {
            row.info.orchestration_name = name;
        }
        if let Some(version) = metadata.orchestration_version {
            row.info.orchestration_version = Some(version);
        }
        match metadata.status {
            Some(status) => {
                row.info.status = status;
                row.info.output = metadata.output;
            }
            None if row.info.status == STATUS_PENDING && !row.log.is_empty() => {
                row.info.status = STATUS_RUNNING.to_string();
            }
            None => {}
        }
        if let Some(custom_status) = metadata.custom_status {
            row.info.custom_status = custom_status;
        }
        row.info.updated_at_ms = now;

        st.orchestrator_queue
            .retain(|m| m.lock_token.as_deref() != Some(lock_token));
        for item in worker_items {
            st.push_worker(item, now);
        }
        for item in orchestrator_items {
            let visible_at = item.visible_at(now);
            st.push_orchestrator(item, visible_at);
        }
        st.instance_locks.remove(&instance);

        tracing::debug!(target: "durafan::providers::in_memory", instance = %instance, "Acked orchestration item");
        Ok(())
    }

    async fn abandon_orchestration_item(&self, lock_token: &str, delay: Option<Duration>) -> Result<(), ProviderError> {
        let mut st = self.state.lock().await;
        let visible_at = now_ms().saturating_add(delay_ms(delay));
        let before = st.instance_locks.len();
        st.instance_locks.retain(|_, (token, _)| token != lock_token);
        if st.instance_locks.len() == before {
            return Err(ProviderError::permanent(
                "abandon_orchestration_item",
                "Invalid lock token",
            ));
        }
        for m in st
            .orchestrator_queue
            .iter_mut()
            .filter(|m| m.lock_token.as_deref() == Some(lock_token))
        {
            m.lock_token = None;
            if delay.is_some() {
                m.visible_at = visible_at;
            }
        }
        Ok(())
    }

    async fn fetch_work_item(&self, lock_timeout: Duration) -> Result<Option<(WorkItem, String)>, ProviderError> {
        let mut st = self.state.lock().await;
        let now = now_ms();
        let Some(work) = st
            .worker_queue
            .iter_mut()
            .filter(|w| w.visible_at <= now && (w.lock_token.is_none() || w.locked_until <= now))
            .min_by_key(|w| w.id)
        else {
            return Ok(None);
        };
        let token = uuid::Uuid::new_v4().to_string();
        work.lock_token = Some(token.clone());
        work.locked_until = now.saturating_add(lock_timeout.as_millis() as u64);
        Ok(Some((work.item.clone(), token)))
    }

    async fn ack_work_item(&self, token: &str, completion: Option<WorkItem>) -> Result<(), ProviderError> {
        let mut st = self.state.lock().await;
        let Some(pos) = st
            .worker_queue
            .iter()
            .position(|w| w.lock_token.as_deref() == Some(token))
        else {
            return Err(ProviderError::permanent("ack_work_item", "Invalid lock token"));
        };
        if let Some(completion) = &completion
            && !matches!(
                completion,
                WorkItem::ActivityCompleted { .. } | WorkItem::ActivityFailed { .. }
            )
        {
            return Err(ProviderError::permanent(
                "ack_work_item",
                "Invalid completion type for worker ack",
            ));
        }
        st.worker_queue.remove(pos);
        if let Some(completion) = completion {
            let now = now_ms();
            st.push_orchestrator(completion, now);
        }
        Ok(())
    }

    async fn abandon_work_item(&self, token: &str, delay: Option<Duration>) -> Result<(), ProviderError> {
        let mut st = self.state.lock().await;
        let visible_at = now_ms().saturating_add(delay_ms(delay));
        let Some(work) = st
            .worker_queue
            .iter_mut()
            .find(|w| w.lock_token.as_deref() == Some(token))
        else {
            return Err(ProviderError::permanent("abandon_work_item", "Invalid lock token"));
        };
        work.lock_token = None;
        work.locked_until = 0;
        work.visible_at = visible_at;
        Ok(())
    }

    async fn enqueue_for_orchestrator(&self, item: WorkItem, delay: Option<Duration>) -> Result<(), ProviderError> {
        let mut st = self.state.lock().await;
        let now = now_ms();
        let visible_at = item.visible_at(now).max(now.saturating_add(delay_ms(delay)));
        st.push_orchestrator(item, visible_at);
        Ok(())
    }

    async fn read(&self, instance: &str) -> Result<Vec<Event>, ProviderError> {
        let st = self.state.lock().await;
        Ok(st
            .instances
            .get(instance)
            .map(|row| row.log.to_vec())
            .unwrap_or_default())
    }

    async fn append(&self, instance: &str, events: Vec<Event>) -> Result<(), ProviderError> {
        let mut st = self.state.lock().await;
        let started = events.iter().find_map(|e| match &e.kind {
            EventKind::OrchestrationStarted { name, version, .. } => Some((name.clone(), version.clone())),
            _ => None,
        });
        let row = st.instances.entry(instance.to_string()).or_insert_with(|| {
            let (name, version) = started.clone().unwrap_or_default();
            InstanceRow {
                log: HistoryLog::new(instance),
                info: new_info(instance, &name, Some(version.as_str()), STATUS_RUNNING),
            }
        });
        row.log
            .append_all(events)
            .map_err(|e| ProviderError::from_history("append", e))?;
        row.info.updated_at_ms = now_ms();
        Ok(())
    }

    async fn get_instance_info(&self, instance: &str) -> Result<Option<InstanceInfo>, ProviderError> {
        let st = self.state.lock().await;
        Ok(st.instances.get(instance).map(|row| row.info.clone()))
    }

    async fn list_instances(&self) -> Result<Vec<String>, ProviderError> {
        let st = self.state.lock().await;
        let mut ids: Vec<String> = st.instances.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
