use std::sync::Arc;
use std::time::Duration;

use crate::_typed_codec::{Codec, Json};
use crate::providers::{Provider, ProviderError, WorkItem};
use crate::runtime::{HistoryManager, OrchestrationStatus};
use crate::{AppErrorKind, ErrorDetails, Event};
use serde::Serialize;

/// Errors returned by [`Client`] calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    Provider(ProviderError),
    /// `wait_for_orchestration` gave up before the instance finished.
    Timeout,
    InvalidInput(String),
    NotFound(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Provider(e) => write!(f, "provider error: {e}"),
            ClientError::Timeout => write!(f, "timed out waiting for orchestration"),
            ClientError::InvalidInput(m) => write!(f, "invalid input: {m}"),
            ClientError::NotFound(id) => write!(f, "instance not found: {id}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ProviderError> for ClientError {
    fn from(e: ProviderError) -> Self {
        ClientError::Provider(e)
    }
}

/// Control-plane client.
///
/// Talks to the runtime only through the shared [`Provider`]: starting,
/// terminating and completing are queue messages picked up by the next turn.
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn Provider>,
}

impl Client {
    pub fn new(store: Arc<dyn Provider>) -> Self {
        Self { store }
    }

    /// Start an orchestration on its latest registered version.
    pub async fn start_orchestration(
        &self,
        instance: &str,
        orchestration: &str,
        input: impl Into<String>,
    ) -> Result<(), ClientError> {
        self.start(instance, orchestration, None, input.into()).await
    }

    /// Start an orchestration pinned to a specific version.
    pub async fn start_orchestration_versioned(
        &self,
        instance: &str,
        orchestration: &str,
        version: impl Into<String>,
        input: impl Into<String>,
    ) -> Result<(), ClientError> {
        let version = version.into();
        semver::Version::parse(&version).map_err(|e| ClientError::InvalidInput(format!("version {version}: {e}")))?;
        self.start(instance, orchestration, Some(version), input.into()).await
    }

    /// Start an orchestration with input serialized to JSON.
    pub async fn start_orchestration_typed<In: Serialize>(
        &self,
        instance: &str,
        orchestration: &str,
        input: &In,
    ) -> Result<(), ClientError> {
        let payload = Json::encode(input).map_err(ClientError::InvalidInput)?;
        self.start(instance, orchestration, None, payload).await
    }

    async fn start(
        &self,
        instance: &str,
        orchestration: &str,
        version: Option<String>,
        input: String,
    ) -> Result<(), ClientError> {
        if instance.is_empty() {
            return Err(ClientError::InvalidInput("instance id must not be empty".into()));
        }
        if !self
            .store
            .create_instance(instance, orchestration, version.as_deref())
            .await?
        {
            return Err(ClientError::InvalidInput(format!("instance already exists: {instance}")));
        }
        let item = WorkItem::StartOrchestration {
            instance: instance.to_string(),
            orchestration: orchestration.to_string(),
            version,
            input,
        };
        self.store.enqueue_for_orchestrator(item, None).await?;
        Ok(())
    }

    pub async fn get_orchestration_status(&self, instance: &str) -> Result<OrchestrationStatus, ClientError> {
        let history = self.store.read(instance).await?;
        let info = self.store.get_instance_info(instance).await?;
        let custom_status = info.as_ref().and_then(|i| i.custom_status.clone());

        if history.is_empty() {
            return Ok(match info {
                Some(_) => OrchestrationStatus::Running { custom_status },
                None => OrchestrationStatus::NotFound,
            });
        }
        Ok(HistoryManager::from_history(&history).status(custom_status))
    }

    /// Poll until the instance is terminal or `timeout` elapses.
    pub async fn wait_for_orchestration(
        &self,
        instance: &str,
        timeout: Duration,
    ) -> Result<OrchestrationStatus, ClientError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut delay = Duration::from_millis(5);
        loop {
            let status = self.get_orchestration_status(instance).await?;
            if status.is_terminal() {
                return Ok(status);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::Timeout);
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_millis(100));
        }
    }

    /// Ask the runtime to terminate an instance. Outstanding activities are
    /// left to finish; their results are discarded.
    pub async fn terminate_instance(&self, instance: &str, reason: impl Into<String>) -> Result<(), ClientError> {
        let Some(info) = self.store.get_instance_info(instance).await? else {
            return Err(ClientError::NotFound(instance.to_string()));
        };
        if info.is_terminal() {
            tracing::debug!(target: "durafan::client", instance_id = %instance, status = %info.status, "terminate on finished instance ignored");
            return Ok(());
        }
        let item = WorkItem::TerminateInstance {
            instance: instance.to_string(),
            reason: reason.into(),
        };
        self.store.enqueue_for_orchestrator(item, None).await?;
        Ok(())
    }

    pub async fn read_history(&self, instance: &str) -> Result<Vec<Event>, ClientError> {
        Ok(self.store.read(instance).await?)
    }

    pub async fn list_instances(&self) -> Result<Vec<String>, ClientError> {
        Ok(self.store.list_instances().await?)
    }

    /// Deliver the result of an activity executed outside this runtime.
    ///
    /// `id` is the event id of the `ActivityScheduled` event.
    pub async fn deliver_activity_result(
        &self,
        instance: &str,
        id: u64,
        result: Result<String, String>,
    ) -> Result<(), ClientError> {
        let item = match result {
            Ok(result) => WorkItem::ActivityCompleted {
                instance: instance.to_string(),
                id,
                result,
            },
            Err(message) => WorkItem::ActivityFailed {
                instance: instance.to_string(),
                id,
                details: ErrorDetails::Application {
                    kind: AppErrorKind::ActivityFailed,
                    message,
                },
            },
        };
        self.store.enqueue_for_orchestrator(item, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::in_memory::InMemoryProvider;

    fn client() -> Client {
        Client::new(Arc::new(InMemoryProvider::new()))
    }

    #[tokio::test]
    async fn duplicate_start_is_rejected() {
        let c = client();
        c.start_orchestration("a", "Hello", "").await.unwrap();
        let err = c.start_orchestration("a", "Hello", "").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn created_instance_reports_running_before_first_turn() {
        let c = client();
        assert_eq!(c.get_orchestration_status("a").await.unwrap(), OrchestrationStatus::NotFound);
        c.start_orchestration("a", "Hello", "").await.unwrap();
        assert_eq!(
            c.get_orchestration_status("a").await.unwrap(),
            OrchestrationStatus::Running { custom_status: None }
        );
    }

    #[tokio::test]
    async fn terminate_unknown_instance_is_not_found() {
        let err = client().terminate_instance("missing", "x").await.unwrap_err();
        assert_eq!(err, ClientError::NotFound("missing".into()));
    }

    #[tokio::test]
    async fn invalid_version_is_rejected() {
        let err = client()
            .start_orchestration_versioned("a", "Hello", "one", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidInput(_)));
    }
}
