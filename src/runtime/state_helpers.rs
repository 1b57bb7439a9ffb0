use crate::runtime::OrchestrationStatus;
use crate::{ErrorDetails, Event, EventKind};

/// Reader for the facts a dispatcher or client needs from an instance history.
#[derive(Debug, Clone, Default)]
pub struct HistoryManager {
    /// Orchestration name (from OrchestrationStarted)
    pub orchestration_name: Option<String>,
    /// Orchestration version (from OrchestrationStarted)
    pub orchestration_version: Option<String>,
    /// Original input (from OrchestrationStarted)
    pub orchestration_input: Option<String>,
    pub output: Option<String>,
    pub failure: Option<ErrorDetails>,
    pub termination_reason: Option<String>,
    /// Count of recorded events.
    pub len: usize,
}

impl HistoryManager {
    pub fn from_history(history: &[Event]) -> Self {
        let mut mgr = Self {
            len: history.len(),
            ..Self::default()
        };

        for event in history {
            match &event.kind {
                EventKind::OrchestrationStarted { name, version, input } => {
                    mgr.orchestration_name = Some(name.clone());
                    mgr.orchestration_version = Some(version.clone());
                    mgr.orchestration_input = Some(input.clone());
                }
                EventKind::OrchestrationCompleted { output } => mgr.output = Some(output.clone()),
                EventKind::OrchestrationFailed { details } => mgr.failure = Some(details.clone()),
                EventKind::OrchestrationTerminated { reason } => mgr.termination_reason = Some(reason.clone()),
                _ => {}
            }
        }

        mgr
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_started(&self) -> bool {
        self.orchestration_name.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.output.is_some() || self.failure.is_some() || self.termination_reason.is_some()
    }

    /// Client-facing status. `NotFound` only for an empty history.
    pub fn status(&self, custom_status: Option<String>) -> OrchestrationStatus {
        if let Some(output) = &self.output {
            OrchestrationStatus::Completed {
                output: output.clone(),
                custom_status,
            }
        } else if let Some(details) = &self.failure {
            OrchestrationStatus::Failed {
                details: details.clone(),
                custom_status,
            }
        } else if let Some(reason) = &self.termination_reason {
            OrchestrationStatus::Terminated {
                reason: reason.clone(),
                custom_status,
            }
        } else if self.is_empty() {
            OrchestrationStatus::NotFound
        } else {
            OrchestrationStatus::Running { custom_status }
        }
    }
}
