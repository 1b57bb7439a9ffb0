use crate::providers::WorkItem;
use crate::runtime::OrchestrationHandler;
use crate::{Action, AppErrorKind, ErrorDetails, Event, EventKind};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of executing an orchestration turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnResult {
    /// Turn persisted, orchestration waits for more completions
    Continue,
    Completed(String),
    Failed(ErrorDetails),
    Terminated(String),
}

/// Replays history and executes one deterministic orchestration evaluation.
///
/// A turn runs in three stages: completion messages are converted into
/// history events, the orchestration is replayed over the result, and the
/// outcome is turned into a terminal event when the instance finished.
pub struct ReplayEngine {
    pub(crate) instance: String,
    /// History as stored when the batch was fetched
    pub(crate) baseline_history: Vec<Event>,
    /// Events produced by this turn, to be appended on ack
    pub(crate) history_delta: Vec<Event>,
    /// Actions to dispatch after persistence
    pub(crate) pending_actions: Vec<Action>,
    pub(crate) next_event_id: u64,
    /// System failure that aborts the turn before user code runs
    pub(crate) abort_error: Option<ErrorDetails>,
    /// Custom status at the end of the turn; `None` when user code did not run
    pub(crate) custom_status: Option<Option<String>>,
}

impl ReplayEngine {
    pub fn new(instance: impl Into<String>, baseline_history: Vec<Event>) -> Self {
        let next_event_id = baseline_history
            .last()
            .map(|e| e.event_id + 1)
            .unwrap_or(crate::INITIAL_EVENT_ID);

        Self {
            instance: instance.into(),
            baseline_history,
            history_delta: Vec::new(),
            pending_actions: Vec::new(),
            next_event_id,
            abort_error: None,
            custom_status: None,
        }
    }

    fn push_event(&mut self, source_event_id: Option<u64>, kind: EventKind) {
        let event = Event::with_event_id(self.next_event_id, self.instance.clone(), source_event_id, kind);
        self.next_event_id += 1;
        self.history_delta.push(event);
    }

    fn all_events(&self) -> impl Iterator<Item = &Event> {
        self.baseline_history.iter().chain(self.history_delta.iter())
    }

    /// Record the first event of a new instance.
    pub fn record_started(&mut self, name: &str, version: &str, input: &str) {
        self.push_event(
            None,
            EventKind::OrchestrationStarted {
                name: name.to_string(),
                version: version.to_string(),
                input: input.to_string(),
            },
        );
    }

    /// Stage 1: convert completion messages into history events.
    ///
    /// Completions already in history are dropped. A completion that does not
    /// answer a scheduling event of the same kind aborts the turn.
    pub fn prep_completions(&mut self, messages: Vec<WorkItem>) {
        debug!(
            target: "durafan::runtime",
            instance = %self.instance,
            message_count = messages.len(),
            "converting messages to events"
        );

        for msg in messages {
            let (id, expected) = match &msg {
                WorkItem::ActivityCompleted { id, .. } | WorkItem::ActivityFailed { id, .. } => (*id, "activity"),
                WorkItem::TimerFired { id, .. } => (*id, "timer"),
                _ => continue,
            };

            let answered = self.all_events().any(|e| e.is_completion() && e.source_event_id == Some(id));
            if answered {
                debug!(target: "durafan::runtime", instance = %self.instance, id, "ignoring duplicate completion");
                continue;
            }

            let scheduled = self.all_events().find(|e| e.event_id == id).map(|e| match e.kind {
                EventKind::ActivityScheduled { .. } => "activity",
                EventKind::TimerCreated { .. } => "timer",
                _ => "other",
            });
            let mismatch = match scheduled {
                Some(kind) if kind == expected => None,
                Some(kind) => Some(format!("completion kind mismatch for id={id}, expected '{kind}', got '{expected}'")),
                None => Some(format!("no matching schedule for completion id={id}")),
            };
            if let Some(message) = mismatch {
                warn!(target: "durafan::runtime", instance = %self.instance, %message, "detected nondeterminism in completion batch");
                if self.abort_error.is_none() {
                    self.abort_error = Some(ErrorDetails::ReplayMismatch { message });
                }
                continue;
            }

            match msg {
                WorkItem::ActivityCompleted { id, result, .. } => {
                    self.push_event(Some(id), EventKind::ActivityCompleted { result });
                }
                WorkItem::ActivityFailed { id, details, .. } => {
                    if details.is_system_error() && self.abort_error.is_none() {
                        warn!(target: "durafan::runtime", instance = %self.instance, id, ?details, "System error aborts turn");
                        self.abort_error = Some(details.clone());
                    }
                    self.push_event(Some(id), EventKind::ActivityFailed { details });
                }
                WorkItem::TimerFired { id, fire_at_ms, .. } => {
                    self.push_event(Some(id), EventKind::TimerFired { fire_at_ms });
                }
                _ => {}
            }
        }
    }

    /// Stage 2: replay the orchestration over baseline plus staged completions.
    pub fn execute_orchestration(&mut self, handler: Arc<dyn OrchestrationHandler>, input: String) -> TurnResult {
        if let Some(err) = self.abort_error.clone() {
            return TurnResult::Failed(err);
        }

        let working_history: Vec<Event> = self.all_events().cloned().collect();
        let working_len = working_history.len();
        let instance = self.instance.clone();

        let run_result = catch_unwind(AssertUnwindSafe(|| {
            crate::run_turn(&instance, working_history, move |ctx| async move { handler.invoke(ctx, input).await })
        }));

        let turn = match run_result {
            Ok(turn) => turn,
            Err(panic_payload) => {
                let message = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "orchestration panicked".to_string()
                };
                return TurnResult::Failed(ErrorDetails::Application {
                    kind: AppErrorKind::Panicked,
                    message,
                });
            }
        };

        if let Some(message) = turn.mismatch {
            return TurnResult::Failed(ErrorDetails::ReplayMismatch { message });
        }

        self.custom_status = Some(turn.custom_status);
        if turn.history.len() > working_len {
            self.history_delta.extend(turn.history.into_iter().skip(working_len));
            self.next_event_id = self
                .history_delta
                .last()
                .map(|e| e.event_id + 1)
                .unwrap_or(self.next_event_id);
        }
        self.pending_actions = turn.actions;

        match turn.output {
            Some(Ok(output)) => TurnResult::Completed(output),
            Some(Err(message)) => TurnResult::Failed(ErrorDetails::Application {
                kind: AppErrorKind::OrchestrationFailed,
                message,
            }),
            None => TurnResult::Continue,
        }
    }

    /// Stage 3: append the terminal event for a finished instance.
    pub fn finish(&mut self, result: &TurnResult) {
        match result {
            TurnResult::Continue => {}
            TurnResult::Completed(output) => self.push_event(None, EventKind::OrchestrationCompleted { output: output.clone() }),
            TurnResult::Failed(details) => self.push_event(None, EventKind::OrchestrationFailed { details: details.clone() }),
            TurnResult::Terminated(reason) => {
                self.push_event(None, EventKind::OrchestrationTerminated { reason: reason.clone() })
            }
        }
    }

    pub fn history_delta(&self) -> &[Event] {
        &self.history_delta
    }

    pub fn pending_actions(&self) -> &[Action] {
        &self.pending_actions
    }

    pub fn into_delta(self) -> Vec<Event> {
        self.history_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrchestrationContext;
    use crate::runtime::FnOrchestration;

    fn hello_twice() -> Arc<dyn OrchestrationHandler> {
        Arc::new(FnOrchestration(|ctx: OrchestrationContext, input: String| async move {
            let a = ctx.call_activity("hello", input.clone()).await?;
            let b = ctx.call_activity("hello", a).await?;
            Ok(b)
        }))
    }

    fn started_engine() -> ReplayEngine {
        let mut engine = ReplayEngine::new("i", Vec::new());
        engine.record_started("Hello", "1.0.0", "x");
        engine
    }

    #[test]
    fn first_turn_schedules_and_continues() {
        let mut engine = started_engine();
        let result = engine.execute_orchestration(hello_twice(), "x".into());
        assert_eq!(result, TurnResult::Continue);
        assert_eq!(engine.history_delta().len(), 2);
        assert_eq!(engine.pending_actions().len(), 1);
    }

    #[test]
    fn completion_resumes_and_schedules_next() {
        let mut first = started_engine();
        first.execute_orchestration(hello_twice(), "x".into());
        let baseline = first.into_delta();

        let mut engine = ReplayEngine::new("i", baseline);
        engine.prep_completions(vec![WorkItem::ActivityCompleted {
            instance: "i".into(),
            id: 2,
            result: "hx".into(),
        }]);
        let result = engine.execute_orchestration(hello_twice(), "x".into());
        assert_eq!(result, TurnResult::Continue);
        assert_eq!(
            engine.pending_actions(),
            &[Action::CallActivity {
                scheduling_event_id: 4,
                name: "hello".into(),
                input: "hx".into()
            }]
        );
    }

    #[test]
    fn duplicate_completion_is_dropped() {
        let mut first = started_engine();
        first.execute_orchestration(hello_twice(), "x".into());
        let mut baseline = first.into_delta();
        baseline.push(Event::with_event_id(3, "i", Some(2), EventKind::ActivityCompleted { result: "hx".into() }));

        let mut engine = ReplayEngine::new("i", baseline);
        engine.prep_completions(vec![WorkItem::ActivityCompleted {
            instance: "i".into(),
            id: 2,
            result: "again".into(),
        }]);
        assert!(engine.history_delta().is_empty());
        assert!(engine.abort_error.is_none());
    }

    #[test]
    fn completion_for_unknown_id_aborts() {
        let mut engine = started_engine();
        engine.prep_completions(vec![WorkItem::TimerFired {
            instance: "i".into(),
            id: 42,
            fire_at_ms: 0,
        }]);
        let result = engine.execute_orchestration(hello_twice(), "x".into());
        assert!(matches!(result, TurnResult::Failed(ErrorDetails::ReplayMismatch { .. })));
    }

    #[test]
    fn panic_becomes_application_failure() {
        let handler: Arc<dyn OrchestrationHandler> =
            Arc::new(FnOrchestration(|_ctx: OrchestrationContext, _input: String| async move {
                if true {
                    panic!("boom");
                }
                Ok(String::new())
            }));
        let mut engine = started_engine();
        let result = engine.execute_orchestration(handler, String::new());
        assert_eq!(
            result,
            TurnResult::Failed(ErrorDetails::Application {
                kind: AppErrorKind::Panicked,
                message: "boom".into()
            })
        );
    }

    #[test]
    fn empty_select_fails_the_turn() {
        let handler: Arc<dyn OrchestrationHandler> =
            Arc::new(FnOrchestration(|ctx: OrchestrationContext, _input: String| async move {
                let (idx, _, _) = ctx.select(Vec::new()).await;
                Ok(idx.to_string())
            }));
        let mut engine = started_engine();
        let result = engine.execute_orchestration(handler, String::new());
        assert!(matches!(
            result,
            TurnResult::Failed(ErrorDetails::Application {
                kind: AppErrorKind::Panicked,
                ref message
            }) if message.contains("select requires at least one future")
        ));
    }

    #[test]
    fn finish_appends_terminal_event() {
        let mut engine = started_engine();
        let result = TurnResult::Terminated("stop".into());
        engine.finish(&result);
        let last = engine.history_delta().last().map(|e| e.kind.clone());
        assert_eq!(last, Some(EventKind::OrchestrationTerminated { reason: "stop".into() }));
    }
}
