//! Durable orchestration engine with deterministic replay.
//!
//! Orchestrations are ordinary `async` functions over an [`OrchestrationContext`].
//! Every durable await point (an activity call, a timer, a recorded system value)
//! is backed by an append-only history of [`Event`]s. A *turn* replays the
//! orchestration against that history: decisions that are already recorded are
//! matched and resolved from history, new decisions become [`Action`]s that the
//! runtime dispatches after the turn is persisted.
//!
//! - Data model: [`Event`], [`EventKind`], [`Action`], [`ErrorDetails`]
//! - Replay executor: [`run_turn`] and [`OrchestrationContext`]
//! - Fan-out/fan-in: [`OrchestrationContext::join`], [`OrchestrationContext::select`]
//! - History log: [`history::HistoryLog`]
//! - Runtime, storage and control plane: [`runtime`], [`providers`], [`Client`]
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod app;
pub mod client;
pub mod futures;
pub mod history;
pub mod http;
pub mod providers;
pub mod retry;
pub mod runtime;
pub mod sample;

pub use client::{Client, ClientError};
pub use futures::{ActivityFuture, DurableFuture, DurableOutput, JoinFuture, QuorumFuture, SelectFuture};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use runtime::registry::{ActivityRegistry, OrchestrationRegistry};
pub use runtime::{ActivityContext, ActivityHandler, OrchestrationHandler, OrchestrationStatus};

/// First event id of every history.
pub const INITIAL_EVENT_ID: u64 = 1;

pub(crate) const SYSTEM_OP_UTC_NOW: &str = "utc_now_ms";
pub(crate) const SYSTEM_OP_NEW_GUID: &str = "new_guid";

// Internal codec utilities for typed I/O
pub(crate) mod _typed_codec {
    use serde::{Serialize, de::DeserializeOwned};

    pub trait Codec {
        fn encode<T: Serialize>(v: &T) -> Result<String, String>;
        fn decode<T: DeserializeOwned>(s: &str) -> Result<T, String>;
    }

    pub struct Json;

    impl Codec for Json {
        fn encode<T: Serialize>(v: &T) -> Result<String, String> {
            serde_json::to_string(v).map_err(|e| format!("encode: {e}"))
        }

        fn decode<T: DeserializeOwned>(s: &str) -> Result<T, String> {
            serde_json::from_str(s).map_err(|e| format!("decode: {e}"))
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// Errors
// ============================================================================

/// Application-level failure categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppErrorKind {
    /// An activity returned `Err`.
    ActivityFailed,
    /// Orchestrator code returned `Err`.
    OrchestrationFailed,
    /// Orchestrator or activity code panicked.
    Panicked,
}

/// Configuration failure categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigErrorKind {
    UnregisteredOrchestration,
    UnregisteredActivity,
    /// The version recorded in history is no longer registered.
    MissingVersion,
}

/// Classified failure carried by history events and instance statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorDetails {
    /// Failure raised by user code. Catchable by orchestrations.
    Application { kind: AppErrorKind, message: String },
    /// Orchestrator code no longer matches its recorded history.
    ReplayMismatch { message: String },
    /// Missing registrations and similar deployment problems.
    Configuration {
        kind: ConfigErrorKind,
        resource: String,
        message: Option<String>,
    },
    /// Storage or runtime failure.
    Infrastructure {
        operation: String,
        message: String,
        retryable: bool,
    },
}

impl ErrorDetails {
    /// Short category label used in logs and status responses.
    pub fn category(&self) -> &'static str {
        match self {
            ErrorDetails::Application { .. } => "application",
            ErrorDetails::ReplayMismatch { .. } => "replay_mismatch",
            ErrorDetails::Configuration { .. } => "configuration",
            ErrorDetails::Infrastructure { .. } => "infrastructure",
        }
    }

    /// Failures that abort a turn instead of being handed to orchestrator code.
    pub fn is_system_error(&self) -> bool {
        !matches!(self, ErrorDetails::Application { .. })
    }

    /// Human readable message. Application errors return the raw user message.
    pub fn display_message(&self) -> String {
        match self {
            ErrorDetails::Application { message, .. } => message.clone(),
            ErrorDetails::ReplayMismatch { message } => format!("replay mismatch: {message}"),
            ErrorDetails::Configuration {
                kind,
                resource,
                message,
            } => {
                let base = match kind {
                    ConfigErrorKind::UnregisteredOrchestration => format!("unregistered orchestration: {resource}"),
                    ConfigErrorKind::UnregisteredActivity => format!("unregistered activity: {resource}"),
                    ConfigErrorKind::MissingVersion => format!("version not registered: {resource}"),
                };
                match message {
                    Some(m) => format!("{base} ({m})"),
                    None => base,
                }
            }
            ErrorDetails::Infrastructure { operation, message, .. } => format!("infrastructure: {operation}: {message}"),
        }
    }
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_message())
    }
}

impl std::error::Error for ErrorDetails {}

// ============================================================================
// History events
// ============================================================================

/// One immutable record in an instance history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Position in the history, starting at [`INITIAL_EVENT_ID`].
    pub event_id: u64,
    /// For completions, the event id of the scheduling event they answer.
    pub source_event_id: Option<u64>,
    pub instance_id: String,
    /// Wall-clock time the event was created. Informational only; never read during replay.
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    OrchestrationStarted { name: String, version: String, input: String },
    ActivityScheduled { name: String, input: String },
    ActivityCompleted { result: String },
    ActivityFailed { details: ErrorDetails },
    TimerCreated { fire_at_ms: u64 },
    TimerFired { fire_at_ms: u64 },
    /// A nondeterministic value captured the first time it was requested.
    SystemCall { op: String, value: String },
    OrchestrationCompleted { output: String },
    OrchestrationFailed { details: ErrorDetails },
    OrchestrationTerminated { reason: String },
}

impl Event {
    pub fn with_event_id(
        event_id: u64,
        instance_id: impl Into<String>,
        source_event_id: Option<u64>,
        kind: EventKind,
    ) -> Self {
        Self {
            event_id,
            source_event_id,
            instance_id: instance_id.into(),
            timestamp_ms: now_ms(),
            kind,
        }
    }

    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    pub fn set_event_id(&mut self, event_id: u64) {
        self.event_id = event_id;
    }

    /// Events that record a decision made by orchestrator code.
    pub fn is_schedule(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ActivityScheduled { .. } | EventKind::TimerCreated { .. } | EventKind::SystemCall { .. }
        )
    }

    /// Events that answer a previously scheduled decision.
    pub fn is_completion(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ActivityCompleted { .. } | EventKind::ActivityFailed { .. } | EventKind::TimerFired { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::OrchestrationCompleted { .. }
                | EventKind::OrchestrationFailed { .. }
                | EventKind::OrchestrationTerminated { .. }
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            EventKind::OrchestrationStarted { .. } => "OrchestrationStarted",
            EventKind::ActivityScheduled { .. } => "ActivityScheduled",
            EventKind::ActivityCompleted { .. } => "ActivityCompleted",
            EventKind::ActivityFailed { .. } => "ActivityFailed",
            EventKind::TimerCreated { .. } => "TimerCreated",
            EventKind::TimerFired { .. } => "TimerFired",
            EventKind::SystemCall { .. } => "SystemCall",
            EventKind::OrchestrationCompleted { .. } => "OrchestrationCompleted",
            EventKind::OrchestrationFailed { .. } => "OrchestrationFailed",
            EventKind::OrchestrationTerminated { .. } => "OrchestrationTerminated",
        }
    }

    fn describe_schedule(&self) -> String {
        match &self.kind {
            EventKind::ActivityScheduled { name, input } => format!("ActivityScheduled('{name}','{input}')"),
            EventKind::TimerCreated { .. } => "TimerCreated".to_string(),
            EventKind::SystemCall { op, .. } => format!("SystemCall('{op}')"),
            _ => self.kind_name().to_string(),
        }
    }
}

/// Decision emitted by a turn for the runtime to carry out once the turn is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CallActivity {
        scheduling_event_id: u64,
        name: String,
        input: String,
    },
    CreateTimer {
        scheduling_event_id: u64,
        fire_at_ms: u64,
    },
    /// Informational: the value is already recorded, nothing to dispatch.
    SystemCall {
        scheduling_event_id: u64,
        op: String,
        value: String,
    },
}

// ============================================================================
// Replay context
// ============================================================================

/// What a durable future asks to schedule when it first polls.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ScheduleRequest<'a> {
    Activity { name: &'a str, input: &'a str },
    Timer,
    System { op: &'a str },
}

impl std::fmt::Display for ScheduleRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleRequest::Activity { name, input } => write!(f, "ActivityScheduled('{name}','{input}')"),
            ScheduleRequest::Timer => write!(f, "TimerCreated"),
            ScheduleRequest::System { op } => write!(f, "SystemCall('{op}')"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct CtxInner {
    pub(crate) instance_id: String,
    pub(crate) history: Vec<Event>,
    pub(crate) actions: Vec<Action>,
    pub(crate) next_event_id: u64,
    pub(crate) claimed_scheduling_events: HashSet<u64>,
    recorded_schedules: usize,
    claimed_recorded: usize,
    pub(crate) mismatch: Option<String>,
    pub(crate) custom_status: Option<String>,
    pub(crate) turn_started_ms: u64,
}

impl CtxInner {
    fn new(instance_id: String, history: Vec<Event>, turn_started_ms: u64) -> Self {
        let next_event_id = history.last().map(|e| e.event_id + 1).unwrap_or(INITIAL_EVENT_ID);
        let recorded_schedules = history.iter().filter(|e| e.is_schedule()).count();
        Self {
            instance_id,
            history,
            actions: Vec::new(),
            next_event_id,
            claimed_scheduling_events: HashSet::new(),
            recorded_schedules,
            claimed_recorded: 0,
            mismatch: None,
            custom_status: None,
            turn_started_ms,
        }
    }

    /// Claim the next unclaimed recorded scheduling event.
    ///
    /// `Ok(None)` means history holds no further decisions and the caller must
    /// record a new one. `Err` carries a replay mismatch description.
    pub(crate) fn claim_next_schedule(&mut self, request: ScheduleRequest<'_>) -> Result<Option<u64>, String> {
        let Some(next) = self
            .history
            .iter()
            .find(|e| e.is_schedule() && !self.claimed_scheduling_events.contains(&e.event_id))
        else {
            return Ok(None);
        };

        let matches = match (&next.kind, request) {
            (EventKind::ActivityScheduled { name, input }, ScheduleRequest::Activity { name: n, input: i }) => {
                name == n && input == i
            }
            (EventKind::TimerCreated { .. }, ScheduleRequest::Timer) => true,
            (EventKind::SystemCall { op, .. }, ScheduleRequest::System { op: o }) => op == o,
            _ => false,
        };
        if !matches {
            return Err(format!(
                "schedule order mismatch at event_id={}: history has {} but orchestration requested {request}",
                next.event_id,
                next.describe_schedule()
            ));
        }

        let event_id = next.event_id;
        self.claimed_scheduling_events.insert(event_id);
        self.claimed_recorded += 1;
        Ok(Some(event_id))
    }

    /// Append a new scheduling event and mark it claimed.
    pub(crate) fn record_schedule(&mut self, kind: EventKind) -> u64 {
        let event_id = self.next_event_id;
        self.next_event_id += 1;
        self.history
            .push(Event::with_event_id(event_id, self.instance_id.clone(), None, kind));
        self.claimed_scheduling_events.insert(event_id);
        event_id
    }

    pub(crate) fn record_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub(crate) fn find_completion(&self, scheduling_event_id: u64) -> Option<&Event> {
        self.history
            .iter()
            .find(|e| e.is_completion() && e.source_event_id == Some(scheduling_event_id))
    }

    pub(crate) fn find_event(&self, event_id: u64) -> Option<&Event> {
        self.history.iter().find(|e| e.event_id == event_id)
    }

    pub(crate) fn is_replaying(&self) -> bool {
        self.claimed_recorded < self.recorded_schedules
    }

    fn first_unclaimed_schedule(&self) -> Option<&Event> {
        self.history
            .iter()
            .find(|e| e.is_schedule() && !self.claimed_scheduling_events.contains(&e.event_id))
    }
}

/// Handle given to orchestrator code. Cheap to clone; all clones share one turn.
#[derive(Clone)]
pub struct OrchestrationContext {
    pub(crate) inner: Arc<Mutex<CtxInner>>,
}

impl OrchestrationContext {
    pub(crate) fn new(instance_id: impl Into<String>, history: Vec<Event>, turn_started_ms: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CtxInner::new(instance_id.into(), history, turn_started_ms))),
        }
    }

    // A panic in user code can poison the lock; the turn is failed by the engine anyway.
    pub(crate) fn lock(&self) -> MutexGuard<'_, CtxInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn instance_id(&self) -> String {
        self.lock().instance_id.clone()
    }

    /// True while orchestrator code is re-treading decisions already recorded in history.
    pub fn is_replaying(&self) -> bool {
        self.lock().is_replaying()
    }

    /// Set the instance custom status. Last write in a turn wins.
    pub fn set_custom_status(&self, status: impl Into<String>) {
        self.lock().custom_status = Some(status.into());
    }

    pub fn reset_custom_status(&self) {
        self.lock().custom_status = None;
    }

    pub fn custom_status(&self) -> Option<String> {
        self.lock().custom_status.clone()
    }

    pub fn trace_info(&self, message: impl Into<String>) {
        self.trace(tracing::Level::INFO, message.into());
    }

    pub fn trace_warn(&self, message: impl Into<String>) {
        self.trace(tracing::Level::WARN, message.into());
    }

    pub fn trace_error(&self, message: impl Into<String>) {
        self.trace(tracing::Level::ERROR, message.into());
    }

    pub fn trace_debug(&self, message: impl Into<String>) {
        self.trace(tracing::Level::DEBUG, message.into());
    }

    // Suppressed during replay so each message is emitted once per instance.
    fn trace(&self, level: tracing::Level, message: String) {
        let (replaying, instance_id) = {
            let inner = self.lock();
            (inner.is_replaying(), inner.instance_id.clone())
        };
        if replaying {
            return;
        }
        match level {
            tracing::Level::ERROR => {
                tracing::error!(target: "durafan::orchestration", instance_id = %instance_id, "{}", message)
            }
            tracing::Level::WARN => {
                tracing::warn!(target: "durafan::orchestration", instance_id = %instance_id, "{}", message)
            }
            tracing::Level::DEBUG => {
                tracing::debug!(target: "durafan::orchestration", instance_id = %instance_id, "{}", message)
            }
            _ => tracing::info!(target: "durafan::orchestration", instance_id = %instance_id, "{}", message),
        }
    }

    /// Schedule an activity. Nothing happens until the returned future is polled.
    pub fn schedule_activity(&self, name: impl Into<String>, input: impl Into<String>) -> DurableFuture {
        DurableFuture::activity(self.clone(), name.into(), input.into())
    }

    /// Schedule an activity and await its result.
    pub fn call_activity(&self, name: impl Into<String>, input: impl Into<String>) -> ActivityFuture {
        self.schedule_activity(name, input).into_activity()
    }

    /// Call an activity with JSON-encoded input and output.
    pub async fn call_activity_typed<In, Out>(&self, name: impl Into<String>, input: &In) -> Result<Out, String>
    where
        In: Serialize,
        Out: serde::de::DeserializeOwned,
    {
        use _typed_codec::Codec;
        let payload = _typed_codec::Json::encode(input)?;
        let raw = self.call_activity(name, payload).await?;
        _typed_codec::Json::decode(&raw)
    }

    /// Durable timer that fires `delay` after the turn that created it.
    pub fn schedule_timer(&self, delay: Duration) -> DurableFuture {
        DurableFuture::timer(self.clone(), delay)
    }

    /// Wall-clock time in milliseconds, recorded on first execution and replayed afterwards.
    pub async fn utc_now_ms(&self) -> u64 {
        let value = DurableFuture::system(self.clone(), SYSTEM_OP_UTC_NOW.to_string())
            .await
            .into_value();
        value.parse().unwrap_or(0)
    }

    /// Random GUID, recorded on first execution and replayed afterwards.
    pub async fn new_guid(&self) -> String {
        DurableFuture::system(self.clone(), SYSTEM_OP_NEW_GUID.to_string())
            .await
            .into_value()
    }

    /// Wait for every future. Outputs come back in input order.
    pub fn join(&self, futures: Vec<DurableFuture>) -> JoinFuture {
        JoinFuture::new(futures)
    }

    /// Wait for the first future to complete. The others are handed back still pending.
    ///
    /// # Panics
    ///
    /// Panics if `futures` is empty. Inside the runtime this fails the instance.
    pub fn select(&self, futures: Vec<DurableFuture>) -> SelectFuture {
        assert!(!futures.is_empty(), "select requires at least one future");
        SelectFuture::new(futures)
    }

    /// Wait until `required` futures have completed.
    pub fn join_quorum(&self, futures: Vec<DurableFuture>, required: usize) -> QuorumFuture {
        QuorumFuture::new(futures, required)
    }

    fn take_turn_state(&self) -> (Vec<Event>, Vec<Action>, Option<String>, Option<String>) {
        let mut inner = self.lock();
        if inner.mismatch.is_none()
            && let Some(unclaimed) = inner.first_unclaimed_schedule()
        {
            let message = format!(
                "orchestration finished but history still holds {} at event_id={}",
                unclaimed.describe_schedule(),
                unclaimed.event_id
            );
            inner.mismatch = Some(message);
        }
        (
            std::mem::take(&mut inner.history),
            std::mem::take(&mut inner.actions),
            inner.mismatch.clone(),
            inner.custom_status.clone(),
        )
    }
}

/// Everything one turn produced.
#[derive(Debug)]
pub struct TurnOutput {
    /// Input history plus the scheduling events recorded this turn.
    pub history: Vec<Event>,
    /// New decisions, in the order orchestrator code made them.
    pub actions: Vec<Action>,
    /// `Some` once orchestrator code returned.
    pub output: Option<Result<String, String>>,
    /// Set when the code diverged from recorded history.
    pub mismatch: Option<String>,
    pub custom_status: Option<String>,
}

/// Run one turn of `orchestrator` against `history`.
///
/// The orchestration is polled once with a no-op waker: every completion it can
/// observe is already in history, so a single pass resolves all ready await points.
pub fn run_turn<F, Fut>(instance_id: &str, history: Vec<Event>, orchestrator: F) -> TurnOutput
where
    F: FnOnce(OrchestrationContext) -> Fut,
    Fut: Future<Output = Result<String, String>>,
{
    run_turn_at(instance_id, history, now_ms(), orchestrator)
}

/// [`run_turn`] with an explicit turn start time, used for new timer deadlines.
pub fn run_turn_at<F, Fut>(instance_id: &str, history: Vec<Event>, turn_started_ms: u64, orchestrator: F) -> TurnOutput
where
    F: FnOnce(OrchestrationContext) -> Fut,
    Fut: Future<Output = Result<String, String>>,
{
    let ctx = OrchestrationContext::new(instance_id, history, turn_started_ms);
    let mut fut = std::pin::pin!(orchestrator(ctx.clone()));
    let mut cx = Context::from_waker(Waker::noop());
    let output = match fut.as_mut().poll(&mut cx) {
        Poll::Ready(out) => Some(out),
        Poll::Pending => None,
    };

    let (history, actions, mismatch, custom_status) = if output.is_some() {
        ctx.take_turn_state()
    } else {
        let mut inner = ctx.lock();
        (
            std::mem::take(&mut inner.history),
            std::mem::take(&mut inner.actions),
            inner.mismatch.clone(),
            inner.custom_status.clone(),
        )
    };

    TurnOutput {
        history,
        actions,
        output,
        mismatch,
        custom_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(instance: &str) -> Event {
        Event::with_event_id(
            1,
            instance,
            None,
            EventKind::OrchestrationStarted {
                name: "O".into(),
                version: "1.0.0".into(),
                input: String::new(),
            },
        )
    }

    #[test]
    fn first_turn_emits_one_action_per_scheduled_call() {
        let out = run_turn("i", vec![started("i")], |ctx| async move {
            let a = ctx.call_activity("hello", "Seattle").await?;
            Ok(a)
        });
        assert!(out.output.is_none());
        assert_eq!(
            out.actions,
            vec![Action::CallActivity {
                scheduling_event_id: 2,
                name: "hello".into(),
                input: "Seattle".into()
            }]
        );
        assert_eq!(out.history.len(), 2);
    }

    #[test]
    fn recorded_completion_resolves_without_new_work() {
        let mut history = vec![started("i")];
        history.push(Event::with_event_id(
            2,
            "i",
            None,
            EventKind::ActivityScheduled {
                name: "hello".into(),
                input: "Seattle".into(),
            },
        ));
        history.push(Event::with_event_id(
            3,
            "i",
            Some(2),
            EventKind::ActivityCompleted {
                result: "Hello Seattle".into(),
            },
        ));
        let out = run_turn("i", history, |ctx| async move { ctx.call_activity("hello", "Seattle").await });
        assert!(out.actions.is_empty());
        assert_eq!(out.output, Some(Ok("Hello Seattle".to_string())));
        assert!(out.mismatch.is_none());
    }

    #[test]
    fn changed_input_is_a_mismatch() {
        let history = vec![
            started("i"),
            Event::with_event_id(
                2,
                "i",
                None,
                EventKind::ActivityScheduled {
                    name: "hello".into(),
                    input: "Seattle".into(),
                },
            ),
        ];
        let out = run_turn("i", history, |ctx| async move { ctx.call_activity("hello", "Tokyo").await });
        let mismatch = out.mismatch.expect("mismatch");
        assert!(mismatch.contains("Seattle"));
        assert!(mismatch.contains("Tokyo"));
        assert!(out.actions.is_empty());
    }

    #[test]
    fn error_details_messages() {
        let app = ErrorDetails::Application {
            kind: AppErrorKind::ActivityFailed,
            message: "boom".into(),
        };
        assert_eq!(app.display_message(), "boom");
        assert!(!app.is_system_error());

        let cfg = ErrorDetails::Configuration {
            kind: ConfigErrorKind::UnregisteredActivity,
            resource: "Nope".into(),
            message: None,
        };
        assert_eq!(cfg.display_message(), "unregistered activity: Nope");
        assert!(cfg.is_system_error());
        assert_eq!(cfg.category(), "configuration");
    }

    #[test]
    fn event_serde_keeps_kind_tag() {
        let e = Event::with_event_id(4, "i", Some(2), EventKind::TimerFired { fire_at_ms: 10 });
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"type\":\"TimerFired\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
