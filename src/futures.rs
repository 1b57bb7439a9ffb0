use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::{Action, EventKind, OrchestrationContext, ScheduleRequest};

/// What a durable await point resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DurableOutput {
    Activity(Result<String, String>),
    Timer,
    System(String),
}

impl DurableOutput {
    /// Activity result. Timers and system values count as success.
    pub fn into_activity(self) -> Result<String, String> {
        match self {
            DurableOutput::Activity(r) => r,
            DurableOutput::Timer => Ok(String::new()),
            DurableOutput::System(v) => Ok(v),
        }
    }

    pub fn into_value(self) -> String {
        match self {
            DurableOutput::Activity(Ok(v)) | DurableOutput::System(v) => v,
            DurableOutput::Activity(Err(e)) => e,
            DurableOutput::Timer => String::new(),
        }
    }

    pub fn is_timer(&self) -> bool {
        matches!(self, DurableOutput::Timer)
    }
}

pub(crate) enum Kind {
    Activity { name: String, input: String },
    Timer { delay: Duration },
    System { op: String },
}

/// A single durable await point: an activity call, a timer or a recorded system value.
///
/// On first poll the future claims the next unclaimed scheduling event in history.
/// If history has none left it records a new one and emits an [`Action`].
pub struct DurableFuture {
    pub(crate) kind: Kind,
    pub(crate) claimed: Option<u64>,
    pub(crate) ctx: OrchestrationContext,
}

impl DurableFuture {
    pub(crate) fn activity(ctx: OrchestrationContext, name: String, input: String) -> Self {
        Self {
            kind: Kind::Activity { name, input },
            claimed: None,
            ctx,
        }
    }

    pub(crate) fn timer(ctx: OrchestrationContext, delay: Duration) -> Self {
        Self {
            kind: Kind::Timer { delay },
            claimed: None,
            ctx,
        }
    }

    pub(crate) fn system(ctx: OrchestrationContext, op: String) -> Self {
        Self {
            kind: Kind::System { op },
            claimed: None,
            ctx,
        }
    }

    /// Scheduling event id (the sequence id) once the future has been polled.
    pub fn scheduling_event_id(&self) -> Option<u64> {
        self.claimed
    }

    pub fn into_activity(self) -> ActivityFuture {
        ActivityFuture(self)
    }

    /// Event id of the completion answering this future, if history holds one.
    pub(crate) fn completion_event_id(&self) -> Option<u64> {
        let id = self.claimed?;
        if matches!(self.kind, Kind::System { .. }) {
            return Some(id);
        }
        self.ctx.lock().find_completion(id).map(|e| e.event_id)
    }

    fn claim(&mut self) -> Option<u64> {
        if let Some(id) = self.claimed {
            return Some(id);
        }
        let mut inner = self.ctx.lock();
        if inner.mismatch.is_some() {
            return None;
        }

        let request = match &self.kind {
            Kind::Activity { name, input } => ScheduleRequest::Activity { name, input },
            Kind::Timer { .. } => ScheduleRequest::Timer,
            Kind::System { op } => ScheduleRequest::System { op },
        };
        match inner.claim_next_schedule(request) {
            Ok(Some(id)) => {
                self.claimed = Some(id);
                return Some(id);
            }
            Ok(None) => {}
            Err(message) => {
                inner.mismatch = Some(message);
                return None;
            }
        }

        let id = match &self.kind {
            Kind::Activity { name, input } => {
                let id = inner.record_schedule(EventKind::ActivityScheduled {
                    name: name.clone(),
                    input: input.clone(),
                });
                inner.record_action(Action::CallActivity {
                    scheduling_event_id: id,
                    name: name.clone(),
                    input: input.clone(),
                });
                id
            }
            Kind::Timer { delay } => {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let fire_at_ms = inner.turn_started_ms.saturating_add(delay_ms);
                let id = inner.record_schedule(EventKind::TimerCreated { fire_at_ms });
                inner.record_action(Action::CreateTimer {
                    scheduling_event_id: id,
                    fire_at_ms,
                });
                id
            }
            Kind::System { op } => {
                let value = match op.as_str() {
                    crate::SYSTEM_OP_UTC_NOW => inner.turn_started_ms.to_string(),
                    crate::SYSTEM_OP_NEW_GUID => uuid::Uuid::new_v4().to_string(),
                    other => {
                        inner.mismatch = Some(format!("unknown system operation: {other}"));
                        return None;
                    }
                };
                let id = inner.record_schedule(EventKind::SystemCall {
                    op: op.clone(),
                    value: value.clone(),
                });
                inner.record_action(Action::SystemCall {
                    scheduling_event_id: id,
                    op: op.clone(),
                    value,
                });
                id
            }
        };
        self.claimed = Some(id);
        Some(id)
    }
}

impl Future for DurableFuture {
    type Output = DurableOutput;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(id) = this.claim() else {
            return Poll::Pending;
        };

        let inner = this.ctx.lock();
        if let Kind::System { .. } = this.kind {
            return match inner.find_event(id).map(|e| &e.kind) {
                Some(EventKind::SystemCall { value, .. }) => Poll::Ready(DurableOutput::System(value.clone())),
                _ => Poll::Pending,
            };
        }

        match inner.find_completion(id).map(|e| &e.kind) {
            Some(EventKind::ActivityCompleted { result }) => Poll::Ready(DurableOutput::Activity(Ok(result.clone()))),
            Some(EventKind::ActivityFailed { details }) => {
                Poll::Ready(DurableOutput::Activity(Err(details.display_message())))
            }
            Some(EventKind::TimerFired { .. }) => Poll::Ready(DurableOutput::Timer),
            _ => Poll::Pending,
        }
    }
}

const fn assert_unpin<T: Unpin>() {}
const _: () = {
    assert_unpin::<DurableFuture>();
};

/// Activity call that resolves straight to its result.
pub struct ActivityFuture(DurableFuture);

impl Future for ActivityFuture {
    type Output = Result<String, String>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0).poll(cx).map(DurableOutput::into_activity)
    }
}

// Polls every child in input order so replay claims scheduling events in the
// same order as the first execution. Returns the completion event id of each ready child.
fn poll_children(
    children: &mut [DurableFuture],
    results: &mut [Option<DurableOutput>],
    cx: &mut Context<'_>,
) -> Vec<(u64, usize)> {
    let mut ready = Vec::new();
    for (i, child) in children.iter_mut().enumerate() {
        if results[i].is_none()
            && let Poll::Ready(out) = Pin::new(&mut *child).poll(cx)
        {
            results[i] = Some(out);
        }
        if results[i].is_some() {
            ready.push((child.completion_event_id().unwrap_or(u64::MAX), i));
        }
    }
    ready.sort_unstable();
    ready
}

/// Wait-all over a fan-out group. Outputs come back in input order.
pub struct JoinFuture {
    children: Vec<DurableFuture>,
    results: Vec<Option<DurableOutput>>,
}

impl JoinFuture {
    pub(crate) fn new(children: Vec<DurableFuture>) -> Self {
        let results = vec![None; children.len()];
        Self { children, results }
    }
}

impl Future for JoinFuture {
    type Output = Vec<DurableOutput>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let ready = poll_children(&mut this.children, &mut this.results, cx);
        if ready.len() < this.children.len() {
            return Poll::Pending;
        }
        Poll::Ready(this.results.iter_mut().filter_map(Option::take).collect())
    }
}

/// Wait-any over a fan-out group.
///
/// Resolves to `(index, output, remaining)`. The winner is the member whose
/// completion comes first in history; `remaining` keeps the other members in
/// input order and they can be awaited later or dropped.
pub struct SelectFuture {
    children: Vec<DurableFuture>,
    results: Vec<Option<DurableOutput>>,
}

impl SelectFuture {
    pub(crate) fn new(children: Vec<DurableFuture>) -> Self {
        let results = vec![None; children.len()];
        Self { children, results }
    }
}

impl Future for SelectFuture {
    type Output = (usize, DurableOutput, Vec<DurableFuture>);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let ready = poll_children(&mut this.children, &mut this.results, cx);
        let Some(&(_, winner)) = ready.first() else {
            return Poll::Pending;
        };
        let Some(output) = this.results[winner].take() else {
            return Poll::Pending;
        };
        let mut remaining = std::mem::take(&mut this.children);
        remaining.remove(winner);
        Poll::Ready((winner, output, remaining))
    }
}

/// Resolves once `required` members have completed, with `(index, output)`
/// pairs in completion order.
pub struct QuorumFuture {
    children: Vec<DurableFuture>,
    results: Vec<Option<DurableOutput>>,
    required: usize,
}

impl QuorumFuture {
    pub(crate) fn new(children: Vec<DurableFuture>, required: usize) -> Self {
        let results = vec![None; children.len()];
        let required = required.min(children.len());
        Self {
            children,
            results,
            required,
        }
    }
}

impl Future for QuorumFuture {
    type Output = Vec<(usize, DurableOutput)>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let ready = poll_children(&mut this.children, &mut this.results, cx);
        if ready.len() < this.required {
            return Poll::Pending;
        }
        let picked = ready
            .into_iter()
            .take(this.required)
            .filter_map(|(_, i)| this.results[i].take().map(|out| (i, out)))
            .collect();
        Poll::Ready(picked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Event, run_turn};

    fn base() -> Vec<Event> {
        vec![Event::with_event_id(
            1,
            "i",
            None,
            EventKind::OrchestrationStarted {
                name: "O".into(),
                version: "1.0.0".into(),
                input: String::new(),
            },
        )]
    }

    fn scheduled(id: u64, name: &str, input: &str) -> Event {
        Event::with_event_id(
            id,
            "i",
            None,
            EventKind::ActivityScheduled {
                name: name.into(),
                input: input.into(),
            },
        )
    }

    fn completed(id: u64, source: u64, result: &str) -> Event {
        Event::with_event_id(id, "i", Some(source), EventKind::ActivityCompleted { result: result.into() })
    }

    #[test]
    fn select_picks_earliest_completion_not_lowest_index() {
        let mut h = base();
        h.push(scheduled(2, "A", "a"));
        h.push(scheduled(3, "B", "b"));
        h.push(completed(4, 3, "rb"));
        h.push(completed(5, 2, "ra"));

        let out = crate::run_turn("i", h, |ctx| async move {
            let a = ctx.schedule_activity("A", "a");
            let b = ctx.schedule_activity("B", "b");
            let (idx, output, remaining) = ctx.select(vec![a, b]).await;
            assert_eq!(remaining.len(), 1);
            Ok(format!("{idx}:{}", output.into_value()))
        });
        assert_eq!(out.output, Some(Ok("1:rb".to_string())));
        assert!(out.mismatch.is_none());
    }

    #[test]
    fn join_returns_input_order() {
        let mut h = base();
        h.push(scheduled(2, "A", "a"));
        h.push(scheduled(3, "B", "b"));
        h.push(completed(4, 3, "rb"));
        h.push(completed(5, 2, "ra"));

        let out = run_turn("i", h, |ctx| async move {
            let futs = vec![ctx.schedule_activity("A", "a"), ctx.schedule_activity("B", "b")];
            let outs: Vec<String> = ctx.join(futs).await.into_iter().map(DurableOutput::into_value).collect();
            Ok(outs.join(","))
        });
        assert_eq!(out.output, Some(Ok("ra,rb".to_string())));
    }

    #[test]
    fn quorum_waits_for_required_members() {
        let mut h = base();
        h.push(scheduled(2, "A", "a"));
        h.push(scheduled(3, "B", "b"));
        h.push(scheduled(4, "C", "c"));
        h.push(completed(5, 4, "rc"));

        let pending = run_turn("i", h.clone(), |ctx| async move {
            let futs = vec![
                ctx.schedule_activity("A", "a"),
                ctx.schedule_activity("B", "b"),
                ctx.schedule_activity("C", "c"),
            ];
            let got = ctx.join_quorum(futs, 2).await;
            Ok(got.len().to_string())
        });
        assert!(pending.output.is_none());

        h.push(completed(6, 2, "ra"));
        let done = run_turn("i", h, |ctx| async move {
            let futs = vec![
                ctx.schedule_activity("A", "a"),
                ctx.schedule_activity("B", "b"),
                ctx.schedule_activity("C", "c"),
            ];
            let got = ctx.join_quorum(futs, 2).await;
            Ok(got.iter().map(|(i, _)| i.to_string()).collect::<Vec<_>>().join(","))
        });
        assert_eq!(done.output, Some(Ok("2,0".to_string())));
    }

    #[test]
    fn timer_deadline_is_relative_to_turn_start() {
        let out = crate::run_turn_at("i", base(), 1_000, |ctx| async move {
            ctx.schedule_timer(Duration::from_millis(250)).await;
            Ok(String::new())
        });
        assert_eq!(
            out.actions,
            vec![Action::CreateTimer {
                scheduling_event_id: 2,
                fire_at_ms: 1_250
            }]
        );
    }

    #[test]
    fn huge_timer_delay_saturates() {
        let out = crate::run_turn_at("i", base(), 1_000, |ctx| async move {
            ctx.schedule_timer(Duration::from_secs(1 << 61)).await;
            Ok(String::new())
        });
        assert_eq!(
            out.actions,
            vec![Action::CreateTimer {
                scheduling_event_id: 2,
                fire_at_ms: u64::MAX
            }]
        );
    }

    #[test]
    #[should_panic(expected = "select requires at least one future")]
    fn select_over_nothing_panics() {
        let _ = run_turn("i", base(), |ctx| async move {
            let (idx, _, _) = ctx.select(Vec::new()).await;
            Ok(idx.to_string())
        });
    }

    #[test]
    fn join_over_three_cities_keeps_input_order() {
        let mut h = base();
        h.push(scheduled(2, "Visit", "Casablanca"));
        h.push(scheduled(3, "Visit", "Marrakesh"));
        h.push(scheduled(4, "Visit", "Fes"));
        h.push(completed(5, 4, "Fes-done"));
        h.push(completed(6, 2, "Casablanca-done"));
        h.push(completed(7, 3, "Marrakesh-done"));

        let out = run_turn("i", h, |ctx| async move {
            let futs = ["Casablanca", "Marrakesh", "Fes"]
                .iter()
                .map(|c| ctx.schedule_activity("Visit", *c))
                .collect();
            let outs: Vec<String> = ctx.join(futs).await.into_iter().map(DurableOutput::into_value).collect();
            Ok(outs.join(","))
        });
        assert!(out.mismatch.is_none());
        assert!(out.actions.is_empty());
        assert_eq!(out.output, Some(Ok("Casablanca-done,Marrakesh-done,Fes-done".to_string())));
    }

    #[test]
    fn system_values_replay_from_history() {
        let first = crate::run_turn_at("i", base(), 42, |ctx| async move {
            let now = ctx.utc_now_ms().await;
            let guid = ctx.new_guid().await;
            Ok(format!("{now}|{guid}"))
        });
        let Some(Ok(first_out)) = first.output.clone() else {
            panic!("expected completion");
        };
        assert!(first_out.starts_with("42|"));

        let second = crate::run_turn_at("i", first.history, 99, |ctx| async move {
            let now = ctx.utc_now_ms().await;
            let guid = ctx.new_guid().await;
            Ok(format!("{now}|{guid}"))
        });
        assert_eq!(second.output, Some(Ok(first_out)));
        assert!(second.actions.is_empty());
    }
}
