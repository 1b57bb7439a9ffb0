use durafan::providers::Provider;
use durafan::providers::in_memory::InMemoryProvider;
use durafan::runtime::Runtime;
use durafan::{ActivityContext, ActivityRegistry, Client, EventKind, OrchestrationContext, OrchestrationRegistry};
use durafan::sample::{self, MOROCCO_CITIES};
use durafan::{Event, OrchestrationStatus, run_turn};
use std::sync::Arc;
use std::time::Duration;

mod common;

fn city_delay(city: &str) -> Duration {
    match city {
        "Casablanca" => Duration::from_millis(80),
        "Marrakesh" => Duration::from_millis(160),
        _ => Duration::from_millis(1),
    }
}

fn activities() -> Arc<ActivityRegistry> {
    Arc::new(
        ActivityRegistry::builder()
            .register("Visit", |_ctx: ActivityContext, city: String| async move {
                tokio::time::sleep(city_delay(&city)).await;
                Ok(format!("{city}-result"))
            })
            .register("Fail", |_ctx: ActivityContext, input: String| async move {
                Err(format!("no {input}"))
            })
            .build(),
    )
}

async fn start(orchestrations: OrchestrationRegistry) -> (Arc<Runtime>, Client, Arc<dyn Provider>) {
    let store: Arc<dyn Provider> = Arc::new(InMemoryProvider::new());
    let rt = Runtime::start_with_options(store.clone(), activities(), orchestrations, common::fast_options()).await;
    (rt, Client::new(store.clone()), store)
}

#[tokio::test]
async fn join_returns_results_in_input_order() {
    let orchestrations = OrchestrationRegistry::builder()
        .register("FanOut", |ctx: OrchestrationContext, _input: String| async move {
            let calls = MOROCCO_CITIES.iter().map(|c| ctx.schedule_activity("Visit", *c)).collect();
            let results = ctx
                .join(calls)
                .await
                .into_iter()
                .map(|o| o.into_activity())
                .collect::<Result<Vec<_>, _>>()?;
            Ok(results.join(","))
        })
        .build();
    let (rt, client, _store) = start(orchestrations).await;

    client.start_orchestration("fan-1", "FanOut", "").await.unwrap();
    let status = client.wait_for_orchestration("fan-1", Duration::from_secs(5)).await.unwrap();
    assert_eq!(
        status,
        OrchestrationStatus::Completed {
            output: "Casablanca-result,Marrakesh-result,Fes-result".to_string(),
            custom_status: None
        }
    );

    let hist = client.read_history("fan-1").await.unwrap();
    let mut completion_sources: Vec<u64> = hist
        .iter()
        .filter(|e| matches!(e.kind, EventKind::ActivityCompleted { .. }))
        .filter_map(|e| e.source_event_id)
        .collect();
    completion_sources.sort_unstable();
    assert_eq!(completion_sources, vec![2, 3, 4]);
    common::assert_ids_contiguous(&hist);

    rt.shutdown(None).await;
}

#[tokio::test]
async fn join_surfaces_individual_failures() {
    let orchestrations = OrchestrationRegistry::builder()
        .register("Mixed", |ctx: OrchestrationContext, _input: String| async move {
            let outs = ctx
                .join(vec![ctx.schedule_activity("Visit", "Fes"), ctx.schedule_activity("Fail", "Rabat")])
                .await;
            let first = outs[0].clone().into_activity()?;
            match outs[1].clone().into_activity() {
                Ok(_) => Err("expected failure".to_string()),
                Err(e) => Ok(format!("{first}|{e}")),
            }
        })
        .build();
    let (rt, client, _store) = start(orchestrations).await;

    client.start_orchestration("fan-2", "Mixed", "").await.unwrap();
    let status = client.wait_for_orchestration("fan-2", Duration::from_secs(5)).await.unwrap();
    assert_eq!(
        status,
        OrchestrationStatus::Completed {
            output: "Fes-result|no Rabat".to_string(),
            custom_status: None
        }
    );
    rt.shutdown(None).await;
}

#[tokio::test]
async fn select_resumes_on_first_completion() {
    let orchestrations = OrchestrationRegistry::builder()
        .register("Race", |ctx: OrchestrationContext, _input: String| async move {
            let (idx, out, remaining) = ctx
                .select(vec![
                    ctx.schedule_activity("Visit", "Marrakesh"),
                    ctx.schedule_activity("Visit", "Fes"),
                ])
                .await;
            assert_eq!(remaining.len(), 1);
            // The loser is dropped; its result is recorded and ignored.
            Ok(format!("{idx}:{}", out.into_activity()?))
        })
        .build();
    let (rt, client, store) = start(orchestrations).await;

    client.start_orchestration("race-1", "Race", "").await.unwrap();
    let status = client.wait_for_orchestration("race-1", Duration::from_secs(5)).await.unwrap();
    assert_eq!(status.label(), "Completed");
    assert_eq!(
        status,
        OrchestrationStatus::Completed {
            output: "1:Fes-result".to_string(),
            custom_status: None
        }
    );

    // The dropped call still runs; its completion is acked without changing the instance.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let hist = store.read("race-1").await.unwrap();
    assert!(hist.last().is_some_and(|e| e.is_terminal()));
    rt.shutdown(None).await;
}

#[tokio::test]
async fn timer_wins_against_slow_activity() {
    let orchestrations = OrchestrationRegistry::builder()
        .register("Deadline", |ctx: OrchestrationContext, _input: String| async move {
            let (idx, _out, _rest) = ctx
                .select(vec![
                    ctx.schedule_activity("Visit", "Marrakesh"),
                    ctx.schedule_timer(Duration::from_millis(20)),
                ])
                .await;
            Ok(if idx == 1 { "timeout" } else { "done" }.to_string())
        })
        .build();
    let (rt, client, _store) = start(orchestrations).await;

    client.start_orchestration("deadline-1", "Deadline", "").await.unwrap();
    let status = client
        .wait_for_orchestration("deadline-1", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(
        status,
        OrchestrationStatus::Completed {
            output: "timeout".to_string(),
            custom_status: None
        }
    );
    let hist = client.read_history("deadline-1").await.unwrap();
    assert_eq!(common::count_kind(&hist, "TimerCreated"), 1);
    assert_eq!(common::count_kind(&hist, "TimerFired"), 1);
    rt.shutdown(None).await;
}

#[tokio::test]
async fn quorum_waits_for_required_count() {
    let orchestrations = OrchestrationRegistry::builder()
        .register("Quorum", |ctx: OrchestrationContext, _input: String| async move {
            let calls = MOROCCO_CITIES.iter().map(|c| ctx.schedule_activity("Visit", *c)).collect();
            let done = ctx.join_quorum(calls, 2).await;
            let idx: Vec<String> = done.iter().map(|(i, _)| i.to_string()).collect();
            Ok(idx.join(","))
        })
        .build();
    let (rt, client, _store) = start(orchestrations).await;

    client.start_orchestration("quorum-1", "Quorum", "").await.unwrap();
    let status = client.wait_for_orchestration("quorum-1", Duration::from_secs(5)).await.unwrap();
    assert_eq!(
        status,
        OrchestrationStatus::Completed {
            output: "2,0".to_string(),
            custom_status: None
        }
    );
    rt.shutdown(None).await;
}

fn completed(instance: &str, event_id: u64, source: u64, result: &str) -> Event {
    Event::with_event_id(
        event_id,
        instance,
        Some(source),
        EventKind::ActivityCompleted {
            result: result.to_string(),
        },
    )
}

#[test]
fn sample_orders_morocco_results_by_input_not_completion() {
    let wait = sample::PRINT_MESSAGE_AND_WAIT_RANDOM;
    let hist = vec![
        common::started("cities", sample::HELLO_ORCHESTRATOR, "1.0.0", ""),
        common::activity_scheduled("cities", 2, sample::HELLO, "Seattle"),
        completed("cities", 3, 2, "Hello Seattle"),
        common::activity_scheduled("cities", 4, wait, "Casablanca"),
        common::activity_scheduled("cities", 5, wait, "Marrakesh"),
        common::activity_scheduled("cities", 6, wait, "Fes"),
        // Fes, then Casablanca, then Marrakesh.
        completed("cities", 7, 6, "fes"),
        completed("cities", 8, 4, "casablanca"),
        completed("cities", 9, 5, "marrakesh"),
        common::activity_scheduled("cities", 10, sample::HELLO, "Tokyo"),
        completed("cities", 11, 10, "Hello Tokyo"),
        common::activity_scheduled("cities", 12, sample::HELLO, "London"),
        completed("cities", 13, 12, "Hello London"),
    ];

    let out = run_turn("cities", hist, |ctx| sample::hello_orchestrator(ctx, String::new()));

    assert!(out.mismatch.is_none());
    assert!(out.actions.is_empty());
    let Some(Ok(output)) = out.output else {
        panic!("expected completion, got {:?}", out.output);
    };
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(
        value,
        serde_json::json!([
            "Hello Seattle",
            ["casablanca", "marrakesh", "fes"],
            "Hello Tokyo",
            "Hello London"
        ])
    );
    assert_eq!(out.custom_status.as_deref(), Some(sample::MOROCCO_STATUS));
}
