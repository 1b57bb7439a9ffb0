use durafan::providers::Provider;
use durafan::providers::in_memory::InMemoryProvider;
use durafan::runtime::Runtime;
use durafan::sample::{HELLO_ORCHESTRATOR, MOROCCO_STATUS, SampleOptions, sample_app};
use durafan::{Client, OrchestrationStatus};
use std::sync::Arc;
use std::time::Duration;

mod common;

fn fast_sample() -> SampleOptions {
    SampleOptions {
        wait_unit: Duration::from_millis(2),
    }
}

async fn run_sample(store: Arc<dyn Provider>) {
    let app = sample_app(fast_sample()).unwrap();
    let rt =
        Runtime::start_with_options(store.clone(), app.activities(), app.orchestrations(), common::fast_options()).await;
    let client = Client::new(store.clone());

    client.start_orchestration("inst-sample-1", HELLO_ORCHESTRATOR, "").await.unwrap();
    let status = client
        .wait_for_orchestration("inst-sample-1", Duration::from_secs(10))
        .await
        .unwrap();

    let OrchestrationStatus::Completed { output, custom_status } = status else {
        panic!("unexpected status: {status:?}");
    };
    assert_eq!(custom_status.as_deref(), Some(MOROCCO_STATUS));

    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(value[0], "Hello Seattle");
    let morocco = value[1].as_array().unwrap();
    assert_eq!(morocco.len(), 3);
    for r in morocco {
        let s = r.as_str().unwrap();
        assert!(s.starts_with("Waited for ") && s.ends_with(" seconds after printing message."), "{s}");
    }
    assert_eq!(value[2], "Hello Tokyo");
    assert_eq!(value[3], "Hello London");

    let hist = client.read_history("inst-sample-1").await.unwrap();
    common::assert_ids_contiguous(&hist);
    assert_eq!(common::count_kind(&hist, "ActivityScheduled"), 6);
    assert_eq!(common::count_kind(&hist, "ActivityCompleted"), 6);
    assert_eq!(common::count_kind(&hist, "OrchestrationCompleted"), 1);

    rt.shutdown(None).await;
}

#[tokio::test]
async fn sample_hello_cities_in_memory() {
    run_sample(Arc::new(InMemoryProvider::new())).await;
}

#[tokio::test]
async fn sample_hello_cities_sqlite() {
    let (store, _td) = common::create_sqlite_store_disk().await;
    run_sample(store).await;
}

#[tokio::test]
async fn sample_instances_are_listed() {
    let store: Arc<dyn Provider> = Arc::new(InMemoryProvider::new());
    let app = sample_app(fast_sample()).unwrap();
    let rt =
        Runtime::start_with_options(store.clone(), app.activities(), app.orchestrations(), common::fast_options()).await;
    let client = Client::new(store);

    for id in ["a", "b"] {
        client.start_orchestration(id, HELLO_ORCHESTRATOR, "").await.unwrap();
    }
    for id in ["a", "b"] {
        let status = client.wait_for_orchestration(id, Duration::from_secs(10)).await.unwrap();
        assert_eq!(status.label(), "Completed");
    }
    assert_eq!(client.list_instances().await.unwrap(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(rt.stats().orch_completions, 2);

    rt.shutdown(Some(Duration::from_secs(1))).await;
}
