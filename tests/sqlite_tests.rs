use durafan::providers::sqlite::SqliteProvider;
use durafan::providers::{ExecutionMetadata, Provider, WorkItem};
use durafan::runtime::Runtime;
use durafan::{
    ActivityContext, ActivityRegistry, Client, EventKind, OrchestrationContext, OrchestrationRegistry,
    OrchestrationStatus,
};
use std::sync::Arc;
use std::time::Duration;

mod common;

fn registries() -> (Arc<ActivityRegistry>, OrchestrationRegistry) {
    let activities = ActivityRegistry::builder()
        .register("Greet", |_ctx: ActivityContext, name: String| async move { Ok(format!("Hello {name}")) })
        .build();
    let orchestrations = OrchestrationRegistry::builder()
        .register("Greeter", |ctx: OrchestrationContext, name: String| async move {
            let greeting = ctx.call_activity("Greet", name).await?;
            ctx.schedule_timer(Duration::from_millis(5)).await;
            Ok(greeting)
        })
        .build();
    (Arc::new(activities), orchestrations)
}

async fn open(url: &str) -> Arc<dyn Provider> {
    Arc::new(SqliteProvider::new(url, None).await.unwrap())
}

#[tokio::test]
async fn history_survives_reopen() {
    let td = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}?mode=rwc", td.path().join("durafan.db").display());

    {
        let store = open(&url).await;
        let (activities, orchestrations) = registries();
        let rt = Runtime::start_with_options(store.clone(), activities, orchestrations, common::fast_options()).await;
        let client = Client::new(store);
        client.start_orchestration("persist-1", "Greeter", "Rabat").await.unwrap();
        let status = client.wait_for_orchestration("persist-1", Duration::from_secs(5)).await.unwrap();
        assert_eq!(status.label(), "Completed");
        rt.shutdown(None).await;
    }

    let store = open(&url).await;
    let client = Client::new(store.clone());
    assert_eq!(
        client.get_orchestration_status("persist-1").await.unwrap(),
        OrchestrationStatus::Completed {
            output: "Hello Rabat".to_string(),
            custom_status: None
        }
    );
    let hist = client.read_history("persist-1").await.unwrap();
    common::assert_ids_contiguous(&hist);
    let kinds: Vec<&str> = hist.iter().map(|e| e.kind_name()).collect();
    assert_eq!(
        kinds,
        vec![
            "OrchestrationStarted",
            "ActivityScheduled",
            "ActivityCompleted",
            "TimerCreated",
            "TimerFired",
            "OrchestrationCompleted"
        ]
    );
    let info = store.get_instance_info("persist-1").await.unwrap().unwrap();
    assert_eq!(info.orchestration_name, "Greeter");
    assert!(info.is_terminal());
}

#[tokio::test]
async fn queued_start_is_processed_after_restart() {
    let td = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}?mode=rwc", td.path().join("queued.db").display());

    {
        // No runtime: the start message only lands in the queue.
        let client = Client::new(open(&url).await);
        client.start_orchestration("queued-1", "Greeter", "Fes").await.unwrap();
    }

    let store = open(&url).await;
    let (activities, orchestrations) = registries();
    let rt = Runtime::start_with_options(store.clone(), activities, orchestrations, common::fast_options()).await;
    let client = Client::new(store);
    let status = client.wait_for_orchestration("queued-1", Duration::from_secs(5)).await.unwrap();
    assert_eq!(
        status,
        OrchestrationStatus::Completed {
            output: "Hello Fes".to_string(),
            custom_status: None
        }
    );
    rt.shutdown(None).await;
}

#[tokio::test]
async fn abandoned_item_is_redelivered() {
    let (store, _td) = common::create_sqlite_store_disk().await;
    store.create_instance("lock-1", "Greeter", None).await.unwrap();
    store
        .enqueue_for_orchestrator(
            WorkItem::StartOrchestration {
                instance: "lock-1".to_string(),
                orchestration: "Greeter".to_string(),
                version: None,
                input: "x".to_string(),
            },
            None,
        )
        .await
        .unwrap();

    let item = store.fetch_orchestration_item(Duration::from_secs(30)).await.unwrap().unwrap();
    assert_eq!(item.instance, "lock-1");
    // Locked: nobody else sees it.
    assert!(store.fetch_orchestration_item(Duration::from_secs(30)).await.unwrap().is_none());

    store.abandon_orchestration_item(&item.lock_token, None).await.unwrap();
    let again = store.fetch_orchestration_item(Duration::from_secs(30)).await.unwrap().unwrap();
    assert_eq!(again.messages, item.messages);

    let started = common::started("lock-1", "Greeter", "1.0.0", "x");
    store
        .ack_orchestration_item(
            &again.lock_token,
            vec![started.clone()],
            Vec::new(),
            Vec::new(),
            ExecutionMetadata::default(),
        )
        .await
        .unwrap();
    assert!(store.fetch_orchestration_item(Duration::from_secs(30)).await.unwrap().is_none());
    let hist = store.read("lock-1").await.unwrap();
    assert_eq!(hist.len(), 1);
    assert!(matches!(hist[0].kind, EventKind::OrchestrationStarted { .. }));
}
