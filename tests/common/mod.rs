#![allow(dead_code)]

use durafan::providers::Provider;
use durafan::providers::sqlite::SqliteProvider;
use durafan::runtime::RuntimeOptions;
use durafan::{Event, EventKind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub fn fast_options() -> RuntimeOptions {
    RuntimeOptions {
        dispatcher_idle_sleep_ms: 1,
        ..RuntimeOptions::default()
    }
}

pub async fn wait_for_history<F>(store: Arc<dyn Provider>, instance: &str, predicate: F, timeout_ms: u64) -> bool
where
    F: Fn(&[Event]) -> bool,
{
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        let hist = store.read(instance).await.unwrap_or_default();
        if predicate(&hist) {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn create_sqlite_store_disk() -> (Arc<dyn Provider>, TempDir) {
    let td = tempfile::tempdir().unwrap();
    let db_path = td.path().join("test.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
    let store = Arc::new(SqliteProvider::new(&db_url, None).await.unwrap()) as Arc<dyn Provider>;
    (store, td)
}

pub fn count_kind(hist: &[Event], kind_name: &str) -> usize {
    hist.iter().filter(|e| e.kind_name() == kind_name).count()
}

pub fn started(instance: &str, name: &str, version: &str, input: &str) -> Event {
    Event::with_event_id(
        1,
        instance,
        None,
        EventKind::OrchestrationStarted {
            name: name.to_string(),
            version: version.to_string(),
            input: input.to_string(),
        },
    )
}

pub fn activity_scheduled(instance: &str, event_id: u64, name: &str, input: &str) -> Event {
    Event::with_event_id(
        event_id,
        instance,
        None,
        EventKind::ActivityScheduled {
            name: name.to_string(),
            input: input.to_string(),
        },
    )
}

pub fn assert_ids_contiguous(hist: &[Event]) {
    for (i, e) in hist.iter().enumerate() {
        assert_eq!(e.event_id, i as u64 + 1, "event ids must be contiguous: {hist:?}");
    }
}
