use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use durafan::app::FunctionApp;
use durafan::http::{CheckStatusResponse, ErrorBody, HttpState, InstanceStatusResponse, router};
use durafan::providers::Provider;
use durafan::providers::in_memory::InMemoryProvider;
use durafan::runtime::Runtime;
use durafan::sample::{HELLO, HELLO_ORCHESTRATOR, SampleOptions, sample_app};
use durafan::{ActivityContext, Client, OrchestrationContext};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

mod common;

async fn body_json<T: DeserializeOwned>(resp: axum::response::Response) -> T {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::HOST, "localhost:7071")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn start_app(app: FunctionApp) -> (Arc<Runtime>, HttpState) {
    let store: Arc<dyn Provider> = Arc::new(InMemoryProvider::new());
    let rt =
        Runtime::start_with_options(store.clone(), app.activities(), app.orchestrations(), common::fast_options()).await;
    let state = HttpState {
        client: Client::new(store),
        app: Arc::new(app),
    };
    (rt, state)
}

async fn poll_until_terminal(state: &HttpState, uri: &str) -> InstanceStatusResponse {
    for _ in 0..500 {
        let resp = router(state.clone()).oneshot(get(uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let status: InstanceStatusResponse = body_json(resp).await;
        if status.runtime_status != "Running" {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("instance at {uri} never finished");
}

#[tokio::test]
async fn health_reports_ok() {
    let (rt, state) = start_app(sample_app(SampleOptions::default()).unwrap()).await;
    let resp = router(state).oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["status"], "ok");
    rt.shutdown(None).await;
}

#[tokio::test]
async fn starter_returns_check_status_payload() {
    let app = sample_app(SampleOptions {
        wait_unit: Duration::from_millis(1),
    })
    .unwrap();
    let (rt, state) = start_app(app).await;

    let resp = router(state.clone())
        .oneshot(post(&format!("/orchestrators/{HELLO_ORCHESTRATOR}"), ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let location = resp.headers()[header::LOCATION].to_str().unwrap().to_string();
    let payload: CheckStatusResponse = body_json(resp).await;

    assert_eq!(location, format!("http://localhost:7071/instances/{}", payload.id));
    assert_eq!(payload.status_query_get_uri, location);
    assert!(payload.terminate_post_uri.starts_with(&format!("{location}/terminate")));

    let status = poll_until_terminal(&state, &format!("/instances/{}", payload.id)).await;
    assert_eq!(status.runtime_status, "Completed");
    assert_eq!(status.instance_id, payload.id);
    let output = status.output.unwrap();
    assert_eq!(output[0], "Hello Seattle");
    assert_eq!(output[3], "Hello London");
    rt.shutdown(None).await;
}

#[tokio::test]
async fn starter_rejects_unknown_and_non_orchestration_names() {
    let (rt, state) = start_app(sample_app(SampleOptions::default()).unwrap()).await;

    for name in ["missing", HELLO] {
        let resp = router(state.clone())
            .oneshot(post(&format!("/orchestrators/{name}"), ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{name}");
        let body: ErrorBody = body_json(resp).await;
        assert_eq!(body.code, "NotFound");
    }
    assert!(state.client.list_instances().await.unwrap().is_empty());
    rt.shutdown(None).await;
}

#[tokio::test]
async fn unknown_instance_is_not_found() {
    let (rt, state) = start_app(sample_app(SampleOptions::default()).unwrap()).await;

    let resp = router(state.clone()).oneshot(get("/instances/nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = router(state).oneshot(post("/instances/nope/terminate", "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    rt.shutdown(None).await;
}

#[tokio::test]
async fn terminate_endpoint_stops_instance() {
    let app = FunctionApp::builder()
        .http_trigger("Start", "orchestrators/{functionName}")
        .orchestration("Sleeper", |ctx: OrchestrationContext, _input: String| async move {
            ctx.schedule_timer(Duration::from_secs(60)).await;
            Ok("woke".to_string())
        })
        .activity("Noop", |_ctx: ActivityContext, input: String| async move { Ok(input) })
        .build()
        .unwrap();
    let (rt, state) = start_app(app).await;

    let resp = router(state.clone()).oneshot(post("/orchestrators/Sleeper", "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let payload: CheckStatusResponse = body_json(resp).await;

    let resp = router(state.clone())
        .oneshot(post(&format!("/instances/{}/terminate?reason=enough", payload.id), ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let status = poll_until_terminal(&state, &format!("/instances/{}", payload.id)).await;
    assert_eq!(status.runtime_status, "Terminated");
    assert_eq!(status.error.as_deref(), Some("enough"));
    rt.shutdown(None).await;
}
