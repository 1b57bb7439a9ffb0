//! HTTP front end: start orchestrations, query and terminate instances.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::app::FunctionApp;
use crate::runtime::OrchestrationStatus;
use crate::{Client, ClientError};

#[derive(Clone)]
pub struct HttpState {
    pub client: Client,
    pub app: Arc<FunctionApp>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Response of the starter endpoint.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckStatusResponse {
    pub id: String,
    pub status_query_get_uri: String,
    pub terminate_post_uri: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatusResponse {
    pub instance_id: String,
    pub runtime_status: String,
    pub output: Option<serde_json::Value>,
    pub custom_status: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TerminateParams {
    pub reason: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            code: code.to_string(),
            message: message.into(),
        }),
    )
}

fn map_client_error(err: ClientError) -> ApiError {
    match &err {
        ClientError::NotFound(_) => error(StatusCode::NOT_FOUND, "NotFound", err.to_string()),
        ClientError::InvalidInput(_) => error(StatusCode::BAD_REQUEST, "InvalidInput", err.to_string()),
        ClientError::Timeout => error(StatusCode::GATEWAY_TIMEOUT, "Timeout", err.to_string()),
        ClientError::Provider(e) if e.is_retryable() => {
            error(StatusCode::SERVICE_UNAVAILABLE, "Unavailable", err.to_string())
        }
        ClientError::Provider(_) => error(StatusCode::INTERNAL_SERVER_ERROR, "Internal", err.to_string()),
    }
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/orchestrators/{function_name}", post(start_orchestration))
        .route("/instances/{id}", get(instance_status))
        .route("/instances/{id}/terminate", post(terminate_instance))
        .with_state(state)
}

pub async fn run_server(state: HttpState, listen: SocketAddr) -> anyhow::Result<()> {
    use anyhow::Context;

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .context("bind server listener failed")?;
    tracing::info!(target: "durafan::http", %listen, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server terminated with error")
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status":"ok"}))
}

fn base_url(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|host| format!("http://{host}"))
        .unwrap_or_default()
}

async fn start_orchestration(
    State(state): State<HttpState>,
    Path(function_name): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    if !state.app.is_orchestration(&function_name) {
        return Err(error(
            StatusCode::NOT_FOUND,
            "NotFound",
            format!("no orchestration named {function_name}"),
        ));
    }

    let id = uuid::Uuid::new_v4().simple().to_string();
    state
        .client
        .start_orchestration(&id, &function_name, body)
        .await
        .map_err(map_client_error)?;
    tracing::info!(
        target: "durafan::http",
        instance_id = %id,
        orchestration_name = %function_name,
        "Started orchestration"
    );

    let base = base_url(&headers);
    let status_uri = format!("{base}/instances/{id}");
    let resp = CheckStatusResponse {
        terminate_post_uri: format!("{status_uri}/terminate?reason={{text}}"),
        status_query_get_uri: status_uri.clone(),
        id,
    };
    Ok((StatusCode::ACCEPTED, [(header::LOCATION, status_uri)], Json(resp)))
}

fn parse_output(output: String) -> serde_json::Value {
    serde_json::from_str(&output).unwrap_or(serde_json::Value::String(output))
}

async fn instance_status(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Json<InstanceStatusResponse>, ApiError> {
    let status = state
        .client
        .get_orchestration_status(&id)
        .await
        .map_err(map_client_error)?;

    let runtime_status = status.label().to_string();
    let custom_status = status.custom_status().map(str::to_string);
    let (output, err) = match status {
        OrchestrationStatus::NotFound => return Err(map_client_error(ClientError::NotFound(id))),
        OrchestrationStatus::Running { .. } => (None, None),
        OrchestrationStatus::Completed { output, .. } => (Some(parse_output(output)), None),
        OrchestrationStatus::Failed { details, .. } => (None, Some(details.display_message())),
        OrchestrationStatus::Terminated { reason, .. } => (None, Some(reason)),
    };

    Ok(Json(InstanceStatusResponse {
        instance_id: id,
        runtime_status,
        output,
        custom_status,
        error: err,
    }))
}

async fn terminate_instance(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Query(params): Query<TerminateParams>,
) -> Result<StatusCode, ApiError> {
    let reason = params.reason.unwrap_or_else(|| "terminated via http".to_string());
    state
        .client
        .terminate_instance(&id, reason)
        .await
        .map_err(map_client_error)?;
    Ok(StatusCode::ACCEPTED)
}
