//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use pellematic_client::ClientError;
use pellematic_core::count_instances;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::state::{AppState, CommandError};

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn not_found(what: &str) -> axum::response::Response {
    (StatusCode::NOT_FOUND, Json(ApiError::new(format!("{} not found", what)))).into_response()
}

/// List all known entities with their current state
pub async fn list_entities(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.entities().await)
}

/// Get a specific entity by identity
pub async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.entity(&id).await {
        Some(entity) => Json(entity).into_response(),
        None => not_found("Entity"),
    }
}

/// Command request body
#[derive(Deserialize)]
pub struct SetRequest {
    /// Display value for numbers, option label or key for selects
    value: serde_json::Value,
}

/// Send a value to a writable entity
pub async fn set_entity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SetRequest>,
) -> impl IntoResponse {
    info!(entity = %id, value = %req.value, "Command requested");

    match state.set_entity(&id, &req.value).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(CommandError::UnknownEntity) => not_found("Entity"),
        Err(CommandError::Client(e @ (ClientError::Value(_) | ClientError::InvalidUrl(_)))) => (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(e.to_string())),
        )
            .into_response(),
        Err(CommandError::Client(e)) => (
            StatusCode::BAD_GATEWAY,
            Json(ApiError::new(format!("Command failed: {}", e))),
        )
            .into_response(),
    }
}

/// List climate groupings with their current state
pub async fn list_climates(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.climates().await)
}

/// Get the raw snapshot last fetched from the device
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.poller.store().current().await {
        Some(snapshot) => Json(snapshot.as_ref().clone()).into_response(),
        None => not_found("Snapshot"),
    }
}

/// Component instance counts, live and as configured
pub async fn get_components(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let discovered = state
        .poller
        .store()
        .current()
        .await
        .map(|snapshot| count_instances(&snapshot.data));

    Json(serde_json::json!({
        "discovered": discovered,
        "configured": state.config.components,
    }))
}

/// Trigger a poll
pub async fn trigger_poll(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("Manual poll triggered");

    match state.poller.poll_once().await {
        Ok(snapshot) => Json(serde_json::json!({
            "status": "completed",
            "fetched_at": snapshot.fetched_at,
            "entities": state.poller.entities().await.len(),
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(format!("Poll failed: {}", e))),
        )
            .into_response(),
    }
}

/// Get current configuration, with the device password masked
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.redacted())
}
