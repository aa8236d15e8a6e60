use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ChatError;
use crate::state::AppState;

pub async fn health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "initialized": true
    }))
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ChatError> {
    let provider_reachable = state.provider.health_check().await.unwrap_or(false);
    let indexed_chunks = state.store.count(None).await.unwrap_or(0);

    Ok(Json(json!({
        "initialized": true,
        "provider": state.provider.name(),
        "provider_reachable": provider_reachable,
        "indexed_chunks": indexed_chunks
    })))
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let models: Vec<_> = state
        .catalog
        .options()
        .iter()
        .map(|option| json!({"label": option.label, "model": option.model}))
        .collect();

    Json(json!({
        "models": models,
        "default": state.catalog.default_option().label
    }))
}
