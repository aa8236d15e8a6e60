use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Error kinds surfaced by the chat backend.
///
/// Each variant maps to one failing user action: the action is aborted,
/// the message is rendered, and session state is left as it was.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("document error: {0}")]
    Load(String),
    #[error("index error: {0}")]
    Index(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("bad request: {0}")]
    Config(String),
    #[error("a previous answer is still streaming")]
    Busy,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ChatError::Internal(err.to_string())
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ChatError::Load(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ChatError::Index(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ChatError::Model(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ChatError::Config(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ChatError::Busy => (StatusCode::CONFLICT, self.to_string()),
            ChatError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
