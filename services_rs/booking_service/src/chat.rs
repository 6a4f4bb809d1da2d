use crate::assistant;
use crate::models::{ChatIn, ChatOut};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatIn>, JsonRejection>,
) -> (StatusCode, Json<ChatOut>) {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "chat body rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(ChatOut::error("Send a JSON body like {\"message\": \"...\"}.")),
            );
        }
    };
    let message = body.message.trim();
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ChatOut::error("Message cannot be empty.")),
        );
    }
    let Some(cfg) = state.assistant.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ChatOut::error("The assistant is not available right now.")),
        );
    };
    match assistant::complete(&state.http, cfg, message).await {
        Ok(reply) => (StatusCode::OK, Json(ChatOut::reply(reply))),
        Err(e) => (e.status, Json(ChatOut::error(e.detail))),
    }
}
