//! Stateless travel-assistant proxy over the generative-language `generateContent` API.

use crate::error::{ApiError, ApiResult};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const MAX_MESSAGE_CHARS: usize = 2000;

pub const SYSTEM_PROMPT: &str = "You are the Busline travel assistant. Help passengers \
find routes, understand seat availability, fares, booking, payment and cancellation. \
Only pending bookings can be cancelled. Keep answers short and friendly, and never \
invent schedules or prices you were not given.";

#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

fn reply_text(resp: GenerateResponse) -> Option<String> {
    let content = resp.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().map(|p| p.text).collect();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

pub async fn complete(http: &Client, cfg: &AssistantConfig, message: &str) -> ApiResult<String> {
    let message: String = message.trim().chars().take(MAX_MESSAGE_CHARS).collect();
    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        cfg.base_url, cfg.model
    );
    let body = json!({
        "system_instruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
        "contents": [{ "role": "user", "parts": [{ "text": message }] }],
    });

    let resp = http
        .post(url)
        .header("x-goog-api-key", &cfg.api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "assistant request failed");
            ApiError::upstream("assistant unavailable")
        })?;
    let status = resp.status();
    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), model = %cfg.model, "assistant upstream error");
        return Err(ApiError::upstream("assistant unavailable"));
    }
    let parsed: GenerateResponse = resp.json().await.map_err(|e| {
        tracing::error!(error = %e, "assistant returned invalid json");
        ApiError::upstream("assistant unavailable")
    })?;
    reply_text(parsed).ok_or_else(|| ApiError::upstream("assistant returned no reply"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_stub_server;

    fn cfg(base_url: &str) -> AssistantConfig {
        AssistantConfig {
            api_key: "ai-key-for-tests".to_string(),
            model: "gemini-1.5-flash".to_string(),
            base_url: base_url.to_string(),
        }
    }

    #[tokio::test]
    async fn forwards_message_with_system_prompt_and_joins_parts() {
        let (base, mut rx) = spawn_stub_server(vec![(
            "200 OK",
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Seats are "},{"text":"still available."}]}}]}"#
                .to_string(),
        )])
        .await;

        let reply = complete(&Client::new(), &cfg(&base), "  Any seats tomorrow?  ")
            .await
            .expect("reply");
        assert_eq!(reply, "Seats are still available.");

        let req = rx.recv().await.expect("request");
        assert_eq!(req.path, "/v1beta/models/gemini-1.5-flash:generateContent");
        assert_eq!(req.header("x-goog-api-key"), Some("ai-key-for-tests"));
        let body = req.json();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Any seats tomorrow?");
        assert_eq!(
            body["system_instruction"]["parts"][0]["text"],
            SYSTEM_PROMPT
        );
    }

    #[tokio::test]
    async fn upstream_error_maps_to_bad_gateway() {
        let (base, _rx) = spawn_stub_server(vec![(
            "500 Internal Server Error",
            r#"{"error":{"code":500}}"#.to_string(),
        )])
        .await;
        let err = complete(&Client::new(), &cfg(&base), "hello")
            .await
            .expect_err("upstream failure");
        assert_eq!(err.status, axum::http::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn empty_candidates_is_an_error() {
        let (base, _rx) = spawn_stub_server(vec![("200 OK", r#"{"candidates":[]}"#.to_string())]).await;
        let err = complete(&Client::new(), &cfg(&base), "hello")
            .await
            .expect_err("no reply");
        assert_eq!(err.status, axum::http::StatusCode::BAD_GATEWAY);
    }
}
