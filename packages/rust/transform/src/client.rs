//! OpenAI-compatible chat completions client.
//!
//! The instruction set travels as the system message and the chunk text as
//! the user message, so the service rewrites content instead of chatting
//! about it.

use std::time::Duration;

use async_trait::async_trait;
use lectern_shared::{LecternError, OpenAiConfig, Result};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::{TransformError, Transformer};

/// Per-request timeout. A full-chunk rewrite is a long generation.
const REQUEST_TIMEOUT_SECS: u64 = 600;

/// Sampling temperature. Rewrites should stay close to the source.
const TEMPERATURE: f64 = 0.2;

/// [`Transformer`] backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiTransformer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiTransformer {
    /// Build a client for the given endpoint, key, and model.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LecternError::Network(e.to_string()))?;

        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Build a client from config, resolving the API key from the environment.
    pub fn from_config(config: &OpenAiConfig, model_override: Option<&str>) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            LecternError::config(format!(
                "API key not found. Set the {} environment variable.",
                config.api_key_env
            ))
        })?;
        let model = model_override.unwrap_or(&config.default_model);
        Self::new(&config.base_url, api_key, model)
    }

    /// Model identifier this client sends, used for cache keying.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Map an HTTP error status to a transform error.
    fn classify_status(status: StatusCode, body: &str) -> TransformError {
        let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));
        // Timeouts, conflicts, rate limits, and server errors are worth retrying.
        match status.as_u16() {
            408 | 409 | 429 => TransformError::Transient(message),
            s if s >= 500 => TransformError::Transient(message),
            _ => TransformError::Fatal(message),
        }
    }
}

#[async_trait]
impl Transformer for OpenAiTransformer {
    async fn transform(
        &self,
        text: &str,
        instructions: &str,
    ) -> std::result::Result<String, TransformError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = serde_json::json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "messages": [
                { "role": "system", "content": instructions },
                { "role": "user", "content": text },
            ],
        });

        debug!(model = %self.model, chars = text.chars().count(), "sending transformation request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransformError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TransformError::Fatal(format!("invalid response body: {e}")))?;

        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| TransformError::Fatal("model returned an empty response".into()))?;

        debug!(chars = content.chars().count(), "transformation response received");
        Ok(content.to_string())
    }
}

/// Truncate a body for error messages without splitting a character.
fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_response(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": content } }
            ]
        })
    }

    #[tokio::test]
    async fn sends_instructions_as_system_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_json(serde_json::json!({
                "model": "gpt-4.1-mini",
                "temperature": 0.2,
                "messages": [
                    { "role": "system", "content": "rewrite as lecture notes" },
                    { "role": "user", "content": "raw transcript text" },
                ],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("# Done")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiTransformer::new(server.uri(), "test-key", "gpt-4.1-mini").unwrap();
        let out = client
            .transform("raw transcript text", "rewrite as lecture notes")
            .await
            .expect("transform");
        assert_eq!(out, "# Done");
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("ok")))
            .mount(&server)
            .await;

        let base = format!("{}/", server.uri());
        let client = OpenAiTransformer::new(base, "k", "m").unwrap();
        assert_eq!(client.transform("t", "i").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let client = OpenAiTransformer::new(server.uri(), "k", "m").unwrap();
        let err = client.transform("t", "i").await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn rate_limits_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = OpenAiTransformer::new(server.uri(), "k", "m").unwrap();
        assert!(client.transform("t", "i").await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn client_errors_are_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error": "bad request"}"#),
            )
            .mount(&server)
            .await;

        let client = OpenAiTransformer::new(server.uri(), "k", "m").unwrap();
        let err = client.transform("t", "i").await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("HTTP 400"));
    }

    #[tokio::test]
    async fn empty_model_output_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("   ")))
            .mount(&server)
            .await;

        let client = OpenAiTransformer::new(server.uri(), "k", "m").unwrap();
        let err = client.transform("t", "i").await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("empty response"));
    }

    #[test]
    fn status_classification_boundaries() {
        for status in [408u16, 409, 429, 500, 502, 503] {
            let err =
                OpenAiTransformer::classify_status(StatusCode::from_u16(status).unwrap(), "");
            assert!(err.is_transient(), "expected {status} to be transient");
        }
        for status in [400u16, 401, 403, 404, 422] {
            let err =
                OpenAiTransformer::classify_status(StatusCode::from_u16(status).unwrap(), "");
            assert!(!err.is_transient(), "expected {status} to be fatal");
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("héllo", 2), "hé");
    }
}
