// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Ollama native API.
//!
//! Provides [`OllamaClient`], which sends generate requests and classifies
//! failures as transient or permanent. It does not retry on its own: the
//! pipeline owns the retry policy.

use std::time::Duration;

use archivist_core::ArchivistError;
use tracing::debug;

use crate::types::{ApiErrorResponse, GenerateRequest, GenerateResponse, TagsResponse};

/// HTTP client for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    /// Creates a client for `base_url` (e.g. `http://localhost:11434`).
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, ArchivistError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArchivistError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Returns the model used for generation.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Sends a non-streaming JSON-mode generate request and returns the
    /// model's raw text output.
    pub async fn generate(&self, prompt: String) -> Result<String, ArchivistError> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt,
            format: "json".into(),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        debug!(status = %status, model = %self.model, "generate response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body = response.text().await.map_err(request_error)?;
        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| ArchivistError::PermanentExtraction {
                message: format!("failed to parse generate response: {e}"),
            })?;
        Ok(parsed.response)
    }

    /// Lists the models available on the server.
    pub async fn list_models(&self) -> Result<Vec<String>, ArchivistError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let tags: TagsResponse = response.json().await.map_err(|e| {
            ArchivistError::PermanentExtraction {
                message: format!("failed to parse model list: {e}"),
            }
        })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

fn status_error(status: reqwest::StatusCode, body: &str) -> ArchivistError {
    let detail = match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api_err) => api_err.error,
        Err(_) => body.to_string(),
    };
    let message = format!("Ollama returned {status}: {detail}");
    if is_transient_error(status) {
        ArchivistError::TransientExtraction {
            message,
            source: None,
        }
    } else {
        ArchivistError::PermanentExtraction { message }
    }
}

fn request_error(e: reqwest::Error) -> ArchivistError {
    if e.is_connect() || e.is_timeout() {
        ArchivistError::TransientExtraction {
            message: format!("HTTP request failed: {e}"),
            source: Some(Box::new(e)),
        }
    } else {
        ArchivistError::PermanentExtraction {
            message: format!("HTTP request failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> OllamaClient {
        OllamaClient::new("http://unused", "gemma3n:latest", Duration::from_secs(5))
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    #[test]
    fn transient_status_codes() {
        for code in [429u16, 500, 502, 503, 504] {
            let status = reqwest::StatusCode::from_u16(code).unwrap();
            assert!(is_transient_error(status), "{code} should be transient");
        }
        for code in [400u16, 401, 404, 422] {
            let status = reqwest::StatusCode::from_u16(code).unwrap();
            assert!(!is_transient_error(status), "{code} should be permanent");
        }
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client =
            OllamaClient::new("http://localhost:11434/", "m", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[tokio::test]
    async fn generate_sends_json_mode_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "gemma3n:latest",
                "format": "json",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gemma3n:latest",
                "response": "{\"facts\": []}",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let text = client.generate("hello".into()).await.unwrap();
        assert_eq!(text, "{\"facts\": []}");
    }

    #[tokio::test]
    async fn generate_classifies_503_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(serde_json::json!({"error": "busy"})),
            )
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .generate("hello".into())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("busy"), "got: {err}");
    }

    #[tokio::test]
    async fn generate_classifies_404_as_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                serde_json::json!({"error": "model 'gemma3n:latest' not found"}),
            ))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .generate("hello".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchivistError::PermanentExtraction { .. }));
        assert!(err.to_string().contains("not found"), "got: {err}");
    }

    #[tokio::test]
    async fn undecodable_body_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .generate("hello".into())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = test_client(&uri).generate("hello".into()).await.unwrap_err();
        assert!(err.is_transient(), "got: {err}");
    }

    #[tokio::test]
    async fn list_models_returns_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "gemma3n:latest"}, {"name": "llama3:8b"}]
            })))
            .mount(&server)
            .await;

        let models = test_client(&server.uri()).list_models().await.unwrap();
        assert_eq!(models, vec!["gemma3n:latest", "llama3:8b"]);
    }
}
