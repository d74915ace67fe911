//! Text-completion collaborator.
//!
//! The planner sends one natural-language prompt and receives free text.
//! The call is unreliable by nature: timeouts, HTTP errors and empty answers
//! all surface as [`WorkerError::Collaborator`], which the planner recovers
//! from.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CompletionConfig;
use crate::error::{WorkerError, WorkerResult};

/// One prompt in, free text out.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> WorkerResult<String>;
}

/// Build the configured collaborator, if any.
///
/// Returns `None` when no API key is configured.
pub fn from_config(config: &CompletionConfig) -> WorkerResult<Option<Arc<dyn TextCompletion>>> {
    match GeminiClient::from_config(config)? {
        Some(client) => Ok(Some(Arc::new(client))),
        None => {
            info!("GEMINI_API_KEY not set, IR planning will use the default template");
            Ok(None)
        }
    }
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    /// `None` when the config carries no API key.
    pub fn from_config(config: &CompletionConfig) -> WorkerResult<Option<Self>> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("HTTP client: {}", e)))?;

        Ok(Some(Self {
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        }))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextCompletion for GeminiClient {
    async fn complete(&self, prompt: &str) -> WorkerResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig { temperature: 0.7 },
        };

        debug!(model = %self.model, "Calling Gemini API");
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| WorkerError::collaborator(format!("Gemini API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WorkerError::collaborator(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            WorkerError::collaborator(format!("Failed to parse Gemini response: {}", e))
        })?;

        gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| WorkerError::collaborator("No content in Gemini response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> CompletionConfig {
        CompletionConfig {
            api_key: Some("test-key".to_string()),
            model: "gemini-test".to_string(),
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_complete_returns_first_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{ "parts": [{ "text": "plan a video" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [
                    { "content": { "parts": [{ "text": "```json\n{}\n```" }] } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::from_config(&config(&server)).unwrap().unwrap();
        let text = client.complete("plan a video").await.unwrap();
        assert_eq!(text, "```json\n{}\n```");
    }

    #[tokio::test]
    async fn test_http_error_is_collaborator_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = GeminiClient::from_config(&config(&server)).unwrap().unwrap();
        let err = client.complete("prompt").await.unwrap_err();
        assert!(matches!(err, WorkerError::Collaborator(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_collaborator_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let client = GeminiClient::from_config(&config(&server)).unwrap().unwrap();
        let err = client.complete("prompt").await.unwrap_err();
        assert!(matches!(err, WorkerError::Collaborator(_)));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "candidates": [] }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.timeout = Duration::from_millis(200);
        let client = GeminiClient::from_config(&config).unwrap().unwrap();
        let err = client.complete("prompt").await.unwrap_err();
        assert!(matches!(err, WorkerError::Collaborator(_)));
    }

    #[test]
    fn test_no_api_key_means_no_client() {
        let config = CompletionConfig::default();
        assert!(GeminiClient::from_config(&config).unwrap().is_none());
        assert!(from_config(&config).unwrap().is_none());
    }
}
