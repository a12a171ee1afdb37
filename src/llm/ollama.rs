use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::llm::provider::LLMProvider;
use crate::models::ModelRequest;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_CONTEXT_TOKENS: usize = 8_192;

/// Talks to a local Ollama server over its HTTP API.
pub struct OllamaProvider {
    client: Client,
    endpoint: String,
    request_timeout: Duration,
    context_tokens: usize,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
    num_ctx: usize,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaProvider {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            request_timeout,
            context_tokens: DEFAULT_CONTEXT_TOKENS,
        })
    }

    pub fn with_context_limit(mut self, context_tokens: usize) -> Self {
        self.context_tokens = context_tokens;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn generate(&self, request: &ModelRequest) -> Result<String> {
        tracing::debug!(
            "Sending ~{} tokens for batch {} to {}",
            request.estimate_tokens(),
            request.batch_index + 1,
            self.endpoint
        );

        let body = OllamaRequest {
            model: &request.params.model,
            prompt: &request.prompt,
            system: &request.system,
            stream: false,
            options: OllamaOptions {
                temperature: request.params.temperature,
                num_predict: request.params.max_tokens,
                num_ctx: request.params.context_window,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::from_transport(e, self.request_timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::from_transport(e, self.request_timeout))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<OllamaResponse>(&text)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or(text);
            return Err(match status {
                StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT => {
                    Error::EndpointUnavailable(format!("Ollama returned {}: {}", status, detail))
                }
                _ => Error::EndpointProtocol(format!("Ollama returned {}: {}", status, detail)),
            });
        }

        let result: OllamaResponse = serde_json::from_str(&text)
            .map_err(|e| Error::EndpointProtocol(format!("Failed to decode Ollama response: {}", e)))?;

        if let Some(error) = result.error {
            return Err(Error::EndpointProtocol(error));
        }

        match result.response {
            Some(text) if !text.trim().is_empty() => Ok(text),
            Some(_) => Err(Error::EndpointProtocol("Empty response from Ollama".to_string())),
            None => Err(Error::EndpointProtocol(
                "Ollama response has no 'response' field".to_string(),
            )),
        }
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(&self.endpoint)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| Error::EndpointUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::EndpointUnavailable(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn max_context_tokens(&self) -> usize {
        self.context_tokens
    }

    fn name(&self) -> &str {
        "Ollama"
    }
}
