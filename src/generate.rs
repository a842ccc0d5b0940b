//! Client for the downstream text-generation service.
//!
//! The generator is an opaque prompt→text collaborator, called once per
//! question with no core-side retry. A failure never reaches the user raw:
//! the ask flow substitutes [`APOLOGY`] and keeps the original error in
//! the logs.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

/// User-facing substitute for a failed generation call.
pub const APOLOGY: &str =
    "Sorry — something went wrong while writing an answer. Please try again in a moment.";

/// Opaque prompt→text generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Generator backed by an Ollama-style `/api/generate` endpoint.
pub struct OllamaGenerator {
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Request(format!("{}: {}", status, text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let answer = json
            .get("response")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();

        if answer.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        Ok(answer)
    }
}
