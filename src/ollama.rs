use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::session::Message;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Listing installed models is a quick local call; chat and pull requests
/// stay untimed because they legitimately run long.
const LIST_MODELS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    models: Vec<ModelEntry>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Single-shot chat completion.
    pub async fn chat(&self, model: &str, messages: &[Message]) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let request = ChatRequest {
            model,
            messages,
            stream: false,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Ollama request failed with status: {}. Make sure Ollama is running with: ollama serve",
                response.status()
            ));
        }

        let chat_response: ChatResponse = response.json().await?;
        Ok(chat_response.message.content)
    }

    /// Opens a streaming chat completion and returns the raw response after
    /// the status check. The body is an NDJSON sequence of partial messages;
    /// `stream::pump` consumes it.
    pub async fn chat_stream(&self, model: &str, messages: &[Message]) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);

        let request = ChatRequest {
            model,
            messages,
            stream: true,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Ollama request failed with status: {}. Make sure Ollama is running with: ollama serve",
                response.status()
            ));
        }

        Ok(response)
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(LIST_MODELS_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: ModelsResponse = response.json().await?;
        let model_names: Vec<String> = models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect();

        Ok(model_names)
    }

    pub async fn has_model(&self, name: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| m == name))
    }

    pub async fn pull_model(&self, name: &str) -> Result<()> {
        let url = format!("{}/api/pull", self.base_url);

        let request = PullRequest {
            name,
            stream: false,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to pull model: {}", response.status()));
        }

        Ok(())
    }

    /// Pulls the model if it is not present yet. Failures are logged and
    /// never block the chat attempt.
    pub async fn ensure_model(&self, name: &str) {
        match self.has_model(name).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("model '{}' not found, pulling", name);
                if let Err(e) = self.pull_model(name).await {
                    tracing::warn!("failed to pull model '{}': {}", name, e);
                }
            }
            Err(e) => {
                tracing::warn!("failed to check model availability: {}", e);
            }
        }
    }
}
