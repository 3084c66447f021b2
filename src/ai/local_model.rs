// src/ai/local_model.rs
use anyhow::{anyhow, Result};
use log::{info, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::connector::{ChatRequest, LlmConnector};

pub const DEFAULT_MODEL: &str = "qwen2.5:7b";

//Implementation for Ollama local LLM chat
pub struct LocalModel {
    id: String,
    ollama_url: String,
    model_name: String,
    client: Client,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Value,
}

/// An entry of `/api/tags`
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModelInfo>,
}

impl LocalModel {
    pub fn new(id: &str, ollama_url: &str, model_name: Option<&str>) -> Result<Self> {
        let model_name = model_name.unwrap_or(DEFAULT_MODEL);
        info!("Initializing Ollama provider '{}': {} at {}", id, model_name, ollama_url);

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            id: id.to_string(),
            ollama_url: ollama_url.trim_end_matches('/').to_string(),
            model_name: model_name.to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.ollama_url
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn list_models(&self) -> Result<Vec<OllamaModelInfo>> {
        let url = format!("{}/api/tags", self.ollama_url);
        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(anyhow!("Ollama server error: {}", response.status()));
        }
        let tags: OllamaTags = response.json()?;
        Ok(tags.models)
    }
}

impl LlmConnector for LocalModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn text_chat(&self, request: &ChatRequest) -> Result<Value> {
        let model = request.model.as_deref().unwrap_or(&self.model_name);
        info!("Sending chat to Ollama model: {}", model);

        let mut messages = Vec::new();
        if !request.system_prompt.is_empty() {
            messages.push(OllamaMessage {
                role: "system",
                content: &request.system_prompt,
            });
        }
        messages.push(OllamaMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = OllamaChatRequest {
            model,
            messages,
            stream: false,
        };

        let url = format!("{}/api/chat", self.ollama_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("Request timed out after 5 minutes")
                } else {
                    anyhow!("Ollama API error: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text()?;
            if status.as_u16() == 404 {
                warn!("Model '{}' not found. Pull it with: ollama pull {}", model, model);
            }
            return Err(anyhow!("Ollama API error ({}): {}", status, error_text));
        }

        let reply: OllamaChatResponse = response.json()?;
        Ok(reply.message)
    }
}
