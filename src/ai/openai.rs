// src/ai/openai.rs
use anyhow::{anyhow, Result};
use log::info;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::connector::{ChatRequest, LlmConnector};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Any server speaking the OpenAI `/v1/chat/completions` dialect
pub struct OpenAiCompatible {
    id: String,
    base_url: String,
    api_key: Option<String>,
    model_name: String,
    client: Client,
}

impl OpenAiCompatible {
    pub fn new(
        id: &str,
        base_url: &str,
        api_key: Option<&str>,
        model_name: Option<&str>,
    ) -> Result<Self> {
        let model_name = model_name.unwrap_or(DEFAULT_MODEL);
        info!("Initializing OpenAI-compatible provider '{}': {} at {}", id, model_name, base_url);
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            id: id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string).filter(|key| !key.is_empty()),
            model_name: model_name.to_string(),
            client,
        })
    }

    pub fn completions_url(&self) -> String {
        if self.base_url.ends_with("/v1") {
            format!("{}/chat/completions", self.base_url)
        } else {
            format!("{}/v1/chat/completions", self.base_url)
        }
    }

    pub fn request_body(&self, request: &ChatRequest) -> Value {
        let model = request.model.as_deref().unwrap_or(&self.model_name);
        let mut messages = Vec::new();
        if !request.system_prompt.is_empty() {
            messages.push(json!({ "role": "system", "content": request.system_prompt }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));
        json!({
            "model": model,
            "messages": messages,
        })
    }
}

/// `choices[0].message` of a completion response
pub fn first_choice_message(response: &Value) -> Option<Value> {
    response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .cloned()
}

impl LlmConnector for OpenAiCompatible {
    fn id(&self) -> &str {
        &self.id
    }

    fn text_chat(&self, request: &ChatRequest) -> Result<Value> {
        let url = self.completions_url();
        info!("Sending chat to {} ({})", url, self.id);

        let mut http = self.client.post(&url).json(&self.request_body(request));
        if let Some(api_key) = &self.api_key {
            http = http.bearer_auth(api_key);
        }

        let response = http.send().map_err(|e| {
            if e.is_timeout() {
                anyhow!("Request to {} timed out", self.id)
            } else {
                anyhow!("Request failed: {}", e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!("HTTP {} from {}: {}", status, self.id, error_text));
        }

        let body: Value = response.json()?;
        Ok(first_choice_message(&body).unwrap_or(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(base: &str) -> OpenAiCompatible {
        OpenAiCompatible::new("remote", base, Some(""), None).unwrap()
    }

    #[test]
    fn completions_url_handles_v1_suffix() {
        assert_eq!(
            connector("http://host:8000/").completions_url(),
            "http://host:8000/v1/chat/completions"
        );
        assert_eq!(
            connector("https://api.example.com/v1").completions_url(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn empty_api_key_is_dropped() {
        assert!(connector("http://x").api_key.is_none());
    }

    #[test]
    fn request_body_includes_system_prompt_and_override() {
        let request = ChatRequest {
            prompt: "hello".to_string(),
            system_prompt: "be brief".to_string(),
            model: Some("custom".to_string()),
        };
        let body = connector("http://x").request_body(&request);
        assert_eq!(body["model"], "custom");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[test]
    fn first_choice_message_is_extracted() {
        let response = json!({ "choices": [ { "message": { "role": "assistant", "content": "A. go" } } ] });
        assert_eq!(first_choice_message(&response).unwrap()["content"], "A. go");
        assert!(first_choice_message(&json!({ "choices": [] })).is_none());
    }
}
