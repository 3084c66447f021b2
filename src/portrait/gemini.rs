// src/portrait/gemini.rs
use anyhow::{anyhow, Result};
use log::{error, info};
use reqwest::blocking::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::data_url::DataUrl;
use crate::config::PluginConfig;

/// Produces a character portrait from a prompt and a reference image
pub trait PortraitGenerator {
    fn generate(&self, prompt: &str, reference: &DataUrl) -> Result<Option<DataUrl>>;
}

/// Gemini `generateContent` image generation, trying each API key in turn
pub struct GeminiImageClient {
    client: Client,
    endpoint: String,
    api_keys: Vec<String>,
    legacy: bool,
}

impl GeminiImageClient {
    pub fn from_config(cfg: &PluginConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        let base = cfg.gemini_base().trim_end_matches('/');
        let endpoint = if cfg.use_legacy_image_endpoint {
            format!("{}/v1beta/models/{}", base, cfg.legacy_image_endpoint)
        } else {
            format!("{}/v1beta/models/{}:generateContent", base, cfg.gemini_model)
        };
        Ok(Self {
            client,
            endpoint,
            api_keys: cfg.gemini_api_keys.clone(),
            legacy: cfg.use_legacy_image_endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn try_key(&self, key: &str, payload: &Value) -> Result<Option<DataUrl>> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", key)])
            .json(payload)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_else(|_| "<no body>".to_string());
            let snippet: String = body.chars().take(300).collect();
            return Err(anyhow!("Gemini returned {}: {}", status, snippet));
        }

        let data: Value = response.json()?;
        info!("Gemini request succeeded, looking for inline image data");
        find_inline_image(&data)
    }
}

impl PortraitGenerator for GeminiImageClient {
    fn generate(&self, prompt: &str, reference: &DataUrl) -> Result<Option<DataUrl>> {
        if self.api_keys.is_empty() {
            error!("No Gemini API key configured, cannot generate portrait");
            return Ok(None);
        }

        let payload = if self.legacy {
            legacy_payload(prompt, reference)
        } else {
            tools_payload(prompt, reference)
        };

        for (idx, key) in self.api_keys.iter().enumerate() {
            info!(
                "Calling Gemini with key #{} at {}, expecting PNG",
                idx + 1,
                self.endpoint()
            );
            match self.try_key(key, &payload) {
                Ok(Some(image)) => {
                    info!(
                        "Gemini returned {} image, {} bytes",
                        image.mime,
                        image.bytes.len()
                    );
                    return Ok(Some(image));
                }
                Ok(None) => error!("Gemini response with key #{} had no image", idx + 1),
                Err(e) => error!("Gemini call with key #{} failed: {}", idx + 1, e),
            }
        }

        error!("All Gemini keys failed, giving up on portrait");
        Ok(None)
    }
}

/// Request shape accepted by image-generation model endpoints and most proxies
pub fn legacy_payload(prompt: &str, reference: &DataUrl) -> Value {
    json!({
        "contents": [
            {
                "role": "user",
                "parts": [{ "text": prompt }],
            },
            {
                "role": "user",
                "parts": [{
                    "inlineData": {
                        "mimeType": reference.mime,
                        "data": reference.to_base64(),
                    }
                }],
            }
        ],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "temperature": 0.8,
            "topP": 0.95,
            "topK": 40,
            "maxOutputTokens": 1024,
        }
    })
}

/// `generateContent` with the image generation tool enabled
pub fn tools_payload(prompt: &str, reference: &DataUrl) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": prompt },
                {
                    "inline_data": {
                        "mime_type": reference.mime,
                        "data": reference.to_base64(),
                    }
                },
            ],
        }],
        "generation_config": { "temperature": 0.8 },
        "tools": [{ "image_generation": {} }],
        "tool_config": {
            "image_generation_config": { "mime_type": "image/png" }
        }
    })
}

/// Depth-first search for the first `inline_data` / `inlineData` object
/// carrying a `data` member
pub fn find_inline(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(map) => {
            for key in ["inline_data", "inlineData"] {
                if let Some(inline) = map.get(key).and_then(Value::as_object) {
                    if inline.contains_key("data") {
                        return Some(inline);
                    }
                }
            }
            map.values().find_map(find_inline)
        }
        Value::Array(items) => items.iter().find_map(find_inline),
        _ => None,
    }
}

pub fn find_inline_image(value: &Value) -> Result<Option<DataUrl>> {
    let Some(inline) = find_inline(value) else {
        return Ok(None);
    };
    let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
    if data.is_empty() {
        return Ok(None);
    }
    let mime = inline
        .get("mime_type")
        .or_else(|| inline.get("mimeType"))
        .and_then(Value::as_str)
        .unwrap_or("image/png");
    Ok(Some(DataUrl::from_base64(mime, data)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_camel_case_inline_data_in_candidates() -> Result<()> {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "here you go" },
                        { "inlineData": { "mimeType": "image/png", "data": "AQID" } }
                    ]
                }
            }]
        });
        let image = find_inline_image(&response)?.expect("inline image");
        assert_eq!(image.mime, "image/png");
        assert_eq!(image.bytes, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn finds_snake_case_inline_data_anywhere() -> Result<()> {
        let response = json!({
            "outer": [ { "deep": { "inline_data": { "mime_type": "image/jpeg", "data": "AQ==" } } } ]
        });
        let image = find_inline_image(&response)?.expect("inline image");
        assert_eq!(image.mime, "image/jpeg");
        Ok(())
    }

    #[test]
    fn inline_without_data_is_skipped() -> Result<()> {
        let response = json!({
            "a": { "inlineData": { "mimeType": "image/png" } },
            "b": { "inlineData": { "data": "AQ==" } }
        });
        let image = find_inline_image(&response)?.expect("second entry");
        assert_eq!(image.mime, "image/png");
        assert_eq!(image.bytes, vec![1]);
        Ok(())
    }

    #[test]
    fn no_inline_data_yields_none() -> Result<()> {
        assert!(find_inline_image(&json!({ "candidates": [] }))?.is_none());
        assert!(find_inline_image(&json!("text"))?.is_none());
        Ok(())
    }

    #[test]
    fn payload_shapes_follow_endpoint_style() {
        let reference = DataUrl::new("image/jpeg", vec![0xff]);
        let legacy = legacy_payload("draw", &reference);
        assert_eq!(legacy["contents"][0]["parts"][0]["text"], "draw");
        assert_eq!(legacy["contents"][1]["parts"][0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(legacy["generationConfig"]["responseModalities"][1], "IMAGE");

        let tools = tools_payload("draw", &reference);
        assert_eq!(tools["contents"][0]["parts"][1]["inline_data"]["data"], "/w==");
        assert!(tools["tools"][0].get("image_generation").is_some());
    }

    #[test]
    fn endpoint_depends_on_legacy_flag() -> Result<()> {
        let mut cfg = PluginConfig::default();
        cfg.gemini_base_url = "https://proxy.example/".to_string();
        let legacy = GeminiImageClient::from_config(&cfg)?;
        assert_eq!(
            legacy.endpoint(),
            "https://proxy.example/v1beta/models/gemini-2.0-flash-preview-image-generation:generateContent"
        );

        cfg.use_legacy_image_endpoint = false;
        let tools = GeminiImageClient::from_config(&cfg)?;
        assert_eq!(
            tools.endpoint(),
            "https://proxy.example/v1beta/models/gemini-2.0-flash-exp:generateContent"
        );
        Ok(())
    }
}
