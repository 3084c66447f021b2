// src/render/mod.rs
pub mod background;
pub mod template;

use anyhow::{anyhow, Context, Result};
use log::info;
use reqwest::blocking::Client;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Turns a scene document into a file: an image when a render service is
/// configured, the HTML itself otherwise
pub struct Renderer {
    endpoint: Option<String>,
    quality: u32,
    client: Client,
}

impl Renderer {
    pub fn new(endpoint: Option<&str>, quality: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            endpoint: endpoint
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            quality,
            client,
        })
    }

    pub fn extension(&self) -> &'static str {
        if self.endpoint.is_some() {
            "jpg"
        } else {
            "html"
        }
    }

    /// `requested`, or a timestamped file in `dir` with the right extension
    pub fn output_path(&self, requested: Option<&Path>, dir: &Path) -> PathBuf {
        match requested {
            Some(path) => path.to_path_buf(),
            None => {
                let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
                dir.join(format!("galchoice-{}.{}", stamp, self.extension()))
            }
        }
    }

    pub fn render(&self, html: &str, out: &Path) -> Result<PathBuf> {
        let Some(endpoint) = &self.endpoint else {
            std::fs::write(out, html)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!("Scene HTML written to {}", out.display());
            return Ok(out.to_path_buf());
        };

        info!("Rendering scene via {}", endpoint);
        let response = self
            .client
            .post(endpoint)
            .json(&json!({
                "html": html,
                "options": { "type": "jpeg", "quality": self.quality },
            }))
            .send()
            .context("Render service request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(anyhow!("Render service returned {}: {}", status, text));
        }
        let bytes = response.bytes()?;
        std::fs::write(out, &bytes)
            .with_context(|| format!("Failed to write {}", out.display()))?;
        info!("Rendered scene saved to {}", out.display());
        Ok(out.to_path_buf())
    }
}
