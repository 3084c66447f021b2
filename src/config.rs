// src/config.rs
use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Deserializer};
use std::path::Path;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    #[serde(alias = "openai_compatible")]
    OpenAi,
}

/// One configured LLM backend
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ProviderConfig {
    pub fn ollama(id: &str, base_url: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: ProviderKind::Ollama,
            base_url: Some(base_url.to_string()),
            api_key: None,
            model: None,
        }
    }
}

/// Settings supplied by the host. Every field has a default so a partial
/// JSON file is enough.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub provider_id: String,
    pub providers: Vec<ProviderConfig>,
    pub model: Option<String>,
    pub prompt_template: String,
    pub option_count: usize,
    pub message_separator: String,
    pub title: String,
    pub show_quote: bool,
    pub render_image: bool,
    pub background_dir: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub character_x_offset: i32,
    pub character_bottom_offset: i32,
    pub character_scale: f32,
    pub enable_character: bool,
    #[serde(deserialize_with = "keys_from_list_or_csv")]
    pub gemini_api_keys: Vec<String>,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub character_prompt: String,
    pub chroma_bg_color: String,
    pub chroma_tolerance: u32,
    pub use_legacy_image_endpoint: bool,
    pub legacy_image_endpoint: String,
    pub avatar_url_tmpl: String,
    pub image_quality: u32,
    pub onebot_api_base: Option<String>,
    pub onebot_access_token: Option<String>,
    pub render_endpoint: Option<String>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            provider_id: String::new(),
            providers: vec![ProviderConfig::ollama("ollama", DEFAULT_OLLAMA_URL)],
            model: None,
            prompt_template: String::new(),
            option_count: 3,
            message_separator: "-------------------------".to_string(),
            title: "🎮 GalGame 选项".to_string(),
            show_quote: true,
            render_image: false,
            background_dir: "background".to_string(),
            canvas_width: 1280,
            canvas_height: 720,
            character_x_offset: 0,
            character_bottom_offset: 40,
            character_scale: 0.42,
            enable_character: false,
            gemini_api_keys: Vec::new(),
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            gemini_model: "gemini-2.0-flash-exp".to_string(),
            character_prompt: "以 {name} 的头像为参考，生成一位二次元风格的完整半身像角色，面向正前方，透明背景，立绘适合 Galgame 对话立绘使用。".to_string(),
            chroma_bg_color: "#00FF00".to_string(),
            chroma_tolerance: 80,
            use_legacy_image_endpoint: true,
            legacy_image_endpoint: "gemini-2.0-flash-preview-image-generation:generateContent".to_string(),
            avatar_url_tmpl: "https://q1.qlogo.cn/g?b=qq&nk={qq}&s=640".to_string(),
            image_quality: 85,
            onebot_api_base: None,
            onebot_access_token: None,
            render_endpoint: None,
        }
    }
}

impl PluginConfig {
    /// Load from a JSON file; a missing file falls back to defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_json(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// JPEG quality for the renderer, clamped to 10..=100
    pub fn render_quality(&self) -> u32 {
        self.image_quality.clamp(10, 100)
    }

    pub fn avatar_url_for(&self, id: &str) -> String {
        self.avatar_url_tmpl.replace("{qq}", id)
    }

    pub fn gemini_base(&self) -> &str {
        let trimmed = self.gemini_base_url.trim();
        if trimmed.is_empty() {
            "https://generativelanguage.googleapis.com"
        } else {
            trimmed
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyList {
    List(Vec<serde_json::Value>),
    Csv(String),
}

fn keys_from_list_or_csv<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let keys = match Option::<KeyList>::deserialize(deserializer)? {
        Some(KeyList::List(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect(),
        Some(KeyList::Csv(raw)) => raw
            .split(',')
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect(),
        None => Vec::new(),
    };
    Ok(keys)
}
