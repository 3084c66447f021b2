// src/options/mod.rs
pub mod normalize;
pub mod prompt;

use log::{debug, error, info};

use crate::ai::connector::ChatRequest;
use crate::ai::reply::ReplyText;
use crate::ai::ProviderRegistry;
use crate::config::PluginConfig;

pub use normalize::normalize_options;

pub const NO_PROVIDER_MESSAGE: &str =
    "未找到可用的 LLM 供应商，请在配置中添加 providers 或指定 provider_id。";
pub const PROVIDER_FAILED_MESSAGE: &str = "LLM 调用失败，请稍后重试。";

/// Ask the selected provider for `count` options. Never fails: problems come
/// back as a short message that the normalizer then turns into option lines.
pub fn generate_options(
    registry: &ProviderRegistry,
    cfg: &PluginConfig,
    base_text: &str,
    count: usize,
) -> String {
    let Some(provider) = registry.select(&cfg.provider_id) else {
        return NO_PROVIDER_MESSAGE.to_string();
    };
    info!("Generating {} options via provider={}", count, provider.id());

    let request = ChatRequest {
        prompt: prompt::build_prompt(base_text, count, &cfg.prompt_template),
        system_prompt: prompt::SYSTEM_PROMPT.to_string(),
        model: cfg.model.clone(),
    };

    match provider.text_chat(&request) {
        Ok(reply) => {
            let content = ReplyText::decode(&reply).into_text();
            debug!("Raw LLM content len={}", content.chars().count());
            content
        }
        Err(e) => {
            error!("LLM call failed: {:#}", e);
            PROVIDER_FAILED_MESSAGE.to_string()
        }
    }
}
