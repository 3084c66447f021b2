// src/app.rs
use anyhow::Result;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};

use crate::ai::ProviderRegistry;
use crate::chat::command::{is_trigger, parse_count, MAX_OPTIONS, MIN_OPTIONS};
use crate::chat::event::MessageEvent;
use crate::chat::onebot::MessageLookup;
use crate::chat::quote::{extract_quoted_text, resolve_target};
use crate::config::PluginConfig;
use crate::options::{generate_options, normalize_options};
use crate::portrait::avatar::ImageFetcher;
use crate::portrait::cache::PortraitCache;
use crate::portrait::data_url::DataUrl;
use crate::portrait::gemini::PortraitGenerator;
use crate::portrait::PortraitService;
use crate::render::background::pick_background;
use crate::render::template::{render_html, Scene};
use crate::render::Renderer;

pub const OPTIONS_FAILED_MESSAGE: &str = "生成选项失败，请稍后重试。";
pub const NO_QUOTE_PLACEHOLDER: &str = "（无原文）";
pub const REFRESH_OTHERS_MESSAGE: &str = "仅可刷新自己立绘";
pub const REFRESH_OK_MESSAGE: &str = "已刷新你的立绘~";
pub const REFRESH_FAILED_MESSAGE: &str = "刷新失败，请检查 Key/网络后再试。";
pub const REFRESH_ERROR_MESSAGE: &str = "刷新失败，请稍后重试。";

/// What a command hands back to the chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Image(PathBuf),
}

/// Network collaborators of a command, injected so the flow can run on fakes
pub struct Services<'a> {
    pub registry: &'a ProviderRegistry,
    pub lookup: Option<&'a dyn MessageLookup>,
    pub fetcher: &'a dyn ImageFetcher,
    pub generator: &'a dyn PortraitGenerator,
}

pub struct App<'a> {
    cfg: &'a PluginConfig,
    data_dir: PathBuf,
    services: Services<'a>,
}

impl<'a> App<'a> {
    pub fn new(cfg: &'a PluginConfig, data_dir: &Path, services: Services<'a>) -> Self {
        let app = Self {
            cfg,
            data_dir: data_dir.to_path_buf(),
            services,
        };
        if let Err(e) = std::fs::create_dir_all(app.background_dir()) {
            error!("Failed to create background dir: {}", e);
        }
        app
    }

    pub fn background_dir(&self) -> PathBuf {
        self.data_dir.join(&self.cfg.background_dir)
    }

    fn portraits(&self) -> PortraitService<'_> {
        PortraitService::new(
            self.cfg,
            PortraitCache::new(&self.data_dir),
            self.services.fetcher,
            self.services.generator,
        )
    }

    /// Whether `event` asks for options even when the platform did not route
    /// it as a command
    pub fn accepts(&self, event: &MessageEvent) -> bool {
        is_trigger(&event.message_str())
    }

    /// Options for `event`, as a text block or a rendered scene written to
    /// `out`. Failures come back as a short apology text.
    pub fn make_options(&self, event: &MessageEvent, out: Option<&Path>) -> Reply {
        match self.try_make_options(event, out) {
            Ok(reply) => reply,
            Err(e) => {
                error!("Option generation failed: {:#}", e);
                Reply::Text(OPTIONS_FAILED_MESSAGE.to_string())
            }
        }
    }

    fn try_make_options(&self, event: &MessageEvent, out: Option<&Path>) -> Result<Reply> {
        let count = parse_count(
            &event.message_str(),
            self.cfg.option_count,
            MIN_OPTIONS,
            MAX_OPTIONS,
        );
        debug!("Parsed option count n={}", count);

        let base_text = extract_quoted_text(event, self.services.lookup);
        let raw = generate_options(self.services.registry, self.cfg, &base_text, count);
        let options = normalize_options(&raw, count);
        debug!("Normalized options:\n{}", options.join("\n"));

        if self.cfg.render_image {
            let quote = if base_text.is_empty() {
                NO_QUOTE_PLACEHOLDER
            } else {
                base_text.as_str()
            };
            return Ok(Reply::Image(self.render_scene(event, quote, &options, out)?));
        }

        let sep = &self.cfg.message_separator;
        let mut lines = vec![self.cfg.title.clone(), sep.clone()];
        if self.cfg.show_quote && !base_text.is_empty() {
            lines.push(format!("📝 原文：{}", base_text));
            lines.push(sep.clone());
        }
        lines.extend(options);
        Ok(Reply::Text(lines.join("\n")))
    }

    fn render_scene(
        &self,
        event: &MessageEvent,
        quote: &str,
        options: &[String],
        out: Option<&Path>,
    ) -> Result<PathBuf> {
        let target = resolve_target(event, self.services.lookup, self.cfg);
        let background = pick_background(&self.background_dir()).and_then(|path| {
            match DataUrl::from_file(&path, "image/jpeg") {
                Ok(url) => Some(url.to_string()),
                Err(e) => {
                    debug!("Background {} unreadable: {:#}", path.display(), e);
                    None
                }
            }
        });

        let portrait = self
            .portraits()
            .portrait(&target.name, &target.avatar_url, &target.id, false)?;
        match &portrait {
            Some(p) => info!("Portrait ready for {}, transparent={}", target.id, p.transparent),
            None => info!("No portrait added for {}", target.id),
        }

        let display = target.display();
        let scene = Scene {
            background,
            avatar_url: &target.avatar_url,
            display_name: &display,
            quote,
            options,
            portrait: portrait.as_ref(),
        };
        let html = render_html(&scene, self.cfg);

        let renderer = Renderer::new(self.cfg.render_endpoint.as_deref(), self.cfg.render_quality())?;
        let path = renderer.output_path(out, &self.data_dir);
        renderer.render(&html, &path)
    }

    /// Regenerate the sender's own portrait, ignoring the cache
    pub fn refresh_portrait(&self, event: &MessageEvent) -> String {
        match self.try_refresh_portrait(event) {
            Ok(message) => message.to_string(),
            Err(e) => {
                error!("Portrait refresh failed: {:#}", e);
                REFRESH_ERROR_MESSAGE.to_string()
            }
        }
    }

    fn try_refresh_portrait(&self, event: &MessageEvent) -> Result<&'static str> {
        let target = resolve_target(event, self.services.lookup, self.cfg);
        let sender_id = event.sender_id();
        if target.id != sender_id {
            warn!("User {} tried to refresh portrait of {}", sender_id, target.id);
            return Ok(REFRESH_OTHERS_MESSAGE);
        }
        let name = event.sender_name().unwrap_or_else(|| sender_id.clone());
        let refreshed = self
            .portraits()
            .portrait(&name, &target.avatar_url, &target.id, true)?;
        Ok(if refreshed.is_some() {
            REFRESH_OK_MESSAGE
        } else {
            REFRESH_FAILED_MESSAGE
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::connector::{ChatRequest, LlmConnector};
    use crate::portrait::matte::encode_png;
    use anyhow::anyhow;
    use image::{Rgba, RgbaImage};
    use serde_json::{json, Value};

    struct Canned(&'static str);

    impl LlmConnector for Canned {
        fn id(&self) -> &str {
            "canned"
        }

        fn text_chat(&self, _request: &ChatRequest) -> Result<Value> {
            Ok(json!({ "text": self.0 }))
        }
    }

    struct NoImages;

    impl ImageFetcher for NoImages {
        fn fetch(&self, _url: &str) -> Result<Option<DataUrl>> {
            Ok(Some(DataUrl::new("image/jpeg", vec![1, 2, 3])))
        }
    }

    impl PortraitGenerator for NoImages {
        fn generate(&self, _prompt: &str, _reference: &DataUrl) -> Result<Option<DataUrl>> {
            Ok(None)
        }
    }

    struct GreenScreen;

    impl PortraitGenerator for GreenScreen {
        fn generate(&self, _prompt: &str, _reference: &DataUrl) -> Result<Option<DataUrl>> {
            let image = RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255]));
            Ok(Some(DataUrl::png(encode_png(image)?)))
        }
    }

    struct Broken;

    impl PortraitGenerator for Broken {
        fn generate(&self, _prompt: &str, _reference: &DataUrl) -> Result<Option<DataUrl>> {
            Err(anyhow!("network down"))
        }
    }

    fn registry(reply: &'static str) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(Canned(reply));
        registry
    }

    fn services<'a>(
        registry: &'a ProviderRegistry,
        generator: &'a dyn PortraitGenerator,
    ) -> Services<'a> {
        Services {
            registry,
            lookup: None,
            fetcher: &NoImages,
            generator,
        }
    }

    #[test]
    fn text_block_includes_quote() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = PluginConfig::default();
        let registry = registry("A. 牵起她的手\nB. 沉默");
        let app = App::new(&cfg, dir.path(), services(&registry, &NoImages));

        let event = MessageEvent::from_text("/gal 雨停了 2", "1", "Bob");
        let Reply::Text(text) = app.make_options(&event, None) else {
            panic!("expected text reply");
        };
        assert_eq!(
            text,
            "🎮 GalGame 选项\n-------------------------\n📝 原文：雨停了 2\n-------------------------\nA. 牵起她的手\nB. 沉默"
        );
        assert!(app.background_dir().is_dir());
        Ok(())
    }

    #[test]
    fn empty_base_text_hides_quote_and_pads() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = PluginConfig::default();
        let registry = registry("随便走走");
        let app = App::new(&cfg, dir.path(), services(&registry, &NoImages));

        let event = MessageEvent::from_text("/gal", "1", "Bob");
        assert_eq!(
            app.make_options(&event, None),
            Reply::Text(
                "🎮 GalGame 选项\n-------------------------\nA. 随便走走\nB. …\nC. …".to_string()
            )
        );
        Ok(())
    }

    #[test]
    fn rendering_without_endpoint_writes_html() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = PluginConfig {
            render_image: true,
            ..PluginConfig::default()
        };
        let registry = registry("A. <b>run</b>");
        let app = App::new(&cfg, dir.path(), services(&registry, &NoImages));

        let out = dir.path().join("scene.html");
        let event = MessageEvent::from_text("gal 1", "7", "Dana");
        assert_eq!(app.make_options(&event, Some(&out)), Reply::Image(out.clone()));

        let html = std::fs::read_to_string(&out)?;
        assert!(html.contains("（无原文）"));
        assert!(html.contains("Dana (7)"));
        assert!(html.contains("A. &lt;b&gt;run&lt;/b&gt;"));
        assert!(html.contains("opacity:0;"));
        Ok(())
    }

    struct Offline;

    impl ImageFetcher for Offline {
        fn fetch(&self, _url: &str) -> Result<Option<DataUrl>> {
            Err(anyhow!("dns failure"))
        }
    }

    fn portrait_config() -> PluginConfig {
        PluginConfig {
            render_image: true,
            enable_character: true,
            gemini_api_keys: vec!["k".to_string()],
            ..PluginConfig::default()
        }
    }

    #[test]
    fn avatar_network_error_still_renders_scene() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = portrait_config();
        let registry = registry("A. x");
        let app = App::new(
            &cfg,
            dir.path(),
            Services {
                registry: &registry,
                lookup: None,
                fetcher: &Offline,
                generator: &GreenScreen,
            },
        );

        let out = dir.path().join("o.html");
        let event = MessageEvent::from_text("gal", "7", "Dana");
        assert_eq!(app.make_options(&event, Some(&out)), Reply::Image(out.clone()));
        let html = std::fs::read_to_string(&out)?;
        assert!(html.contains("A. x"));
        assert!(html.contains("opacity:0;"));
        Ok(())
    }

    #[test]
    fn generator_error_drops_portrait_only() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = portrait_config();
        let registry = registry("A. x");
        let app = App::new(&cfg, dir.path(), services(&registry, &Broken));

        let out = dir.path().join("o.html");
        let event = MessageEvent::from_text("gal", "7", "Dana");
        assert_eq!(app.make_options(&event, Some(&out)), Reply::Image(out.clone()));
        assert_eq!(app.refresh_portrait(&event), REFRESH_FAILED_MESSAGE);
        Ok(())
    }

    #[test]
    fn unwritable_output_becomes_apology() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = portrait_config();
        let registry = registry("A. x");
        let app = App::new(&cfg, dir.path(), services(&registry, &NoImages));

        let out = dir.path().join("missing").join("o.html");
        let event = MessageEvent::from_text("gal", "7", "Dana");
        assert_eq!(
            app.make_options(&event, Some(&out)),
            Reply::Text(OPTIONS_FAILED_MESSAGE.to_string())
        );
        Ok(())
    }

    #[test]
    fn refresh_only_for_self() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = PluginConfig {
            enable_character: true,
            gemini_api_keys: vec!["k".to_string()],
            ..PluginConfig::default()
        };
        let registry = registry("");
        let app = App::new(&cfg, dir.path(), services(&registry, &GreenScreen));

        let mentions_other = MessageEvent::from_json(
            r#"{"user_id": 1, "message": [{"type": "at", "data": {"qq": "2"}}, {"type": "text", "data": {"text": "刷新立绘"}}],
                "sender": {"user_id": 1, "nickname": "Bob"}}"#,
        )?;
        assert_eq!(app.refresh_portrait(&mentions_other), REFRESH_OTHERS_MESSAGE);

        let own = MessageEvent::from_text("刷新立绘", "1", "Bob");
        assert_eq!(app.refresh_portrait(&own), REFRESH_OK_MESSAGE);
        assert!(PortraitCache::new(dir.path()).matte_path("1").exists());
        Ok(())
    }

    #[test]
    fn refresh_reports_generation_failure() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = PluginConfig {
            enable_character: true,
            gemini_api_keys: vec!["k".to_string()],
            ..PluginConfig::default()
        };
        let registry = registry("");
        let app = App::new(&cfg, dir.path(), services(&registry, &NoImages));
        let own = MessageEvent::from_text("刷新立绘", "1", "Bob");
        assert_eq!(app.refresh_portrait(&own), REFRESH_FAILED_MESSAGE);
        Ok(())
    }

    #[test]
    fn fallback_trigger_detection() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = PluginConfig::default();
        let registry = registry("");
        let app = App::new(&cfg, dir.path(), services(&registry, &NoImages));
        let routed_late = MessageEvent::from_json(
            r#"{"message": [{"type": "reply", "data": {"id": "1"}}, {"type": "text", "data": {"text": "*选项 3"}}]}"#,
        )?;
        assert!(app.accepts(&routed_late));
        assert!(!app.accepts(&MessageEvent::from_text("hello", "1", "")));
        Ok(())
    }
}
