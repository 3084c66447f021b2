// src/portrait/mod.rs
pub mod avatar;
pub mod cache;
pub mod data_url;
pub mod gemini;
pub mod matte;

use anyhow::Result;
use log::{error, info};

use crate::config::PluginConfig;
use avatar::ImageFetcher;
use cache::PortraitCache;
use data_url::DataUrl;
use gemini::PortraitGenerator;
use matte::{matte_bytes, ChromaKeySpec};

/// A portrait ready for the scene, with whether it carries real transparency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Portrait {
    pub image: DataUrl,
    pub transparent: bool,
}

/// Chroma-key `source`, caching the result as the matte entry for `id`.
///
/// On any failure the unmodified source comes back, flagged transparent only
/// when it already is a PNG.
pub fn matte_with_fallback(
    source: DataUrl,
    spec: Option<&ChromaKeySpec>,
    cache: &PortraitCache,
    id: &str,
) -> Portrait {
    let Some(spec) = spec else {
        let transparent = source.is_png();
        return Portrait {
            image: source,
            transparent,
        };
    };
    match matte_bytes(&source.bytes, spec) {
        Ok(png) => {
            let image = DataUrl::png(png);
            if let Err(e) = cache.save(&image, id, true) {
                error!("Failed to cache matte for {}: {:#}", id, e);
            }
            Portrait {
                image,
                transparent: true,
            }
        }
        Err(e) => {
            error!("Chroma key failed, using unmodified portrait: {}", e);
            let transparent = source.is_png();
            Portrait {
                image: source,
                transparent,
            }
        }
    }
}

/// Finds or generates the character portrait for a chat user
pub struct PortraitService<'a> {
    cfg: &'a PluginConfig,
    cache: PortraitCache,
    fetcher: &'a dyn ImageFetcher,
    generator: &'a dyn PortraitGenerator,
}

impl<'a> PortraitService<'a> {
    pub fn new(
        cfg: &'a PluginConfig,
        cache: PortraitCache,
        fetcher: &'a dyn ImageFetcher,
        generator: &'a dyn PortraitGenerator,
    ) -> Self {
        Self {
            cfg,
            cache,
            fetcher,
            generator,
        }
    }

    fn chroma_spec(&self) -> Option<ChromaKeySpec> {
        match ChromaKeySpec::from_hex(&self.cfg.chroma_bg_color, self.cfg.chroma_tolerance) {
            Ok(spec) => Some(spec),
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }

    fn prompt_for(&self, name: &str) -> String {
        format!(
            "{}\n背景：{} 纯色背景，人物完整半身像，无遮挡。",
            self.cfg.character_prompt.replace("{name}", name),
            self.cfg.chroma_bg_color
        )
    }

    /// Portrait for `id`, or `None` when disabled or when download or
    /// generation failed. Network errors are logged, never returned.
    ///
    /// Without `force_refresh` the matte cache is used first, then a cached raw
    /// image (keyed on the spot). Fresh images are cached raw, keyed, and the
    /// raw file is removed afterwards.
    pub fn portrait(
        &self,
        name: &str,
        avatar_url: &str,
        id: &str,
        force_refresh: bool,
    ) -> Result<Option<Portrait>> {
        if !self.cfg.enable_character {
            info!("Character portraits disabled, skipping");
            return Ok(None);
        }

        if force_refresh {
            info!("Force refresh for {} in {}", id, self.cache.dir().display());
        } else {
            if let Some(image) = self.cache.load_matte(id) {
                info!("Matte cache hit: {}", self.cache.matte_path(id).display());
                return Ok(Some(Portrait {
                    image,
                    transparent: true,
                }));
            }
            if let Some(raw) = self.cache.load_raw(id) {
                info!(
                    "Raw portrait cache hit for {} (png={}), keying now",
                    id,
                    raw.is_png()
                );
                let spec = self.chroma_spec();
                return Ok(Some(matte_with_fallback(raw, spec.as_ref(), &self.cache, id)));
            }
        }

        if self.cfg.gemini_api_keys.is_empty() {
            error!("No Gemini API key configured, cannot generate portrait");
            return Ok(None);
        }

        let reference = match self.fetcher.fetch(avatar_url) {
            Ok(Some(reference)) => reference,
            Ok(None) => {
                error!("Avatar download failed, skipping portrait generation");
                return Ok(None);
            }
            Err(e) => {
                error!("Avatar download error, skipping portrait generation: {:#}", e);
                return Ok(None);
            }
        };

        let generated = match self.generator.generate(&self.prompt_for(name), &reference) {
            Ok(Some(generated)) => generated,
            Ok(None) => return Ok(None),
            Err(e) => {
                error!("Portrait generation error: {:#}", e);
                return Ok(None);
            }
        };

        if let Err(e) = self.cache.save(&generated, id, false) {
            error!("Failed to cache raw portrait for {}: {:#}", id, e);
        }
        let spec = self.chroma_spec();
        let portrait = matte_with_fallback(generated, spec.as_ref(), &self.cache, id);
        self.cache.remove_raw(id);
        Ok(Some(Portrait {
            transparent: true,
            ..portrait
        }))
    }
}
