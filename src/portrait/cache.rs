// src/portrait/cache.rs
use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

use super::data_url::DataUrl;
use super::matte::encode_png;

const CACHE_DIR: &str = "charactert";
const RAW_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// On-disk portrait cache: `<id>.<ext>` for the generated image and
/// `<id>-matte.png` for its chroma-keyed version
pub struct PortraitCache {
    dir: PathBuf,
}

impl PortraitCache {
    pub fn new(data_dir: &Path) -> Self {
        let dir = data_dir.join(CACHE_DIR);
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("Failed to create portrait cache {}: {}", dir.display(), e);
        }
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First existing raw file for `id`, or the PNG path when none exists
    pub fn raw_path(&self, id: &str) -> PathBuf {
        RAW_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{id}.{ext}")))
            .find(|path| path.exists())
            .unwrap_or_else(|| self.dir.join(format!("{id}.png")))
    }

    pub fn matte_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}-matte.png"))
    }

    pub fn load_matte(&self, id: &str) -> Option<DataUrl> {
        let path = self.matte_path(id);
        if !path.exists() {
            return None;
        }
        match fs::read(&path) {
            Ok(bytes) => Some(DataUrl::png(bytes)),
            Err(e) => {
                debug!("Failed to read matte cache {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn load_raw(&self, id: &str) -> Option<DataUrl> {
        let path = self.raw_path(id);
        if !path.exists() {
            return None;
        }
        DataUrl::from_file(&path, "image/png")
            .map_err(|e| debug!("Failed to read portrait cache {}: {}", path.display(), e))
            .ok()
    }

    /// Re-encode `image` as RGBA PNG and store it as the raw or matte entry
    pub fn save(&self, image: &DataUrl, id: &str, as_matte: bool) -> Result<PathBuf> {
        let decoded = image::load_from_memory(&image.bytes)
            .context("Failed to decode portrait for caching")?
            .to_rgba8();
        let png = encode_png(decoded)?;
        let path = if as_matte {
            self.matte_path(id)
        } else {
            self.dir.join(format!("{id}.png"))
        };
        fs::write(&path, png).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn remove_raw(&self, id: &str) {
        let path = self.raw_path(id);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                debug!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn tiny_png() -> DataUrl {
        let image = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        DataUrl::png(encode_png(image).unwrap())
    }

    #[test]
    fn raw_path_prefers_existing_extension() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = PortraitCache::new(dir.path());
        assert_eq!(cache.raw_path("42"), cache.dir().join("42.png"));

        fs::write(cache.dir().join("42.webp"), b"x")?;
        assert_eq!(cache.raw_path("42"), cache.dir().join("42.webp"));

        fs::write(cache.dir().join("42.jpg"), b"x")?;
        assert_eq!(cache.raw_path("42"), cache.dir().join("42.jpg"));
        Ok(())
    }

    #[test]
    fn save_and_load_matte() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = PortraitCache::new(dir.path());
        assert!(cache.load_matte("7").is_none());

        let path = cache.save(&tiny_png(), "7", true)?;
        assert_eq!(path, cache.matte_path("7"));
        let loaded = cache.load_matte("7").expect("matte cached");
        assert!(loaded.is_png());
        assert!(cache.load_raw("7").is_none());
        Ok(())
    }

    #[test]
    fn raw_entry_is_png_and_removable() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = PortraitCache::new(dir.path());
        cache.save(&tiny_png(), "9", false)?;
        let raw = cache.load_raw("9").expect("raw cached");
        assert_eq!(raw.mime, "image/png");

        cache.remove_raw("9");
        assert!(cache.load_raw("9").is_none());
        Ok(())
    }

    #[test]
    fn saving_garbage_fails() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = PortraitCache::new(dir.path());
        let garbage = DataUrl::png(b"nope".to_vec());
        assert!(cache.save(&garbage, "1", false).is_err());
        Ok(())
    }
}
