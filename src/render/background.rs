// src/render/background.rs
use log::debug;
use rand::seq::SliceRandom;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".webp"];

fn is_image_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Image files directly inside `dir`, sorted by name
pub fn list_backgrounds(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read background dir {}: {}", dir.display(), e);
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(is_image_file)
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// A random background from `dir`, if it holds any
pub fn pick_background(dir: &Path) -> Option<PathBuf> {
    list_backgrounds(dir)
        .choose(&mut rand::thread_rng())
        .cloned()
}
