// src/portrait/data_url.rs
use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use std::fmt;
use std::path::Path;

/// An inline `data:<mime>;base64,<payload>` image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new("image/png", bytes)
    }

    /// Read a file, guessing the MIME type from its extension
    pub fn from_file(path: &Path, fallback_mime: &str) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mime = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(fallback_mime);
        Ok(Self::new(mime, bytes))
    }

    pub fn from_base64(mime: &str, payload: &str) -> Result<Self> {
        let bytes = general_purpose::STANDARD
            .decode(payload.trim().as_bytes())
            .context("Invalid base64 payload")?;
        Ok(Self::new(mime, bytes))
    }

    pub fn is_png(&self) -> bool {
        self.mime.contains("png")
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }
}

impl fmt::Display for DataUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime, self.to_base64())
    }
}
