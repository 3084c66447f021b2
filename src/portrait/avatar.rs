// src/portrait/avatar.rs
use anyhow::Result;
use log::{info, warn};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

use super::data_url::DataUrl;

/// Downloads reference images (avatars) by URL
pub trait ImageFetcher {
    /// `Ok(None)` when the server answered but had no image for us
    fn fetch(&self, url: &str) -> Result<Option<DataUrl>>;
}

pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self { client })
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: &str) -> Result<Option<DataUrl>> {
        info!("Downloading reference image from {}", url);
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            warn!("Image download returned status {}", response.status());
            return Ok(None);
        }
        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response.bytes()?.to_vec();
        Ok(Some(DataUrl::new(mime, bytes)))
    }
}
