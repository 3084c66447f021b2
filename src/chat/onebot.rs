// src/chat/onebot.rs
use anyhow::{anyhow, Result};
use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::event::{MessageBody, Sender};

/// A message fetched back from the platform by id
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchedMessage {
    #[serde(default)]
    pub message: MessageBody,
    #[serde(default)]
    pub sender: Sender,
}

/// Looks up earlier messages, e.g. the one a reply points at
pub trait MessageLookup {
    fn get_msg(&self, message_id: i64) -> Result<FetchedMessage>;
}

#[derive(Deserialize)]
struct ActionResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    retcode: i64,
    data: Option<FetchedMessage>,
}

/// OneBot v11 HTTP API client
pub struct OneBotClient {
    api_base: String,
    access_token: Option<String>,
    client: Client,
}

impl OneBotClient {
    pub fn new(api_base: &str, access_token: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token: access_token.map(str::to_string).filter(|t| !t.is_empty()),
            client,
        })
    }
}

impl MessageLookup for OneBotClient {
    fn get_msg(&self, message_id: i64) -> Result<FetchedMessage> {
        let url = format!("{}/get_msg", self.api_base);
        debug!("Calling {} for message {}", url, message_id);

        let mut request = self.client.post(&url).json(&json!({ "message_id": message_id }));
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let response = request.send()?;
        if !response.status().is_success() {
            return Err(anyhow!("get_msg returned HTTP {}", response.status()));
        }

        let body: ActionResponse = response.json()?;
        if body.status == "failed" || body.retcode != 0 {
            return Err(anyhow!("get_msg failed with retcode {}", body.retcode));
        }
        body.data.ok_or_else(|| anyhow!("get_msg returned no data"))
    }
}
