// src/chat/quote.rs
use log::debug;

use super::command::strip_command;
use super::event::{MessageBody, MessageEvent};
use super::onebot::{FetchedMessage, MessageLookup};
use crate::config::PluginConfig;

fn fetch_reply(event: &MessageEvent, lookup: Option<&dyn MessageLookup>) -> Option<FetchedMessage> {
    let lookup = lookup?;
    if !event.supports_get_msg() {
        debug!("Platform {:?} has no get_msg, ignoring reply", event.platform);
        return None;
    }
    let reply_id = event.message.reply_id()?;
    let Ok(message_id) = reply_id.parse::<i64>() else {
        debug!("Reply id {} is not numeric, skipping get_msg", reply_id);
        return None;
    };
    debug!("Detected reply id={}, calling get_msg", message_id);
    match lookup.get_msg(message_id) {
        Ok(message) => Some(message),
        Err(e) => {
            debug!("get_msg failed: {:#}", e);
            None
        }
    }
}

/// Text to base the options on: inline text after the command, else the text
/// of the replied-to message, else empty
pub fn extract_quoted_text(event: &MessageEvent, lookup: Option<&dyn MessageLookup>) -> String {
    let inline = strip_command(&event.message_str());
    if !inline.is_empty() {
        debug!("Using inline text as base text, len={}", inline.chars().count());
        return inline;
    }

    let Some(fetched) = fetch_reply(event, lookup) else {
        return String::new();
    };
    let text = match &fetched.message {
        MessageBody::Segments(_) => fetched.message.plain_text(),
        MessageBody::Raw(raw) => raw.clone(),
    };
    let text = text.trim().to_string();
    if !text.is_empty() {
        debug!("Got quoted text from get_msg, len={}", text.chars().count());
    }
    text
}

/// Who the scene is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
}

impl Target {
    pub fn display(&self) -> String {
        format!("{} ({})", self.name, self.id)
    }
}

/// The replied-to author (or, when that is the bot itself, the first person it
/// mentioned), else the first person mentioned in the event, else the sender
pub fn resolve_target(
    event: &MessageEvent,
    lookup: Option<&dyn MessageLookup>,
    cfg: &PluginConfig,
) -> Target {
    let mut found: Option<(String, Option<String>)> = None;

    if let Some(fetched) = fetch_reply(event, lookup) {
        let mut uid = fetched.sender.id();
        let mut nick = fetched.sender.name();
        let replied_to_bot = matches!((&uid, &event.self_id), (Some(u), Some(s)) if u == s);
        if replied_to_bot {
            if let Some((qq, name)) = fetched.message.first_at() {
                uid = Some(qq);
                nick = name;
            }
        }
        found = uid.map(|id| (id, nick));
    }

    if found.is_none() {
        found = event.message.first_at();
    }

    let (id, name) = match found {
        Some((id, name)) => {
            let name = name.unwrap_or_else(|| id.clone());
            (id, name)
        }
        None => {
            let id = event.sender_id();
            let name = event.sender_name().unwrap_or_else(|| id.clone());
            (id, name)
        }
    };

    Target {
        avatar_url: cfg.avatar_url_for(&id),
        id,
        name,
    }
}
