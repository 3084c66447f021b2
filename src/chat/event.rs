// src/chat/event.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::io::Read;
use std::path::Path;

/// One OneBot v11 message segment, e.g. `{"type": "text", "data": {"text": "hi"}}`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Segment {
    pub fn new(kind: &str, data: Map<String, Value>) -> Self {
        Self {
            kind: kind.to_string(),
            data,
        }
    }

    pub fn text(text: &str) -> Self {
        let mut data = Map::new();
        data.insert("text".to_string(), Value::String(text.to_string()));
        Self::new("text", data)
    }

    /// A data member as a string, accepting numbers as well
    pub fn field(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        if self.kind != "text" {
            return None;
        }
        self.data.get("text").and_then(Value::as_str)
    }

    /// Replied-to message id of a `reply` segment
    pub fn reply_id(&self) -> Option<String> {
        if self.kind != "reply" {
            return None;
        }
        self.field("id").or_else(|| self.field("message_id"))
    }

    /// Mentioned user of an `at` segment, ignoring `@all`
    pub fn at_target(&self) -> Option<String> {
        if self.kind != "at" {
            return None;
        }
        self.field("qq").filter(|qq| qq != "all")
    }
}

/// Message content: a segment array, or a raw string with CQ codes
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Segments(Vec<Segment>),
    Raw(String),
}

impl Default for MessageBody {
    fn default() -> Self {
        MessageBody::Segments(Vec::new())
    }
}

impl MessageBody {
    pub fn segments(&self) -> Vec<Segment> {
        match self {
            MessageBody::Segments(segments) => segments.clone(),
            MessageBody::Raw(raw) => parse_cq(raw),
        }
    }

    /// Text segments joined together, without trimming
    pub fn plain_text(&self) -> String {
        self.segments()
            .iter()
            .filter_map(Segment::text_content)
            .collect()
    }

    pub fn reply_id(&self) -> Option<String> {
        self.segments().iter().find_map(Segment::reply_id)
    }

    /// First non-`all` mention with its display name when the segment has one
    pub fn first_at(&self) -> Option<(String, Option<String>)> {
        self.segments().iter().find_map(|segment| {
            segment
                .at_target()
                .map(|qq| (qq, segment.field("name")))
        })
    }
}

/// Sender block of an event or of a fetched message
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Sender {
    #[serde(default, deserialize_with = "optional_id")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub uid: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub uin: Option<String>,
    #[serde(default)]
    pub card: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub nick: Option<String>,
}

fn first_non_empty(candidates: [&Option<String>; 3]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.is_empty())
        .cloned()
}

impl Sender {
    pub fn id(&self) -> Option<String> {
        first_non_empty([&self.user_id, &self.uid, &self.uin])
    }

    /// Group card, then nickname
    pub fn name(&self) -> Option<String> {
        first_non_empty([&self.card, &self.nickname, &self.nick])
    }
}

/// A OneBot v11 message event as delivered to the bot
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(default, deserialize_with = "optional_id")]
    pub self_id: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub message: MessageBody,
    #[serde(default)]
    pub sender: Sender,
    /// Adapter that delivered the event; plain OneBot JSON has none
    #[serde(default)]
    pub platform: Option<String>,
}

/// Adapter name of OneBot v11 (go-cqhttp, NapCat, Lagrange ...)
pub const ONEBOT_PLATFORM: &str = "aiocqhttp";

impl MessageEvent {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Invalid OneBot message event")
    }

    /// Read an event from a file, or from stdin when `path` is `-`
    pub fn load(path: &Path) -> Result<Self> {
        let raw = if path.as_os_str() == "-" {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        } else {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read event {}", path.display()))?
        };
        Self::from_json(&raw)
    }

    /// Event for plain text typed on the command line
    pub fn from_text(text: &str, user_id: &str, name: &str) -> Self {
        Self {
            self_id: None,
            user_id: Some(user_id.to_string()),
            message: MessageBody::Segments(vec![Segment::text(text)]),
            sender: Sender {
                user_id: Some(user_id.to_string()),
                nickname: Some(name.to_string()).filter(|n| !n.is_empty()),
                ..Sender::default()
            },
            platform: None,
        }
    }

    /// Whether replied-to messages can be fetched with OneBot `get_msg`
    pub fn supports_get_msg(&self) -> bool {
        match self.platform.as_deref() {
            None => true,
            Some(platform) => platform == ONEBOT_PLATFORM,
        }
    }

    pub fn message_str(&self) -> String {
        self.message.plain_text().trim().to_string()
    }

    pub fn sender_id(&self) -> String {
        self.sender
            .id()
            .or_else(|| self.user_id.clone())
            .unwrap_or_default()
    }

    pub fn sender_name(&self) -> Option<String> {
        self.sender.name()
    }
}

fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn unescape_cq(text: &str) -> String {
    text.replace("&#91;", "[")
        .replace("&#93;", "]")
        .replace("&#44;", ",")
        .replace("&amp;", "&")
}

/// Split a CQ-coded string like `[CQ:reply,id=1]hi` into segments
pub fn parse_cq(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = raw;
    while !rest.is_empty() {
        let Some(start) = rest.find("[CQ:") else {
            segments.push(Segment::text(&unescape_cq(rest)));
            break;
        };
        if start > 0 {
            segments.push(Segment::text(&unescape_cq(&rest[..start])));
        }
        let Some(len) = rest[start..].find(']') else {
            segments.push(Segment::text(&unescape_cq(&rest[start..])));
            break;
        };
        let code = &rest[start + 4..start + len];
        let mut parts = code.split(',');
        let kind = parts.next().unwrap_or_default();
        let data = parts
            .filter_map(|part| part.split_once('='))
            .map(|(k, v)| (k.to_string(), Value::String(unescape_cq(v))))
            .collect();
        segments.push(Segment::new(kind, data));
        rest = &rest[start + len + 1..];
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_segment_array_event() -> Result<()> {
        let event = MessageEvent::from_json(
            r#"{
                "post_type": "message",
                "self_id": 10001,
                "user_id": 20002,
                "message": [
                    {"type": "reply", "data": {"id": "-12345"}},
                    {"type": "at", "data": {"qq": "all"}},
                    {"type": "at", "data": {"qq": 30003, "name": "Carol"}},
                    {"type": "text", "data": {"text": " /gal 4 "}}
                ],
                "sender": {"user_id": 20002, "nickname": "Bob", "card": ""}
            }"#,
        )?;
        assert_eq!(event.self_id.as_deref(), Some("10001"));
        assert_eq!(event.message_str(), "/gal 4");
        assert_eq!(event.message.reply_id().as_deref(), Some("-12345"));
        assert_eq!(
            event.message.first_at(),
            Some(("30003".to_string(), Some("Carol".to_string())))
        );
        assert_eq!(event.sender_id(), "20002");
        assert_eq!(event.sender_name().as_deref(), Some("Bob"));
        Ok(())
    }

    #[test]
    fn parses_cq_string_event() -> Result<()> {
        let event = MessageEvent::from_json(
            r#"{"user_id": "5", "message": "[CQ:reply,id=77][CQ:at,qq=8] 选项 &#91;x&#93;"}"#,
        )?;
        assert_eq!(event.message.reply_id().as_deref(), Some("77"));
        assert_eq!(event.message.first_at().map(|(qq, _)| qq).as_deref(), Some("8"));
        assert_eq!(event.message_str(), "选项 [x]");
        assert_eq!(event.sender_id(), "5");
        Ok(())
    }

    #[test]
    fn unterminated_cq_code_is_text() {
        let segments = parse_cq("hi [CQ:at,qq=1");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].text_content(), Some("[CQ:at,qq=1"));
    }

    #[test]
    fn sender_name_prefers_card_over_nickname() {
        let sender = Sender {
            card: Some("Card".to_string()),
            nickname: Some("Nick".to_string()),
            ..Sender::default()
        };
        assert_eq!(sender.name().as_deref(), Some("Card"));
        let sender = Sender {
            card: Some(String::new()),
            nick: Some("n".to_string()),
            ..Sender::default()
        };
        assert_eq!(sender.name().as_deref(), Some("n"));
    }

    #[test]
    fn only_onebot_events_support_get_msg() -> Result<()> {
        assert!(MessageEvent::from_json(r#"{"message": "x"}"#)?.supports_get_msg());
        assert!(MessageEvent::from_json(r#"{"message": "x", "platform": "aiocqhttp"}"#)?.supports_get_msg());
        assert!(!MessageEvent::from_json(r#"{"message": "x", "platform": "telegram"}"#)?.supports_get_msg());
        Ok(())
    }

    #[test]
    fn reply_segment_accepts_message_id_key() {
        let mut data = Map::new();
        data.insert("message_id".to_string(), Value::from(42));
        assert_eq!(Segment::new("reply", data).reply_id().as_deref(), Some("42"));
    }
}
