// src/ai/reply.rs
use serde_json::Value;

/// Where the text of a provider reply was found.
///
/// Providers answer in different shapes; decoding tries, in order, a `text`
/// field, a `content` field, a `result_chain.chain` of segments, and finally
/// the whole value coerced to a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyText {
    Text(String),
    Content(String),
    Chain(Vec<String>),
    Coerced(String),
}

impl ReplyText {
    pub fn decode(reply: &Value) -> Self {
        from_text_field(reply)
            .map(ReplyText::Text)
            .or_else(|| from_content_field(reply).map(ReplyText::Content))
            .or_else(|| from_result_chain(reply).map(ReplyText::Chain))
            .unwrap_or_else(|| ReplyText::Coerced(coerce(reply)))
    }

    pub fn into_text(self) -> String {
        match self {
            ReplyText::Text(text) | ReplyText::Content(text) | ReplyText::Coerced(text) => {
                text.trim().to_string()
            }
            ReplyText::Chain(parts) => parts.join("\n").trim().to_string(),
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

pub fn from_text_field(reply: &Value) -> Option<String> {
    reply.get("text").and_then(Value::as_str).and_then(non_empty)
}

/// `content` as a plain string, or as an array of parts with `text` members
pub fn from_content_field(reply: &Value) -> Option<String> {
    match reply.get("content")? {
        Value::String(text) => non_empty(text),
        Value::Array(parts) => {
            let joined: String = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            non_empty(&joined)
        }
        _ => None,
    }
}

pub fn from_result_chain(reply: &Value) -> Option<Vec<String>> {
    let chain = reply
        .get("result_chain")?
        .get("chain")?
        .as_array()?;
    let parts: Vec<String> = chain
        .iter()
        .filter_map(|segment| segment.get("text"))
        .map(|text| match text {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    let has_text = parts.iter().any(|part| !part.is_empty());
    if has_text {
        Some(parts)
    } else {
        None
    }
}

pub fn coerce(reply: &Value) -> String {
    match reply {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
