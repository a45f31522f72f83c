//! Claude export parser.
//!
//! The claude.ai export is a JSON array of conversations, each with a
//! `chat_messages` array whose entries use `sender: human|assistant` and
//! either a plain `text` field or a content-block list.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{message_count, ImportParser, MIN_CONTENT_LEN};
use crate::error::EngineError;
use crate::types::{Conversation, ImportMetadata, ImportedData, Message, Role};

pub struct ClaudeParser;

impl ImportParser for ClaudeParser {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn validate(&self, raw: &str) -> bool {
        let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
            return false;
        };
        conversation_items(&value)
            .map(|items| {
                items
                    .iter()
                    .any(|c| c.get("chat_messages").map(|m| m.is_array()).unwrap_or(false))
            })
            .unwrap_or(false)
    }

    fn parse(&self, raw: &str, user_id: &str) -> Result<ImportedData, EngineError> {
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|e| EngineError::MalformedExport(format!("invalid JSON: {}", e)))?;

        let items = conversation_items(&value).ok_or_else(|| {
            EngineError::MalformedExport("expected an array of conversations".to_string())
        })?;

        let mut conversations = Vec::new();
        for item in items {
            if let Some(conv) = parse_conversation(item, user_id) {
                conversations.push(conv);
            }
        }

        if conversations.is_empty() {
            return Err(EngineError::EmptyExtraction(
                "no conversations with messages found in export".to_string(),
            ));
        }
        let total_chars: usize = conversations
            .iter()
            .flat_map(|c| c.messages.iter())
            .map(|m| m.content.len())
            .sum();
        if total_chars < MIN_CONTENT_LEN {
            return Err(EngineError::EmptyExtraction(
                "export contains almost no text".to_string(),
            ));
        }

        let mut data = ImportedData {
            conversations,
            memories: Vec::new(),
            inferred_personality: None,
            metadata: ImportMetadata {
                source: "claude".to_string(),
                export_date: Utc::now(),
                message_count: 0,
            },
        };
        data.metadata.message_count = message_count(&data);
        Ok(data)
    }
}

fn conversation_items(value: &Value) -> Option<Vec<&Value>> {
    match value {
        Value::Array(items) => Some(items.iter().collect()),
        Value::Object(map) => {
            if map.contains_key("chat_messages") {
                Some(vec![value])
            } else {
                map.get("conversations")
                    .and_then(|c| c.as_array())
                    .map(|items| items.iter().collect())
            }
        }
        _ => None,
    }
}

fn parse_conversation(item: &Value, user_id: &str) -> Option<Conversation> {
    let title = item.get("name").and_then(|n| n.as_str()).map(String::from);
    let list = item.get("chat_messages")?.as_array()?;

    let mut messages = Vec::new();
    for msg in list {
        let role = match msg.get("sender").and_then(|s| s.as_str()) {
            Some("human") => Role::User,
            Some("assistant") => Role::Assistant,
            _ => continue,
        };
        let content = block_text(msg);
        if content.trim().is_empty() {
            continue;
        }
        messages.push(Message {
            role,
            content,
            timestamp: msg
                .get("created_at")
                .and_then(|t| t.as_str())
                .and_then(rfc3339),
        });
    }
    if messages.is_empty() {
        return None;
    }
    messages.sort_by_key(|m| m.timestamp.unwrap_or(DateTime::<Utc>::MIN_UTC));

    let mut conv = Conversation::from_messages(messages, title, user_id);
    if let Some(ts) = item.get("created_at").and_then(|t| t.as_str()).and_then(rfc3339) {
        conv.started_at = ts;
    }
    if let Some(ts) = item.get("updated_at").and_then(|t| t.as_str()).and_then(rfc3339) {
        conv.ended_at = Some(ts);
    }
    Some(conv)
}

/// Message text lives in `text`, or in a `content` list of
/// `{type: "text", text: "..."}` blocks on newer exports.
fn block_text(msg: &Value) -> String {
    if let Some(text) = msg.get("text").and_then(|t| t.as_str()) {
        return text.to_string();
    }
    msg.get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

fn rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
