//! ChatGPT export parser.
//!
//! The official export is a JSON array of conversation objects, each
//! carrying a `mapping` tree of message nodes (branches and edits live as
//! sibling nodes). The tree is flattened by sorting every user/assistant
//! node by creation time, deliberately not by walking child pointers,
//! since edit branches make any single path incomplete.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{message_count, ImportParser, MIN_CONTENT_LEN};
use crate::error::EngineError;
use crate::types::{Conversation, ImportMetadata, ImportedData, Message, Role};

pub struct ChatGptParser;

impl ImportParser for ChatGptParser {
    fn name(&self) -> &'static str {
        "chatgpt"
    }

    fn validate(&self, raw: &str) -> bool {
        let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
            return false;
        };
        match &value {
            Value::Array(items) => items
                .first()
                .map(|c| c.get("mapping").is_some() || c.get("title").is_some())
                .unwrap_or(false),
            Value::Object(map) => {
                map.contains_key("mapping")
                    || (map.contains_key("title") && map.contains_key("create_time"))
                    || map
                        .get("messages")
                        .map(|m| m.is_array())
                        .unwrap_or(false)
            }
            _ => false,
        }
    }

    fn parse(&self, raw: &str, user_id: &str) -> Result<ImportedData, EngineError> {
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|e| EngineError::MalformedExport(format!("invalid JSON: {}", e)))?;

        let items: Vec<&Value> = match &value {
            Value::Array(items) => items.iter().collect(),
            obj @ Value::Object(_) => vec![obj],
            _ => {
                return Err(EngineError::MalformedExport(
                    "expected a JSON object or array of conversations".to_string(),
                ))
            }
        };

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
                source: "chatgpt".to_string(),
                export_date: Utc::now(),
                message_count: 0,
            },
        };
        data.metadata.message_count = message_count(&data);
        Ok(data)
    }
}

fn parse_conversation(item: &Value, user_id: &str) -> Option<Conversation> {
    let title = item.get("title").and_then(|t| t.as_str()).map(String::from);

    let mut messages = if let Some(mapping) = item.get("mapping").and_then(|m| m.as_object()) {
        collect_mapping_messages(mapping)
    } else if let Some(list) = item.get("messages").and_then(|m| m.as_array()) {
        collect_plain_messages(list)
    } else {
        Vec::new()
    };

    if messages.is_empty() {
        return None;
    }

    // Chronological order; untimestamped messages keep their relative order
    // at the front.
    messages.sort_by_key(|m| m.timestamp.unwrap_or(DateTime::<Utc>::MIN_UTC));

    let mut conv = Conversation::from_messages(messages, title, user_id);
    if let Some(ts) = item.get("create_time").and_then(epoch_seconds) {
        conv.started_at = ts;
    }
    if let Some(ts) = item.get("update_time").and_then(epoch_seconds) {
        conv.ended_at = Some(ts);
    }
    Some(conv)
}

/// Pull user/assistant messages out of the mapping tree, timestamps attached.
fn collect_mapping_messages(mapping: &serde_json::Map<String, Value>) -> Vec<Message> {
    let mut out = Vec::new();
    for node in mapping.values() {
        let Some(msg) = node.get("message") else {
            continue;
        };
        let role = match msg.pointer("/author/role").and_then(|r| r.as_str()) {
            Some("user") => Role::User,
            Some("assistant") => Role::Assistant,
            _ => continue, // system/tool nodes are not conversation content
        };
        let content = extract_content_text(msg.get("content"));
        if content.trim().is_empty() {
            continue;
        }
        out.push(Message {
            role,
            content,
            timestamp: msg.get("create_time").and_then(epoch_seconds),
        });
    }
    out
}

/// Alternative export shape: a flat `messages` array.
fn collect_plain_messages(list: &[Value]) -> Vec<Message> {
    let mut out = Vec::new();
    for msg in list {
        let role_str = msg
            .get("role")
            .and_then(|r| r.as_str())
            .or_else(|| msg.pointer("/author/role").and_then(|r| r.as_str()));
        let role = match role_str {
            Some("user") => Role::User,
            Some("assistant") => Role::Assistant,
            _ => continue,
        };
        let content = match msg.get("content") {
            Some(Value::String(s)) => s.clone(),
            other => extract_content_text(other),
        };
        if content.trim().is_empty() {
            continue;
        }
        out.push(Message {
            role,
            content,
            timestamp: msg.get("create_time").and_then(epoch_seconds),
        });
    }
    out
}

/// `content` can be `{parts: [...]}` (strings or multimodal objects) or
/// `{text: "..."}` depending on export vintage.
fn extract_content_text(content: Option<&Value>) -> String {
    let Some(content) = content else {
        return String::new();
    };
    if let Some(parts) = content.get("parts").and_then(|p| p.as_array()) {
        return parts
            .iter()
            .filter_map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join("\n");
    }
    content
        .get("text")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string()
}

fn epoch_seconds(v: &Value) -> Option<DateTime<Utc>> {
    let secs = v.as_f64()?;
    DateTime::from_timestamp(secs as i64, ((secs.fract()) * 1e9) as u32)
}
