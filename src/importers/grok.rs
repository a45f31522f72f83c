//! Grok export parser.
//!
//! Grok shares arrive either as markdown (`## User` / `## Grok` headers)
//! or as a JSON message array from the X.AI export tooling. Markdown
//! carries no timestamps; message order is taken as chronological.

use chrono::Utc;
use serde_json::Value;

use super::{message_count, ImportParser, MIN_CONTENT_LEN};
use crate::error::EngineError;
use crate::types::{Conversation, ImportMetadata, ImportedData, Message, Role};

pub struct GrokParser;

impl ImportParser for GrokParser {
    fn name(&self) -> &'static str {
        "grok"
    }

    fn validate(&self, raw: &str) -> bool {
        let trimmed = raw.trim();
        if trimmed.contains("## User") && (trimmed.contains("## Grok") || trimmed.contains("## Assistant"))
        {
            return true;
        }
        // JSON shape: only claim it when a Grok marker is present, otherwise
        // generic message arrays belong to other parsers.
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            let text = value.to_string().to_lowercase();
            if text.contains("grok") || text.contains("x.ai") || text.contains("grok.com") {
                return extract_json_array(&value).is_some();
            }
        }
        false
    }

    fn parse(&self, raw: &str, user_id: &str) -> Result<ImportedData, EngineError> {
        let trimmed = raw.trim();
        let (messages, title) = if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            (parse_json_messages(&value)?, None)
        } else {
            parse_markdown(trimmed)
        };

        if messages.is_empty() {
            return Err(EngineError::EmptyExtraction(
                "no messages found in Grok export".to_string(),
            ));
        }
        let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
        if total_chars < MIN_CONTENT_LEN {
            return Err(EngineError::EmptyExtraction(
                "Grok export contains almost no text".to_string(),
            ));
        }

        let conv = Conversation::from_messages(messages, title, user_id);
        let mut data = ImportedData {
            conversations: vec![conv],
            memories: Vec::new(),
            inferred_personality: None,
            metadata: ImportMetadata {
                source: "grok".to_string(),
                export_date: Utc::now(),
                message_count: 0,
            },
        };
        data.metadata.message_count = message_count(&data);
        Ok(data)
    }
}

/// Walk the markdown line by line, flushing the accumulated message each
/// time a speaker header appears.
fn parse_markdown(raw: &str) -> (Vec<Message>, Option<String>) {
    let mut messages = Vec::new();
    let mut title = None;
    let mut current_role: Option<Role> = None;
    let mut buffer: Vec<&str> = Vec::new();

    let flush = |role: Option<Role>, buffer: &mut Vec<&str>, messages: &mut Vec<Message>| {
        if let Some(role) = role {
            let content = buffer.join("\n").trim().to_string();
            if !content.is_empty() {
                messages.push(Message::new(role, content));
            }
        }
        buffer.clear();
    };

    for line in raw.lines() {
        let l = line.trim();
        if let Some(t) = l.strip_prefix("# ") {
            if title.is_none() && current_role.is_none() {
                title = Some(t.trim().to_string());
                continue;
            }
        }
        if l.eq_ignore_ascii_case("## user") || l.eq_ignore_ascii_case("## human") {
            flush(current_role, &mut buffer, &mut messages);
            current_role = Some(Role::User);
        } else if l.eq_ignore_ascii_case("## grok") || l.eq_ignore_ascii_case("## assistant") {
            flush(current_role, &mut buffer, &mut messages);
            current_role = Some(Role::Assistant);
        } else {
            buffer.push(line);
        }
    }
    flush(current_role, &mut buffer, &mut messages);

    (messages, title)
}

fn extract_json_array(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("messages")
            .or_else(|| map.get("conversation"))
            .and_then(|v| v.as_array()),
        _ => None,
    }
}

fn parse_json_messages(value: &Value) -> Result<Vec<Message>, EngineError> {
    let items = extract_json_array(value).ok_or_else(|| {
        EngineError::MalformedExport("expected a Grok message array".to_string())
    })?;

    let mut out = Vec::new();
    for item in items {
        let role_str = item
            .get("role")
            .or_else(|| item.get("sender"))
            .and_then(|r| r.as_str())
            .unwrap_or("");
        let role = match role_str.to_lowercase().as_str() {
            "user" | "human" => Role::User,
            "assistant" | "grok" => Role::Assistant,
            _ => continue,
        };
        let content = item
            .get("content")
            .or_else(|| item.get("text"))
            .or_else(|| item.get("message"))
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();
        if content.trim().is_empty() {
            continue;
        }
        out.push(Message::new(role, content));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKDOWN: &str = "\
# Weekend plans

## User
I'm going to a concert on Saturday, really excited about it.

## Grok
That sounds fun! Who are you seeing?

## User
Arctic Monkeys, they're my favorite band.
";

    #[test]
    fn validates_markdown_markers() {
        assert!(GrokParser.validate(MARKDOWN));
        assert!(!GrokParser.validate("## User only, no reply header"));
        assert!(!GrokParser.validate("{\"messages\": []}"));
    }

    #[test]
    fn parses_markdown_headers_into_turns() {
        let data = GrokParser.parse(MARKDOWN, "u1").unwrap();
        let conv = &data.conversations[0];
        assert_eq!(conv.summary.as_deref(), Some("Weekend plans"));
        assert_eq!(conv.messages.len(), 3);
        assert_eq!(conv.messages[0].role, Role::User);
        assert_eq!(conv.messages[1].role, Role::Assistant);
        assert!(conv.messages[2].content.contains("Arctic Monkeys"));
    }

    #[test]
    fn parses_json_message_array() {
        let raw = serde_json::json!({
            "source": "grok.com",
            "messages": [
                {"role": "user", "content": "I live in Berlin and I love techno music"},
                {"role": "grok", "content": "Berlin is the right city for that!"}
            ]
        })
        .to_string();
        assert!(GrokParser.validate(&raw));
        let data = GrokParser.parse(&raw, "u1").unwrap();
        assert_eq!(data.conversations[0].messages.len(), 2);
        assert_eq!(data.conversations[0].messages[1].role, Role::Assistant);
    }

    #[test]
    fn near_empty_markdown_is_rejected() {
        let raw = "## User\nhi\n\n## Grok\nhey";
        let err = GrokParser.parse(raw, "u1").unwrap_err();
        assert!(matches!(err, EngineError::EmptyExtraction(_)));
    }
}
