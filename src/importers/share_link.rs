//! Share-link import: fetch a public share page and recover the
//! conversation from untrusted HTML.
//!
//! Extraction order: embedded JSON state blobs first (reliable when
//! present), then stripped page text with alternating-speaker inference.
//! The alternating heuristic is a last resort and is wrong whenever the
//! page does not alternate strictly; callers surface the result as
//! best-effort extracted text, never as trusted structure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::EngineError;
use crate::importers::MIN_CONTENT_LEN;
use crate::types::{Message, Role};

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLinkImport {
    pub extracted_text: String,
    pub detected_platform: String,
    #[serde(skip)]
    pub messages: Vec<Message>,
}

static SCRIPT_BLOCKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").unwrap());
static NEXT_DATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*id="__NEXT_DATA__"[^>]*>(.*?)</script>"#).unwrap()
});
static STATE_BLOB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)window\.__INITIAL_STATE__\s*=\s*(\{.*?\})\s*;").unwrap()
});
static BLOCK_BREAKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(p|div|h[1-6]|li|section|article)>|<br\s*/?>").unwrap());
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

pub fn detect_platform(url: &str) -> &'static str {
    let u = url.to_lowercase();
    if u.contains("chat.openai.com") || u.contains("chatgpt.com") {
        "chatgpt"
    } else if u.contains("grok.com") || u.contains("x.com/i/grok") {
        "grok"
    } else if u.contains("claude.ai") {
        "claude"
    } else {
        "unknown"
    }
}

/// Fetch a share page and extract its conversation text.
pub async fn import_from_share_link(
    client: &reqwest::Client,
    url: &str,
    platform_hint: Option<&str>,
) -> Result<ShareLinkImport, EngineError> {
    let platform = platform_hint
        .map(str::to_string)
        .unwrap_or_else(|| detect_platform(url).to_string());

    let response = client
        .get(url)
        .header(
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
        )
        .send()
        .await
        .map_err(|e| EngineError::ShareLinkFetch(format!("request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(EngineError::ShareLinkFetch(format!(
            "the page returned HTTP {}, make sure the link is publicly accessible",
            response.status()
        )));
    }

    let html = response
        .text()
        .await
        .map_err(|e| EngineError::ShareLinkFetch(format!("could not read page body: {}", e)))?;

    extract_from_html(&html, &platform)
}

/// Pure extraction half, separated from the fetch for testability.
pub fn extract_from_html(html: &str, platform: &str) -> Result<ShareLinkImport, EngineError> {
    // Structured data first
    if let Some(messages) = extract_embedded_messages(html) {
        if !messages.is_empty() {
            let text = messages
                .iter()
                .map(|m| format!("{}: {}", m.role.as_str(), m.content))
                .collect::<Vec<_>>()
                .join("\n\n");
            return Ok(ShareLinkImport {
                extracted_text: text,
                detected_platform: platform.to_string(),
                messages,
            });
        }
    }

    // Fall back to naive text extraction
    let text = strip_html(html);
    if text.len() < MIN_CONTENT_LEN {
        return Err(EngineError::ShareLinkFetch(
            "no conversation content found on the page, make sure the link is publicly accessible"
                .to_string(),
        ));
    }
    let messages = infer_alternating_messages(&text);
    Ok(ShareLinkImport {
        extracted_text: text,
        detected_platform: platform.to_string(),
        messages,
    })
}

/// Look for embedded JSON state (`__NEXT_DATA__`, `__INITIAL_STATE__`)
/// and hunt it for anything shaped like a message list.
fn extract_embedded_messages(html: &str) -> Option<Vec<Message>> {
    let blob = NEXT_DATA
        .captures(html)
        .or_else(|| STATE_BLOB.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())?;
    let value: Value = serde_json::from_str(blob.trim()).ok()?;
    let mut found = Vec::new();
    find_message_arrays(&value, &mut found);
    if found.is_empty() {
        None
    } else {
        Some(found)
    }
}

/// Recursive hunt for arrays of `{role|sender|author, content|text}` objects.
fn find_message_arrays(value: &Value, out: &mut Vec<Message>) {
    match value {
        Value::Array(items) => {
            let parsed: Vec<Message> = items.iter().filter_map(message_from_value).collect();
            if parsed.len() >= 2 && parsed.len() == items.len() {
                out.extend(parsed);
                return;
            }
            for item in items {
                find_message_arrays(item, out);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                find_message_arrays(v, out);
            }
        }
        _ => {}
    }
}

fn message_from_value(v: &Value) -> Option<Message> {
    let obj = v.as_object()?;
    let role_str = obj
        .get("role")
        .or_else(|| obj.get("sender"))
        .and_then(|r| r.as_str())
        .or_else(|| v.pointer("/author/role").and_then(|r| r.as_str()))?;
    let role = match role_str.to_lowercase().as_str() {
        "user" | "human" => Role::User,
        "assistant" | "grok" | "model" => Role::Assistant,
        _ => return None,
    };
    let content = obj
        .get("content")
        .or_else(|| obj.get("text"))
        .and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Object(inner) => inner
                .get("parts")
                .and_then(|p| p.as_array())
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|p| p.as_str())
                        .collect::<Vec<_>>()
                        .join("\n")
                }),
            _ => None,
        })?;
    if content.trim().is_empty() {
        return None;
    }
    Some(Message::new(role, content))
}

/// Strip scripts, styles and tags; decode entities; normalize whitespace.
pub fn strip_html(html: &str) -> String {
    let no_scripts = SCRIPT_BLOCKS.replace_all(html, "");
    let with_breaks = BLOCK_BREAKS.replace_all(&no_scripts, "\n");
    let no_tags = TAGS.replace_all(&with_breaks, " ");
    let decoded = html_escape::decode_html_entities(&no_tags);
    let compact = SPACE_RUNS.replace_all(&decoded, " ");
    let lines: Vec<&str> = compact.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    BLANK_RUNS.replace_all(&joined, "\n\n").trim().to_string()
}

/// Last-resort heuristic: treat paragraph blocks as alternating speakers,
/// starting with the user. Known to be wrong for non-alternating pages.
pub fn infer_alternating_messages(text: &str) -> Vec<Message> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .enumerate()
        .map(|(i, block)| {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            Message::new(role, block)
        })
        .collect()
}
