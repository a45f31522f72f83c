//! AI-assisted memory extraction.
//!
//! Conversations are flattened and chunked to fit the model's context
//! window; each chunk becomes one generation request asking for a JSON
//! array of memory candidates. A failed chunk degrades to zero memories
//! from that chunk, never to a failed extraction.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::MemoryCandidate;
use crate::llm::provider::{LlmParams, LlmProvider, Message as LlmMessage};
use crate::types::{Conversation, MemoryType};

/// Messages per chunk, tuned for a ~8k-token context budget.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Pause between chunk requests to stay under upstream rate limits.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_secs(1);

const CONTENT_MIN_LEN: usize = 10;
const CONTENT_MAX_LEN: usize = 500;

const EXTRACTION_PROMPT: &str = concat!(
    "You are a memory extraction assistant. Analyze the conversation transcript ",
    "and extract facts worth remembering about the user for future conversations.\n\n",
    "Extract things like:\n",
    "- Personal details (name, age, where they live, what they do)\n",
    "- Preferences, tastes and interests\n",
    "- Experiences, events, trips and plans\n",
    "- Ongoing situations or context (projects, relationships)\n\n",
    "For each memory, return an object with these fields:\n",
    "- \"content\": one self-contained sentence about the user (10-500 characters)\n",
    "- \"type\": one of \"fact\", \"preference\", \"experience\", \"context\"\n",
    "- \"importance_score\": 0.0-1.0 (1.0 = critical personal info)\n",
    "- \"category\": optional short topic tag (e.g. \"music\", \"work\")\n\n",
    "Respond with ONLY a JSON array of such objects. If nothing is worth ",
    "remembering, respond with [].\n",
    "IMPORTANT: Output ONLY the JSON array, no explanation or markdown."
);

/// Raw candidate as the model returns it, before validation.
#[derive(Debug, serde::Deserialize)]
struct RawCandidate {
    content: String,
    #[serde(rename = "type")]
    memory_type: String,
    importance_score: f64,
    #[serde(default)]
    category: Option<String>,
}

/// Extract memories from conversations with chunked LLM calls.
pub async fn extract_with_ai(
    provider: Arc<dyn LlmProvider>,
    conversations: &[Conversation],
    chunk_size: usize,
    chunk_delay: Duration,
) -> Vec<MemoryCandidate> {
    let lines: Vec<String> = conversations
        .iter()
        .flat_map(|c| c.messages.iter())
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let chunk_count = lines.len().div_ceil(chunk_size);
    info!(
        "AI extraction: {} messages in {} chunk(s)",
        lines.len(),
        chunk_count
    );

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for (idx, chunk) in lines.chunks(chunk_size).enumerate() {
        if idx > 0 {
            tokio::time::sleep(chunk_delay).await;
        }

        let messages = vec![
            LlmMessage::system(EXTRACTION_PROMPT),
            LlmMessage::user(format!("Transcript:\n\n{}", chunk.join("\n"))),
        ];
        let params = LlmParams {
            temperature: Some(0.2),
            ..Default::default()
        };

        let response = match provider.chat(messages, Some(params)).await {
            Ok(r) => r,
            Err(e) => {
                warn!("AI extraction chunk {}/{} failed, skipping: {}", idx + 1, chunk_count, e);
                continue;
            }
        };

        for candidate in parse_candidates(&response) {
            let key = candidate.content.trim().to_lowercase();
            if seen.insert(key) {
                out.push(candidate);
            }
        }
    }

    info!("AI extraction produced {} candidate(s)", out.len());
    out
}

/// Parse one chunk response, dropping invalid candidates silently;
/// they are expected noise, not errors.
pub fn parse_candidates(response: &str) -> Vec<MemoryCandidate> {
    let json_str = strip_code_fences(response);
    let raw: Vec<RawCandidate> = match serde_json::from_str(json_str) {
        Ok(items) => items,
        Err(e) => {
            let preview: String = response.chars().take(200).collect();
            warn!("Unparseable extraction response: {}. Raw: {}", e, preview);
            return Vec::new();
        }
    };

    raw.into_iter()
        .filter_map(|r| {
            let content = r.content.trim().to_string();
            if content.len() < CONTENT_MIN_LEN || content.len() > CONTENT_MAX_LEN {
                return None;
            }
            let memory_type = MemoryType::parse(&r.memory_type)?;
            if !(0.0..=1.0).contains(&r.importance_score) {
                return None;
            }
            Some(MemoryCandidate {
                content,
                memory_type,
                importance: r.importance_score,
                category: r.category.filter(|c| !c.trim().is_empty()),
                tags: Vec::new(),
            })
        })
        .collect()
}

/// Strip markdown code fences if present.
pub fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_json() {
        assert_eq!(strip_code_fences("```json\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("  [] "), "[]");
    }

    #[test]
    fn parses_valid_candidates() {
        let resp = r#"[
            {"content": "User's name is Alex", "type": "fact", "importance_score": 0.95},
            {"content": "User loves live jazz music", "type": "preference",
             "importance_score": 0.6, "category": "music"}
        ]"#;
        let got = parse_candidates(resp);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].memory_type, MemoryType::Fact);
        assert_eq!(got[1].category.as_deref(), Some("music"));
    }

    #[test]
    fn rejects_out_of_bounds_candidates() {
        let long = "x".repeat(600);
        let resp = format!(
            r#"[
            {{"content": "too short", "type": "fact", "importance_score": 0.5}},
            {{"content": "{}", "type": "fact", "importance_score": 0.5}},
            {{"content": "User's score is out of range", "type": "fact", "importance_score": 1.5}},
            {{"content": "User's type is made up here", "type": "opinion", "importance_score": 0.5}},
            {{"content": "User lives in Berlin these days", "type": "fact", "importance_score": 0.8}}
        ]"#,
            long
        );
        let got = parse_candidates(&resp);
        assert_eq!(got.len(), 1);
        assert!(got[0].content.contains("Berlin"));
    }

    #[test]
    fn garbage_response_yields_nothing() {
        assert!(parse_candidates("Sorry, I can't do that.").is_empty());
        assert!(parse_candidates("").is_empty());
    }

    #[test]
    fn multibyte_garbage_is_logged_without_panicking() {
        // A multibyte char straddling the 200-byte mark must not split the
        // preview slice mid-character.
        let _ = tracing_subscriber::fmt().try_init();
        let resp = format!("{}é and then some trailing prose", "x".repeat(199));
        assert!(parse_candidates(&resp).is_empty());
    }

    #[tokio::test]
    async fn failed_chunks_are_skipped_not_fatal() {
        use crate::types::{Conversation, Message, Role};
        use async_trait::async_trait;

        struct FailingProvider;
        #[async_trait]
        impl LlmProvider for FailingProvider {
            async fn chat(
                &self,
                _messages: Vec<LlmMessage>,
                _options: Option<LlmParams>,
            ) -> Result<String, String> {
                Err("boom".to_string())
            }
            fn id(&self) -> &str {
                "failing"
            }
        }

        let conv = Conversation::from_messages(
            vec![Message::new(Role::User, "my name is Alex")],
            None,
            "u1",
        );
        let got = extract_with_ai(
            Arc::new(FailingProvider),
            &[conv],
            10,
            Duration::from_millis(0),
        )
        .await;
        assert!(got.is_empty());
    }
}
