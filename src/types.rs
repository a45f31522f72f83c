//! Canonical data model shared by the import, extraction and retrieval layers.
//!
//! Parsers normalize every source format into these shapes; everything
//! downstream (extractors, merge, persistence, retrieval) only ever sees
//! this model, never the raw export structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat turn. Immutable once created; ordering within a
/// conversation is chronological.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    #[default]
    Private,
    Shared,
}

/// One imported thread or live chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// Filled in by the import pipeline once the owning agent is known.
    pub agent_id: String,
    pub user_id: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub privacy: PrivacyLevel,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// New conversation shell with ids generated and timestamps derived
    /// from the message list (falling back to now).
    pub fn from_messages(
        messages: Vec<Message>,
        summary: Option<String>,
        user_id: &str,
    ) -> Self {
        let started_at = messages
            .iter()
            .filter_map(|m| m.timestamp)
            .min()
            .unwrap_or_else(Utc::now);
        let ended_at = messages.iter().filter_map(|m| m.timestamp).max();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: String::new(),
            user_id: user_id.to_string(),
            messages,
            summary,
            themes: Vec::new(),
            privacy: PrivacyLevel::Private,
            started_at,
            ended_at,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Fact,
    Preference,
    Experience,
    Context,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Preference => "preference",
            MemoryType::Experience => "experience",
            MemoryType::Context => "context",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fact" => Some(MemoryType::Fact),
            "preference" => Some(MemoryType::Preference),
            "experience" => Some(MemoryType::Experience),
            "context" => Some(MemoryType::Context),
            _ => None,
        }
    }
}

/// A typed, scored, persisted atomic fact about the user. Never mutated
/// after creation except for `last_mentioned` bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub memory_type: MemoryType,
    pub content: String,
    pub importance_score: f64,
    #[serde(default)]
    pub privacy: PrivacyLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_mentioned: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    #[default]
    Personal,
    Shared,
}

/// Six-axis personality mood, each slider 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mood {
    pub empathy: u8,
    pub directness: u8,
    pub humor: u8,
    pub formality: u8,
    pub intensity: u8,
    pub romanticism: u8,
}

impl Default for Mood {
    fn default() -> Self {
        // the "balanced" preset
        Self {
            empathy: 70,
            directness: 50,
            humor: 50,
            formality: 30,
            intensity: 40,
            romanticism: 20,
        }
    }
}

/// The persistent companion identity owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub agent_type: AgentType,
    pub core_prompt: String,
    pub default_mood: Mood,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_mode: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportMetadata {
    pub source: String,
    pub export_date: DateTime<Utc>,
    pub message_count: usize,
}

/// Transient output of a format parser; consumed by the import pipeline
/// and then discarded.
#[derive(Debug, Clone)]
pub struct ImportedData {
    pub conversations: Vec<Conversation>,
    pub memories: Vec<Memory>,
    pub inferred_personality: Option<String>,
    pub metadata: ImportMetadata,
}

/// Requested verbosity of a chat reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLength {
    Brief,
    #[default]
    Standard,
    Detailed,
    Comprehensive,
}

impl ResponseLength {
    pub fn instruction(&self) -> &'static str {
        match self {
            ResponseLength::Brief => "Keep your reply short: one or two sentences.",
            ResponseLength::Standard => "Keep your reply conversational, a short paragraph at most.",
            ResponseLength::Detailed => {
                "Give a thorough reply with relevant detail, a few paragraphs if needed."
            }
            ResponseLength::Comprehensive => {
                "Give a comprehensive, in-depth reply covering every relevant angle."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_type_round_trips_through_strings() {
        for t in [
            MemoryType::Fact,
            MemoryType::Preference,
            MemoryType::Experience,
            MemoryType::Context,
        ] {
            assert_eq!(MemoryType::parse(t.as_str()), Some(t));
        }
        assert_eq!(MemoryType::parse("opinion"), None);
        assert_eq!(MemoryType::parse(" FACT "), Some(MemoryType::Fact));
    }

    #[test]
    fn conversation_derives_bounds_from_message_timestamps() {
        let t0 = Utc::now() - chrono::Duration::hours(2);
        let t1 = Utc::now() - chrono::Duration::hours(1);
        let mut m0 = Message::new(Role::User, "hi");
        m0.timestamp = Some(t0);
        let mut m1 = Message::new(Role::Assistant, "hello");
        m1.timestamp = Some(t1);

        let conv = Conversation::from_messages(vec![m1.clone(), m0.clone()], None, "u1");
        assert_eq!(conv.started_at, t0);
        assert_eq!(conv.ended_at, Some(t1));
        assert!(conv.started_at <= conv.ended_at.unwrap());
    }
}
