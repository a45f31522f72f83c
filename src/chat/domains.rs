//! Knowledge domains: curated subject areas the companion can draw on
//! when the conversation steers into them.
//!
//! Detection is keyword-based on the user's message; retrieval within a
//! detected domain is embedding similarity against the `knowledge` table
//! at a stricter threshold than personal memories.

use crate::config::EngineConfig;

pub struct KnowledgeDomain {
    pub name: &'static str,
    pub triggers: &'static [&'static str],
    /// Style guidance injected alongside retrieved snippets.
    pub guide: &'static str,
}

pub static DOMAINS: &[KnowledgeDomain] = &[
    KnowledgeDomain {
        name: "psychology",
        triggers: &[
            "anxious",
            "anxiety",
            "depressed",
            "depression",
            "therapy",
            "therapist",
            "stressed",
            "burnout",
            "attachment",
            "self-esteem",
            "lonely",
            "grief",
            "overwhelmed",
        ],
        guide: "Draw on the notes below where relevant, but speak as a caring \
                companion, not a clinician. Never diagnose; suggest professional \
                help for anything serious.",
    },
    KnowledgeDomain {
        name: "art",
        triggers: &[
            "painting",
            "gallery",
            "museum",
            "exhibition",
            "sculpture",
            "impressionism",
            "renaissance",
            "artist",
            "artwork",
        ],
        guide: "Use the notes below to add depth, sharing context the way an \
                enthusiastic friend who knows the subject would.",
    },
];

/// Which domains does this message touch? Whole-word, case-insensitive.
pub fn detect_domains(message: &str) -> Vec<&'static KnowledgeDomain> {
    let lower = message.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .collect();
    DOMAINS
        .iter()
        .filter(|d| d.triggers.iter().any(|t| words.contains(t)))
        .collect()
}

/// The similarity floor for knowledge snippets, stricter than memory
/// retrieval so tangential notes stay out of the prompt.
pub fn knowledge_threshold(config: &EngineConfig) -> f32 {
    config.knowledge_similarity_threshold
}
