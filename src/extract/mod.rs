//! Memory extraction: a deterministic pattern pass, an AI-assisted pass,
//! and the merge step that combines them.

pub mod ai;
pub mod merge;
pub mod ongoing;
pub mod rules;

use crate::types::MemoryType;

/// A memory candidate produced by an extractor, before it is attached to
/// an agent and persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryCandidate {
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: f64,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

impl MemoryCandidate {
    pub fn new(content: impl Into<String>, memory_type: MemoryType, importance: f64) -> Self {
        Self {
            content: content.into(),
            memory_type,
            importance,
            category: None,
            tags: Vec::new(),
        }
    }
}
