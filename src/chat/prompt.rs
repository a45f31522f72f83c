//! System prompt assembly for chat turns.

use chrono::{DateTime, Utc};

use super::domains::KnowledgeDomain;
use crate::memory::store::KnowledgeSnippet;
use crate::types::{Memory, ResponseLength};

/// Everything a single chat turn injects into the system prompt.
pub struct PromptContext<'a> {
    pub core_prompt: &'a str,
    pub mood_prompt: &'a str,
    pub memories: &'a [Memory],
    pub domain_sections: &'a [(&'static KnowledgeDomain, Vec<KnowledgeSnippet>)],
    pub now: DateTime<Utc>,
    pub response_length: ResponseLength,
}

pub fn compose_system_prompt(ctx: &PromptContext<'_>) -> String {
    let mut sections: Vec<String> = vec![ctx.core_prompt.trim().to_string()];

    if !ctx.mood_prompt.is_empty() {
        sections.push(ctx.mood_prompt.to_string());
    }

    if !ctx.memories.is_empty() {
        let bullets: Vec<String> = ctx
            .memories
            .iter()
            .map(|m| format!("- {}", m.content))
            .collect();
        sections.push(format!(
            "What you remember about the user:\n{}\n\nWeave these in naturally \
             when relevant. Never recite them as a list or mention having a \
             memory system.",
            bullets.join("\n")
        ));
    }

    for (domain, snippets) in ctx.domain_sections {
        if snippets.is_empty() {
            continue;
        }
        let notes: Vec<String> = snippets
            .iter()
            .map(|s| format!("### {}\n{}", s.title, s.content))
            .collect();
        sections.push(format!(
            "Background notes ({}):\n{}\n\n{}",
            domain.name,
            notes.join("\n\n"),
            domain.guide
        ));
    }

    sections.push(format!(
        "Today's date is {}. When the user refers to relative times like \
         \"yesterday\" or \"last week\", interpret them against this date.",
        ctx.now.format("%A, %B %-d, %Y")
    ));

    sections.push(ctx.response_length.instruction().to_string());

    sections.join("\n\n")
}
