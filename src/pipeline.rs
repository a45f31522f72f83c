//! The import pipeline: raw export text in, persisted agent, conversation
//! and memory rows out.
//!
//! Stages: detect and parse, infer personality, resolve the agent, store
//! conversations (dedup-hashed), run both extraction passes over the
//! newly stored history, merge, embed and persist. Extraction only sees
//! conversations that were actually inserted, so re-importing the same
//! export is a no-op end to end.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::extract::{ai, merge, rules, MemoryCandidate};
use crate::importers::{self, personality};
use crate::llm::provider::LlmProvider;
use crate::memory::embedder::Embedder;
use crate::memory::store::MemoryStore;
use crate::types::{Conversation, ImportedData, Memory, Mood, PrivacyLevel};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub agent_id: String,
    pub source: String,
    pub message_count: usize,
    pub conversations_imported: usize,
    pub conversations_skipped: usize,
    pub memories_imported: usize,
    pub memories_failed: usize,
    /// True when this import created the agent and its inferred persona
    /// became the core prompt.
    pub personality_applied: bool,
    /// The persona text inferred from the imported history, applied or not.
    pub inferred_personality: Option<String>,
}

/// Import a raw export file's contents for a user.
pub async fn import_history(
    store: &MemoryStore,
    embedder: &dyn Embedder,
    provider: Arc<dyn LlmProvider>,
    config: &EngineConfig,
    raw: &str,
    user_id: &str,
) -> Result<ImportReport, EngineError> {
    let (data, source) = importers::parse_any(raw, user_id)?;
    info!(
        "Parsed {} export: {} conversation(s), {} message(s)",
        source,
        data.conversations.len(),
        data.metadata.message_count
    );
    run_import(store, embedder, provider, config, data, &source, user_id).await
}

async fn run_import(
    store: &MemoryStore,
    embedder: &dyn Embedder,
    provider: Arc<dyn LlmProvider>,
    config: &EngineConfig,
    mut data: ImportedData,
    source: &str,
    user_id: &str,
) -> Result<ImportReport, EngineError> {
    let persona = data
        .inferred_personality
        .clone()
        .unwrap_or_else(|| personality::infer_personality(&data.conversations));
    let (agent, created) = store
        .find_or_create_agent(user_id, "Eve", &persona, Mood::default())
        .await?;

    let mut imported = 0usize;
    let mut skipped = 0usize;
    let mut fresh: Vec<Conversation> = Vec::new();
    for mut conv in data.conversations.drain(..) {
        conv.agent_id = agent.id.clone();
        match store.insert_conversation(&conv).await {
            Ok(true) => {
                imported += 1;
                fresh.push(conv);
            }
            Ok(false) => skipped += 1,
            Err(e) => {
                warn!("Failed to store a conversation, continuing: {}", e);
                skipped += 1;
            }
        }
    }

    let candidates = if fresh.is_empty() {
        Vec::new()
    } else {
        let pattern = rules::extract(&fresh);
        let ai_pass = ai::extract_with_ai(
            provider,
            &fresh,
            config.chunk_size,
            Duration::from_millis(config.chunk_delay_ms),
        )
        .await;
        merge::merge(pattern, ai_pass)
    };

    let memories: Vec<Memory> = candidates
        .into_iter()
        .map(|c| candidate_to_memory(c, &agent.id))
        .collect();
    let outcome = store
        .persist_memories(memories, embedder, config.embed_batch_size)
        .await;

    info!(
        "Import complete: {} conversation(s) stored ({} duplicate), {} memorie(s) persisted",
        imported, skipped, outcome.succeeded
    );
    Ok(ImportReport {
        agent_id: agent.id,
        source: source.to_string(),
        message_count: data.metadata.message_count,
        conversations_imported: imported,
        conversations_skipped: skipped,
        memories_imported: outcome.succeeded,
        memories_failed: outcome.failed,
        personality_applied: created,
        inferred_personality: Some(persona),
    })
}

fn candidate_to_memory(candidate: MemoryCandidate, agent_id: &str) -> Memory {
    Memory {
        id: uuid::Uuid::new_v4().to_string(),
        agent_id: agent_id.to_string(),
        conversation_id: None,
        memory_type: candidate.memory_type,
        content: candidate.content,
        importance_score: candidate.importance.clamp(0.0, 1.0),
        privacy: PrivacyLevel::Private,
        category: candidate.category,
        tags: candidate.tags,
        embedding: None,
        created_at: chrono::Utc::now(),
        last_mentioned: None,
    }
}
