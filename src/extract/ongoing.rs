//! Background memory extraction for live chat.
//!
//! The chat path never extracts inline. Once a session accumulates enough
//! turns it enqueues the window here and moves on; a single worker task
//! drains the queue, runs the pattern pass, and persists what it finds.
//! A dropped or full queue costs at most one extraction window, never a
//! chat reply.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::rules;
use crate::memory::embedder::Embedder;
use crate::memory::store::MemoryStore;
use crate::types::{Conversation, Memory, Message, PrivacyLevel};

const QUEUE_DEPTH: usize = 64;

/// One window of recent chat turns to mine for memories.
#[derive(Debug)]
pub struct ExtractionJob {
    pub agent_id: String,
    pub user_id: String,
    pub window: Vec<Message>,
}

/// Cheap-to-clone handle for enqueueing jobs.
#[derive(Clone)]
pub struct ExtractionQueue {
    tx: mpsc::Sender<ExtractionJob>,
}

impl ExtractionQueue {
    /// Spawn the worker task and return the queue handle.
    pub fn spawn(store: MemoryStore, embedder: Arc<dyn Embedder>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(run_worker(rx, store, embedder));
        Self { tx }
    }

    /// Non-blocking enqueue. When the queue is full the window is dropped
    /// with a warning; the same facts resurface in later windows.
    pub fn enqueue(&self, job: ExtractionJob) {
        if let Err(e) = self.tx.try_send(job) {
            warn!("Extraction queue full, dropping window: {}", e);
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<ExtractionJob>,
    store: MemoryStore,
    embedder: Arc<dyn Embedder>,
) {
    info!("Ongoing extraction worker started");
    while let Some(job) = rx.recv().await {
        if let Err(e) = process_job(&store, embedder.as_ref(), job).await {
            warn!("Ongoing extraction failed: {}", e);
        }
    }
    debug!("Ongoing extraction worker stopped");
}

async fn process_job(
    store: &MemoryStore,
    embedder: &dyn Embedder,
    job: ExtractionJob,
) -> anyhow::Result<()> {
    let conv = Conversation::from_messages(job.window, None, &job.user_id);
    let candidates = rules::extract(std::slice::from_ref(&conv));
    if candidates.is_empty() {
        return Ok(());
    }
    debug!(
        "Ongoing extraction: {} candidate(s) for agent {}",
        candidates.len(),
        job.agent_id
    );

    for candidate in candidates {
        let embedding = match embedder.embed(&candidate.content).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Embedding failed during ongoing extraction: {}", e);
                continue; // without a vector we cannot dedup; skip, not store
            }
        };

        // A near-duplicate of an existing memory refreshes it instead of
        // piling up restatements.
        if let Some(existing) = store.find_near_duplicate(&job.agent_id, &embedding).await? {
            store.touch_last_mentioned(&existing).await?;
            continue;
        }

        let memory = Memory {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: job.agent_id.clone(),
            conversation_id: None,
            memory_type: candidate.memory_type,
            content: candidate.content,
            importance_score: candidate.importance,
            privacy: PrivacyLevel::Private,
            category: candidate.category,
            tags: candidate.tags,
            embedding: Some(embedding),
            created_at: chrono::Utc::now(),
            last_mentioned: None,
        };
        store.insert_memory(&memory).await?;
    }
    Ok(())
}
