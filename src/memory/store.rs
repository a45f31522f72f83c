//! SQLite-backed memory and conversation store.
//!
//! Embeddings are bincode BLOBs compared in-process with cosine
//! similarity, partitioned by agent id. Fine for the per-agent scale this
//! serves (< 10k memories); a real vector index would replace the scan.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

use super::embedder::Embedder;
use crate::types::{
    Agent, AgentType, Conversation, Memory, MemoryType, Mood, PrivacyLevel,
};

/// Similarity above which an ongoing-extraction candidate refreshes an
/// existing memory instead of inserting a new row.
pub const DEDUP_THRESHOLD: f32 = 0.9;

/// Characters of the first message that feed the conversation dedup hash.
const DEDUP_PREFIX_LEN: usize = 100;

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct PersistOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct KnowledgeSnippet {
    pub title: String,
    pub content: String,
}

#[derive(Clone)]
pub struct MemoryStore {
    db: SqlitePool,
}

impl MemoryStore {
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let db = SqlitePool::connect_with(options).await?;
        let store = Self { db };
        store.init_schema().await?;
        info!("Memory store ready at {}", path.display());
        Ok(store)
    }

    /// Wrap an existing pool (tests use `sqlite::memory:`).
    pub async fn from_pool(db: SqlitePool) -> Result<Self> {
        let store = Self { db };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                agent_type TEXT NOT NULL DEFAULT 'personal',
                core_prompt TEXT NOT NULL,
                default_mood TEXT NOT NULL,
                voice_mode TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                messages TEXT NOT NULL,
                summary TEXT,
                themes TEXT NOT NULL DEFAULT '[]',
                privacy TEXT NOT NULL DEFAULT 'private',
                started_at TEXT NOT NULL,
                ended_at TEXT,
                created_at TEXT NOT NULL,
                dedup_hash TEXT NOT NULL
            );",
        )
        .execute(&self.db)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_agent_hash
             ON conversations(agent_id, dedup_hash);",
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                conversation_id TEXT,
                memory_type TEXT NOT NULL,
                content TEXT NOT NULL,
                importance REAL NOT NULL DEFAULT 0.5,
                privacy TEXT NOT NULL DEFAULT 'private',
                category TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                embedding BLOB,
                created_at TEXT NOT NULL,
                last_mentioned TEXT
            );",
        )
        .execute(&self.db)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_agent ON memories(agent_id);")
            .execute(&self.db)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS knowledge (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB
            );",
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chat_usage (
                user_id TEXT NOT NULL,
                day TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, day)
            );",
        )
        .execute(&self.db)
        .await?;

        // Best-effort migrations for databases created before these columns
        // existed; failures mean the column is already there.
        let _ = sqlx::query("ALTER TABLE memories ADD COLUMN category TEXT")
            .execute(&self.db)
            .await;
        let _ = sqlx::query("ALTER TABLE memories ADD COLUMN tags TEXT NOT NULL DEFAULT '[]'")
            .execute(&self.db)
            .await;
        let _ = sqlx::query("ALTER TABLE memories ADD COLUMN last_mentioned TEXT")
            .execute(&self.db)
            .await;

        Ok(())
    }

    // ── Agents ─────────────────────────────────────────────

    /// One personal agent per user, soft-enforced: first agent wins,
    /// subsequent imports append to it. The inferred core prompt only
    /// applies when the agent is newly created.
    pub async fn find_or_create_agent(
        &self,
        user_id: &str,
        name: &str,
        core_prompt: &str,
        default_mood: Mood,
    ) -> Result<(Agent, bool)> {
        if let Some(agent) = self.find_agent(user_id).await? {
            return Ok((agent, false));
        }

        let now = Utc::now();
        let agent = Agent {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            agent_type: AgentType::Personal,
            core_prompt: core_prompt.to_string(),
            default_mood,
            voice_mode: None,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO agents (id, user_id, name, agent_type, core_prompt, default_mood, created_at, updated_at)
             VALUES (?, ?, ?, 'personal', ?, ?, ?, ?)",
        )
        .bind(&agent.id)
        .bind(&agent.user_id)
        .bind(&agent.name)
        .bind(&agent.core_prompt)
        .bind(serde_json::to_string(&agent.default_mood)?)
        .bind(agent.created_at.to_rfc3339())
        .bind(agent.updated_at.to_rfc3339())
        .execute(&self.db)
        .await?;
        info!("Created agent '{}' for user {}", agent.name, user_id);
        Ok((agent, true))
    }

    pub async fn find_agent(&self, user_id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query(
            "SELECT id, user_id, name, core_prompt, default_mood, voice_mode, created_at, updated_at
             FROM agents WHERE user_id = ? ORDER BY created_at ASC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| Agent {
            id: r.get("id"),
            user_id: r.get("user_id"),
            name: r.get("name"),
            agent_type: AgentType::Personal,
            core_prompt: r.get("core_prompt"),
            default_mood: serde_json::from_str(r.get::<String, _>("default_mood").as_str())
                .unwrap_or_default(),
            voice_mode: r.get("voice_mode"),
            created_at: parse_ts(r.get::<String, _>("created_at").as_str()),
            updated_at: parse_ts(r.get::<String, _>("updated_at").as_str()),
        }))
    }

    // ── Conversations ──────────────────────────────────────

    /// Hash of (first-message prefix, start timestamp): repeat imports of
    /// the same export never duplicate conversation rows.
    pub fn conversation_dedup_hash(conv: &Conversation) -> String {
        let first = conv
            .messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let prefix: String = first.chars().take(DEDUP_PREFIX_LEN).collect();
        let mut hasher = Sha256::new();
        hasher.update(prefix.as_bytes());
        hasher.update(conv.started_at.to_rfc3339().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Insert unless an identical conversation is already stored for this
    /// agent. Returns true when a row was written.
    pub async fn insert_conversation(&self, conv: &Conversation) -> Result<bool> {
        let hash = Self::conversation_dedup_hash(conv);
        let existing = sqlx::query(
            "SELECT 1 FROM conversations WHERE agent_id = ? AND dedup_hash = ? LIMIT 1",
        )
        .bind(&conv.agent_id)
        .bind(&hash)
        .fetch_optional(&self.db)
        .await?;
        if existing.is_some() {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO conversations
             (id, agent_id, user_id, messages, summary, themes, privacy, started_at, ended_at, created_at, dedup_hash)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conv.id)
        .bind(&conv.agent_id)
        .bind(&conv.user_id)
        .bind(serde_json::to_string(&conv.messages)?)
        .bind(&conv.summary)
        .bind(serde_json::to_string(&conv.themes)?)
        .bind(privacy_str(conv.privacy))
        .bind(conv.started_at.to_rfc3339())
        .bind(conv.ended_at.map(|t| t.to_rfc3339()))
        .bind(conv.created_at.to_rfc3339())
        .bind(&hash)
        .execute(&self.db)
        .await?;
        Ok(true)
    }

    pub async fn conversation_count(&self, agent_id: &str) -> Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM conversations WHERE agent_id = ?")
                .bind(agent_id)
                .fetch_one(&self.db)
                .await?;
        Ok(row.0)
    }

    // ── Memories ───────────────────────────────────────────

    /// Embed and persist a batch of memories. Embedding runs
    /// `batch_size`-wide concurrently; persistence stays per-item so one
    /// failure never blocks its siblings. An item whose embedding fails is
    /// stored with a null vector, not dropped.
    pub async fn persist_memories(
        &self,
        mut memories: Vec<Memory>,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> PersistOutcome {
        let mut outcome = PersistOutcome::default();
        let batch_size = batch_size.max(1);

        for batch in memories.chunks_mut(batch_size) {
            let embeds = futures::future::join_all(
                batch.iter().map(|m| embedder.embed(&m.content)),
            )
            .await;

            for (memory, embed) in batch.iter_mut().zip(embeds) {
                match embed {
                    Ok(vector) => memory.embedding = Some(vector),
                    Err(e) => {
                        let preview: String = memory.content.chars().take(50).collect();
                        warn!("Embedding failed for '{}', persisting without vector: {}", preview, e);
                    }
                }
                match self.insert_memory(memory).await {
                    Ok(()) => outcome.succeeded += 1,
                    Err(e) => {
                        warn!("Failed to persist memory: {}", e);
                        outcome.failed += 1;
                    }
                }
            }
        }
        outcome
    }

    pub async fn insert_memory(&self, memory: &Memory) -> Result<()> {
        let embedding_bytes = memory
            .embedding
            .as_ref()
            .map(|v| bincode::serialize(v))
            .transpose()?;
        sqlx::query(
            "INSERT INTO memories
             (id, agent_id, conversation_id, memory_type, content, importance, privacy, category, tags, embedding, created_at, last_mentioned)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&memory.id)
        .bind(&memory.agent_id)
        .bind(&memory.conversation_id)
        .bind(memory.memory_type.as_str())
        .bind(&memory.content)
        .bind(memory.importance_score.clamp(0.0, 1.0))
        .bind(privacy_str(memory.privacy))
        .bind(&memory.category)
        .bind(serde_json::to_string(&memory.tags)?)
        .bind(embedding_bytes)
        .bind(memory.created_at.to_rfc3339())
        .bind(memory.last_mentioned.map(|t| t.to_rfc3339()))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Nearest-neighbor scan over the agent's embedded memories.
    pub async fn search_similar(
        &self,
        agent_id: &str,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let rows = sqlx::query(MEMORY_COLUMNS_WHERE_AGENT)
            .bind(agent_id)
            .fetch_all(&self.db)
            .await?;

        let mut scored: Vec<(Memory, f32)> = Vec::new();
        for row in rows {
            let memory = row_to_memory(&row)?;
            let Some(ref embedding) = memory.embedding else {
                continue; // degraded rows are invisible to similarity search
            };
            let sim = cosine_similarity(query, embedding);
            if sim >= threshold {
                scored.push((memory, sim));
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(limit).map(|(m, _)| m).collect())
    }

    /// Is any stored memory a near-duplicate of this vector? Returns the
    /// id of the best match at or above `DEDUP_THRESHOLD`.
    pub async fn find_near_duplicate(
        &self,
        agent_id: &str,
        query: &[f32],
    ) -> Result<Option<String>> {
        let hits = self.search_similar(agent_id, query, DEDUP_THRESHOLD, 1).await?;
        Ok(hits.into_iter().next().map(|m| m.id))
    }

    pub async fn touch_last_mentioned(&self, memory_id: &str) -> Result<()> {
        sqlx::query("UPDATE memories SET last_mentioned = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(memory_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn top_by_importance(&self, agent_id: &str, limit: usize) -> Result<Vec<Memory>> {
        let rows = sqlx::query(
            "SELECT id, agent_id, conversation_id, memory_type, content, importance, privacy, category, tags, embedding, created_at, last_mentioned
             FROM memories WHERE agent_id = ? ORDER BY importance DESC, created_at DESC LIMIT ?",
        )
        .bind(agent_id)
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(row_to_memory).collect()
    }

    pub async fn memories_in_range(
        &self,
        agent_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Memory>> {
        let rows = sqlx::query(
            "SELECT id, agent_id, conversation_id, memory_type, content, importance, privacy, category, tags, embedding, created_at, last_mentioned
             FROM memories WHERE agent_id = ? AND created_at >= ? AND created_at <= ?
             ORDER BY created_at DESC",
        )
        .bind(agent_id)
        .bind(start.to_rfc3339())
        .bind(end.to_rfc3339())
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(row_to_memory).collect()
    }

    pub async fn memory_count(&self, agent_id: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM memories WHERE agent_id = ?")
            .bind(agent_id)
            .fetch_one(&self.db)
            .await?;
        Ok(row.0)
    }

    // ── Knowledge ──────────────────────────────────────────

    pub async fn insert_knowledge(
        &self,
        domain: &str,
        title: &str,
        content: &str,
        embedding: Option<&[f32]>,
    ) -> Result<()> {
        let bytes = embedding.map(bincode::serialize).transpose()?;
        sqlx::query("INSERT INTO knowledge (domain, title, content, embedding) VALUES (?, ?, ?, ?)")
            .bind(domain)
            .bind(title)
            .bind(content)
            .bind(bytes)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn search_knowledge(
        &self,
        domain: &str,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<KnowledgeSnippet>> {
        let rows = sqlx::query("SELECT title, content, embedding FROM knowledge WHERE domain = ?")
            .bind(domain)
            .fetch_all(&self.db)
            .await?;

        let mut scored: Vec<(KnowledgeSnippet, f32)> = Vec::new();
        for row in rows {
            let Some(bytes) = row.get::<Option<Vec<u8>>, _>("embedding") else {
                continue;
            };
            let embedding: Vec<f32> = bincode::deserialize(&bytes)?;
            let sim = cosine_similarity(query, &embedding);
            if sim >= threshold {
                scored.push((
                    KnowledgeSnippet {
                        title: row.get("title"),
                        content: row.get("content"),
                    },
                    sim,
                ));
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(limit).map(|(s, _)| s).collect())
    }

    // ── Rate gate ──────────────────────────────────────────

    /// Count this message against the user's daily allowance. Returns
    /// false once the limit is exceeded.
    pub async fn consume_daily_allowance(&self, user_id: &str, limit: i64) -> Result<bool> {
        let day = Utc::now().format("%Y-%m-%d").to_string();
        let row = sqlx::query(
            "INSERT INTO chat_usage (user_id, day, count) VALUES (?, ?, 1)
             ON CONFLICT(user_id, day) DO UPDATE SET count = count + 1
             RETURNING count",
        )
        .bind(user_id)
        .bind(&day)
        .fetch_one(&self.db)
        .await?;
        let count: i64 = row.get("count");
        Ok(count <= limit)
    }
}

const MEMORY_COLUMNS_WHERE_AGENT: &str =
    "SELECT id, agent_id, conversation_id, memory_type, content, importance, privacy, category, tags, embedding, created_at, last_mentioned
     FROM memories WHERE agent_id = ?";

fn row_to_memory(row: &sqlx::sqlite::SqliteRow) -> Result<Memory> {
    let embedding = row
        .get::<Option<Vec<u8>>, _>("embedding")
        .map(|bytes| bincode::deserialize::<Vec<f32>>(&bytes))
        .transpose()?;
    let tags: Vec<String> =
        serde_json::from_str(row.get::<String, _>("tags").as_str()).unwrap_or_default();
    let memory_type = MemoryType::parse(row.get::<String, _>("memory_type").as_str())
        .unwrap_or(MemoryType::Fact);
    Ok(Memory {
        id: row.get("id"),
        agent_id: row.get("agent_id"),
        conversation_id: row.get("conversation_id"),
        memory_type,
        content: row.get("content"),
        importance_score: row.get("importance"),
        privacy: if row.get::<String, _>("privacy") == "shared" {
            PrivacyLevel::Shared
        } else {
            PrivacyLevel::Private
        },
        category: row.get("category"),
        tags,
        embedding,
        created_at: parse_ts(row.get::<String, _>("created_at").as_str()),
        last_mentioned: row
            .get::<Option<String>, _>("last_mentioned")
            .map(|s| parse_ts(&s)),
    })
}

fn privacy_str(p: PrivacyLevel) -> &'static str {
    match p {
        PrivacyLevel::Private => "private",
        PrivacyLevel::Shared => "shared",
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
