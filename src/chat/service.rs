//! Live chat orchestration.
//!
//! One turn: rate gate, memory retrieval (temporal or semantic), knowledge
//! domain lookup, prompt assembly, generation, and a fire-and-forget
//! handoff to the background extractor. Retrieval failures degrade the
//! prompt; only the rate gate and a missing store error the turn.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domains::{self, KnowledgeDomain};
use super::mood;
use super::prompt::{compose_system_prompt, PromptContext};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::extract::ongoing::{ExtractionJob, ExtractionQueue};
use crate::importers::personality::DEFAULT_PERSONA;
use crate::llm::provider::{LlmParams, LlmProvider, Message as LlmMessage};
use crate::memory::embedder::Embedder;
use crate::memory::store::{KnowledgeSnippet, MemoryStore};
use crate::memory::temporal::{parse_temporal_query, TemporalContext};
use crate::types::{Memory, Message, Mood, ResponseLength, Role};

/// Reply when the upstream model is unavailable; the turn still succeeds.
const FALLBACK_REPLY: &str =
    "I'm having a little trouble gathering my thoughts right now. \
     Give me a moment and ask me again?";

const MEMORY_RETRIEVAL_LIMIT: usize = 10;
const KNOWLEDGE_RETRIEVAL_LIMIT: usize = 3;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub response_length: ResponseLength,
    #[serde(default)]
    pub mood_preset: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub memories_used: usize,
}

#[derive(Debug, Serialize)]
pub struct TemporalSearchResult {
    pub memories: Vec<Memory>,
    #[serde(rename = "resolvedTemporalContext")]
    pub resolved: TemporalContext,
}

pub struct ChatService {
    store: MemoryStore,
    embedder: Arc<dyn Embedder>,
    provider: Arc<dyn LlmProvider>,
    queue: ExtractionQueue,
    config: EngineConfig,
}

impl ChatService {
    pub fn new(
        store: MemoryStore,
        embedder: Arc<dyn Embedder>,
        provider: Arc<dyn LlmProvider>,
        queue: ExtractionQueue,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            provider,
            queue,
            config,
        }
    }

    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, EngineError> {
        let allowed = self
            .store
            .consume_daily_allowance(&req.user_id, self.config.daily_message_limit)
            .await?;
        if !allowed {
            return Err(EngineError::RateLimited);
        }

        let (agent, _) = self
            .store
            .find_or_create_agent(&req.user_id, "Eve", DEFAULT_PERSONA, Mood::default())
            .await?;

        let now = Utc::now();
        let memories = self.retrieve_memories(&agent.id, &req.message, now).await;
        let domain_sections = self.retrieve_knowledge(&req.message).await;

        let mood = req
            .mood_preset
            .as_deref()
            .map(mood::preset)
            .unwrap_or(agent.default_mood);
        let mood_prompt = mood::build_mood_prompt(&mood);
        let system = compose_system_prompt(&PromptContext {
            core_prompt: &agent.core_prompt,
            mood_prompt: &mood_prompt,
            memories: &memories,
            domain_sections: &domain_sections,
            now,
            response_length: req.response_length,
        });

        let mut llm_messages = vec![LlmMessage::system(system)];
        for m in &req.history {
            llm_messages.push(LlmMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            });
        }
        llm_messages.push(LlmMessage::user(&req.message));

        let reply = match self.provider.chat(llm_messages, Some(LlmParams::default())).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Generation failed, returning fallback reply: {}", e);
                FALLBACK_REPLY.to_string()
            }
        };

        self.maybe_enqueue_extraction(&agent.id, &req, &reply);

        Ok(ChatResponse {
            memories_used: memories.len(),
            reply,
        })
    }

    /// Temporal queries get a date-window lookup; everything else goes
    /// through similarity with an importance-ranked fallback so the
    /// companion is never amnesiac while memories exist.
    async fn retrieve_memories(
        &self,
        agent_id: &str,
        message: &str,
        now: chrono::DateTime<Utc>,
    ) -> Vec<Memory> {
        let temporal = parse_temporal_query(message, now);
        if temporal.is_temporal() {
            let (start, end) = temporal
                .resolve_range(now)
                .unwrap_or_else(|| TemporalContext::fallback_range(now));
            match self.store.memories_in_range(agent_id, start, end).await {
                Ok(memories) if !memories.is_empty() => return memories,
                Ok(_) => {}
                Err(e) => warn!("Temporal memory lookup failed: {}", e),
            }
            // An empty window still surfaces what matters most.
            return self.importance_fallback(agent_id).await;
        }

        if let Ok(query_vec) = self.embedder.embed(message).await {
            match self
                .store
                .search_similar(
                    agent_id,
                    &query_vec,
                    self.config.memory_similarity_threshold,
                    MEMORY_RETRIEVAL_LIMIT,
                )
                .await
            {
                Ok(memories) if !memories.is_empty() => return memories,
                Ok(_) => {}
                Err(e) => warn!("Similarity search failed: {}", e),
            }
        }
        self.importance_fallback(agent_id).await
    }

    async fn importance_fallback(&self, agent_id: &str) -> Vec<Memory> {
        match self
            .store
            .top_by_importance(agent_id, MEMORY_RETRIEVAL_LIMIT)
            .await
        {
            Ok(memories) => memories,
            Err(e) => {
                warn!("Importance fallback failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn retrieve_knowledge(
        &self,
        message: &str,
    ) -> Vec<(&'static KnowledgeDomain, Vec<KnowledgeSnippet>)> {
        let detected = domains::detect_domains(message);
        if detected.is_empty() {
            return Vec::new();
        }
        let Ok(query_vec) = self.embedder.embed(message).await else {
            return Vec::new();
        };

        let mut sections = Vec::new();
        for domain in detected {
            match self
                .store
                .search_knowledge(
                    domain.name,
                    &query_vec,
                    domains::knowledge_threshold(&self.config),
                    KNOWLEDGE_RETRIEVAL_LIMIT,
                )
                .await
            {
                Ok(snippets) => sections.push((domain, snippets)),
                Err(e) => warn!("Knowledge lookup failed for {}: {}", domain.name, e),
            }
        }
        sections
    }

    /// Hand the recent window to the background extractor once the session
    /// is long enough. Never awaited, never fails the chat turn.
    fn maybe_enqueue_extraction(&self, agent_id: &str, req: &ChatRequest, reply: &str) {
        let mut turns = req.history.clone();
        turns.push(Message::new(Role::User, req.message.clone()));
        turns.push(Message::new(Role::Assistant, reply.to_string()));

        let window = self.config.ongoing_window.max(1);
        if turns.len() < window {
            return;
        }
        let start = turns.len().saturating_sub(window);
        debug!("Enqueueing extraction window of {} turn(s)", window);
        self.queue.enqueue(ExtractionJob {
            agent_id: agent_id.to_string(),
            user_id: req.user_id.clone(),
            window: turns[start..].to_vec(),
        });
    }

    /// Standalone temporal memory search, exposed over the API for the
    /// "what did we talk about last week" style of query.
    pub async fn search_memories_temporal(
        &self,
        user_id: &str,
        query: &str,
    ) -> Result<TemporalSearchResult, EngineError> {
        let Some(agent) = self.store.find_agent(user_id).await? else {
            return Ok(TemporalSearchResult {
                memories: Vec::new(),
                resolved: TemporalContext::Unknown,
            });
        };

        let now = Utc::now();
        let resolved = parse_temporal_query(query, now);
        let (start, end) = resolved
            .resolve_range(now)
            .unwrap_or_else(|| TemporalContext::fallback_range(now));
        let memories = self.store.memories_in_range(&agent.id, start, end).await?;
        Ok(TemporalSearchResult { memories, resolved })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::embedder::testing::FakeEmbedder;
    use crate::types::MemoryType;
    use async_trait::async_trait;
    use sqlx::SqlitePool;
    use std::sync::Mutex;

    struct StubProvider {
        reply: String,
        fail: bool,
        last_system: Mutex<Option<String>>,
    }

    impl StubProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                fail: false,
                last_system: Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new("")
            }
        }
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn chat(
            &self,
            messages: Vec<LlmMessage>,
            _options: Option<LlmParams>,
        ) -> Result<String, String> {
            if self.fail {
                return Err("upstream down".to_string());
            }
            if let Some(system) = messages.iter().find(|m| m.role == "system") {
                *self.last_system.lock().unwrap() = Some(system.content.clone());
            }
            Ok(self.reply.clone())
        }

        fn id(&self) -> &str {
            "stub"
        }
    }

    async fn service_with(provider: Arc<StubProvider>) -> (ChatService, MemoryStore) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = MemoryStore::from_pool(pool).await.unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new());
        let queue = ExtractionQueue::spawn(store.clone(), embedder.clone());
        let service = ChatService::new(
            store.clone(),
            embedder,
            provider,
            queue,
            EngineConfig::default(),
        );
        (service, store)
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            user_id: "u1".to_string(),
            message: message.to_string(),
            history: Vec::new(),
            response_length: ResponseLength::Standard,
            mood_preset: None,
        }
    }

    async fn seed_memory(store: &MemoryStore, agent_id: &str, content: &str) {
        let embedder = FakeEmbedder::new();
        let memory = Memory {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            conversation_id: None,
            memory_type: MemoryType::Fact,
            content: content.to_string(),
            importance_score: 0.9,
            privacy: Default::default(),
            category: None,
            tags: Vec::new(),
            embedding: Some(embedder.embed(content).await.unwrap()),
            created_at: Utc::now(),
            last_mentioned: None,
        };
        store.insert_memory(&memory).await.unwrap();
    }

    #[tokio::test]
    async fn plain_chat_round_trips_the_provider_reply() {
        let provider = Arc::new(StubProvider::new("Hello Alex!"));
        let (service, _) = service_with(provider.clone()).await;
        let resp = service.chat(request("hey there")).await.unwrap();
        assert_eq!(resp.reply, "Hello Alex!");
    }

    #[tokio::test]
    async fn memories_reach_the_system_prompt() {
        let provider = Arc::new(StubProvider::new("ok"));
        let (service, store) = service_with(provider.clone()).await;
        // First turn creates the agent; seed against it, then chat again.
        service.chat(request("hello")).await.unwrap();
        let agent = store.find_agent("u1").await.unwrap().unwrap();
        seed_memory(&store, &agent.id, "User's name is Alex").await;

        let resp = service.chat(request("do you remember me?")).await.unwrap();
        assert_eq!(resp.memories_used, 1);
        let system = provider.last_system.lock().unwrap().clone().unwrap();
        assert!(system.contains("- User's name is Alex"));
    }

    #[tokio::test]
    async fn provider_failure_yields_fallback_reply_not_error() {
        let provider = Arc::new(StubProvider::failing());
        let (service, _) = service_with(provider).await;
        let resp = service.chat(request("hello")).await.unwrap();
        assert_eq!(resp.reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn rate_limit_trips_with_typed_error() {
        let provider = Arc::new(StubProvider::new("ok"));
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = MemoryStore::from_pool(pool).await.unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new());
        let queue = ExtractionQueue::spawn(store.clone(), embedder.clone());
        let config = EngineConfig {
            daily_message_limit: 1,
            ..Default::default()
        };
        let service = ChatService::new(store, embedder, provider, queue, config);

        service.chat(request("one")).await.unwrap();
        let err = service.chat(request("two")).await.unwrap_err();
        assert!(matches!(err, EngineError::RateLimited));
    }

    #[tokio::test]
    async fn temporal_query_uses_date_window_not_similarity() {
        let provider = Arc::new(StubProvider::new("ok"));
        let (service, store) = service_with(provider.clone()).await;
        service.chat(request("hello")).await.unwrap();
        let agent = store.find_agent("u1").await.unwrap().unwrap();

        // Recent memory lands in the "yesterday" window; the old one does not.
        seed_memory(&store, &agent.id, "User started a pottery class").await;
        let embedder = FakeEmbedder::new();
        let old = Memory {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent.id.clone(),
            conversation_id: None,
            memory_type: MemoryType::Fact,
            content: "User went skiing in January".to_string(),
            importance_score: 0.9,
            privacy: Default::default(),
            category: None,
            tags: Vec::new(),
            embedding: Some(embedder.embed("User went skiing in January").await.unwrap()),
            created_at: Utc::now() - chrono::Duration::days(60),
            last_mentioned: None,
        };
        store.insert_memory(&old).await.unwrap();

        let resp = service
            .chat(request("what did we talk about yesterday?"))
            .await
            .unwrap();
        assert_eq!(resp.memories_used, 1);
        let system = provider.last_system.lock().unwrap().clone().unwrap();
        assert!(system.contains("pottery"));
        assert!(!system.contains("skiing"));
    }

    #[tokio::test]
    async fn importance_fallback_when_nothing_is_similar() {
        let provider = Arc::new(StubProvider::new("ok"));
        let (service, store) = service_with(provider.clone()).await;
        service.chat(request("hello")).await.unwrap();
        let agent = store.find_agent("u1").await.unwrap().unwrap();

        // Stored without an embedding: similarity can never match it.
        let memory = Memory {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent.id.clone(),
            conversation_id: None,
            memory_type: MemoryType::Fact,
            content: "User plays the violin".to_string(),
            importance_score: 0.9,
            privacy: Default::default(),
            category: None,
            tags: Vec::new(),
            embedding: None,
            created_at: Utc::now(),
            last_mentioned: None,
        };
        store.insert_memory(&memory).await.unwrap();

        let resp = service.chat(request("tell me a story")).await.unwrap();
        assert_eq!(resp.memories_used, 1);
    }

    #[tokio::test]
    async fn empty_temporal_window_falls_back_to_importance() {
        let provider = Arc::new(StubProvider::new("ok"));
        let (service, store) = service_with(provider.clone()).await;
        service.chat(request("hello")).await.unwrap();
        let agent = store.find_agent("u1").await.unwrap().unwrap();

        // The only memory predates the "yesterday" window by two months.
        let embedder = FakeEmbedder::new();
        let old = Memory {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent.id.clone(),
            conversation_id: None,
            memory_type: MemoryType::Fact,
            content: "User is training for a marathon".to_string(),
            importance_score: 0.9,
            privacy: Default::default(),
            category: None,
            tags: Vec::new(),
            embedding: Some(
                embedder
                    .embed("User is training for a marathon")
                    .await
                    .unwrap(),
            ),
            created_at: Utc::now() - chrono::Duration::days(60),
            last_mentioned: None,
        };
        store.insert_memory(&old).await.unwrap();

        let resp = service
            .chat(request("what did we talk about yesterday?"))
            .await
            .unwrap();
        assert_eq!(resp.memories_used, 1);
        let system = provider.last_system.lock().unwrap().clone().unwrap();
        assert!(system.contains("marathon"));
    }

    #[tokio::test]
    async fn temporal_search_reports_resolved_context() {
        let provider = Arc::new(StubProvider::new("ok"));
        let (service, _) = service_with(provider).await;
        service.chat(request("hello")).await.unwrap();

        let result = service
            .search_memories_temporal("u1", "what happened last week")
            .await
            .unwrap();
        assert_eq!(result.resolved, TemporalContext::Recent { days_ago: 7 });

        // Unknown user resolves to nothing rather than an error.
        let empty = service
            .search_memories_temporal("ghost", "last week")
            .await
            .unwrap();
        assert!(empty.memories.is_empty());
    }
}
