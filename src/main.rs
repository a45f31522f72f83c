use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use eve_engine::chat::ChatService;
use eve_engine::config::EngineConfig;
use eve_engine::extract::ongoing::ExtractionQueue;
use eve_engine::llm;
use eve_engine::memory::embedder::{Embedder, FastEmbedder};
use eve_engine::memory::store::MemoryStore;
use eve_engine::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(EngineConfig::default_path);
    let config = EngineConfig::load(&config_path);

    let store = MemoryStore::connect(&config.resolve_database_path()).await?;
    let embedder: Arc<dyn Embedder> = Arc::new(FastEmbedder::new());
    let provider = llm::build_provider(&config.llm);
    let queue = ExtractionQueue::spawn(store.clone(), embedder.clone());

    let chat = Arc::new(ChatService::new(
        store.clone(),
        embedder.clone(),
        provider.clone(),
        queue,
        config.clone(),
    ));

    let addr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.bind_addr))?;

    let state = AppState {
        store,
        embedder,
        provider,
        chat,
        config,
        http: reqwest::Client::new(),
    };
    server::run(state, addr).await;
    Ok(())
}
