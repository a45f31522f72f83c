//! HTTP surface: a small warp API over the import pipeline, chat service
//! and temporal memory search.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use warp::http::StatusCode;
use warp::Filter;

use crate::chat::{ChatRequest, ChatService};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::importers::share_link;
use crate::llm::provider::LlmProvider;
use crate::memory::embedder::Embedder;
use crate::memory::store::MemoryStore;
use crate::pipeline;

/// Exports can be large; cap request bodies at 50 MB.
const MAX_BODY_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: MemoryStore,
    pub embedder: Arc<dyn Embedder>,
    pub provider: Arc<dyn LlmProvider>,
    pub chat: Arc<ChatService>,
    pub config: EngineConfig,
    pub http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ImportBody {
    user_id: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ImportLinkBody {
    url: String,
    #[serde(default)]
    platform: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TemporalBody {
    user_id: String,
    query: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    reason: &'static str,
}

pub async fn run(state: AppState, addr: SocketAddr) {
    let routes = routes(state);
    info!("HTTP API listening on http://{}", addr);
    warp::serve(routes).run(addr).await;
}

pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_state = {
        let state = state.clone();
        warp::any().map(move || state.clone())
    };

    let import = warp::path!("api" / "import")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_SIZE))
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_import);

    let import_link = warp::path!("api" / "import-from-link")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_import_link);

    let chat = warp::path!("api" / "chat")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_chat);

    let temporal = warp::path!("api" / "memories" / "temporal")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state)
        .and_then(handle_temporal);

    import.or(import_link).or(chat).or(temporal)
}

async fn handle_import(body: ImportBody, state: AppState) -> Result<impl warp::Reply, Infallible> {
    let result = pipeline::import_history(
        &state.store,
        state.embedder.as_ref(),
        state.provider.clone(),
        &state.config,
        &body.content,
        &body.user_id,
    )
    .await;
    Ok(reply_result(result))
}

/// Preview-only: scrape the page and hand the text back to the client.
/// Nothing is persisted; the client submits the result through
/// `/api/import` once the user confirms it.
async fn handle_import_link(
    body: ImportLinkBody,
    state: AppState,
) -> Result<impl warp::Reply, Infallible> {
    let result =
        share_link::import_from_share_link(&state.http, &body.url, body.platform.as_deref()).await;
    Ok(reply_result(result))
}

async fn handle_chat(body: ChatRequest, state: AppState) -> Result<impl warp::Reply, Infallible> {
    Ok(reply_result(state.chat.chat(body).await))
}

async fn handle_temporal(
    body: TemporalBody,
    state: AppState,
) -> Result<impl warp::Reply, Infallible> {
    Ok(reply_result(
        state
            .chat
            .search_memories_temporal(&body.user_id, &body.query)
            .await,
    ))
}

fn reply_result<T: Serialize>(result: Result<T, EngineError>) -> warp::reply::WithStatus<warp::reply::Json> {
    match result {
        Ok(value) => warp::reply::with_status(warp::reply::json(&value), StatusCode::OK),
        Err(e) => {
            let status = status_for(&e);
            let body = ErrorBody {
                error: e.to_string(),
                reason: e.reason_code(),
            };
            warp::reply::with_status(warp::reply::json(&body), status)
        }
    }
}

fn status_for(e: &EngineError) -> StatusCode {
    match e {
        EngineError::UnrecognizedFormat
        | EngineError::MalformedExport(_)
        | EngineError::EmptyExtraction(_) => StatusCode::BAD_REQUEST,
        EngineError::ShareLinkFetch(_) => StatusCode::BAD_GATEWAY,
        EngineError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        EngineError::Llm(_) | EngineError::Embedding(_) => StatusCode::BAD_GATEWAY,
        EngineError::Database(_) | EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ongoing::ExtractionQueue;
    use crate::llm::provider::{LlmParams, Message as LlmMessage};
    use crate::memory::embedder::testing::FakeEmbedder;
    use async_trait::async_trait;
    use sqlx::SqlitePool;

    struct StubProvider;

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn chat(
            &self,
            _messages: Vec<LlmMessage>,
            _options: Option<LlmParams>,
        ) -> Result<String, String> {
            Ok("Hello from Eve".to_string())
        }
        fn id(&self) -> &str {
            "stub"
        }
    }

    async fn state() -> AppState {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = MemoryStore::from_pool(pool).await.unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new());
        let provider: Arc<dyn LlmProvider> = Arc::new(StubProvider);
        let queue = ExtractionQueue::spawn(store.clone(), embedder.clone());
        let config = EngineConfig {
            chunk_delay_ms: 0,
            ..Default::default()
        };
        let chat = Arc::new(ChatService::new(
            store.clone(),
            embedder.clone(),
            provider.clone(),
            queue,
            config.clone(),
        ));
        AppState {
            store,
            embedder,
            provider,
            chat,
            config,
            http: reqwest::Client::new(),
        }
    }

    #[tokio::test]
    async fn chat_endpoint_returns_reply_json() {
        let api = routes(state().await);
        let resp = warp::test::request()
            .method("POST")
            .path("/api/chat")
            .json(&serde_json::json!({"user_id": "u1", "message": "hi there"}))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["reply"], "Hello from Eve");
    }

    #[tokio::test]
    async fn unrecognized_import_is_a_400_with_reason() {
        let api = routes(state().await);
        let resp = warp::test::request()
            .method("POST")
            .path("/api/import")
            .json(&serde_json::json!({"user_id": "u1", "content": "garbage text"}))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["reason"], "unrecognized_format");
    }

    #[tokio::test]
    async fn import_link_returns_extracted_text_without_persisting() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let page = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body>\
                 <p>Hi, my name is Alex and I just moved to Berlin recently.</p>\
                 <p>Welcome, Alex! How are you finding the city so far?</p>\
                 </body></html>",
            ))
            .mount(&page)
            .await;

        let s = state().await;
        let store = s.store.clone();
        let api = routes(s);
        let resp = warp::test::request()
            .method("POST")
            .path("/api/import-from-link")
            .json(&serde_json::json!({
                "url": format!("{}/share/abc", page.uri()),
                "platform": "chatgpt"
            }))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["detectedPlatform"], "chatgpt");
        assert!(body["extractedText"]
            .as_str()
            .unwrap()
            .contains("moved to Berlin"));
        // The preview never touches the store.
        assert!(store.find_agent("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreachable_share_link_is_a_502() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let page = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&page)
            .await;

        let api = routes(state().await);
        let resp = warp::test::request()
            .method("POST")
            .path("/api/import-from-link")
            .json(&serde_json::json!({"url": format!("{}/gone", page.uri())}))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["reason"], "share_link_fetch");
    }

    #[tokio::test]
    async fn temporal_endpoint_reports_resolved_context() {
        let api = routes(state().await);
        // First chat turn creates the agent.
        warp::test::request()
            .method("POST")
            .path("/api/chat")
            .json(&serde_json::json!({"user_id": "u1", "message": "hello"}))
            .reply(&api)
            .await;

        let resp = warp::test::request()
            .method("POST")
            .path("/api/memories/temporal")
            .json(&serde_json::json!({"user_id": "u1", "query": "what happened last week"}))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["resolvedTemporalContext"]["type"], "recent");
        assert_eq!(body["resolvedTemporalContext"]["days_ago"], 7);
    }

    #[tokio::test]
    async fn rate_limited_chat_is_a_429() {
        let mut s = state().await;
        s.config.daily_message_limit = 0;
        // ChatService holds its own config copy; rebuild it with the limit.
        let queue = ExtractionQueue::spawn(s.store.clone(), s.embedder.clone());
        s.chat = Arc::new(ChatService::new(
            s.store.clone(),
            s.embedder.clone(),
            s.provider.clone(),
            queue,
            s.config.clone(),
        ));
        let api = routes(s);
        let resp = warp::test::request()
            .method("POST")
            .path("/api/chat")
            .json(&serde_json::json!({"user_id": "u1", "message": "hi"}))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["reason"], "rate_limited");
    }
}
