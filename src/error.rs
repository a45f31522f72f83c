//! Engine-wide error taxonomy.
//!
//! Format errors abort an import before anything is persisted. Upstream
//! failures (LLM, embedding, fetch) are degraded per call-site and mostly
//! never reach this enum; the variants here are the ones callers see.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unrecognized export format (supported: ChatGPT, Grok, Claude)")]
    UnrecognizedFormat,

    #[error("malformed export: {0}")]
    MalformedExport(String),

    #[error("no usable content found: {0}")]
    EmptyExtraction(String),

    #[error("could not fetch share link: {0}")]
    ShareLinkFetch(String),

    #[error("language model request failed: {0}")]
    Llm(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("daily message limit reached")]
    RateLimited,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable machine-readable reason code for API responses.
    pub fn reason_code(&self) -> &'static str {
        match self {
            EngineError::UnrecognizedFormat => "unrecognized_format",
            EngineError::MalformedExport(_) => "malformed_export",
            EngineError::EmptyExtraction(_) => "empty_extraction",
            EngineError::ShareLinkFetch(_) => "share_link_fetch",
            EngineError::Llm(_) => "llm_error",
            EngineError::Embedding(_) => "embedding_error",
            EngineError::Database(_) => "database_error",
            EngineError::RateLimited => "rate_limited",
            EngineError::Internal(_) => "internal_error",
        }
    }
}
