//! eve-engine: import-and-memory core for a personal AI companion.
//!
//! The engine ingests chat history exports (ChatGPT, Grok, Claude, public
//! share links), distills them into typed memories, and serves a chat API
//! whose replies are grounded in those memories.

pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod importers;
pub mod llm;
pub mod memory;
pub mod pipeline;
pub mod server;
pub mod types;
pub mod utils;

pub use config::EngineConfig;
pub use error::EngineError;
pub use pipeline::ImportReport;
