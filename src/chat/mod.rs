//! Chat-time behavior: mood presets, knowledge domains, prompt assembly
//! and the per-turn orchestration service.

pub mod domains;
pub mod mood;
pub mod prompt;
pub mod service;

pub use service::{ChatRequest, ChatResponse, ChatService, TemporalSearchResult};
