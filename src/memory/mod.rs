//! Persistence and retrieval: embeddings, the SQLite store, and temporal
//! query classification.

pub mod embedder;
pub mod store;
pub mod temporal;

pub use embedder::{Embedder, FastEmbedder};
pub use store::{MemoryStore, PersistOutcome};
pub use temporal::{parse_temporal_query, TemporalContext};
