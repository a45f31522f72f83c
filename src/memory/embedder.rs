//! Embedding seam. `Embedder` keeps the rest of the engine independent of
//! fastembed so tests can substitute deterministic fakes.

use anyhow::Result;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;

/// Inputs longer than this are truncated before the model sees them.
pub const EMBED_INPUT_CAP: usize = 8000;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Truncate at the cap on a char boundary. Never called with more by the
/// implementations below.
pub fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= EMBED_INPUT_CAP {
        return text;
    }
    let mut end = EMBED_INPUT_CAP;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Local fastembed model (all-MiniLM-L6-v2), lazy-loaded on first use so
/// construction never blocks on a model download.
pub struct FastEmbedder {
    model: tokio::sync::OnceCell<Mutex<TextEmbedding>>,
}

impl FastEmbedder {
    pub fn new() -> Self {
        Self {
            model: tokio::sync::OnceCell::new(),
        }
    }

    async fn get_model(&self) -> Result<&Mutex<TextEmbedding>> {
        self.model
            .get_or_try_init(|| async {
                tracing::info!("Loading embedding model (first use)...");
                let model = TextEmbedding::try_new(
                    InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                        .with_cache_dir(std::path::PathBuf::from("models")),
                )?;
                tracing::info!("Embedding model ready");
                Ok(Mutex::new(model))
            })
            .await
    }
}

impl Default for FastEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let capped = truncate_for_embedding(text);
        let model = self.get_model().await?;
        let mut guard = model.lock().await;
        let embeddings = guard.embed(vec![capped], None)?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("embedding model returned no vector"))
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic fake: hashes the text into a tiny vector. Also counts
    /// calls and records the longest input it has seen.
    pub struct FakeEmbedder {
        pub calls: AtomicUsize,
        pub max_input_len: AtomicUsize,
        pub fail: bool,
    }

    impl FakeEmbedder {
        pub fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                max_input_len: AtomicUsize::new(0),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let capped = truncate_for_embedding(text);
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.max_input_len.fetch_max(capped.len(), Ordering::Relaxed);
            if self.fail {
                anyhow::bail!("fake embedder set to fail");
            }
            let mut acc: u32 = 0;
            for b in capped.bytes() {
                acc = acc.wrapping_mul(31).wrapping_add(b as u32);
            }
            Ok(vec![
                (acc % 97) as f32 / 97.0,
                ((acc / 97) % 89) as f32 / 89.0,
                ((acc / 8633) % 83) as f32 / 83.0,
            ])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_cap_and_char_boundaries() {
        let long = "é".repeat(EMBED_INPUT_CAP); // 2 bytes per char
        let capped = truncate_for_embedding(&long);
        assert!(capped.len() <= EMBED_INPUT_CAP);
        assert!(capped.is_char_boundary(capped.len()));

        let short = "hello";
        assert_eq!(truncate_for_embedding(short), "hello");
    }

    #[tokio::test]
    async fn fake_embedder_is_deterministic_and_capped() {
        use std::sync::atomic::Ordering;
        let fake = testing::FakeEmbedder::new();
        let a = fake.embed("User lives in Berlin").await.unwrap();
        let b = fake.embed("User lives in Berlin").await.unwrap();
        assert_eq!(a, b);

        let giant = "x".repeat(EMBED_INPUT_CAP * 2);
        fake.embed(&giant).await.unwrap();
        assert!(fake.max_input_len.load(Ordering::Relaxed) <= EMBED_INPUT_CAP);
    }
}
