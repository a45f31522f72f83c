//! Engine configuration, persisted to `eve_engine.json`, with generic
//! helpers for loading/saving JSON config files and resolving API keys
//! from fields or environment variables.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Generic load for any Serde config type with a `Default` implementation.
/// Falls back to `T::default()` if the file is missing or unparsable.
pub fn load_json_config<T: DeserializeOwned + Default>(path: &Path, label: &str) -> T {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<T>(&content) {
            Ok(config) => {
                println!("[{}] Loaded config from {}", label, path.display());
                config
            }
            Err(e) => {
                eprintln!(
                    "[{}] Failed to parse config {}: {}, using defaults",
                    label,
                    path.display(),
                    e
                );
                T::default()
            }
        },
        Err(_) => {
            println!(
                "[{}] No config file at {}, using defaults",
                label,
                path.display()
            );
            T::default()
        }
    }
}

/// Generic save for any Serde config type.
pub fn save_json_config<T: Serialize>(path: &Path, config: &T, label: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(path, json).map_err(|e| format!("Failed to write config file: {}", e))?;
    println!("[{}] Saved config to {}", label, path.display());
    Ok(())
}

/// Resolve an API key: check the direct `api_key` field first,
/// then fall back to reading the environment variable named in `api_key_env`.
pub fn resolve_api_key(api_key: &Option<String>, api_key_env: &Option<String>) -> Option<String> {
    if let Some(ref key) = api_key {
        if !key.is_empty() {
            return Some(key.clone());
        }
    }
    if let Some(ref env_var) = api_key_env {
        if let Ok(key) = std::env::var(env_var) {
            if !key.is_empty() {
                return Some(key);
            }
        }
    }
    None
}

// ── Engine config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl LlmSettings {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_api_key(&self.api_key, &self.api_key_env)
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            base_url: Some("https://api.openai.com/v1".to_string()),
            model: Some("gpt-4o-mini".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// SQLite database path. Defaults to `eve.db` under the user data dir.
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub llm: LlmSettings,

    /// Messages per AI-extraction chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Pause between AI-extraction requests.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,

    /// Width of one concurrent embedding batch.
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,

    #[serde(default = "default_memory_threshold")]
    pub memory_similarity_threshold: f32,

    #[serde(default = "default_knowledge_threshold")]
    pub knowledge_similarity_threshold: f32,

    /// Turns that must accumulate before ongoing extraction runs.
    #[serde(default = "default_ongoing_window")]
    pub ongoing_window: usize,

    #[serde(default = "default_daily_message_limit")]
    pub daily_message_limit: i64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8780".to_string()
}
fn default_chunk_size() -> usize {
    100
}
fn default_chunk_delay_ms() -> u64 {
    1000
}
fn default_embed_batch_size() -> usize {
    10
}
fn default_memory_threshold() -> f32 {
    0.70
}
fn default_knowledge_threshold() -> f32 {
    0.78
}
fn default_ongoing_window() -> usize {
    10
}
fn default_daily_message_limit() -> i64 {
    200
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            database_path: None,
            llm: LlmSettings::default(),
            chunk_size: default_chunk_size(),
            chunk_delay_ms: default_chunk_delay_ms(),
            embed_batch_size: default_embed_batch_size(),
            memory_similarity_threshold: default_memory_threshold(),
            knowledge_similarity_threshold: default_knowledge_threshold(),
            ongoing_window: default_ongoing_window(),
            daily_message_limit: default_daily_message_limit(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Self {
        load_json_config(path, "Config")
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        save_json_config(path, self, "Config")
    }

    /// Resolved database path, creating the data directory if needed.
    pub fn resolve_database_path(&self) -> PathBuf {
        if let Some(ref p) = self.database_path {
            return p.clone();
        }
        let base = dirs_next::data_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("eve-engine").join("eve.db")
    }

    /// Default location of the config file itself.
    pub fn default_path() -> PathBuf {
        let base = dirs_next::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("eve-engine").join("eve_engine.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_api_key_prefers_direct_field() {
        let direct = Some("sk-direct".to_string());
        let env = Some("EVE_TEST_KEY_THAT_DOES_NOT_EXIST".to_string());
        assert_eq!(resolve_api_key(&direct, &env), Some("sk-direct".to_string()));
        assert_eq!(resolve_api_key(&None, &env), None);
        assert_eq!(resolve_api_key(&Some(String::new()), &None), None);
    }

    #[test]
    fn config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eve_engine.json");

        let mut cfg = EngineConfig::default();
        cfg.chunk_size = 42;
        cfg.save(&path).unwrap();

        let loaded = EngineConfig::load(&path);
        assert_eq!(loaded.chunk_size, 42);
        assert_eq!(loaded.bind_addr, cfg.bind_addr);
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let loaded = EngineConfig::load(Path::new("/nonexistent/eve_engine.json"));
        assert_eq!(loaded.chunk_size, 100);
        assert_eq!(loaded.embed_batch_size, 10);
    }
}
