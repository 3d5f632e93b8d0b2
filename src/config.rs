//! Runtime configuration for complexity-quiz.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Every knob has a default, so a partial file (or none at all) is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::cache::item::{Category, Key};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "complexity-quiz",
    about = "Terminal quiz on P, NP, NP-Complete and NP-Hard problems"
)]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, env = "QUIZ_CONFIG", default_value = "quiz.json")]
    pub config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Print cache metrics (Prometheus text format) on exit.
    #[arg(long)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Play the AI question mode (default).
    Play,
    /// Fill the cache for the warm-up keys, then exit.
    Warm,
    /// Show what the persistent store holds.
    Stats,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache tier settings.
    pub cache: CacheConfig,

    /// Background replenishment settings.
    pub prefetch: PrefetchConfig,

    /// Question generator settings.
    pub generation: GenerationConfig,

    /// Interactive session settings.
    pub quiz: QuizConfig,
}

/// Memory and persistent tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Items kept in memory per key.
    pub memory_capacity: usize,

    /// Items kept on disk per key.
    pub disk_capacity: usize,

    /// Replenish a key once its memory queue drops below this many items.
    pub low_water_mark: usize,

    /// Upper bound on the replenishment target per key.
    pub replenish_cap: usize,

    /// Flush the store after this many appends within a replenishment batch.
    pub flush_every: usize,

    /// Store file. `.gz` selects gzip, `.zst` selects zstd, anything else
    /// is indented JSON.
    pub store_path: PathBuf,

    /// zstd compression level (1-22).
    pub zstd_level: i32,

    /// Deadline for a single generation call made by the cache.
    pub generation_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 50,
            disk_capacity: 20,
            low_water_mark: 3,
            replenish_cap: 10,
            flush_every: 5,
            store_path: PathBuf::from("llm_questions_cache.json"),
            zstd_level: 3,
            generation_timeout_secs: 60,
        }
    }
}

impl CacheConfig {
    /// Memory occupancy a replenishment batch aims for.
    pub fn replenish_target(&self) -> usize {
        self.replenish_cap.min(self.memory_capacity / 2)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

/// Prefetch worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Number of background workers.
    pub workers: usize,

    /// Maximum queued replenishment requests.
    pub queue_depth: usize,

    /// Keys replenished as soon as the scheduler starts.
    pub warm_keys: Vec<Key>,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_depth: 64,
            warm_keys: [
                Category::P,
                Category::Np,
                Category::NpComplete,
                Category::NpHard,
            ]
            .into_iter()
            .map(|c| Key::new(c, 3))
            .collect(),
        }
    }
}

/// Messages API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Messages endpoint.
    pub api_url: String,

    /// Value of the `anthropic-version` header.
    pub api_version: String,

    /// Model name. `CLAUDE_MODEL` overrides it at load time.
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Token budget for a question.
    pub max_tokens: u32,

    /// Sampling temperature for questions.
    pub temperature: f64,

    /// Token budget for a detailed explanation.
    pub explanation_max_tokens: u32,

    /// Sampling temperature for explanations.
    pub explanation_temperature: f64,

    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_version: "2023-06-01".to_string(),
            model: "claude-3-haiku-20240307".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            explanation_max_tokens: 1500,
            explanation_temperature: 0.3,
            timeout_secs: 30,
        }
    }
}

/// Interactive session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    /// Questions asked per round.
    pub questions_per_round: usize,

    /// Cache lookups attempted per question before skipping it.
    pub retries: usize,

    /// Difficulty used for tiered categories.
    pub difficulty: u8,

    /// Seconds to wait for an answer (none = wait forever).
    pub answer_timeout_secs: Option<u64>,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            questions_per_round: 3,
            retries: 2,
            difficulty: 3,
            answer_timeout_secs: None,
        }
    }
}

impl QuizConfig {
    pub fn answer_timeout(&self) -> Option<Duration> {
        self.answer_timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults when
    /// the file is absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str::<Config>(&data)?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };

        if let Ok(model) = std::env::var("CLAUDE_MODEL") {
            if !model.trim().is_empty() {
                config.generation.model = model;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the cache can't operate with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.cache.memory_capacity > 0, "cache.memory_capacity must be > 0");
        anyhow::ensure!(self.cache.disk_capacity > 0, "cache.disk_capacity must be > 0");
        anyhow::ensure!(self.cache.flush_every > 0, "cache.flush_every must be > 0");
        anyhow::ensure!(self.prefetch.workers > 0, "prefetch.workers must be > 0");
        anyhow::ensure!(self.prefetch.queue_depth > 0, "prefetch.queue_depth must be > 0");
        anyhow::ensure!(
            (1..=5).contains(&self.quiz.difficulty),
            "quiz.difficulty must be within 1..=5"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.cache.memory_capacity, 50);
        assert_eq!(cfg.cache.disk_capacity, 20);
        assert_eq!(cfg.cache.low_water_mark, 3);
        assert_eq!(cfg.prefetch.workers, 2);
        assert_eq!(cfg.prefetch.warm_keys.len(), 4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_replenish_target() {
        let mut cfg = CacheConfig::default();
        assert_eq!(cfg.replenish_target(), 10);
        cfg.memory_capacity = 8;
        assert_eq!(cfg.replenish_target(), 4);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let json = r#"{
            "cache": {"memory_capacity": 12, "store_path": "q.json.gz"},
            "prefetch": {"warm_keys": ["NP-Hard_4", "Conceptual_3"]}
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.cache.memory_capacity, 12);
        assert_eq!(cfg.cache.disk_capacity, 20);
        assert_eq!(cfg.prefetch.workers, 2);
        assert_eq!(cfg.prefetch.warm_keys[0], Key::new(Category::NpHard, 4));
        assert_eq!(cfg.prefetch.warm_keys[1], Key::conceptual());
    }

    #[test]
    fn test_bad_warm_key_rejected() {
        let json = r#"{"prefetch": {"warm_keys": ["EXP_3"]}}"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut cfg = Config::default();
        cfg.prefetch.workers = 0;
        assert!(cfg.validate().is_err());
    }
}
