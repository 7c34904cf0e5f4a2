// src/config/file.rs
// File-based configuration from ~/.hindsight/hindsight.toml
//
// Every detection threshold and weight in the engine is a field here rather
// than a constant: the conflict cutoffs and retrieval weights are tunable
// defaults, and deployments are expected to adjust them.

use chrono::Duration;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::types::{Category, Tier};

/// Top-level config structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    /// Directory holding the database file. Defaults to ~/.hindsight.
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub tiers: TierConfig,
    #[serde(default)]
    pub conflict: ConflictConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// Tier transition thresholds and per-tier retrieval weights
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Age after which a working record becomes short-term (seconds).
    pub working_max_age_secs: i64,
    /// Age after which a short-term record becomes long-term (seconds).
    pub short_term_max_age_secs: i64,
    /// Minimum interval between opportunistic sweeps at query time (seconds).
    pub min_sweep_interval_secs: i64,
    /// Retrieval weight for working records ("current context" boost).
    pub working_weight: f32,
    pub short_term_weight: f32,
    /// Long-term records surface on relevance alone.
    pub long_term_weight: f32,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            working_max_age_secs: 3600,        // 1 hour
            short_term_max_age_secs: 604_800,  // 7 days
            min_sweep_interval_secs: 60,
            working_weight: 1.2,
            short_term_weight: 1.05,
            long_term_weight: 1.0,
        }
    }
}

impl TierConfig {
    pub fn working_max_age(&self) -> Duration {
        Duration::seconds(self.working_max_age_secs)
    }

    pub fn short_term_max_age(&self) -> Duration {
        Duration::seconds(self.short_term_max_age_secs)
    }

    pub fn min_sweep_interval(&self) -> Duration {
        Duration::seconds(self.min_sweep_interval_secs)
    }

    pub fn weight(&self, tier: Tier) -> f32 {
        match tier {
            Tier::Working => self.working_weight,
            Tier::ShortTerm => self.short_term_weight,
            Tier::LongTerm => self.long_term_weight,
        }
    }
}

/// Conflict detection thresholds (three-level detection, cheapest first)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// How many same-category neighbors to fetch for resolution.
    pub neighbor_k: usize,
    /// Normalized-text ratio at or above which a candidate is a near-duplicate.
    pub duplicate_ratio: f32,
    /// Embedding cosine similarity required before a fact-like contradiction
    /// is considered "same topic".
    pub contradiction_cosine: f32,
    /// Minimum subject-token overlap (Jaccard) for a contradiction.
    pub subject_overlap: f32,
    /// Cosine similarity above which an unresolved overlap is flagged.
    pub flag_cosine: f32,
    /// Text ratio above which an unresolved overlap is flagged when no
    /// embeddings are available.
    pub flag_ratio: f32,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            neighbor_k: 5,
            duplicate_ratio: 0.95,
            contradiction_cosine: 0.75,
            subject_overlap: 0.6,
            flag_cosine: 0.70,
            flag_ratio: 0.80,
        }
    }
}

/// Hybrid retrieval tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Reciprocal Rank Fusion constant; dampens rank-1 outliers.
    pub rrf_c: f32,
    /// Candidates fetched per pass before fusion.
    pub candidate_pool: usize,
    /// Default result count when the caller does not specify k.
    pub default_limit: usize,
    /// Per-category score multipliers. Categories absent here weigh 1.0.
    #[serde(default = "default_category_weights")]
    pub category_weights: BTreeMap<String, f32>,
}

fn default_category_weights() -> BTreeMap<String, f32> {
    BTreeMap::from([
        ("fact".to_string(), 1.2),
        ("procedure".to_string(), 1.2),
        ("conversation".to_string(), 0.9),
    ])
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_c: 60.0,
            candidate_pool: 50,
            default_limit: 10,
            category_weights: default_category_weights(),
        }
    }
}

impl RetrievalConfig {
    pub fn category_weight(&self, category: Category) -> f32 {
        self.category_weights
            .get(&category.to_string())
            .copied()
            .unwrap_or(1.0)
    }
}

/// Context assembly budget
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Retrieval candidates considered per query.
    pub max_items: usize,
    /// Default token ceiling for the assembled payload.
    pub max_tokens: usize,
    /// Live conversation turns always included, even over budget.
    pub reserved_history_turns: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_items: 12,
            max_tokens: 2048,
            reserved_history_turns: 2,
        }
    }
}

/// Classifier behavior and cache lifecycle
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Delegate ambiguous inputs to the LLM backend at ingestion.
    pub use_llm: bool,
    /// Hard deadline for the LLM path before falling back.
    pub llm_timeout_secs: u64,
    /// Bounded classification cache size (entries).
    pub cache_capacity: u64,
    /// Cache entry time-to-live (seconds).
    pub cache_ttl_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            use_llm: false,
            llm_timeout_secs: 10,
            cache_capacity: 1024,
            cache_ttl_secs: 300,
        }
    }
}

impl EngineConfig {
    /// Load config from ~/.hindsight/hindsight.toml, falling back to defaults
    /// when the file is absent or unparseable.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hindsight")
            .join("hindsight.toml")
    }

    /// Directory holding the database file.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".hindsight")
        })
    }

    /// Full path of the database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("memory.db")
    }
}
