//! Model metadata: context limits and per-million-token pricing.
//!
//! The runtime tolerates absence — an unknown model disables cost
//! accounting and the compaction heuristic for that session.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ens_domain::stream::Usage;

/// Per-million-token rates in currency units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostPerMillion {
    pub input: f64,
    pub output: f64,
    #[serde(default)]
    pub cache_read: f64,
    #[serde(default)]
    pub cache_write: f64,
}

/// Metadata for a single model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    /// Total context window in tokens.
    pub context_limit: u64,
    #[serde(default)]
    pub cost: CostPerMillion,
}

impl ModelInfo {
    /// Cost of one usage record at this model's rates.
    pub fn cost_of(&self, usage: &Usage) -> f64 {
        let per_million = |tokens: u64, rate: f64| tokens as f64 / 1_000_000.0 * rate;
        per_million(usage.input_tokens, self.cost.input)
            + per_million(usage.output_tokens + usage.reasoning_tokens, self.cost.output)
            + per_million(usage.cached_input_tokens, self.cost.cache_read)
            + per_million(usage.cached_output_tokens, self.cost.cache_write)
    }
}

/// Read access to model metadata.
pub trait ModelCatalog: Send + Sync {
    fn get_model(&self, id: &str) -> Option<ModelInfo>;
}

/// In-memory catalog; the embedding application seeds it at startup.
#[derive(Default)]
pub struct InMemoryCatalog {
    models: RwLock<HashMap<String, ModelInfo>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, info: ModelInfo) {
        self.models.write().insert(info.id.clone(), info);
    }

    pub fn with_models(models: impl IntoIterator<Item = ModelInfo>) -> Self {
        let catalog = Self::new();
        for info in models {
            catalog.insert(info);
        }
        catalog
    }
}

impl ModelCatalog for InMemoryCatalog {
    fn get_model(&self, id: &str) -> Option<ModelInfo> {
        self.models.read().get(id).cloned()
    }
}
