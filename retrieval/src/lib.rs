/*!
# Retrieval Engine

Capability-aware retrieval over pluggable vector stores:
- **Capability registry**: what each backend supports (filtering, hybrid search, metrics, batch limits)
- **Strategy catalog**: five strategies with required and preferred capabilities
- **Compatibility scoring**: static fit score per (strategy, backend) pair
- **Fusion and reranking**: multi-query aggregation, weighted hybrid fusion, recency/length/metadata boosts

## Strategies

- **basic_similarity**: one nearest-neighbour query
- **metadata_filtered**: native filter push-down, or oversampled fetch + client-side filtering
- **multi_query**: one search per expanded query vector, aggregated by `max`, `mean` or `weighted`
- **reranked**: over-fetch `initial_k`, then re-score
- **hybrid_universal**: weighted fusion of the other four

## Architecture

```text
retrieve(spec | use case, backend, query, k)
  ├─> StrategyRegistry
  │     ├─> CapabilityRegistry::profile_for(backend)
  │     ├─> StrategyConfig::parse (schema, ranges, unknown keys)
  │     └─> compatibility gate (fails closed)
  ├─> QueryEmbedder (LRU cached)
  └─> RetrievalStrategy::execute
        ├─> VectorBackend::search (raced against cancellation)
        └─> fusion / rerank
              └─> RetrievalResult (score desc, doc ref asc, len <= k)
```

## Example

```rust,no_run
use async_trait::async_trait;
use retrieval_engine::{
    EmbeddingError, EngineConfig, QueryEmbedder, RetrievalEngine, StrategyRegistry, StrategySpec,
};
use retrieval_vector_store::InMemoryVectorStore;
use serde_json::json;
use std::sync::Arc;

struct Embedder;

#[async_trait]
impl QueryEmbedder for Embedder {
    async fn embedding_for(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![text.len() as f32, 1.0])
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let engine = RetrievalEngine::new(
        StrategyRegistry::with_defaults(),
        EngineConfig::default(),
        Arc::new(Embedder),
    )?;
    let store = InMemoryVectorStore::new();

    let spec = StrategySpec::new("reranked", json!({ "rerank_factors": { "recency": 0.2 } }));
    let result = engine.retrieve(&spec, &store, "async error handling", 5).await?;

    for (i, doc) in result.documents.iter().enumerate() {
        println!("{}. {} (score: {:.3})", i + 1, doc.doc_ref, doc.score);
    }

    Ok(())
}
```
*/

mod capability;
mod catalog;
mod compatibility;
mod config;
mod context;
mod embedder;
mod engine;
mod error;
mod fusion;
mod registry;
mod rerank;
mod result;
mod strategy;

pub use capability::{BackendCapabilityProfile, Capability, CapabilityRegistry};
pub use catalog::{StrategyCatalog, StrategyDescriptor, StrategyKind};
pub use compatibility::{CompatibilityReport, score as compatibility_score};
pub use config::{
    AggregationMethod, BasicSimilarityConfig, CONFIG_SCHEMA_VERSION, EngineConfig,
    HybridChildConfig, HybridUniversalConfig, MetadataBoostRule, MetadataFilteredConfig,
    MultiQueryConfig, RerankFactor, RerankedConfig, StrategyConfig, StrategySpec,
};
pub use context::{QueryContext, StrategyState};
pub use embedder::QueryEmbedder;
pub use engine::{CacheStats, RetrievalEngine, RetrieveOptions};
pub use error::{ConfigViolation, EmbeddingError, Result, RetrievalError};
pub use fusion::{WeightedList, aggregate, fuse_weighted, normalize_weights};
pub use registry::{StrategyRegistry, ValidationReport};
pub use rerank::RerankEngine;
pub use result::{RetrievalResult, ScoredDocument, StrategyMetadata};
pub use strategy::{
    BasicSimilarityStrategy, HybridChild, HybridUniversalStrategy, MetadataFilteredStrategy,
    MultiQueryStrategy, RerankedStrategy, RetrievalStrategy,
};
