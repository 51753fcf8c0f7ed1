use super::SearchTarget;
use crate::capability::BackendCapabilityProfile;
use crate::catalog::StrategyKind;
use crate::config::BasicSimilarityConfig;
use crate::context::QueryContext;
use crate::error::Result;
use crate::result::{RetrievalResult, ScoredDocument, rank};
use retrieval_vector_store::{DistanceMetric, SearchHit, VectorBackend};
use std::sync::Arc;

/// Single nearest-neighbour query; the backend ranking is kept as-is apart
/// from the result ordering rules.
#[derive(Debug, Clone)]
pub struct BasicSimilarityStrategy {
    pub(super) target: SearchTarget,
    config: BasicSimilarityConfig,
}

impl BasicSimilarityStrategy {
    pub(crate) fn new(
        config: BasicSimilarityConfig,
        profile: Arc<BackendCapabilityProfile>,
    ) -> Self {
        let metric = config.metric.unwrap_or_else(|| profile.default_metric());
        Self {
            target: SearchTarget {
                kind: StrategyKind::BasicSimilarity,
                profile,
                metric,
            },
            config,
        }
    }

    pub fn config(&self) -> &BasicSimilarityConfig {
        &self.config
    }

    pub fn metric(&self) -> DistanceMetric {
        self.target.metric
    }

    pub(super) async fn execute(
        self,
        backend: &dyn VectorBackend,
        ctx: &QueryContext,
    ) -> Result<RetrievalResult> {
        let hits = self
            .target
            .fetch_scoped(backend, ctx, &ctx.query_vector, ctx.k)
            .await?;
        let fetched = hits.len();

        Ok(
            RetrievalResult::new(StrategyKind::BasicSimilarity.name(), ranked(&hits, ctx.k))
                .with_metadata("fetched", fetched)
                .with_metadata("metric", self.target.metric.as_str()),
        )
    }
}

/// Wrap raw hits into ranked documents.
pub(super) fn ranked(hits: &[SearchHit], k: usize) -> Vec<ScoredDocument> {
    let mut documents: Vec<ScoredDocument> = hits.iter().map(ScoredDocument::from_hit).collect();
    rank(&mut documents, k);
    documents
}
