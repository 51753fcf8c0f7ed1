use super::SearchTarget;
use crate::capability::BackendCapabilityProfile;
use crate::catalog::StrategyKind;
use crate::config::RerankedConfig;
use crate::context::QueryContext;
use crate::error::{ConfigViolation, Result};
use crate::rerank::RerankEngine;
use crate::result::RetrievalResult;
use retrieval_vector_store::VectorBackend;
use std::sync::Arc;

/// Over-fetch `initial_k` candidates, then re-score them.
#[derive(Debug, Clone)]
pub struct RerankedStrategy {
    pub(super) target: SearchTarget,
    config: RerankedConfig,
}

impl RerankedStrategy {
    pub(crate) fn new(config: RerankedConfig, profile: Arc<BackendCapabilityProfile>) -> Self {
        let metric = config.metric.unwrap_or_else(|| profile.default_metric());
        Self {
            target: SearchTarget {
                kind: StrategyKind::Reranked,
                profile,
                metric,
            },
            config,
        }
    }

    pub fn config(&self) -> &RerankedConfig {
        &self.config
    }

    pub(super) async fn execute(
        self,
        backend: &dyn VectorBackend,
        ctx: &QueryContext,
    ) -> Result<RetrievalResult> {
        if self.config.initial_k < ctx.k {
            return Err(ConfigViolation::new(
                "initial_k",
                format!(
                    "must be >= the requested k ({}), got {}",
                    ctx.k, self.config.initial_k
                ),
            )
            .into_error(StrategyKind::Reranked.name(), backend.capability_profile_id()));
        }

        let hits = self
            .target
            .fetch_scoped(backend, ctx, &ctx.query_vector, self.config.initial_k)
            .await?;
        let candidates = hits.len();

        let documents = RerankEngine::new(&self.config, ctx.reference_time).rerank(hits, ctx.k);
        let factors: Vec<&str> = self
            .config
            .rerank_factors
            .keys()
            .map(|f| f.name())
            .collect();

        Ok(RetrievalResult::new(StrategyKind::Reranked.name(), documents)
            .with_metadata("candidates", candidates)
            .with_metadata("rerank_factors", factors))
    }
}
