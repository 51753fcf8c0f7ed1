use super::basic::ranked;
use super::{SearchTarget, fan_out, settle};
use crate::capability::BackendCapabilityProfile;
use crate::catalog::StrategyKind;
use crate::config::MultiQueryConfig;
use crate::context::QueryContext;
use crate::error::{Result, RetrievalError};
use crate::fusion::aggregate;
use crate::result::RetrievalResult;
use log::warn;
use retrieval_vector_store::VectorBackend;
use std::sync::Arc;

/// One similarity search per query vector, aggregated per document.
#[derive(Debug, Clone)]
pub struct MultiQueryStrategy {
    pub(super) target: SearchTarget,
    config: MultiQueryConfig,
}

impl MultiQueryStrategy {
    pub(crate) fn new(config: MultiQueryConfig, profile: Arc<BackendCapabilityProfile>) -> Self {
        let metric = config.metric.unwrap_or_else(|| profile.default_metric());
        Self {
            target: SearchTarget {
                kind: StrategyKind::MultiQuery,
                profile,
                metric,
            },
            config,
        }
    }

    pub fn config(&self) -> &MultiQueryConfig {
        &self.config
    }

    pub(super) async fn execute(
        self,
        backend: &dyn VectorBackend,
        ctx: &QueryContext,
    ) -> Result<RetrievalResult> {
        let requested = self.config.num_queries;
        let vectors = ctx.query_vectors(requested);
        let issued = vectors.len();
        if issued < requested {
            warn!("multi_query: {requested} queries configured, only {issued} vectors available");
        }
        let target = &self.target;

        let searches: Vec<_> = vectors
            .iter()
            .map(|vector| async move {
                let hits = target.fetch_scoped(backend, ctx, vector, ctx.k).await?;
                Ok::<_, RetrievalError>(ranked(&hits, ctx.k))
            })
            .collect();
        let outcomes = fan_out(ctx, searches).await;
        let lists = settle(
            outcomes,
            StrategyKind::MultiQuery,
            backend.capability_profile_id(),
            ctx,
        )?;
        let succeeded = lists.len();

        let documents = aggregate(lists, self.config.aggregation_method, ctx.k);
        Ok(RetrievalResult::new(StrategyKind::MultiQuery.name(), documents)
            .with_metadata("aggregation_method", self.config.aggregation_method.as_str())
            .with_metadata("queries_requested", requested)
            .with_metadata("queries_issued", issued)
            .with_metadata("queries_failed", issued - succeeded))
    }
}
