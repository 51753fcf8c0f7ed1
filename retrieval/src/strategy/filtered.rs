use super::SearchTarget;
use super::basic::ranked;
use crate::capability::BackendCapabilityProfile;
use crate::catalog::StrategyKind;
use crate::config::MetadataFilteredConfig;
use crate::context::QueryContext;
use crate::error::Result;
use crate::result::RetrievalResult;
use log::debug;
use retrieval_vector_store::{MetadataFilter, SearchHit, VectorBackend};
use std::sync::Arc;

/// Similarity search constrained by metadata predicates.
///
/// Pushes the filter down when the backend filters natively. Otherwise runs a
/// single oversampled fetch and filters client-side; a short result is
/// returned as-is.
#[derive(Debug, Clone)]
pub struct MetadataFilteredStrategy {
    pub(super) target: SearchTarget,
    config: MetadataFilteredConfig,
}

impl MetadataFilteredStrategy {
    pub(crate) fn new(
        config: MetadataFilteredConfig,
        profile: Arc<BackendCapabilityProfile>,
    ) -> Self {
        let metric = config.metric.unwrap_or_else(|| profile.default_metric());
        Self {
            target: SearchTarget {
                kind: StrategyKind::MetadataFiltered,
                profile,
                metric,
            },
            config,
        }
    }

    pub fn config(&self) -> &MetadataFilteredConfig {
        &self.config
    }

    /// Configured defaults with per-call filters layered on top.
    pub fn effective_filter(&self, ctx: &QueryContext) -> MetadataFilter {
        match &ctx.filters {
            Some(overrides) => self.config.default_filters.merged_with(overrides),
            None => self.config.default_filters.clone(),
        }
    }

    pub(super) async fn execute(
        self,
        backend: &dyn VectorBackend,
        ctx: &QueryContext,
    ) -> Result<RetrievalResult> {
        let filter = self.effective_filter(ctx);
        let native = self.target.profile.native_filtering;

        let (hits, fetched) = if native {
            let pushed = (!filter.is_empty()).then_some(&filter);
            let hits = self
                .target
                .fetch(backend, ctx, &ctx.query_vector, ctx.k, pushed)
                .await?;
            let fetched = hits.len();
            (hits, fetched)
        } else {
            let oversampled = ctx.k.saturating_mul(self.config.oversample_factor);
            let hits = self
                .target
                .fetch(backend, ctx, &ctx.query_vector, oversampled, None)
                .await?;
            let fetched = hits.len();
            let kept: Vec<SearchHit> = hits
                .into_iter()
                .filter(|hit| filter.matches(&hit.metadata))
                .collect();
            (kept, fetched)
        };

        let matched = hits.len();
        if matched < ctx.k {
            debug!(
                "metadata_filtered: {matched} of {} requested documents matched ({fetched} fetched)",
                ctx.k
            );
        }

        let mode = if native { "native" } else { "client_side" };
        let fields: Vec<String> = filter.fields().map(str::to_string).collect();
        Ok(
            RetrievalResult::new(StrategyKind::MetadataFiltered.name(), ranked(&hits, ctx.k))
                .with_metadata("filter_mode", mode)
                .with_metadata("fetched", fetched)
                .with_metadata("matched", matched)
                .with_metadata("filter_fields", fields),
        )
    }
}
