//! The five retrieval strategies and the plumbing they share.

mod basic;
mod filtered;
mod hybrid;
mod multi_query;
mod reranked;

pub use basic::BasicSimilarityStrategy;
pub use filtered::MetadataFilteredStrategy;
pub use hybrid::{HybridChild, HybridUniversalStrategy};
pub use multi_query::MultiQueryStrategy;
pub use reranked::RerankedStrategy;

use crate::capability::BackendCapabilityProfile;
use crate::catalog::StrategyKind;
use crate::context::QueryContext;
use crate::error::{Result, RetrievalError};
use crate::result::RetrievalResult;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use retrieval_vector_store::{DistanceMetric, MetadataFilter, SearchHit, VectorBackend};
use std::future::Future;
use std::sync::Arc;

/// A validated strategy bound to the backend profile it was built for.
///
/// Only the strategy registry constructs these, after the capability gate has
/// passed. `execute` consumes the instance.
#[derive(Debug, Clone)]
pub enum RetrievalStrategy {
    BasicSimilarity(BasicSimilarityStrategy),
    MetadataFiltered(MetadataFilteredStrategy),
    MultiQuery(MultiQueryStrategy),
    Reranked(RerankedStrategy),
    HybridUniversal(HybridUniversalStrategy),
}

impl RetrievalStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            RetrievalStrategy::BasicSimilarity(_) => StrategyKind::BasicSimilarity,
            RetrievalStrategy::MetadataFiltered(_) => StrategyKind::MetadataFiltered,
            RetrievalStrategy::MultiQuery(_) => StrategyKind::MultiQuery,
            RetrievalStrategy::Reranked(_) => StrategyKind::Reranked,
            RetrievalStrategy::HybridUniversal(_) => StrategyKind::HybridUniversal,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn profile(&self) -> &BackendCapabilityProfile {
        match self {
            RetrievalStrategy::BasicSimilarity(s) => s.target.profile.as_ref(),
            RetrievalStrategy::MetadataFiltered(s) => s.target.profile.as_ref(),
            RetrievalStrategy::MultiQuery(s) => s.target.profile.as_ref(),
            RetrievalStrategy::Reranked(s) => s.target.profile.as_ref(),
            RetrievalStrategy::HybridUniversal(s) => s.profile.as_ref(),
        }
    }

    /// Whether this strategy, or any hybrid child, consumes query expansions.
    pub fn uses_expansions(&self) -> bool {
        match self {
            RetrievalStrategy::MultiQuery(_) => true,
            RetrievalStrategy::HybridUniversal(hybrid) => hybrid
                .children()
                .iter()
                .any(|child| child.strategy.uses_expansions()),
            _ => false,
        }
    }

    /// Run the strategy against `backend`.
    ///
    /// The backend must report the profile id the strategy was built for.
    pub fn execute<'a>(
        self,
        backend: &'a dyn VectorBackend,
        ctx: &'a QueryContext,
    ) -> BoxFuture<'a, Result<RetrievalResult>> {
        Box::pin(async move {
            ensure_backend(self.kind(), self.profile(), backend)?;
            match self {
                RetrievalStrategy::BasicSimilarity(s) => s.execute(backend, ctx).await,
                RetrievalStrategy::MetadataFiltered(s) => s.execute(backend, ctx).await,
                RetrievalStrategy::MultiQuery(s) => s.execute(backend, ctx).await,
                RetrievalStrategy::Reranked(s) => s.execute(backend, ctx).await,
                RetrievalStrategy::HybridUniversal(s) => s.execute(backend, ctx).await,
            }
        })
    }
}

fn ensure_backend(
    kind: StrategyKind,
    profile: &BackendCapabilityProfile,
    backend: &dyn VectorBackend,
) -> Result<()> {
    let actual = backend.capability_profile_id();
    if actual != profile.backend_id {
        return Err(RetrievalError::IncompatibleBackend {
            strategy: kind.name().to_string(),
            backend: actual.to_string(),
            missing: Vec::new(),
            detail: format!("strategy was built for backend `{}`", profile.backend_id),
        });
    }
    Ok(())
}

/// Over-fetch multiplier when a per-call filter is applied client-side.
const CLIENT_SIDE_OVERSAMPLE: usize = 3;

/// Target of a backend search shared by every strategy.
#[derive(Debug, Clone)]
pub(crate) struct SearchTarget {
    pub(crate) kind: StrategyKind,
    pub(crate) profile: Arc<BackendCapabilityProfile>,
    pub(crate) metric: DistanceMetric,
}

impl SearchTarget {
    /// One backend search, raced against cancellation. The fetch size is
    /// clamped to the backend's batch limit.
    pub(crate) async fn fetch(
        &self,
        backend: &dyn VectorBackend,
        ctx: &QueryContext,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        let fetch = self.profile.clamp_fetch(k);
        if fetch < k {
            warn!(
                "{}: fetch of {k} clamped to max batch size {} of `{}`",
                self.kind, self.profile.max_batch_size, self.profile.backend_id
            );
        }

        let backend_id = backend.capability_profile_id();
        tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(RetrievalError::PartialFusionAborted {
                strategy: self.kind.name().to_string(),
                backend: backend_id.to_string(),
                completed: 0,
                total: 1,
            }),
            hits = backend.search(vector, fetch, filter, self.metric) => {
                let hits = hits.map_err(|err| {
                    RetrievalError::from_backend(err, self.kind.name(), backend_id)
                })?;
                debug!("{}: backend `{backend_id}` returned {} hits", self.kind, hits.len());
                Ok(hits)
            }
        }
    }

    /// [`fetch`](Self::fetch) honouring the per-call filters of `ctx`.
    ///
    /// Filters are pushed down to backends that filter natively. Otherwise one
    /// oversampled fetch is filtered client-side and cut back to `k`.
    pub(crate) async fn fetch_scoped(
        &self,
        backend: &dyn VectorBackend,
        ctx: &QueryContext,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let Some(filter) = ctx.filters.as_ref().filter(|f| !f.is_empty()) else {
            return self.fetch(backend, ctx, vector, k, None).await;
        };
        if self.profile.native_filtering {
            return self.fetch(backend, ctx, vector, k, Some(filter)).await;
        }

        let oversampled = k.saturating_mul(CLIENT_SIDE_OVERSAMPLE);
        let hits = self.fetch(backend, ctx, vector, oversampled, None).await?;
        let fetched = hits.len();
        let mut kept: Vec<SearchHit> = hits
            .into_iter()
            .filter(|hit| filter.matches(&hit.metadata))
            .collect();
        debug!(
            "{}: {} of {fetched} hits passed the per-call filter client-side",
            self.kind,
            kept.len()
        );
        kept.truncate(k);
        Ok(kept)
    }
}

/// Run sub-executions with bounded concurrency, preserving input order.
pub(crate) async fn fan_out<T, F>(ctx: &QueryContext, futures: Vec<F>) -> Vec<Result<T>>
where
    F: Future<Output = Result<T>>,
{
    let limit = ctx.fan_out(futures.len());
    stream::iter(futures).buffered(limit).collect().await
}

/// Reduce fan-out outcomes to the surviving `(index, value)` pairs.
///
/// Cancellation aborts the whole call. Errors other than
/// `BackendUnavailable` propagate unchanged. Unavailable sub-executions are
/// dropped as long as one sibling succeeded.
pub(crate) fn settle<T>(
    outcomes: Vec<Result<T>>,
    kind: StrategyKind,
    backend_id: &str,
    ctx: &QueryContext,
) -> Result<Vec<(usize, T)>> {
    let total = outcomes.len();
    let completed = outcomes.iter().filter(|o| o.is_ok()).count();

    let aborted = ctx.cancellation.is_cancelled()
        || outcomes
            .iter()
            .any(|o| matches!(o, Err(RetrievalError::PartialFusionAborted { .. })));
    if aborted {
        return Err(RetrievalError::PartialFusionAborted {
            strategy: kind.name().to_string(),
            backend: backend_id.to_string(),
            completed,
            total,
        });
    }

    let mut survivors = Vec::with_capacity(completed);
    let mut unavailable = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(value) => survivors.push((index, value)),
            Err(RetrievalError::BackendUnavailable { reason, .. }) => {
                unavailable.push((index, reason));
            }
            Err(err) => return Err(err),
        }
    }

    if survivors.is_empty() {
        let reason = unavailable
            .first()
            .map(|(_, reason)| reason.clone())
            .unwrap_or_else(|| "nothing to execute".to_string());
        return Err(RetrievalError::BackendUnavailable {
            strategy: kind.name().to_string(),
            backend: backend_id.to_string(),
            reason: format!("all {total} sub-executions failed, first: {reason}"),
        });
    }

    for (index, reason) in &unavailable {
        warn!("{kind}: dropping sub-execution {index} of {total}: {reason}");
    }
    Ok(survivors)
}
