use super::{RetrievalStrategy, fan_out, settle};
use crate::capability::BackendCapabilityProfile;
use crate::catalog::StrategyKind;
use crate::context::QueryContext;
use crate::error::Result;
use crate::fusion::{WeightedList, fuse_weighted, normalize_weights};
use crate::result::RetrievalResult;
use log::debug;
use retrieval_vector_store::{MetadataValue, VectorBackend};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A built child strategy with its raw (unnormalized) weight.
#[derive(Debug, Clone)]
pub struct HybridChild {
    /// `<position>:<strategy>`, unique within the hybrid.
    pub label: String,
    pub weight: f64,
    pub strategy: RetrievalStrategy,
}

/// Weighted fusion of independently executed child strategies.
///
/// Every child over-fetches `k * oversample_factor` documents so that fusion
/// sees candidates ranked just below the cutoff of a single child; the fused
/// list is truncated to `k`.
#[derive(Debug, Clone)]
pub struct HybridUniversalStrategy {
    pub(super) profile: Arc<BackendCapabilityProfile>,
    children: Vec<HybridChild>,
    oversample_factor: usize,
}

impl HybridUniversalStrategy {
    pub(crate) fn new(
        children: Vec<(f64, RetrievalStrategy)>,
        oversample_factor: usize,
        profile: Arc<BackendCapabilityProfile>,
    ) -> Self {
        let children = children
            .into_iter()
            .enumerate()
            .map(|(i, (weight, strategy))| HybridChild {
                label: format!("{i}:{}", strategy.name()),
                weight,
                strategy,
            })
            .collect();
        Self {
            profile,
            children,
            oversample_factor: oversample_factor.max(1),
        }
    }

    pub fn children(&self) -> &[HybridChild] {
        &self.children
    }

    /// Child weights scaled to sum to 1.0.
    pub fn normalized_weights(&self) -> Vec<f64> {
        let raw: Vec<f64> = self.children.iter().map(|c| c.weight).collect();
        normalize_weights(&raw)
    }

    pub fn oversample_factor(&self) -> usize {
        self.oversample_factor
    }

    /// Result count a child is asked for when the hybrid returns `k`.
    ///
    /// A reranked child never fetches past its `initial_k`, and never below
    /// `k`.
    fn child_k(&self, strategy: &RetrievalStrategy, k: usize) -> usize {
        let wide = k.saturating_mul(self.oversample_factor);
        match strategy {
            RetrievalStrategy::Reranked(reranked) => wide.min(reranked.config().initial_k).max(k),
            _ => wide,
        }
    }

    pub(super) async fn execute(
        self,
        backend: &dyn VectorBackend,
        ctx: &QueryContext,
    ) -> Result<RetrievalResult> {
        let child_contexts: Vec<QueryContext> = self
            .children
            .iter()
            .map(|child| ctx.with_k(self.child_k(&child.strategy, ctx.k)))
            .collect();
        let child_ks: Vec<usize> = child_contexts.iter().map(|c| c.k).collect();

        let mut labels = Vec::with_capacity(self.children.len());
        let mut weights = Vec::with_capacity(self.children.len());
        let mut runs = Vec::with_capacity(self.children.len());
        for (child, child_ctx) in self.children.into_iter().zip(&child_contexts) {
            labels.push(child.label);
            weights.push(child.weight);
            runs.push(child.strategy.execute(backend, child_ctx));
        }

        let outcomes = fan_out(ctx, runs).await;
        let survivors = settle(
            outcomes,
            StrategyKind::HybridUniversal,
            backend.capability_profile_id(),
            ctx,
        )?;

        // Renormalize over the children that produced a result.
        let surviving_weights: Vec<f64> = survivors.iter().map(|(i, _)| weights[*i]).collect();
        let normalized = normalize_weights(&surviving_weights);

        let mut recorded_weights = BTreeMap::new();
        let mut lists = Vec::with_capacity(survivors.len());
        let mut succeeded = vec![false; labels.len()];
        for ((index, result), weight) in survivors.into_iter().zip(normalized) {
            succeeded[index] = true;
            recorded_weights.insert(labels[index].clone(), MetadataValue::from(weight));
            lists.push(WeightedList {
                label: labels[index].clone(),
                weight,
                documents: result.documents,
            });
        }
        let failed: Vec<String> = labels
            .iter()
            .zip(&succeeded)
            .filter(|(_, ok)| !**ok)
            .map(|(label, _)| label.clone())
            .collect();

        debug!(
            "hybrid_universal: fusing {} of {} children (child fetch sizes {child_ks:?})",
            lists.len(),
            labels.len()
        );
        let documents = fuse_weighted(lists, ctx.k);

        Ok(RetrievalResult::new(StrategyKind::HybridUniversal.name(), documents)
            .with_metadata("normalized_weights", MetadataValue::Map(recorded_weights))
            .with_metadata("failed_children", failed)
            .with_metadata("child_fetch_k", child_ks))
    }
}
