use chrono::{DateTime, Utc};
use retrieval_vector_store::MetadataFilter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-call inputs for one strategy execution.
///
/// The context is shared read-only by every sub-execution of a fan-out.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Primary query embedding.
    pub query_vector: Arc<Vec<f32>>,

    /// Pre-computed expansion vectors for multi-query retrieval. The primary
    /// vector is used when this is empty.
    pub expansions: Vec<Arc<Vec<f32>>>,

    /// Requested result count.
    pub k: usize,

    /// Per-call metadata filters, merged over configured defaults.
    pub filters: Option<MetadataFilter>,

    /// "Now" for recency scoring.
    pub reference_time: DateTime<Utc>,

    /// Maximum concurrent sub-executions; `None` runs every child at once.
    pub fan_out_limit: Option<usize>,

    pub cancellation: CancellationToken,
}

impl QueryContext {
    pub fn new(query_vector: Vec<f32>, k: usize) -> Self {
        Self {
            query_vector: Arc::new(query_vector),
            expansions: Vec::new(),
            k,
            filters: None,
            reference_time: Utc::now(),
            fan_out_limit: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_shared_vector(query_vector: Arc<Vec<f32>>, k: usize) -> Self {
        Self {
            query_vector,
            ..Self::new(Vec::new(), k)
        }
    }

    pub fn with_expansions(mut self, expansions: Vec<Vec<f32>>) -> Self {
        self.expansions = expansions.into_iter().map(Arc::new).collect();
        self
    }

    pub fn with_filters(mut self, filters: MetadataFilter) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_reference_time(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = reference_time;
        self
    }

    pub fn with_fan_out_limit(mut self, limit: usize) -> Self {
        self.fan_out_limit = Some(limit);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// The first `n` query vectors: expansions when present, otherwise the
    /// primary vector alone.
    pub fn query_vectors(&self, n: usize) -> Vec<Arc<Vec<f32>>> {
        if self.expansions.is_empty() {
            vec![Arc::clone(&self.query_vector)]
        } else {
            self.expansions.iter().take(n).cloned().collect()
        }
    }

    /// The same call with a different result count; shares the vectors and the
    /// cancellation token.
    pub fn with_k(&self, k: usize) -> Self {
        Self {
            k,
            ..self.clone()
        }
    }

    /// Concurrency for a fan-out over `children` sub-executions.
    pub fn fan_out(&self, children: usize) -> usize {
        self.fan_out_limit
            .unwrap_or(children)
            .min(children)
            .max(1)
    }
}

/// Lifecycle of one strategy execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    Configured,
    Validated,
    Executing,
    Completed,
    Failed,
}

impl StrategyState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StrategyState::Completed | StrategyState::Failed)
    }

    pub fn can_transition_to(self, next: StrategyState) -> bool {
        matches!(
            (self, next),
            (StrategyState::Configured, StrategyState::Validated)
                | (StrategyState::Configured, StrategyState::Failed)
                | (StrategyState::Validated, StrategyState::Executing)
                | (StrategyState::Validated, StrategyState::Failed)
                | (StrategyState::Executing, StrategyState::Completed)
                | (StrategyState::Executing, StrategyState::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyState::Configured => "configured",
            StrategyState::Validated => "validated",
            StrategyState::Executing => "executing",
            StrategyState::Completed => "completed",
            StrategyState::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_query_vectors_fall_back_to_primary() {
        let ctx = QueryContext::new(vec![1.0, 0.0], 5);
        assert_eq!(ctx.query_vectors(3).len(), 1);

        let ctx = ctx.with_expansions(vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]]);
        let vectors = ctx.query_vectors(3);
        assert_eq!(vectors.len(), 3);
        assert_eq!(*vectors[2], vec![3.0]);
    }

    #[test]
    fn test_with_k_shares_cancellation() {
        let ctx = QueryContext::new(vec![1.0], 5);
        let wider = ctx.with_k(10);
        assert_eq!(wider.k, 10);
        assert!(Arc::ptr_eq(&wider.query_vector, &ctx.query_vector));

        ctx.cancellation.cancel();
        assert!(wider.cancellation.is_cancelled());
    }

    #[test]
    fn test_fan_out_is_bounded() {
        let ctx = QueryContext::new(vec![1.0], 5);
        assert_eq!(ctx.fan_out(4), 4);
        assert_eq!(ctx.fan_out(0), 1);
        assert_eq!(ctx.with_fan_out_limit(2).fan_out(4), 2);
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        let all = [
            StrategyState::Configured,
            StrategyState::Validated,
            StrategyState::Executing,
            StrategyState::Completed,
            StrategyState::Failed,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(!from.can_transition_to(to));
            }
        }
        assert!(StrategyState::Configured.can_transition_to(StrategyState::Validated));
        assert!(!StrategyState::Configured.can_transition_to(StrategyState::Executing));
    }
}
