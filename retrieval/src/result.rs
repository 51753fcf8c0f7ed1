use retrieval_vector_store::{DocRef, MetadataValue, SearchHit};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Diagnostic key/value pairs attached to documents and results.
pub type StrategyMetadata = BTreeMap<String, MetadataValue>;

/// A single ranked document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// Opaque reference into the caller's document store
    pub doc_ref: DocRef,

    /// Fused score (higher is better)
    pub score: f64,

    /// Per-factor contributions that make up `score`
    #[serde(default)]
    pub breakdown: BTreeMap<String, f64>,

    /// Strategy-specific diagnostics for this document
    #[serde(default)]
    pub strategy_metadata: StrategyMetadata,
}

impl ScoredDocument {
    pub fn new(doc_ref: impl Into<DocRef>, score: f64) -> Self {
        Self {
            doc_ref: doc_ref.into(),
            score,
            breakdown: BTreeMap::new(),
            strategy_metadata: StrategyMetadata::new(),
        }
    }

    /// Wrap a raw backend hit, recording its similarity in the breakdown.
    pub fn from_hit(hit: &SearchHit) -> Self {
        let mut doc = Self::new(hit.doc_ref.clone(), hit.score);
        doc.breakdown.insert("similarity".to_string(), hit.score);
        doc
    }

    pub fn with_breakdown(mut self, factor: impl Into<String>, value: f64) -> Self {
        self.breakdown.insert(factor.into(), value);
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.strategy_metadata.insert(key.into(), value.into());
        self
    }
}

/// Ranked output of one strategy execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Name of the strategy that produced the result
    pub strategy: String,

    /// Documents, best first
    pub documents: Vec<ScoredDocument>,

    /// Result-level diagnostics
    #[serde(default)]
    pub strategy_metadata: StrategyMetadata,
}

impl RetrievalResult {
    pub fn new(strategy: impl Into<String>, documents: Vec<ScoredDocument>) -> Self {
        Self {
            strategy: strategy.into(),
            documents,
            strategy_metadata: StrategyMetadata::new(),
        }
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.strategy_metadata.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn top(&self) -> Option<&ScoredDocument> {
        self.documents.first()
    }

    pub fn doc_refs(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.doc_ref.as_str()).collect()
    }
}

/// Ordering used by every result list: score descending, then doc ref
/// ascending.
pub(crate) fn compare_ranked(a: &ScoredDocument, b: &ScoredDocument) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.doc_ref.cmp(&b.doc_ref))
}

/// Sort into result order and keep the best `k`. Documents with a NaN score
/// are dropped.
pub(crate) fn rank(documents: &mut Vec<ScoredDocument>, k: usize) {
    documents.retain(|d| !d.score.is_nan());
    documents.sort_by(compare_ranked);
    documents.truncate(k);
}
