use crate::error::Result;
use crate::filter::MetadataFilter;
use crate::value::Metadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque reference to a document owned by an external document store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocRef(String);

impl DocRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Distance metric used for nearest-neighbour search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    DotProduct,
    Euclidean,
}

impl DistanceMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::DotProduct => "dot_product",
            DistanceMetric::Euclidean => "euclidean",
        }
    }

    /// Similarity between two vectors, higher is better for every metric.
    /// Euclidean distance `d` is mapped to `1 / (1 + d)`.
    pub fn similarity(self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            DistanceMetric::Cosine => cosine_similarity(a, b),
            DistanceMetric::DotProduct => dot(a, b),
            DistanceMetric::Euclidean => {
                let dist: f64 = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| {
                        let d = f64::from(*x) - f64::from(*y);
                        d * d
                    })
                    .sum::<f64>()
                    .sqrt();
                1.0 / (1.0 + dist)
            }
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mag_a = dot(a, a).sqrt();
    let mag_b = dot(b, b).sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot(a, b) / (mag_a * mag_b)
    }
}

/// One candidate returned by a backend search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_ref: DocRef,

    /// Raw similarity score, higher is better.
    pub score: f64,

    /// Document metadata, used for client-side filtering and reranking.
    #[serde(default)]
    pub metadata: Metadata,
}

impl SearchHit {
    pub fn new(doc_ref: impl Into<DocRef>, score: f64) -> Self {
        Self {
            doc_ref: doc_ref.into(),
            score,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The single abstract contract every vector-store adapter implements.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Identifier of the capability profile describing this backend.
    fn capability_profile_id(&self) -> &str;

    /// Nearest-neighbour search. `filter` is only passed to backends that
    /// advertise native metadata filtering.
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
        metric: DistanceMetric,
    ) -> Result<Vec<SearchHit>>;
}

#[async_trait]
impl<T: VectorBackend + ?Sized> VectorBackend for Arc<T> {
    fn capability_profile_id(&self) -> &str {
        (**self).capability_profile_id()
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
        metric: DistanceMetric,
    ) -> Result<Vec<SearchHit>> {
        (**self).search(vector, k, filter, metric).await
    }
}
