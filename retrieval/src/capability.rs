use crate::error::{Result, RetrievalError};
use log::debug;
use retrieval_vector_store::DistanceMetric;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// A search feature a backend may or may not support.
///
/// Unknown tags parse to [`Capability::Extension`] so profiles written for newer
/// backends keep loading; strategies that never ask for them ignore them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Capability {
    BasicSimilarity,
    MetadataFiltering,
    BatchUpsert,
    HybridSearch,
    Extension(String),
}

impl Capability {
    pub fn as_str(&self) -> &str {
        match self {
            Capability::BasicSimilarity => "basic_similarity",
            Capability::MetadataFiltering => "metadata_filtering",
            Capability::BatchUpsert => "batch_upsert",
            Capability::HybridSearch => "hybrid_search",
            Capability::Extension(tag) => tag,
        }
    }
}

impl From<&str> for Capability {
    fn from(tag: &str) -> Self {
        match tag {
            "basic_similarity" => Capability::BasicSimilarity,
            "metadata_filtering" => Capability::MetadataFiltering,
            "batch_upsert" => Capability::BatchUpsert,
            "hybrid_search" => Capability::HybridSearch,
            other => Capability::Extension(other.to_string()),
        }
    }
}

impl From<String> for Capability {
    fn from(tag: String) -> Self {
        Capability::from(tag.as_str())
    }
}

impl From<Capability> for String {
    fn from(capability: Capability) -> Self {
        capability.as_str().to_string()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one backend can do, as advertised by its adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendCapabilityProfile {
    pub backend_id: String,

    pub supported: BTreeSet<Capability>,

    /// Supported metrics, most preferred first.
    pub preferred_distance_metrics: Vec<DistanceMetric>,

    /// Upper bound on documents per batch call, also used to clamp fetch sizes.
    pub max_batch_size: usize,

    pub native_filtering: bool,
}

impl BackendCapabilityProfile {
    /// A profile supporting plain similarity search with cosine distance.
    pub fn new(backend_id: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            supported: BTreeSet::from([Capability::BasicSimilarity]),
            preferred_distance_metrics: vec![DistanceMetric::Cosine],
            max_batch_size: 1000,
            native_filtering: false,
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.supported.insert(capability);
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<DistanceMetric>) -> Self {
        self.preferred_distance_metrics = metrics;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Enables native filtering and advertises the matching capability.
    pub fn with_native_filtering(mut self) -> Self {
        self.native_filtering = true;
        self.supported.insert(Capability::MetadataFiltering);
        self
    }

    pub fn supports(&self, capability: &Capability) -> bool {
        self.supported.contains(capability)
    }

    pub fn supports_metric(&self, metric: DistanceMetric) -> bool {
        self.preferred_distance_metrics.contains(&metric)
    }

    /// The metric used when a strategy config does not name one.
    pub fn default_metric(&self) -> DistanceMetric {
        self.preferred_distance_metrics
            .first()
            .copied()
            .unwrap_or(DistanceMetric::Cosine)
    }

    /// Clamp a fetch size to what the backend accepts in one call.
    pub fn clamp_fetch(&self, k: usize) -> usize {
        k.min(self.max_batch_size.max(1))
    }
}

/// Read-only table of backend profiles, keyed by backend id.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    profiles: BTreeMap<String, Arc<BackendCapabilityProfile>>,
}

impl CapabilityRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the profiles of the known backends.
    pub fn with_builtin_profiles() -> Self {
        use Capability::{BatchUpsert, HybridSearch};
        use DistanceMetric::{Cosine, DotProduct, Euclidean};

        let mut registry = Self::new();
        for profile in [
            BackendCapabilityProfile::new("in_memory")
                .with_native_filtering()
                .with_capability(BatchUpsert)
                .with_metrics(vec![Cosine, DotProduct, Euclidean])
                .with_max_batch_size(10_000),
            BackendCapabilityProfile::new("qdrant")
                .with_native_filtering()
                .with_capability(BatchUpsert)
                .with_capability(HybridSearch)
                .with_metrics(vec![Cosine, DotProduct, Euclidean])
                .with_max_batch_size(1000),
            BackendCapabilityProfile::new("pinecone")
                .with_native_filtering()
                .with_capability(BatchUpsert)
                .with_capability(HybridSearch)
                .with_metrics(vec![Cosine, DotProduct, Euclidean])
                .with_max_batch_size(1000),
            BackendCapabilityProfile::new("weaviate")
                .with_native_filtering()
                .with_capability(BatchUpsert)
                .with_capability(HybridSearch)
                .with_metrics(vec![Cosine, DotProduct, Euclidean])
                .with_max_batch_size(1000),
            BackendCapabilityProfile::new("milvus")
                .with_native_filtering()
                .with_capability(BatchUpsert)
                .with_capability(HybridSearch)
                .with_metrics(vec![Euclidean, Cosine, DotProduct])
                .with_max_batch_size(16_384),
            BackendCapabilityProfile::new("chroma")
                .with_native_filtering()
                .with_capability(BatchUpsert)
                .with_metrics(vec![Euclidean, Cosine, DotProduct])
                .with_max_batch_size(5461),
            BackendCapabilityProfile::new("pgvector")
                .with_native_filtering()
                .with_capability(BatchUpsert)
                .with_metrics(vec![Cosine, Euclidean, DotProduct])
                .with_max_batch_size(1000),
            BackendCapabilityProfile::new("faiss")
                .with_capability(BatchUpsert)
                .with_metrics(vec![Euclidean, DotProduct])
                .with_max_batch_size(10_000),
        ] {
            registry.register(profile);
        }
        registry
    }

    /// Add a profile. Returns the profile previously registered under the same
    /// id, if any.
    pub fn register(
        &mut self,
        profile: BackendCapabilityProfile,
    ) -> Option<Arc<BackendCapabilityProfile>> {
        debug!(
            "Registering backend profile `{}` ({} capabilities)",
            profile.backend_id,
            profile.supported.len()
        );
        self.profiles
            .insert(profile.backend_id.clone(), Arc::new(profile))
    }

    pub fn profile_for(&self, backend_id: &str) -> Result<Arc<BackendCapabilityProfile>> {
        self.profiles
            .get(backend_id)
            .cloned()
            .ok_or_else(|| RetrievalError::UnknownBackend {
                backend: backend_id.to_string(),
            })
    }

    /// Registered backend ids in sorted order.
    pub fn backend_ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_capability_parsing_is_open() {
        assert_eq!(Capability::from("hybrid_search"), Capability::HybridSearch);
        assert_eq!(
            Capability::from("sparse_vectors"),
            Capability::Extension("sparse_vectors".to_string())
        );

        let parsed: Vec<Capability> =
            serde_json::from_str(r#"["basic_similarity", "geo_search"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                Capability::BasicSimilarity,
                Capability::Extension("geo_search".to_string())
            ]
        );
        assert_eq!(
            serde_json::to_string(&Capability::MetadataFiltering).unwrap(),
            "\"metadata_filtering\""
        );
    }

    #[test]
    fn test_profile_for_unknown_backend() {
        let registry = CapabilityRegistry::with_builtin_profiles();
        let err = registry.profile_for("redis").unwrap_err();
        assert!(matches!(err, RetrievalError::UnknownBackend { backend } if backend == "redis"));
    }

    #[test]
    fn test_builtin_profiles() {
        let registry = CapabilityRegistry::with_builtin_profiles();
        assert_eq!(registry.len(), 8);

        let faiss = registry.profile_for("faiss").unwrap();
        assert!(!faiss.native_filtering);
        assert!(!faiss.supports(&Capability::MetadataFiltering));
        assert_eq!(faiss.default_metric(), DistanceMetric::Euclidean);

        let qdrant = registry.profile_for("qdrant").unwrap();
        assert!(qdrant.native_filtering);
        assert!(qdrant.supports(&Capability::HybridSearch));
    }

    #[test]
    fn test_registration_is_additive() {
        let mut registry = CapabilityRegistry::new();
        assert!(registry.is_empty());

        let previous = registry.register(BackendCapabilityProfile::new("custom"));
        assert!(previous.is_none());
        let previous = registry.register(
            BackendCapabilityProfile::new("custom").with_capability(Capability::BatchUpsert),
        );
        assert!(previous.is_some());

        let profile = registry.profile_for("custom").unwrap();
        assert!(profile.supports(&Capability::BatchUpsert));
        assert_eq!(registry.backend_ids().collect::<Vec<_>>(), vec!["custom"]);
    }

    #[test]
    fn test_profile_deserializes_with_extension_tags() {
        let profile: BackendCapabilityProfile = serde_json::from_value(serde_json::json!({
            "backend_id": "vespa",
            "supported": ["basic_similarity", "tensor_ranking"],
            "preferred_distance_metrics": ["dot_product"],
            "max_batch_size": 200,
            "native_filtering": false
        }))
        .unwrap();

        assert!(profile.supports(&Capability::Extension("tensor_ranking".to_string())));
        assert_eq!(profile.clamp_fetch(500), 200);
        assert_eq!(profile.clamp_fetch(20), 20);
    }
}
