// In-memory VectorBackend used as the reference adapter and in tests.

use crate::backend::{DistanceMetric, DocRef, SearchHit, VectorBackend};
use crate::error::{Result, VectorStoreError};
use crate::filter::MetadataFilter;
use crate::value::Metadata;
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Configuration for the in-memory store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryStoreConfig {
    /// Capability profile this store reports to the engine
    #[serde(default = "default_profile_id")]
    pub profile_id: String,

    /// Evaluate filters inside `search` instead of rejecting them
    #[serde(default = "default_true")]
    pub native_filtering: bool,
}

fn default_profile_id() -> String {
    "in_memory".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for InMemoryStoreConfig {
    fn default() -> Self {
        Self {
            profile_id: default_profile_id(),
            native_filtering: true,
        }
    }
}

/// A document as stored: reference, vector and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub doc_ref: DocRef,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl StoredDocument {
    pub fn new(doc_ref: impl Into<DocRef>, vector: Vec<f32>) -> Self {
        Self {
            doc_ref: doc_ref.into(),
            vector,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Brute-force in-memory vector store
pub struct InMemoryVectorStore {
    config: InMemoryStoreConfig,
    documents: Arc<RwLock<Vec<StoredDocument>>>,
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::with_config(InMemoryStoreConfig::default())
    }

    pub fn with_config(config: InMemoryStoreConfig) -> Self {
        info!(
            "Initializing in-memory vector store (profile: {}, native filtering: {})",
            config.profile_id, config.native_filtering
        );
        Self {
            config,
            documents: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Insert documents, replacing any with the same reference.
    pub async fn upsert(&self, documents: Vec<StoredDocument>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let mut stored = self.documents.write().await;
        if let Some(expected) = stored.first().or(documents.first()).map(|d| d.vector.len())
            && let Some(bad) = documents.iter().find(|d| d.vector.len() != expected)
        {
            return Err(VectorStoreError::DimensionMismatch {
                expected,
                actual: bad.vector.len(),
            });
        }

        debug!("Upserting {} documents", documents.len());
        for doc in documents {
            match stored.iter_mut().find(|d| d.doc_ref == doc.doc_ref) {
                Some(existing) => *existing = doc,
                None => stored.push(doc),
            }
        }
        Ok(())
    }

    /// Get the total number of documents in the store
    pub async fn count(&self) -> usize {
        self.documents.read().await.len()
    }

    pub fn config(&self) -> &InMemoryStoreConfig {
        &self.config
    }
}

#[async_trait]
impl VectorBackend for InMemoryVectorStore {
    fn capability_profile_id(&self) -> &str {
        &self.config.profile_id
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
        metric: DistanceMetric,
    ) -> Result<Vec<SearchHit>> {
        if vector.is_empty() {
            return Err(VectorStoreError::InvalidQuery("empty query vector".to_string()));
        }
        if filter.is_some_and(|f| !f.is_empty()) && !self.config.native_filtering {
            return Err(VectorStoreError::InvalidQuery(
                "metadata filtering is not supported by this store".to_string(),
            ));
        }

        debug!("Searching (k: {k}, metric: {metric}, filtered: {})", filter.is_some());

        let documents = self.documents.read().await;
        if let Some(expected) = documents.first().map(|d| d.vector.len())
            && expected != vector.len()
        {
            return Err(VectorStoreError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let mut hits: Vec<SearchHit> = documents
            .iter()
            .filter(|doc| filter.is_none_or(|f| f.matches(&doc.metadata)))
            .map(|doc| SearchHit {
                doc_ref: doc.doc_ref.clone(),
                score: metric.similarity(vector, &doc.vector),
                metadata: doc.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc_ref.cmp(&b.doc_ref))
        });
        hits.truncate(k);

        debug!("Found {} results", hits.len());
        Ok(hits)
    }
}
