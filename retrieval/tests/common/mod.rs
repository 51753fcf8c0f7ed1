#![allow(dead_code)]

use async_trait::async_trait;
use retrieval_engine::{EmbeddingError, QueryEmbedder};
use retrieval_vector_store::{
    DistanceMetric, Metadata, MetadataFilter, MetadataValue, Result as StoreResult, SearchHit,
    VectorBackend, VectorStoreError,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One recorded call to [`ScriptedBackend::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSearch {
    pub script: usize,
    pub k: usize,
    pub filtered: bool,
    pub metric: DistanceMetric,
}

/// Backend whose answers are scripted per query vector.
///
/// The first component of the query vector selects the script, so tests
/// can give every expansion or child its own result list.
pub struct ScriptedBackend {
    profile_id: String,
    scripts: BTreeMap<usize, Vec<SearchHit>>,
    unavailable: BTreeSet<usize>,
    rejected: BTreeSet<usize>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedSearch>>,
}

impl ScriptedBackend {
    pub fn new(profile_id: &str) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            scripts: BTreeMap::new(),
            unavailable: BTreeSet::new(),
            rejected: BTreeSet::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(mut self, script: usize, hits: Vec<SearchHit>) -> Self {
        self.scripts.insert(script, hits);
        self
    }

    pub fn with_unavailable(mut self, script: usize) -> Self {
        self.unavailable.insert(script);
        self
    }

    pub fn with_rejected(mut self, script: usize) -> Self {
        self.rejected.insert(script);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedSearch> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorBackend for ScriptedBackend {
    fn capability_profile_id(&self) -> &str {
        &self.profile_id
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
        metric: DistanceMetric,
    ) -> StoreResult<Vec<SearchHit>> {
        let script = vector.first().copied().unwrap_or_default() as usize;
        self.calls.lock().unwrap().push(RecordedSearch {
            script,
            k,
            filtered: filter.is_some(),
            metric,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.contains(&script) {
            return Err(VectorStoreError::Unavailable(format!(
                "script {script} is down"
            )));
        }
        if self.rejected.contains(&script) {
            return Err(VectorStoreError::InvalidQuery(format!(
                "script {script} rejected"
            )));
        }

        let mut hits: Vec<SearchHit> = self.scripts.get(&script).cloned().unwrap_or_default();
        if let Some(filter) = filter {
            hits.retain(|hit| filter.matches(&hit.metadata));
        }
        hits.truncate(k);
        Ok(hits)
    }
}

/// Embedder returning fixed vectors and counting calls.
pub struct FixedEmbedder {
    pub primary: Vec<f32>,
    pub expansions: Vec<Vec<f32>>,
    pub fail: bool,
    embed_calls: AtomicUsize,
    expand_calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(primary: Vec<f32>) -> Self {
        Self {
            primary,
            expansions: Vec::new(),
            fail: false,
            embed_calls: AtomicUsize::new(0),
            expand_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_expansions(mut self, expansions: Vec<Vec<f32>>) -> Self {
        self.expansions = expansions;
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn expand_calls(&self) -> usize {
        self.expand_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryEmbedder for FixedEmbedder {
    async fn embedding_for(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbeddingError("model not loaded".to_string()));
        }
        Ok(self.primary.clone())
    }

    async fn expand(&self, _text: &str) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.expand_calls.fetch_add(1, Ordering::SeqCst);
        if self.expansions.is_empty() {
            return Ok(vec![self.primary.clone()]);
        }
        Ok(self.expansions.clone())
    }
}

pub fn hit(doc: &str, score: f64) -> SearchHit {
    SearchHit::new(doc, score)
}

pub fn hit_with(doc: &str, score: f64, fields: &[(&str, MetadataValue)]) -> SearchHit {
    let metadata: Metadata = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    SearchHit::new(doc, score).with_metadata(metadata)
}

pub fn assert_ranked(documents: &[retrieval_engine::ScoredDocument], k: usize) {
    assert!(documents.len() <= k, "{} results for k = {k}", documents.len());
    for pair in documents.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.score > b.score || (a.score == b.score && a.doc_ref < b.doc_ref),
            "{} ({}) ranked before {} ({})",
            a.doc_ref,
            a.score,
            b.doc_ref,
            b.score
        );
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
