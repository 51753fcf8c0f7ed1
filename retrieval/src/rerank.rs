use crate::config::{RerankFactor, RerankedConfig};
use crate::result::{ScoredDocument, rank};
use chrono::{DateTime, Utc};
use log::debug;
use retrieval_vector_store::{Metadata, MetadataValue, SearchHit};

/// Re-scores candidates with the factors of a [`RerankedConfig`].
pub struct RerankEngine<'a> {
    config: &'a RerankedConfig,
    reference_time: DateTime<Utc>,
}

impl<'a> RerankEngine<'a> {
    pub fn new(config: &'a RerankedConfig, reference_time: DateTime<Utc>) -> Self {
        Self {
            config,
            reference_time,
        }
    }

    /// Rerank backend hits and keep the best `k`.
    ///
    /// `final = base + Σ weight * factor`, each factor normalized to [0, 1].
    /// A missing or unreadable metadata field makes its factor 0.
    pub fn rerank(&self, hits: Vec<SearchHit>, k: usize) -> Vec<ScoredDocument> {
        debug!(
            "Reranking {} candidates with {} factors",
            hits.len(),
            self.config.rerank_factors.len()
        );

        let mut documents: Vec<ScoredDocument> = hits
            .iter()
            .map(|hit| {
                let base = hit.score;
                let mut doc = ScoredDocument::new(hit.doc_ref.clone(), base)
                    .with_breakdown("base_similarity", base)
                    .with_metadata("base_similarity", base);

                for (factor, weight) in &self.config.rerank_factors {
                    let contribution = weight * self.factor_value(*factor, &hit.metadata);
                    doc.score += contribution;
                    doc.breakdown.insert(factor.name().to_string(), contribution);
                    doc.strategy_metadata
                        .insert(format!("{factor}_contribution"), contribution.into());
                }
                doc
            })
            .collect();

        rank(&mut documents, k);
        documents
    }

    /// Normalized value of one factor for a document.
    pub fn factor_value(&self, factor: RerankFactor, metadata: &Metadata) -> f64 {
        match factor {
            RerankFactor::Recency => self.recency(metadata),
            RerankFactor::Length => self.length(metadata),
            RerankFactor::MetadataBoost => self.metadata_boost(metadata),
        }
    }

    fn recency(&self, metadata: &Metadata) -> f64 {
        let Some(timestamp) = metadata
            .get(&self.config.timestamp_field)
            .and_then(timestamp_secs)
        else {
            return 0.0;
        };

        let now = self.reference_time.timestamp_millis() as f64 / 1000.0;
        let age = now - timestamp;
        if age <= 0.0 {
            return 1.0;
        }
        (1.0 - age / (2.0 * self.config.recency_half_life_secs)).max(0.0)
    }

    fn length(&self, metadata: &Metadata) -> f64 {
        let len = match metadata.get(&self.config.length_field) {
            Some(MetadataValue::Number(n)) if n.is_finite() && *n > 0.0 => *n,
            Some(MetadataValue::String(text)) => text.chars().count() as f64,
            _ => return 0.0,
        };
        len / (len + self.config.length_pivot)
    }

    fn metadata_boost(&self, metadata: &Metadata) -> f64 {
        let total: f64 = self
            .config
            .metadata_boost_rules
            .iter()
            .filter(|rule| metadata.get(&rule.field) == Some(&rule.value))
            .map(|rule| rule.boost)
            .sum();
        total.min(1.0)
    }
}

/// Unix seconds from a numeric timestamp or an RFC 3339 string.
fn timestamp_secs(value: &MetadataValue) -> Option<f64> {
    match value {
        MetadataValue::Number(secs) if secs.is_finite() => Some(*secs),
        MetadataValue::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.timestamp_millis() as f64 / 1000.0),
        _ => None,
    }
}
