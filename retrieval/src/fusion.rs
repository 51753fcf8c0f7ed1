use crate::config::AggregationMethod;
use crate::result::{ScoredDocument, rank};
use log::debug;
use retrieval_vector_store::{DocRef, MetadataValue};
use std::collections::BTreeMap;

/// Scale positive weights so they sum to 1.0. Falls back to uniform weights
/// when the total is not positive.
pub fn normalize_weights(weights: &[f64]) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if weights.is_empty() {
        return Vec::new();
    }
    if !total.is_finite() || total <= 0.0 {
        let uniform = 1.0 / weights.len() as f64;
        return vec![uniform; weights.len()];
    }
    weights.iter().map(|w| w / total).collect()
}

/// Combine the ranked lists of several query vectors into one list.
///
/// Each list is tagged with the index of the query that produced it; the
/// index drives the `weighted` method (`1 / (1 + index)`), with weights
/// renormalized over the lists that actually contain a document.
pub fn aggregate(
    lists: Vec<(usize, Vec<ScoredDocument>)>,
    method: AggregationMethod,
    k: usize,
) -> Vec<ScoredDocument> {
    debug!(
        "Aggregating {} query lists with `{}`",
        lists.len(),
        method.as_str()
    );

    let mut per_doc: BTreeMap<DocRef, Vec<(usize, f64)>> = BTreeMap::new();
    for (query_index, documents) in lists {
        for doc in documents {
            per_doc
                .entry(doc.doc_ref)
                .or_default()
                .push((query_index, doc.score));
        }
    }

    let mut fused: Vec<ScoredDocument> = per_doc
        .into_iter()
        .map(|(doc_ref, scores)| {
            let score = match method {
                AggregationMethod::Max => scores
                    .iter()
                    .map(|(_, s)| *s)
                    .fold(f64::NEG_INFINITY, f64::max),
                AggregationMethod::Mean => {
                    scores.iter().map(|(_, s)| s).sum::<f64>() / scores.len() as f64
                }
                AggregationMethod::Weighted => {
                    let (weighted, total) = scores.iter().fold((0.0, 0.0), |(acc, tw), (i, s)| {
                        let w = 1.0 / (1.0 + *i as f64);
                        (acc + w * s, tw + w)
                    });
                    weighted / total
                }
            };

            let mut doc = ScoredDocument::new(doc_ref, score)
                .with_metadata("matched_queries", scores.len());
            for (query_index, s) in &scores {
                doc.breakdown.insert(format!("query_{query_index}"), *s);
            }
            doc
        })
        .collect();

    rank(&mut fused, k);
    debug!("Aggregation produced {} results", fused.len());
    fused
}

/// One input of a weighted fusion: a label, its normalized weight and its
/// ranked list.
#[derive(Debug, Clone)]
pub struct WeightedList {
    pub label: String,
    pub weight: f64,
    pub documents: Vec<ScoredDocument>,
}

/// Weighted score summation over the union of all lists; a document absent
/// from a list contributes 0 for it.
///
/// Every fused document records each list's weighted contribution under
/// `contributions`, keyed by label.
pub fn fuse_weighted(lists: Vec<WeightedList>, k: usize) -> Vec<ScoredDocument> {
    debug!("Weighted fusion of {} lists", lists.len());

    let labels: Vec<String> = lists.iter().map(|l| l.label.clone()).collect();
    let mut per_doc: BTreeMap<DocRef, BTreeMap<String, f64>> = BTreeMap::new();
    for list in lists {
        for doc in list.documents {
            *per_doc
                .entry(doc.doc_ref)
                .or_default()
                .entry(list.label.clone())
                .or_insert(0.0) += list.weight * doc.score;
        }
    }

    let mut fused: Vec<ScoredDocument> = per_doc
        .into_iter()
        .map(|(doc_ref, contributions)| {
            let score = contributions.values().sum();
            let mut doc = ScoredDocument::new(doc_ref, score);
            let mut recorded = BTreeMap::new();
            for label in &labels {
                let value = contributions.get(label).copied().unwrap_or(0.0);
                doc.breakdown.insert(label.clone(), value);
                recorded.insert(label.clone(), MetadataValue::from(value));
            }
            doc.strategy_metadata
                .insert("contributions".to_string(), MetadataValue::Map(recorded));
            doc
        })
        .collect();

    rank(&mut fused, k);
    debug!("Weighted fusion produced {} results", fused.len());
    fused
}
