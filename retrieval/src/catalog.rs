use crate::capability::Capability;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;

/// The closed set of retrieval strategies, in catalog declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    BasicSimilarity,
    MetadataFiltered,
    MultiQuery,
    Reranked,
    HybridUniversal,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::BasicSimilarity,
        StrategyKind::MetadataFiltered,
        StrategyKind::MultiQuery,
        StrategyKind::Reranked,
        StrategyKind::HybridUniversal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::BasicSimilarity => "basic_similarity",
            StrategyKind::MetadataFiltered => "metadata_filtered",
            StrategyKind::MultiQuery => "multi_query",
            StrategyKind::Reranked => "reranked",
            StrategyKind::HybridUniversal => "hybrid_universal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// The strategy a use-case hint favours when candidates tie.
    pub fn for_use_case(use_case: &str) -> Option<Self> {
        match use_case.trim().to_ascii_lowercase().as_str() {
            "fast" | "baseline" => Some(StrategyKind::BasicSimilarity),
            "filtered" | "structured" => Some(StrategyKind::MetadataFiltered),
            "recall" | "exploratory" => Some(StrategyKind::MultiQuery),
            "precision" | "accuracy" => Some(StrategyKind::Reranked),
            "hybrid" | "balanced" => Some(StrategyKind::HybridUniversal),
            _ => None,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static description of a strategy, used for scoring and listing only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyDescriptor {
    pub kind: StrategyKind,
    pub name: String,
    pub description: String,
    pub required_capabilities: BTreeSet<Capability>,
    pub preferred_capabilities: BTreeSet<Capability>,
    pub default_config: serde_json::Value,
}

impl StrategyDescriptor {
    pub fn builtin(kind: StrategyKind) -> Self {
        use Capability::{BasicSimilarity, HybridSearch, MetadataFiltering};

        let (description, preferred, default_config) = match kind {
            StrategyKind::BasicSimilarity => (
                "Single nearest-neighbour query, backend ranking unchanged",
                vec![],
                json!({}),
            ),
            StrategyKind::MetadataFiltered => (
                "Similarity search constrained by metadata predicates",
                vec![MetadataFiltering],
                json!({ "default_filters": {}, "oversample_factor": 3 }),
            ),
            StrategyKind::MultiQuery => (
                "One search per expanded query vector, scores aggregated per document",
                vec![],
                json!({ "num_queries": 3, "aggregation_method": "mean" }),
            ),
            StrategyKind::Reranked => (
                "Over-fetch then re-score by recency, length and metadata boosts",
                vec![MetadataFiltering],
                json!({ "initial_k": 20, "rerank_factors": { "recency": 0.1 } }),
            ),
            StrategyKind::HybridUniversal => (
                "Weighted fusion of several child strategies",
                vec![MetadataFiltering, HybridSearch],
                json!({
                    "children": [
                        { "strategy": "basic_similarity", "weight": 0.7 },
                        { "strategy": "multi_query", "weight": 0.3 }
                    ]
                }),
            ),
        };

        Self {
            kind,
            name: kind.name().to_string(),
            description: description.to_string(),
            required_capabilities: BTreeSet::from([BasicSimilarity]),
            preferred_capabilities: preferred.into_iter().collect(),
            default_config,
        }
    }
}

/// Ordered list of strategy descriptors. Order is the selection tie-breaker.
#[derive(Debug, Clone)]
pub struct StrategyCatalog {
    descriptors: Vec<StrategyDescriptor>,
}

impl Default for StrategyCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StrategyCatalog {
    /// All five strategies in declaration order.
    pub fn builtin() -> Self {
        Self::from_kinds(&StrategyKind::ALL)
    }

    /// A catalog restricted to `kinds`, in the given order.
    pub fn from_kinds(kinds: &[StrategyKind]) -> Self {
        Self {
            descriptors: kinds.iter().map(|k| StrategyDescriptor::builtin(*k)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StrategyDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn descriptor(&self, kind: StrategyKind) -> Option<&StrategyDescriptor> {
        self.descriptors.iter().find(|d| d.kind == kind)
    }

    pub fn descriptors(&self) -> &[StrategyDescriptor] {
        &self.descriptors
    }
}
