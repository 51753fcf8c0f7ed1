use crate::catalog::StrategyKind;
use crate::error::ConfigViolation;
use retrieval_vector_store::{DistanceMetric, MetadataFilter, MetadataValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Schema version accepted in the optional `version` key of every strategy
/// config.
pub const CONFIG_SCHEMA_VERSION: u64 = 1;

type Parsed<T> = std::result::Result<T, ConfigViolation>;

/// One JSON object of a raw strategy config, with its path for error messages.
struct Section {
    path: String,
    fields: Map<String, Value>,
}

impl Section {
    /// Check the object shape, schema version and key set.
    fn open(raw: &Value, path: &str, known: &[&str]) -> Parsed<Self> {
        let fields = match raw {
            Value::Null => Map::new(),
            Value::Object(fields) => fields.clone(),
            other => {
                let field = if path.is_empty() { "config" } else { path };
                return Err(ConfigViolation::new(
                    field,
                    format!("must be an object, got {}", json_kind(other)),
                ));
            }
        };

        let section = Self {
            path: path.to_string(),
            fields,
        };

        if let Some(version) = section.get::<u64>("version")?
            && version != CONFIG_SCHEMA_VERSION
        {
            return Err(ConfigViolation::new(
                section.field_path("version"),
                format!("must be {CONFIG_SCHEMA_VERSION}, got {version}"),
            ));
        }

        if let Some(unknown) = section
            .fields
            .keys()
            .find(|key| *key != "version" && !known.contains(&key.as_str()))
        {
            return Err(ConfigViolation::new(
                section.field_path(unknown),
                format!("is not a recognised key (expected one of: {})", known.join(", ")),
            ));
        }

        Ok(section)
    }

    fn field_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.path)
        }
    }

    fn raw(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Parsed<Option<T>> {
        match self.raw(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|err| {
                ConfigViolation::new(self.field_path(key), format!("has the wrong type: {err}"))
            }),
        }
    }

    fn require<T: DeserializeOwned>(&self, key: &str) -> Parsed<T> {
        self.get(key)?
            .ok_or_else(|| ConfigViolation::new(self.field_path(key), "is required"))
    }

    fn at_least(&self, key: &str, value: usize, min: usize) -> Parsed<usize> {
        if value < min {
            return Err(ConfigViolation::new(
                self.field_path(key),
                format!("must be >= {min}, got {value}"),
            ));
        }
        Ok(value)
    }

    fn positive(&self, key: &str, value: f64) -> Parsed<f64> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigViolation::new(
                self.field_path(key),
                format!("must be a finite number > 0, got {value}"),
            ));
        }
        Ok(value)
    }

    fn non_empty(&self, key: &str, value: String) -> Parsed<String> {
        if value.trim().is_empty() {
            return Err(ConfigViolation::new(self.field_path(key), "must not be empty"));
        }
        Ok(value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Config of [`StrategyKind::BasicSimilarity`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicSimilarityConfig {
    /// Falls back to the backend's most preferred metric.
    pub metric: Option<DistanceMetric>,
}

impl BasicSimilarityConfig {
    const KEYS: &'static [&'static str] = &["metric"];

    fn parse(raw: &Value, path: &str) -> Parsed<Self> {
        let section = Section::open(raw, path, Self::KEYS)?;
        Ok(Self {
            metric: section.get("metric")?,
        })
    }
}

fn default_oversample_factor() -> usize {
    3
}

/// Config of [`StrategyKind::MetadataFiltered`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFilteredConfig {
    pub metric: Option<DistanceMetric>,

    /// Predicates applied to every query; per-call filters override per field.
    pub default_filters: MetadataFilter,

    /// Over-fetch multiplier when filtering client-side.
    pub oversample_factor: usize,
}

impl Default for MetadataFilteredConfig {
    fn default() -> Self {
        Self {
            metric: None,
            default_filters: MetadataFilter::new(),
            oversample_factor: default_oversample_factor(),
        }
    }
}

impl MetadataFilteredConfig {
    const KEYS: &'static [&'static str] = &["metric", "default_filters", "oversample_factor"];

    fn parse(raw: &Value, path: &str) -> Parsed<Self> {
        let section = Section::open(raw, path, Self::KEYS)?;

        let default_filters = match section.raw("default_filters") {
            None => MetadataFilter::new(),
            Some(filters) => MetadataFilter::from_json(filters).map_err(|err| {
                ConfigViolation::new(
                    section.field_path(&format!("default_filters.{}", err.field)),
                    err.reason,
                )
            })?,
        };

        let oversample_factor = match section.get("oversample_factor")? {
            Some(factor) => section.at_least("oversample_factor", factor, 1)?,
            None => default_oversample_factor(),
        };

        Ok(Self {
            metric: section.get("metric")?,
            default_filters,
            oversample_factor,
        })
    }
}

/// How multi-query scores are combined per document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    /// Highest score across lists
    Max,
    /// Mean over the lists containing the document
    #[default]
    Mean,
    /// Mean weighted by `1 / (1 + query index)`
    Weighted,
}

impl AggregationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationMethod::Max => "max",
            AggregationMethod::Mean => "mean",
            AggregationMethod::Weighted => "weighted",
        }
    }
}

fn default_num_queries() -> usize {
    3
}

/// Config of [`StrategyKind::MultiQuery`].
#[derive(Debug, Clone, PartialEq)]
pub struct MultiQueryConfig {
    pub metric: Option<DistanceMetric>,
    pub num_queries: usize,
    pub aggregation_method: AggregationMethod,
}

impl Default for MultiQueryConfig {
    fn default() -> Self {
        Self {
            metric: None,
            num_queries: default_num_queries(),
            aggregation_method: AggregationMethod::default(),
        }
    }
}

impl MultiQueryConfig {
    const KEYS: &'static [&'static str] = &["metric", "num_queries", "aggregation_method"];

    fn parse(raw: &Value, path: &str) -> Parsed<Self> {
        let section = Section::open(raw, path, Self::KEYS)?;

        let num_queries = match section.get("num_queries")? {
            Some(n) => section.at_least("num_queries", n, 1)?,
            None => default_num_queries(),
        };

        Ok(Self {
            metric: section.get("metric")?,
            num_queries,
            aggregation_method: section.get("aggregation_method")?.unwrap_or_default(),
        })
    }
}

/// Score adjustments the reranked strategy understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RerankFactor {
    Recency,
    Length,
    MetadataBoost,
}

impl RerankFactor {
    pub const ALL: [RerankFactor; 3] = [
        RerankFactor::Recency,
        RerankFactor::Length,
        RerankFactor::MetadataBoost,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RerankFactor::Recency => "recency",
            RerankFactor::Length => "length",
            RerankFactor::MetadataBoost => "metadata_boost",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for RerankFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Additive boost applied when `field` equals `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataBoostRule {
    pub field: String,
    pub value: MetadataValue,
    pub boost: f64,
}

const DEFAULT_HALF_LIFE_SECS: f64 = 30.0 * 24.0 * 60.0 * 60.0;

/// Config of [`StrategyKind::Reranked`].
#[derive(Debug, Clone, PartialEq)]
pub struct RerankedConfig {
    pub metric: Option<DistanceMetric>,

    /// Candidates fetched before reranking; must cover the requested count.
    pub initial_k: usize,

    pub rerank_factors: BTreeMap<RerankFactor, f64>,

    pub recency_half_life_secs: f64,

    /// Metadata field holding a unix timestamp (seconds) or RFC 3339 string.
    pub timestamp_field: String,

    /// Metadata field holding the document length.
    pub length_field: String,

    /// Length at which the length factor reaches 0.5.
    pub length_pivot: f64,

    pub metadata_boost_rules: Vec<MetadataBoostRule>,
}

impl Default for RerankedConfig {
    fn default() -> Self {
        Self {
            metric: None,
            initial_k: 20,
            rerank_factors: BTreeMap::new(),
            recency_half_life_secs: DEFAULT_HALF_LIFE_SECS,
            timestamp_field: "timestamp".to_string(),
            length_field: "length".to_string(),
            length_pivot: 512.0,
            metadata_boost_rules: Vec::new(),
        }
    }
}

impl RerankedConfig {
    const KEYS: &'static [&'static str] = &[
        "metric",
        "initial_k",
        "rerank_factors",
        "recency_half_life_secs",
        "timestamp_field",
        "length_field",
        "length_pivot",
        "metadata_boost_rules",
    ];

    fn parse(raw: &Value, path: &str) -> Parsed<Self> {
        let section = Section::open(raw, path, Self::KEYS)?;
        let defaults = Self::default();

        let initial_k = match section.get("initial_k")? {
            Some(k) => section.at_least("initial_k", k, 1)?,
            None => defaults.initial_k,
        };

        let mut rerank_factors = BTreeMap::new();
        let raw_factors: BTreeMap<String, f64> =
            section.get("rerank_factors")?.unwrap_or_default();
        for (name, weight) in raw_factors {
            let field = section.field_path(&format!("rerank_factors.{name}"));
            let Some(factor) = RerankFactor::from_name(&name) else {
                let known: Vec<&str> = RerankFactor::ALL.iter().map(|f| f.name()).collect();
                return Err(ConfigViolation::new(
                    field,
                    format!(
                        "is not a recognised rerank factor (expected one of: {})",
                        known.join(", ")
                    ),
                ));
            };
            if !weight.is_finite() {
                return Err(ConfigViolation::new(field, "must be a finite number"));
            }
            rerank_factors.insert(factor, weight);
        }

        let recency_half_life_secs = match section.get("recency_half_life_secs")? {
            Some(secs) => section.positive("recency_half_life_secs", secs)?,
            None => defaults.recency_half_life_secs,
        };
        let length_pivot = match section.get("length_pivot")? {
            Some(pivot) => section.positive("length_pivot", pivot)?,
            None => defaults.length_pivot,
        };
        let timestamp_field = match section.get("timestamp_field")? {
            Some(field) => section.non_empty("timestamp_field", field)?,
            None => defaults.timestamp_field,
        };
        let length_field = match section.get("length_field")? {
            Some(field) => section.non_empty("length_field", field)?,
            None => defaults.length_field,
        };

        let raw_rules: Vec<Value> = section.get("metadata_boost_rules")?.unwrap_or_default();
        let mut metadata_boost_rules = Vec::with_capacity(raw_rules.len());
        for (i, raw_rule) in raw_rules.into_iter().enumerate() {
            let rule_path = section.field_path(&format!("metadata_boost_rules[{i}]"));
            let rule: MetadataBoostRule = serde_json::from_value(raw_rule).map_err(|err| {
                ConfigViolation::new(rule_path.clone(), format!("is malformed: {err}"))
            })?;
            if !(0.0..=1.0).contains(&rule.boost) {
                return Err(ConfigViolation::new(
                    format!("{rule_path}.boost"),
                    format!("must be in [0.0, 1.0], got {}", rule.boost),
                ));
            }
            metadata_boost_rules.push(rule);
        }

        Ok(Self {
            metric: section.get("metric")?,
            initial_k,
            rerank_factors,
            recency_half_life_secs,
            timestamp_field,
            length_field,
            length_pivot,
            metadata_boost_rules,
        })
    }
}

/// One weighted child of a hybrid strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridChildConfig {
    pub kind: StrategyKind,
    /// Positive, not necessarily normalized.
    pub weight: f64,
    pub config: StrategyConfig,
}

/// Config of [`StrategyKind::HybridUniversal`].
#[derive(Debug, Clone, PartialEq)]
pub struct HybridUniversalConfig {
    pub children: Vec<HybridChildConfig>,

    /// Each child fetches `k * oversample_factor` documents before fusion.
    pub oversample_factor: usize,
}

fn default_hybrid_oversample_factor() -> usize {
    2
}

impl HybridUniversalConfig {
    const KEYS: &'static [&'static str] = &["children", "oversample_factor"];
    const CHILD_KEYS: &'static [&'static str] = &["strategy", "weight", "config"];

    fn parse(raw: &Value, path: &str) -> Parsed<Self> {
        let section = Section::open(raw, path, Self::KEYS)?;
        let raw_children: Vec<Value> = section.require("children")?;
        if raw_children.is_empty() {
            return Err(ConfigViolation::new(
                section.field_path("children"),
                "must contain at least one child strategy",
            ));
        }

        let mut children = Vec::with_capacity(raw_children.len());
        for (i, raw_child) in raw_children.iter().enumerate() {
            let child_path = section.field_path(&format!("children[{i}]"));
            let child = Section::open(raw_child, &child_path, Self::CHILD_KEYS)?;

            let name: String = child.require("strategy")?;
            let kind = StrategyKind::from_name(&name).ok_or_else(|| {
                ConfigViolation::new(
                    child.field_path("strategy"),
                    format!("names unknown strategy `{name}`"),
                )
            })?;
            if kind == StrategyKind::HybridUniversal {
                return Err(ConfigViolation::new(
                    child.field_path("strategy"),
                    "cannot be hybrid_universal; hybrids do not nest",
                ));
            }

            let weight: f64 = child.require("weight")?;
            let weight = child.positive("weight", weight)?;

            let config = StrategyConfig::parse_at(
                kind,
                child.raw("config").unwrap_or(&Value::Null),
                &child.field_path("config"),
            )?;

            children.push(HybridChildConfig {
                kind,
                weight,
                config,
            });
        }

        let oversample_factor = match section.get("oversample_factor")? {
            Some(factor) => section.at_least("oversample_factor", factor, 1)?,
            None => default_hybrid_oversample_factor(),
        };

        Ok(Self {
            children,
            oversample_factor,
        })
    }

    /// Sum of the raw child weights.
    pub fn total_weight(&self) -> f64 {
        self.children.iter().map(|c| c.weight).sum()
    }
}

/// A validated strategy configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyConfig {
    BasicSimilarity(BasicSimilarityConfig),
    MetadataFiltered(MetadataFilteredConfig),
    MultiQuery(MultiQueryConfig),
    Reranked(RerankedConfig),
    HybridUniversal(HybridUniversalConfig),
}

impl StrategyConfig {
    /// Validate a raw JSON config against the schema of `kind`.
    ///
    /// Checks types, ranges and the key set; unknown keys are rejected.
    pub fn parse(kind: StrategyKind, raw: &Value) -> Parsed<Self> {
        Self::parse_at(kind, raw, "")
    }

    fn parse_at(kind: StrategyKind, raw: &Value, path: &str) -> Parsed<Self> {
        Ok(match kind {
            StrategyKind::BasicSimilarity => {
                StrategyConfig::BasicSimilarity(BasicSimilarityConfig::parse(raw, path)?)
            }
            StrategyKind::MetadataFiltered => {
                StrategyConfig::MetadataFiltered(MetadataFilteredConfig::parse(raw, path)?)
            }
            StrategyKind::MultiQuery => {
                StrategyConfig::MultiQuery(MultiQueryConfig::parse(raw, path)?)
            }
            StrategyKind::Reranked => StrategyConfig::Reranked(RerankedConfig::parse(raw, path)?),
            StrategyKind::HybridUniversal => {
                StrategyConfig::HybridUniversal(HybridUniversalConfig::parse(raw, path)?)
            }
        })
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyConfig::BasicSimilarity(_) => StrategyKind::BasicSimilarity,
            StrategyConfig::MetadataFiltered(_) => StrategyKind::MetadataFiltered,
            StrategyConfig::MultiQuery(_) => StrategyKind::MultiQuery,
            StrategyConfig::Reranked(_) => StrategyKind::Reranked,
            StrategyConfig::HybridUniversal(_) => StrategyKind::HybridUniversal,
        }
    }

    /// The explicitly configured metric, if any.
    pub fn metric(&self) -> Option<DistanceMetric> {
        match self {
            StrategyConfig::BasicSimilarity(c) => c.metric,
            StrategyConfig::MetadataFiltered(c) => c.metric,
            StrategyConfig::MultiQuery(c) => c.metric,
            StrategyConfig::Reranked(c) => c.metric,
            StrategyConfig::HybridUniversal(_) => None,
        }
    }
}

/// A strategy name plus its raw config, as stored by configuration tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub strategy: String,
    #[serde(default)]
    pub config: Value,
}

impl StrategySpec {
    pub fn new(strategy: impl Into<String>, config: Value) -> Self {
        Self {
            strategy: strategy.into(),
            config,
        }
    }
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum concurrent sub-executions per fan-out; unset means one task per
    /// child or query.
    #[serde(default)]
    pub fan_out_limit: Option<usize>,

    /// Cancel a retrieval that runs longer than this.
    #[serde(default)]
    pub query_timeout_ms: Option<u64>,

    /// Query embeddings kept in the LRU cache; 0 disables caching.
    #[serde(default = "default_embedding_cache_size")]
    pub embedding_cache_size: usize,
}

fn default_embedding_cache_size() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fan_out_limit: None,
            query_timeout_ms: None,
            embedding_cache_size: default_embedding_cache_size(),
        }
    }
}

impl EngineConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigViolation> {
        if self.fan_out_limit == Some(0) {
            return Err(ConfigViolation::new("fan_out_limit", "must be >= 1 when set"));
        }
        if self.query_timeout_ms == Some(0) {
            return Err(ConfigViolation::new("query_timeout_ms", "must be > 0 when set"));
        }
        Ok(())
    }

    /// Parse and validate a TOML document supplied by the caller.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigViolation> {
        let config: Self = toml::from_str(text)
            .map_err(|err| ConfigViolation::new("engine", format!("is not valid TOML: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn violation(kind: StrategyKind, raw: Value) -> ConfigViolation {
        StrategyConfig::parse(kind, &raw).unwrap_err()
    }

    #[test]
    fn test_empty_and_null_configs_use_defaults() {
        let parsed = StrategyConfig::parse(StrategyKind::MultiQuery, &Value::Null).unwrap();
        assert_eq!(parsed, StrategyConfig::MultiQuery(MultiQueryConfig::default()));

        let parsed = StrategyConfig::parse(StrategyKind::Reranked, &json!({})).unwrap();
        assert_eq!(parsed, StrategyConfig::Reranked(RerankedConfig::default()));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = violation(StrategyKind::BasicSimilarity, json!({"metrc": "cosine"}));
        assert_eq!(err.field, "metrc");
        assert!(err.constraint.contains("expected one of: metric"));
    }

    #[test]
    fn test_schema_version() {
        assert!(
            StrategyConfig::parse(StrategyKind::BasicSimilarity, &json!({"version": 1})).is_ok()
        );
        let err = violation(StrategyKind::BasicSimilarity, json!({"version": 2}));
        assert_eq!(err.field, "version");
    }

    #[test]
    fn test_type_and_range_errors_name_the_field() {
        let err = violation(StrategyKind::MultiQuery, json!({"num_queries": "three"}));
        assert_eq!(err.field, "num_queries");
        assert!(err.constraint.starts_with("has the wrong type"));

        let err = violation(StrategyKind::MultiQuery, json!({"num_queries": 0}));
        assert_eq!(err, ConfigViolation::new("num_queries", "must be >= 1, got 0"));

        let err = violation(StrategyKind::MultiQuery, json!({"aggregation_method": "median"}));
        assert_eq!(err.field, "aggregation_method");

        let err = violation(StrategyKind::MetadataFiltered, json!({"oversample_factor": 0}));
        assert_eq!(err.field, "oversample_factor");

        let err = violation(StrategyKind::BasicSimilarity, json!([1, 2]));
        assert_eq!(err.field, "config");
    }

    #[test]
    fn test_metadata_filtered_parses_filters() {
        let parsed = StrategyConfig::parse(
            StrategyKind::MetadataFiltered,
            &json!({
                "default_filters": {"lang": "rust", "stars": {"$gte": 10}},
                "oversample_factor": 5,
                "metric": "dot_product"
            }),
        )
        .unwrap();

        let StrategyConfig::MetadataFiltered(config) = parsed else {
            panic!("expected metadata_filtered config");
        };
        assert_eq!(config.default_filters.len(), 2);
        assert_eq!(config.oversample_factor, 5);
        assert_eq!(config.metric, Some(DistanceMetric::DotProduct));

        let err = violation(
            StrategyKind::MetadataFiltered,
            json!({"default_filters": {"stars": {"$near": 3}}}),
        );
        assert_eq!(err.field, "default_filters.stars");
    }

    #[test]
    fn test_rerank_factor_typo_is_rejected() {
        let err = violation(
            StrategyKind::Reranked,
            json!({"rerank_factors": {"recency": 0.2, "recncy": 0.1}}),
        );
        assert_eq!(err.field, "rerank_factors.recncy");
        assert!(err.constraint.contains("recency, length, metadata_boost"));
    }

    #[test]
    fn test_rerank_boost_rules() {
        let parsed = StrategyConfig::parse(
            StrategyKind::Reranked,
            &json!({
                "rerank_factors": {"metadata_boost": 0.3},
                "metadata_boost_rules": [{"field": "source", "value": "docs", "boost": 0.5}]
            }),
        )
        .unwrap();
        let StrategyConfig::Reranked(config) = parsed else {
            panic!("expected reranked config");
        };
        assert_eq!(config.metadata_boost_rules.len(), 1);
        assert_eq!(config.rerank_factors[&RerankFactor::MetadataBoost], 0.3);

        let err = violation(
            StrategyKind::Reranked,
            json!({"metadata_boost_rules": [{"field": "source", "value": "docs", "boost": 1.5}]}),
        );
        assert_eq!(err.field, "metadata_boost_rules[0].boost");

        let err = violation(StrategyKind::Reranked, json!({"length_pivot": -1.0}));
        assert_eq!(err.field, "length_pivot");
    }

    #[test]
    fn test_hybrid_children() {
        let parsed = StrategyConfig::parse(
            StrategyKind::HybridUniversal,
            &json!({
                "children": [
                    {"strategy": "basic_similarity", "weight": 2},
                    {"strategy": "reranked", "weight": 3, "config": {"initial_k": 40}},
                    {"strategy": "multi_query", "weight": 5}
                ]
            }),
        )
        .unwrap();
        let StrategyConfig::HybridUniversal(config) = parsed else {
            panic!("expected hybrid config");
        };
        assert_eq!(config.children.len(), 3);
        assert_eq!(config.total_weight(), 10.0);
        assert_eq!(config.children[1].kind, StrategyKind::Reranked);
        assert_eq!(config.oversample_factor, 2);

        let parsed = StrategyConfig::parse(
            StrategyKind::HybridUniversal,
            &json!({
                "children": [{"strategy": "basic_similarity", "weight": 1}],
                "oversample_factor": 4
            }),
        )
        .unwrap();
        let StrategyConfig::HybridUniversal(config) = parsed else {
            panic!("expected hybrid config");
        };
        assert_eq!(config.oversample_factor, 4);

        let err = violation(
            StrategyKind::HybridUniversal,
            json!({
                "children": [{"strategy": "basic_similarity", "weight": 1}],
                "oversample_factor": 0
            }),
        );
        assert_eq!(err.field, "oversample_factor");
    }

    #[test]
    fn test_hybrid_child_errors_carry_paths() {
        let err = violation(StrategyKind::HybridUniversal, json!({"children": []}));
        assert_eq!(err.field, "children");

        let err = violation(
            StrategyKind::HybridUniversal,
            json!({"children": [{"strategy": "basic_similarity", "weight": 0}]}),
        );
        assert_eq!(err.field, "children[0].weight");

        let err = violation(
            StrategyKind::HybridUniversal,
            json!({"children": [
                {"strategy": "basic_similarity", "weight": 1},
                {"strategy": "reranked", "weight": 1, "config": {"initial_k": 0}}
            ]}),
        );
        assert_eq!(err.field, "children[1].config.initial_k");

        let err = violation(
            StrategyKind::HybridUniversal,
            json!({"children": [{"strategy": "hybrid_universal", "weight": 1}]}),
        );
        assert_eq!(err.field, "children[0].strategy");

        let err = violation(
            StrategyKind::HybridUniversal,
            json!({"children": [{"strategy": "bm25", "weight": 1}]}),
        );
        assert!(err.constraint.contains("bm25"));
    }

    #[test]
    fn test_engine_config_from_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
fan_out_limit = 4
query_timeout_ms = 2500
"#,
        )
        .unwrap();
        assert_eq!(config.fan_out_limit, Some(4));
        assert_eq!(config.query_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.embedding_cache_size, 256);

        let err = EngineConfig::from_toml_str("fan_out_limit = 0").unwrap_err();
        assert_eq!(err.field, "fan_out_limit");
        assert!(EngineConfig::from_toml_str("fan_out_limit = [").is_err());
    }
}
