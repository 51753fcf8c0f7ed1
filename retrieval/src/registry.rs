use crate::capability::{BackendCapabilityProfile, CapabilityRegistry};
use crate::catalog::{StrategyCatalog, StrategyDescriptor, StrategyKind};
use crate::compatibility::{self, CompatibilityReport};
use crate::config::{RerankFactor, StrategyConfig};
use crate::error::{ConfigViolation, Result, RetrievalError};
use crate::strategy::{
    BasicSimilarityStrategy, HybridUniversalStrategy, MetadataFilteredStrategy,
    MultiQueryStrategy, RerankedStrategy, RetrievalStrategy,
};
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

const SCORE_EPSILON: f64 = 1e-9;

/// Outcome of a non-failing config validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub strategy: String,
    pub backend: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn new(strategy: &str, backend: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            backend: backend.to_string(),
            valid: false,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn finish(mut self) -> Self {
        self.valid = self.errors.is_empty();
        self
    }
}

/// Resolves, validates and instantiates strategies for a backend.
///
/// Read-only after construction; clone it or share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    capabilities: Arc<CapabilityRegistry>,
    catalog: Arc<StrategyCatalog>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl StrategyRegistry {
    pub fn new(capabilities: CapabilityRegistry, catalog: StrategyCatalog) -> Self {
        Self {
            capabilities: Arc::new(capabilities),
            catalog: Arc::new(catalog),
        }
    }

    /// Built-in backend profiles and all five strategies.
    pub fn with_defaults() -> Self {
        Self::new(
            CapabilityRegistry::with_builtin_profiles(),
            StrategyCatalog::builtin(),
        )
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    /// Descriptors in catalog order.
    pub fn list_strategies(&self) -> &[StrategyDescriptor] {
        self.catalog.descriptors()
    }

    pub fn compatibility(
        &self,
        strategy_name: &str,
        backend_id: &str,
    ) -> Result<CompatibilityReport> {
        let profile = self.capabilities.profile_for(backend_id)?;
        let descriptor = self.descriptor(strategy_name, backend_id)?;
        Ok(compatibility::score(descriptor, &profile))
    }

    /// Highest-scoring strategy whose required capabilities are met.
    ///
    /// Equal scores go to the strategy the use-case hint favours, then to
    /// catalog order. The hint never beats a higher score.
    pub fn select_optimal(&self, backend_id: &str, use_case: &str) -> Result<&StrategyDescriptor> {
        let profile = self.capabilities.profile_for(backend_id)?;
        let hinted = StrategyKind::for_use_case(use_case);

        let mut best: Option<(&StrategyDescriptor, f64)> = None;
        for descriptor in self.catalog.descriptors() {
            let report = compatibility::score(descriptor, &profile);
            debug!(
                "{} on `{backend_id}`: score {:.3}, required met: {}",
                descriptor.name, report.score, report.required_met
            );
            if !report.required_met {
                continue;
            }

            let replace = match best {
                None => true,
                Some((current, best_score)) => {
                    report.score > best_score + SCORE_EPSILON
                        || ((report.score - best_score).abs() <= SCORE_EPSILON
                            && hinted == Some(descriptor.kind)
                            && hinted != Some(current.kind))
                }
            };
            if replace {
                best = Some((descriptor, report.score));
            }
        }

        match best {
            Some((descriptor, score)) => {
                info!(
                    "Selected `{}` for backend `{backend_id}` (score {score:.3}, use case `{use_case}`)",
                    descriptor.name
                );
                Ok(descriptor)
            }
            None => Err(RetrievalError::NoCompatibleStrategy {
                backend: backend_id.to_string(),
                use_case: use_case.to_string(),
            }),
        }
    }

    /// Validate `raw_config` and instantiate the strategy for `backend_id`.
    ///
    /// Fails closed: a backend missing a required capability never gets a
    /// strategy instance.
    pub fn build(
        &self,
        strategy_name: &str,
        raw_config: &Value,
        backend_id: &str,
    ) -> Result<RetrievalStrategy> {
        let profile = self.capabilities.profile_for(backend_id)?;
        let descriptor = self.descriptor(strategy_name, backend_id)?;
        let config = StrategyConfig::parse(descriptor.kind, raw_config)
            .map_err(|violation| violation.into_error(strategy_name, backend_id))?;

        let strategy = self.instantiate(descriptor, config, &profile)?;
        debug!("Built `{strategy_name}` for backend `{backend_id}`");
        Ok(strategy)
    }

    fn descriptor(&self, strategy_name: &str, backend_id: &str) -> Result<&StrategyDescriptor> {
        self.catalog
            .get(strategy_name)
            .ok_or_else(|| RetrievalError::UnknownStrategy {
                strategy: strategy_name.to_string(),
                backend: backend_id.to_string(),
            })
    }

    fn instantiate(
        &self,
        descriptor: &StrategyDescriptor,
        config: StrategyConfig,
        profile: &Arc<BackendCapabilityProfile>,
    ) -> Result<RetrievalStrategy> {
        let backend_id = profile.backend_id.as_str();
        let report = compatibility::score(descriptor, profile);
        if !report.required_met {
            return Err(RetrievalError::incompatible(
                descriptor.name.clone(),
                backend_id,
                report.missing_capabilities.into_iter().collect(),
            ));
        }

        if let Some(violation) = metric_violation(&config, profile) {
            return Err(violation.into_error(&descriptor.name, backend_id));
        }

        let profile = Arc::clone(profile);
        Ok(match config {
            StrategyConfig::BasicSimilarity(c) => {
                RetrievalStrategy::BasicSimilarity(BasicSimilarityStrategy::new(c, profile))
            }
            StrategyConfig::MetadataFiltered(c) => {
                RetrievalStrategy::MetadataFiltered(MetadataFilteredStrategy::new(c, profile))
            }
            StrategyConfig::MultiQuery(c) => {
                RetrievalStrategy::MultiQuery(MultiQueryStrategy::new(c, profile))
            }
            StrategyConfig::Reranked(c) => {
                RetrievalStrategy::Reranked(RerankedStrategy::new(c, profile))
            }
            StrategyConfig::HybridUniversal(c) => {
                let mut children = Vec::with_capacity(c.children.len());
                for (i, child) in c.children.into_iter().enumerate() {
                    let child_descriptor = self.catalog.descriptor(child.kind).ok_or_else(|| {
                        RetrievalError::UnknownStrategy {
                            strategy: child.kind.name().to_string(),
                            backend: backend_id.to_string(),
                        }
                    })?;
                    let built = self
                        .instantiate(child_descriptor, child.config, &profile)
                        .map_err(|err| nest_child_error(err, i, &descriptor.name))?;
                    children.push((child.weight, built));
                }
                RetrievalStrategy::HybridUniversal(HybridUniversalStrategy::new(
                    children,
                    c.oversample_factor,
                    profile,
                ))
            }
        })
    }

    /// Run every check `build` runs without failing fast, plus advisory
    /// warnings.
    pub fn validate_config(
        &self,
        backend_id: &str,
        strategy_name: &str,
        raw_config: &Value,
    ) -> ValidationReport {
        let mut report = ValidationReport::new(strategy_name, backend_id);

        let profile = match self.capabilities.profile_for(backend_id) {
            Ok(profile) => profile,
            Err(err) => {
                report.errors.push(err.to_string());
                return report.finish();
            }
        };
        let descriptor = match self.descriptor(strategy_name, backend_id) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                report.errors.push(err.to_string());
                return report.finish();
            }
        };

        match StrategyConfig::parse(descriptor.kind, raw_config) {
            Ok(config) => self.inspect(descriptor, &config, &profile, "", &mut report),
            Err(violation) => {
                let compat = compatibility::score(descriptor, &profile);
                if !compat.required_met {
                    report.errors.push(
                        RetrievalError::incompatible(
                            strategy_name,
                            backend_id,
                            compat.missing_capabilities.into_iter().collect(),
                        )
                        .to_string(),
                    );
                }
                report
                    .errors
                    .push(violation.into_error(strategy_name, backend_id).to_string());
            }
        }

        report.finish()
    }

    fn inspect(
        &self,
        descriptor: &StrategyDescriptor,
        config: &StrategyConfig,
        profile: &BackendCapabilityProfile,
        prefix: &str,
        report: &mut ValidationReport,
    ) {
        let backend_id = profile.backend_id.as_str();
        let compat = compatibility::score(descriptor, profile);
        if !compat.required_met {
            report.errors.push(
                RetrievalError::incompatible(
                    descriptor.name.clone(),
                    backend_id,
                    compat.missing_capabilities.iter().cloned().collect(),
                )
                .to_string(),
            );
        }
        for capability in &compat.missing_preferred {
            report.warnings.push(format!(
                "{prefix}{}: backend `{backend_id}` lacks preferred capability `{capability}`",
                descriptor.name
            ));
        }
        if let Some(violation) = metric_violation(config, profile) {
            report
                .errors
                .push(format!("`{prefix}{}` {}", violation.field, violation.constraint));
        }

        match config {
            StrategyConfig::BasicSimilarity(_) | StrategyConfig::MultiQuery(_) => {}
            StrategyConfig::MetadataFiltered(c) => {
                if !profile.native_filtering {
                    report.warnings.push(format!(
                        "{prefix}metadata_filtered: backend `{backend_id}` has no native filtering; \
                         filters run client-side over k * {} fetched candidates",
                        c.oversample_factor
                    ));
                }
            }
            StrategyConfig::Reranked(c) => {
                if c.initial_k > profile.max_batch_size {
                    report.warnings.push(format!(
                        "`{prefix}initial_k` ({}) exceeds max batch size {} of `{backend_id}` and will be clamped",
                        c.initial_k, profile.max_batch_size
                    ));
                }
                if c.rerank_factors.is_empty() {
                    report.warnings.push(format!(
                        "`{prefix}rerank_factors` is empty; results keep their similarity order"
                    ));
                }
                if c.rerank_factors.contains_key(&RerankFactor::MetadataBoost)
                    && c.metadata_boost_rules.is_empty()
                {
                    report.warnings.push(format!(
                        "`{prefix}metadata_boost_rules` is empty; the metadata_boost factor is always 0"
                    ));
                }
            }
            StrategyConfig::HybridUniversal(c) => {
                let total = c.total_weight();
                if (total - 1.0).abs() > SCORE_EPSILON {
                    report.warnings.push(format!(
                        "`{prefix}children` weights sum to {total}; they are normalized before fusion"
                    ));
                }
                for (i, child) in c.children.iter().enumerate() {
                    let child_prefix = format!("{prefix}children[{i}].config.");
                    match self.catalog.descriptor(child.kind) {
                        Some(child_descriptor) => self.inspect(
                            child_descriptor,
                            &child.config,
                            profile,
                            &child_prefix,
                            report,
                        ),
                        None => report.errors.push(
                            RetrievalError::UnknownStrategy {
                                strategy: child.kind.name().to_string(),
                                backend: backend_id.to_string(),
                            }
                            .to_string(),
                        ),
                    }
                }
            }
        }
    }
}

fn metric_violation(
    config: &StrategyConfig,
    profile: &BackendCapabilityProfile,
) -> Option<ConfigViolation> {
    let metric = config.metric()?;
    if profile.supports_metric(metric) {
        return None;
    }
    let supported: Vec<&str> = profile
        .preferred_distance_metrics
        .iter()
        .map(|m| m.as_str())
        .collect();
    Some(ConfigViolation::new(
        "metric",
        format!(
            "`{metric}` is not supported by the backend (supported: {})",
            supported.join(", ")
        ),
    ))
}

/// Re-anchor a child's config error under the hybrid's config path.
fn nest_child_error(err: RetrievalError, index: usize, hybrid: &str) -> RetrievalError {
    match err {
        RetrievalError::InvalidConfig {
            backend,
            field,
            constraint,
            ..
        } => RetrievalError::InvalidConfig {
            strategy: hybrid.to_string(),
            backend,
            field: format!("children[{index}].config.{field}"),
            constraint,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use pretty_assertions::assert_eq;
    use retrieval_vector_store::DistanceMetric;
    use serde_json::json;

    fn registry_with(profiles: Vec<BackendCapabilityProfile>) -> StrategyRegistry {
        let mut capabilities = CapabilityRegistry::new();
        for profile in profiles {
            capabilities.register(profile);
        }
        StrategyRegistry::new(capabilities, StrategyCatalog::builtin())
    }

    #[test]
    fn test_select_optimal_prefers_full_preferred_coverage() {
        let registry = registry_with(vec![BackendCapabilityProfile::new("filtering")
            .with_native_filtering()
            .with_capability(Capability::HybridSearch)]);

        // metadata_filtered, reranked and hybrid_universal all score 1.0;
        // catalog order decides.
        let selected = registry.select_optimal("filtering", "general").unwrap();
        assert_eq!(selected.kind, StrategyKind::MetadataFiltered);

        let selected = registry.select_optimal("filtering", "precision").unwrap();
        assert_eq!(selected.kind, StrategyKind::Reranked);
    }

    #[test]
    fn test_hint_never_beats_higher_score() {
        let registry = registry_with(vec![
            BackendCapabilityProfile::new("filtering").with_native_filtering(),
        ]);

        // hybrid_universal scores 0.75 here, below metadata_filtered and reranked.
        let selected = registry.select_optimal("filtering", "hybrid").unwrap();
        assert_eq!(selected.kind, StrategyKind::MetadataFiltered);

        let report = registry.compatibility("hybrid_universal", "filtering").unwrap();
        assert_eq!(report.score, 0.75);
    }

    #[test]
    fn test_select_optimal_without_compatible_strategy() {
        let bare = BackendCapabilityProfile {
            supported: Default::default(),
            ..BackendCapabilityProfile::new("bare")
        };
        let registry = registry_with(vec![bare]);
        let err = registry.select_optimal("bare", "general").unwrap_err();
        assert!(matches!(err, RetrievalError::NoCompatibleStrategy { .. }));

        let err = registry.select_optimal("missing", "general").unwrap_err();
        assert!(matches!(err, RetrievalError::UnknownBackend { .. }));
    }

    #[test]
    fn test_build_fails_closed_on_missing_capability() {
        let bare = BackendCapabilityProfile {
            supported: Default::default(),
            ..BackendCapabilityProfile::new("bare")
        };
        let registry = registry_with(vec![bare]);

        let err = registry
            .build("basic_similarity", &json!({}), "bare")
            .unwrap_err();
        let RetrievalError::IncompatibleBackend { missing, .. } = err else {
            panic!("expected IncompatibleBackend, got {err:?}");
        };
        assert_eq!(missing, vec![Capability::BasicSimilarity]);
    }

    #[test]
    fn test_build_rejects_unknown_strategy_and_bad_config() {
        let registry = StrategyRegistry::with_defaults();

        let err = registry.build("bm25", &json!({}), "qdrant").unwrap_err();
        assert!(
            matches!(err, RetrievalError::UnknownStrategy { strategy, .. } if strategy == "bm25")
        );

        let err = registry
            .build("multi_query", &json!({"num_queries": -1}), "qdrant")
            .unwrap_err();
        assert!(
            matches!(err, RetrievalError::InvalidConfig { field, .. } if field == "num_queries")
        );
    }

    #[test]
    fn test_build_checks_metric_support() {
        let registry = StrategyRegistry::with_defaults();

        let err = registry
            .build("basic_similarity", &json!({"metric": "cosine"}), "faiss")
            .unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidConfig { field, .. } if field == "metric"));

        let strategy = registry
            .build("basic_similarity", &json!({}), "faiss")
            .unwrap();
        let RetrievalStrategy::BasicSimilarity(basic) = strategy else {
            panic!("expected basic similarity");
        };
        assert_eq!(basic.metric(), DistanceMetric::Euclidean);
    }

    #[test]
    fn test_hybrid_child_errors_are_nested() {
        let registry = StrategyRegistry::with_defaults();
        let err = registry
            .build(
                "hybrid_universal",
                &json!({"children": [
                    {"strategy": "basic_similarity", "weight": 1},
                    {"strategy": "reranked", "weight": 1, "config": {"metric": "cosine"}}
                ]}),
                "faiss",
            )
            .unwrap_err();
        let RetrievalError::InvalidConfig {
            strategy, field, ..
        } = err
        else {
            panic!("expected InvalidConfig, got {err:?}");
        };
        assert_eq!(strategy, "hybrid_universal");
        assert_eq!(field, "children[1].config.metric");
    }

    #[test]
    fn test_hybrid_builds_children_in_order() {
        let registry = StrategyRegistry::with_defaults();
        let strategy = registry
            .build(
                "hybrid_universal",
                &json!({"children": [
                    {"strategy": "reranked", "weight": 2},
                    {"strategy": "multi_query", "weight": 3},
                    {"strategy": "basic_similarity", "weight": 5}
                ]}),
                "qdrant",
            )
            .unwrap();
        assert!(strategy.uses_expansions());

        let RetrievalStrategy::HybridUniversal(hybrid) = strategy else {
            panic!("expected hybrid");
        };
        let labels: Vec<&str> = hybrid.children().iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["0:reranked", "1:multi_query", "2:basic_similarity"]);

        let weights = hybrid.normalized_weights();
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!((weights[0] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_validate_config_collects_warnings() {
        let registry = StrategyRegistry::with_defaults();

        let report = registry.validate_config(
            "faiss",
            "metadata_filtered",
            &json!({"default_filters": {"lang": "rust"}}),
        );
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.contains("client-side")));

        let report = registry.validate_config(
            "qdrant",
            "reranked",
            &json!({"initial_k": 5000}),
        );
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.contains("max batch size")));
        assert!(report.warnings.iter().any(|w| w.contains("rerank_factors")));

        let report = registry.validate_config(
            "qdrant",
            "hybrid_universal",
            &json!({"children": [
                {"strategy": "basic_similarity", "weight": 2},
                {"strategy": "multi_query", "weight": 3}
            ]}),
        );
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.contains("normalized")));
    }

    #[test]
    fn test_validate_config_reports_errors_without_failing() {
        let registry = StrategyRegistry::with_defaults();

        let report = registry.validate_config(
            "qdrant",
            "reranked",
            &json!({"rerank_factors": {"age": 1}}),
        );
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("rerank_factors.age"));

        let report = registry.validate_config("nowhere", "reranked", &json!({}));
        assert!(!report.valid);
        assert!(report.errors[0].contains("Unknown backend"));
    }
}
