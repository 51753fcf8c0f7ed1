use crate::catalog::{StrategyDescriptor, StrategyKind};
use crate::config::{EngineConfig, StrategySpec};
use crate::context::{QueryContext, StrategyState};
use crate::embedder::QueryEmbedder;
use crate::error::{ConfigViolation, Result, RetrievalError};
use crate::registry::{StrategyRegistry, ValidationReport};
use crate::result::RetrievalResult;
use crate::strategy::RetrievalStrategy;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use lru::LruCache;
use retrieval_vector_store::{MetadataFilter, VectorBackend};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Optional per-call inputs of [`RetrievalEngine::retrieve_with`].
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    pub filters: Option<MetadataFilter>,

    /// Cancelling this token aborts the retrieval.
    pub cancellation: Option<CancellationToken>,

    /// Defaults to the current time.
    pub reference_time: Option<DateTime<Utc>>,
}

impl RetrieveOptions {
    pub fn with_filters(mut self, filters: MetadataFilter) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub fn with_reference_time(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = Some(reference_time);
        self
    }
}

/// Embedding cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
}

/// Entry point: resolves a strategy for a backend, embeds the query and runs
/// the strategy.
pub struct RetrievalEngine {
    registry: Arc<StrategyRegistry>,
    config: EngineConfig,
    embedder: Arc<dyn QueryEmbedder>,
    cache: Option<Mutex<LruCache<String, Arc<Vec<f32>>>>>,
}

impl RetrievalEngine {
    /// Create new retrieval engine
    pub fn new(
        registry: StrategyRegistry,
        config: EngineConfig,
        embedder: Arc<dyn QueryEmbedder>,
    ) -> std::result::Result<Self, ConfigViolation> {
        config.validate()?;

        let cache = NonZeroUsize::new(config.embedding_cache_size)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));
        info!(
            "Initializing retrieval engine ({} backends, {} strategies, embedding cache {})",
            registry.capabilities().len(),
            registry.list_strategies().len(),
            config.embedding_cache_size
        );

        Ok(Self {
            registry: Arc::new(registry),
            config,
            embedder,
            cache,
        })
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn list_strategies(&self) -> &[StrategyDescriptor] {
        self.registry.list_strategies()
    }

    /// Name of the best-fit strategy for `backend_id`; see
    /// [`StrategyRegistry::select_optimal`] for the descriptor.
    pub fn get_optimal_strategy(&self, backend_id: &str, use_case: &str) -> Result<String> {
        self.registry
            .select_optimal(backend_id, use_case)
            .map(|descriptor| descriptor.name.clone())
    }

    pub fn validate_config(
        &self,
        backend_id: &str,
        strategy_name: &str,
        raw_config: &Value,
    ) -> ValidationReport {
        self.registry
            .validate_config(backend_id, strategy_name, raw_config)
    }

    /// Retrieve the top `k` documents for `query` with an explicit strategy.
    pub async fn retrieve(
        &self,
        spec: &StrategySpec,
        backend: &dyn VectorBackend,
        query: &str,
        k: usize,
    ) -> Result<RetrievalResult> {
        self.retrieve_with(spec, backend, query, k, RetrieveOptions::default())
            .await
    }

    /// Select the best strategy for the backend and run it with its default
    /// config.
    pub async fn retrieve_auto(
        &self,
        backend: &dyn VectorBackend,
        use_case: &str,
        query: &str,
        k: usize,
    ) -> Result<RetrievalResult> {
        let descriptor = self
            .registry
            .select_optimal(backend.capability_profile_id(), use_case)?;

        let mut config = descriptor.default_config.clone();
        if descriptor.kind == StrategyKind::Reranked
            && let Some(fields) = config.as_object_mut()
            && fields
                .get("initial_k")
                .and_then(Value::as_u64)
                .is_some_and(|initial_k| (initial_k as usize) < k)
        {
            fields.insert("initial_k".to_string(), Value::from(k));
        }

        let spec = StrategySpec::new(descriptor.name.clone(), config);
        self.retrieve(&spec, backend, query, k).await
    }

    /// [`retrieve`](Self::retrieve) with per-call filters, cancellation and
    /// reference time.
    pub async fn retrieve_with(
        &self,
        spec: &StrategySpec,
        backend: &dyn VectorBackend,
        query: &str,
        k: usize,
        options: RetrieveOptions,
    ) -> Result<RetrievalResult> {
        let start = Instant::now();
        let backend_id = backend.capability_profile_id();
        let mut state = StrategyState::Configured;

        if k == 0 {
            advance(&mut state, StrategyState::Failed, &spec.strategy, backend_id);
            return Err(ConfigViolation::new("k", "must be >= 1, got 0")
                .into_error(&spec.strategy, backend_id));
        }

        let strategy = match self.registry.build(&spec.strategy, &spec.config, backend_id) {
            Ok(strategy) => strategy,
            Err(err) => {
                advance(&mut state, StrategyState::Failed, &spec.strategy, backend_id);
                return Err(err);
            }
        };
        advance(&mut state, StrategyState::Validated, &spec.strategy, backend_id);

        let name = strategy.name();
        let prepared = self.prepare_context(name, &strategy, query, k, options).await;
        let ctx = match prepared {
            Ok(ctx) => ctx,
            Err(err) => {
                advance(&mut state, StrategyState::Failed, name, backend_id);
                return Err(err);
            }
        };

        advance(&mut state, StrategyState::Executing, name, backend_id);
        let mut run = strategy.execute(backend, &ctx);
        let outcome = match self.config.query_timeout() {
            None => run.await,
            Some(limit) => match tokio::time::timeout(limit, &mut run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        "{name} on `{backend_id}` exceeded {}ms, cancelling",
                        limit.as_millis()
                    );
                    ctx.cancellation.cancel();
                    run.await
                }
            },
        };

        match outcome {
            Ok(result) => {
                advance(&mut state, StrategyState::Completed, name, backend_id);
                info!(
                    "Retrieval `{name}` on `{backend_id}` completed in {}ms, returned {} results",
                    start.elapsed().as_millis(),
                    result.len()
                );
                Ok(result)
            }
            Err(err) => {
                advance(&mut state, StrategyState::Failed, name, backend_id);
                warn!("Retrieval `{name}` on `{backend_id}` failed: {err}");
                Err(err)
            }
        }
    }

    async fn prepare_context(
        &self,
        strategy_name: &str,
        strategy: &RetrievalStrategy,
        query: &str,
        k: usize,
        options: RetrieveOptions,
    ) -> Result<QueryContext> {
        let query_vector = self.embed(strategy_name, query).await?;

        let expansions = if strategy.uses_expansions() {
            self.embedder
                .expand(query)
                .await
                .map_err(|err| RetrievalError::EmbeddingFailed {
                    strategy: strategy_name.to_string(),
                    reason: err.to_string(),
                })?
        } else {
            Vec::new()
        };

        let caller = options.cancellation.unwrap_or_default();
        let mut ctx = QueryContext::with_shared_vector(query_vector, k)
            .with_expansions(expansions)
            .with_cancellation(caller.child_token());
        if let Some(filters) = options.filters {
            ctx = ctx.with_filters(filters);
        }
        if let Some(reference_time) = options.reference_time {
            ctx = ctx.with_reference_time(reference_time);
        }
        if let Some(limit) = self.config.fan_out_limit {
            ctx = ctx.with_fan_out_limit(limit);
        }
        Ok(ctx)
    }

    async fn embed(&self, strategy_name: &str, query: &str) -> Result<Arc<Vec<f32>>> {
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.lock().await.get(query)
        {
            debug!("Embedding cache hit for query: '{query}'");
            return Ok(Arc::clone(hit));
        }

        let vector = self
            .embedder
            .embedding_for(query)
            .await
            .map_err(|err| RetrievalError::EmbeddingFailed {
                strategy: strategy_name.to_string(),
                reason: err.to_string(),
            })?;
        if vector.is_empty() {
            return Err(RetrievalError::EmbeddingFailed {
                strategy: strategy_name.to_string(),
                reason: "embedder returned an empty vector".to_string(),
            });
        }

        let vector = Arc::new(vector);
        if let Some(cache) = &self.cache {
            cache.lock().await.put(query.to_string(), Arc::clone(&vector));
        }
        Ok(vector)
    }

    /// Clear the embedding cache
    pub async fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().await.clear();
            info!("Embedding cache cleared");
        }
    }

    /// Get cache statistics
    pub async fn cache_stats(&self) -> CacheStats {
        match &self.cache {
            Some(cache) => {
                let cache = cache.lock().await;
                CacheStats {
                    size: cache.len(),
                    capacity: cache.cap().get(),
                }
            }
            None => CacheStats {
                size: 0,
                capacity: 0,
            },
        }
    }
}

fn advance(state: &mut StrategyState, next: StrategyState, strategy: &str, backend_id: &str) {
    if state.can_transition_to(next) {
        debug!(
            "{strategy} on `{backend_id}`: {} -> {}",
            state.as_str(),
            next.as_str()
        );
        *state = next;
    } else {
        warn!(
            "{strategy} on `{backend_id}`: ignoring transition {} -> {}",
            state.as_str(),
            next.as_str()
        );
    }
}
