use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use retrieval_engine::{
    AggregationMethod, EmbeddingError, EngineConfig, QueryEmbedder, RetrievalEngine,
    ScoredDocument, StrategyRegistry, StrategySpec, WeightedList, aggregate, fuse_weighted,
};
use retrieval_vector_store::{InMemoryVectorStore, Metadata, MetadataValue, StoredDocument};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

const DIMENSION: usize = 64;

fn vector_for(seed: usize) -> Vec<f32> {
    (0..DIMENSION)
        .map(|i| (((seed * 31 + i * 17) % 97) as f32) / 97.0)
        .collect()
}

struct HashEmbedder;

#[async_trait]
impl QueryEmbedder for HashEmbedder {
    async fn embedding_for(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vector_for(text.len()))
    }

    async fn expand(&self, text: &str) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok((0..4).map(|i| vector_for(text.len() + i)).collect())
    }
}

async fn create_test_store(count: usize) -> InMemoryVectorStore {
    let store = InMemoryVectorStore::new();
    let documents = (0..count)
        .map(|i| {
            let mut metadata = Metadata::new();
            metadata.insert(
                "source".to_string(),
                MetadataValue::from(if i % 3 == 0 { "docs" } else { "code" }),
            );
            metadata.insert(
                "timestamp".to_string(),
                MetadataValue::from(1_600_000_000 + (i as i64) * 3600),
            );
            StoredDocument::new(format!("doc-{i}"), vector_for(i)).with_metadata(metadata)
        })
        .collect();
    store.upsert(documents).await.unwrap();
    store
}

fn ranked_list(offset: usize, len: usize) -> Vec<ScoredDocument> {
    (0..len)
        .map(|i| ScoredDocument::new(format!("doc-{}", i + offset), 1.0 - i as f64 / len as f64))
        .collect()
}

fn bench_strategy_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("strategy_latency");

    let engine = RetrievalEngine::new(
        StrategyRegistry::with_defaults(),
        EngineConfig::default(),
        Arc::new(HashEmbedder),
    )
    .unwrap();
    let specs = [
        StrategySpec::new("basic_similarity", json!({})),
        StrategySpec::new(
            "metadata_filtered",
            json!({"default_filters": {"source": "docs"}}),
        ),
        StrategySpec::new("multi_query", json!({"num_queries": 4})),
        StrategySpec::new("reranked", json!({"rerank_factors": {"recency": 0.2}})),
        StrategySpec::new(
            "hybrid_universal",
            json!({"children": [
                {"strategy": "basic_similarity", "weight": 0.6},
                {"strategy": "multi_query", "weight": 0.4}
            ]}),
        ),
    ];

    for doc_count in [100, 1000, 5000] {
        let store = rt.block_on(create_test_store(doc_count));
        group.throughput(Throughput::Elements(doc_count as u64));

        for spec in &specs {
            group.bench_with_input(
                BenchmarkId::new(spec.strategy.clone(), doc_count),
                &doc_count,
                |b, _| {
                    b.to_async(&rt).iter(|| async {
                        let result = engine
                            .retrieve(spec, &store, black_box("async error handling"), 10)
                            .await
                            .unwrap();
                        black_box(result);
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");

    for method in [
        AggregationMethod::Max,
        AggregationMethod::Mean,
        AggregationMethod::Weighted,
    ] {
        let lists: Vec<(usize, Vec<ScoredDocument>)> =
            (0..4).map(|i| (i, ranked_list(i * 25, 100))).collect();

        group.bench_function(method.as_str(), |b| {
            b.iter(|| black_box(aggregate(lists.clone(), method, 10)));
        });
    }

    group.finish();
}

fn bench_weighted_fusion(c: &mut Criterion) {
    let mut group = c.benchmark_group("fusion");

    for list_len in [20, 100, 500] {
        let lists: Vec<WeightedList> = (0..4)
            .map(|i| WeightedList {
                label: format!("{i}:child"),
                weight: 0.25,
                documents: ranked_list(i * list_len / 2, list_len),
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(list_len), &list_len, |b, _| {
            b.iter(|| black_box(fuse_weighted(lists.clone(), 10)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_strategy_latency,
    bench_aggregation,
    bench_weighted_fusion
);
criterion_main!(benches);
