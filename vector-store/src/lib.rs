//! # Retrieval Vector Store
//!
//! The backend contract the retrieval engine searches through. Every vector
//! store product is reached via the same [`VectorBackend`] trait, so the engine
//! only ever sees document references, scores and metadata.
//!
//! ## Features
//!
//! - Abstract async search contract with distance metrics
//! - Tagged [`MetadataValue`] union for document metadata
//! - Mongo-style metadata filters (`$ne`, `$in`, `$gt`, `$gte`, `$lt`, `$lte`)
//! - Brute-force in-memory reference backend
//! - Retry-once wrapper for transient adapter failures
//!
//! ## Example
//!
//! ```no_run
//! use retrieval_vector_store::{
//!     DistanceMetric, InMemoryVectorStore, StoredDocument, VectorBackend,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = InMemoryVectorStore::new();
//!     store
//!         .upsert(vec![StoredDocument::new("doc-1", vec![0.1, 0.9])])
//!         .await?;
//!
//!     let hits = store.search(&[0.1, 0.8], 5, None, DistanceMetric::Cosine).await?;
//!     println!("Found {} similar documents", hits.len());
//!     Ok(())
//! }
//! ```

mod backend;
mod error;
mod filter;
mod memory;
mod retry;
mod value;

pub use backend::{DistanceMetric, DocRef, SearchHit, VectorBackend};
pub use error::{FilterError, Result, VectorStoreError};
pub use filter::{MetadataFilter, Predicate};
pub use memory::{InMemoryStoreConfig, InMemoryVectorStore, StoredDocument};
pub use retry::RetryingBackend;
pub use value::{Metadata, MetadataValue};
