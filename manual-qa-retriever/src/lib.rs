//! manual-qa-retriever: semantic search over chunked owner's manuals
//!
//! Builds an exact L2 vector index over every chunk of a corpus, persists it
//! keyed by embedding model and content fingerprint, and answers top-k queries
//! optionally restricted to one document group (one manual). Keyword search
//! covers the cases vector search cannot.
//!
//! ## Key Modules
//!
//! - **[`retriever`]**: [`Retriever`], index lifecycle and search operations
//! - **[`manuals`]**: corpus and chunk types, JSON I/O
//! - **[`index`]**: the flat L2 [`VectorIndex`] and its blob format
//! - **[`store`]**: on-disk index cache
//! - **[`fingerprint`]**: content fingerprints that key the cache
//! - **[`query_cache`]**: FIFO cache of query embeddings
//! - **[`keyword`]**: keyword fallback search
//! - **[`chunking`]**, **[`group_detect`]**: ingest and query helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use manual_qa_retriever::{ManualsData, Retriever, RetrieverConfig};
//! use std::path::Path;
//!
//! # async fn example() -> manual_qa_retriever::Result<()> {
//! let manuals = ManualsData::from_json_file(Path::new("processed_manuals.json"))?;
//! let retriever = Retriever::with_fastembed(RetrieverConfig::default())?;
//!
//! // Loads the cached index for this corpus, or encodes and caches it
//! retriever.load_or_build(&manuals).await?;
//!
//! for hit in retriever
//!     .search_with_fallback("How often should I change the engine oil?", Some("MG Astor"), 5)
//!     .await?
//! {
//!     println!("[{}] {}", hit.group(), hit.text());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ManualsData → fingerprint → IndexStore hit? ──yes──→ IndexSnapshot
//!                                   │ no                    ↑
//!                                   └→ embed chunks → VectorIndex → save
//!
//! query → QueryEmbeddingCache → VectorIndex (top_k × overfetch) → group filter
//! ```

pub mod chunking;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod group_detect;
pub mod index;
pub mod keyword;
pub mod manuals;
pub mod query_cache;
pub mod retriever;
pub mod store;

pub use chunking::{ChunkingConfig, chunk_words};
pub use config::{ConfigError, RetrieverConfig};
pub use error::{Result, RetrieverError};
pub use fingerprint::{Fingerprint, fingerprint};
pub use group_detect::GroupDetector;
pub use index::{IndexError, Neighbor, VectorIndex};
pub use keyword::{KeywordHit, simple_keyword_search};
pub use manuals::{Chunk, ChunkMetadata, Manual, ManualsData};
pub use query_cache::QueryEmbeddingCache;
pub use retriever::{IndexOutcome, IndexSnapshot, Retriever, SearchHit, VectorHit};
pub use store::{CacheMeta, CachePaths, StoreError};
