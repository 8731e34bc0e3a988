#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]

//! # Hippograph Core
//!
//! Retrieval core for a personal knowledge graph: notes are embedded,
//! linked by shared entities and semantic similarity, and retrieved
//! through a hybrid scoring pipeline that blends dense-vector search,
//! spreading activation over the link graph, lexical (BM25) matching, and
//! temporal relevance.
//!
//! ## Module Organization
//!
//! ### Primary API
//! - [`memory`]: [`memory::Hippograph`], the orchestrator behind the RPC
//!   surface (`add_note`, `search`, `update_note`, …)
//! - [`ingestion`]: the note-ingestion pipeline (dedup, embed, link)
//! - [`retrieval`]: the 14-stage hybrid search pipeline
//! - [`sleep`]: the background consolidation cycle
//!
//! ### Support Modules
//! - [`types`]: the shared data model (`Note`, `Edge`, `Entity`, …)
//! - [`store`]: the [`store::StoreBackend`] persistence contract
//! - [`embeddings`]: the [`embeddings::EmbeddingProvider`] contract plus a
//!   deterministic mock implementation
//! - [`ann`]: the in-RAM cosine ANN index
//! - [`adjacency`]: the in-RAM bidirectional neighbor cache
//! - [`bm25`]: the lexical inverted index
//! - [`graph_metrics`]: cached PageRank and community labels
//! - [`entity_extractor`]: rule-based + pluggable-NER entity extraction
//! - [`temporal_extractor`]: date/time expression resolution
//! - [`query_decomposer`]: temporal-intent splitting for queries
//! - [`fusion`]: blend and reciprocal-rank signal fusion
//! - [`reranker`]: the optional cross-encoder rerank stage
//! - [`search_logger`]: per-query logging and daily aggregates
//! - [`config`]: runtime configuration
//! - [`error`]: the crate's error taxonomy
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use hippograph_core::config::Config;
//! use hippograph_core::embeddings::MockEmbeddingProvider;
//! use hippograph_core::entity_extractor::EntityExtractor;
//! use hippograph_core::memory::Hippograph;
//! use hippograph_core::retrieval::SearchOptions;
//! use hippograph_core::store::StoreBackend;
//!
//! async fn example(store: Arc<dyn StoreBackend>) -> hippograph_core::error::Result<()> {
//!     let embedder = Arc::new(MockEmbeddingProvider::default_dimension("mock-v1"));
//!     let memory = Hippograph::new(store, embedder, EntityExtractor::new(), Config::default()).await?;
//!
//!     memory.add_note("Set up Docker for local development".to_string(), None, None, false, None).await?;
//!
//!     let outcome = memory.search("docker setup", 10, SearchOptions::default()).await?;
//!     println!("found {} results", outcome.results.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `emotional_memory`: enable the optional emotional-context triple on notes
//! - `rerank`: enable the cross-encoder rerank stage
//! - `proptest-arbitrary`: derive `proptest::Arbitrary` for the core types

pub mod adjacency;
pub mod ann;
pub mod bm25;
pub mod config;
pub mod embeddings;
pub mod entity_extractor;
pub mod error;
pub mod fusion;
pub mod graph_metrics;
pub mod ingestion;
pub mod memory;
pub mod query_decomposer;
pub mod reranker;
pub mod retrieval;
pub mod search_logger;
pub mod sleep;
pub mod store;
pub mod temporal_extractor;
pub mod types;

pub use error::{Error, Result};
pub use memory::Hippograph;
