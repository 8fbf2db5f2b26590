//! Semantic search over document paragraphs.
//!
//! This module embeds corpus paragraphs through a remote embedding API and
//! answers queries with exact nearest-neighbor search.
//!
//! # Architecture
//!
//! - `embeddings`: Embedding client seam, Cohere client and retry wrapper
//! - `index`: Flat in-memory vector index with squared-L2 search
//! - `storage`: Binary file I/O for index.bin persistence
//! - `pipeline`: Extract, embed, index, persist and query in one pass

pub mod embeddings;
pub mod index;
pub mod pipeline;
pub mod storage;

pub use embeddings::{ApiKey, CohereEmbedder, RetryPolicy, RetryingEmbedder};
pub use pipeline::{PipelineOptions, SearchPipeline, SearchReport};
