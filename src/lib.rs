//! Velociraptor - hierarchical summary trees for long paginated documents.
//!
//! A document's pages are merged into chunks, the chunks become the leaves
//! of a balanced tree, and each level above summarizes the one below. Node
//! embeddings support semantic search; the tree structure supports
//! navigation (parent, siblings, breadcrumb, document-order leaf walks) and
//! outlines.
//!
//! # Quick Start
//!
//! ```no_run
//! use velociraptor::{
//!     config::Config,
//!     engine::Velociraptor,
//!     llm::LlmClient,
//!     store::FileStore,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!     config.validate_llm()?;
//!
//!     // One client serves as both summarizer and embedder
//!     let client = LlmClient::from_config(&config);
//!     let store = FileStore::open(&config.storage.data_dir, config.storage.format)?;
//!     let engine = Velociraptor::new(&config, store, client.clone(), client)?;
//!
//!     // Build, summarize, embed and store a document
//!     let report = engine.process_document(Path::new("document.txt"), None).await?;
//!
//!     // Search it
//!     let hits = engine
//!         .search("your query here", Some(&report.document_id), None, None)
//!         .await;
//!     for hit in hits {
//!         println!("{} ({:.3}): {}", hit.page_range, hit.similarity, hit.preview);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Chunker**: merges pages into overlapping chunks
//! - **TreeBuilder**: groups chunks level by level into a tree
//! - **Tree / Node**: the tree aggregate and its structural checks
//! - **Navigator**: traversal over anything that resolves nodes by id
//! - **SearchEngine**: cosine ranking, previews and result context
//! - **NodeStore**: in-memory and file-backed tree storage
//! - **Velociraptor**: the orchestrator tying the pipeline together

pub mod builder;
pub mod chunker;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod llm;
pub mod navigator;
pub mod node;
pub mod persistence;
pub mod search;
pub mod similarity;
pub mod store;
pub mod summarizer;
pub mod tree;

// Re-export commonly used types
pub use builder::{BuilderOptions, IdStrategy, TreeBuilder};
pub use chunker::{Chunk, Chunker, ChunkerOptions};
pub use config::Config;
pub use document::{Document, Page};
pub use embeddings::{Embedder, EmbeddingScope};
pub use engine::{Direction, Velociraptor};
pub use error::{Result, VelociraptorError};
pub use llm::LlmClient;
pub use navigator::{Navigator, NodeLookup, OutlineEntry};
pub use node::{Node, NodeKind};
pub use persistence::{load_tree, save_tree};
pub use search::{SearchEngine, SearchHit};
pub use similarity::cosine_similarity;
pub use store::{FileStore, MemoryStore, NodeStore};
pub use summarizer::Summarizer;
pub use tree::Tree;
