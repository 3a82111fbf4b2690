//! The velociraptor orchestrator.
//!
//! [`Velociraptor`] ties the pipeline together: pages are chunked and built
//! into a tree, the tree is summarized and embedded, then stored. Queries,
//! outlines and navigation run against the store. One instance is built at
//! start-up and passed to whatever serves requests.

use crate::builder::{TreeBuilder, new_document_id};
use crate::chunker::Chunker;
use crate::config::{Config, SearchConfig};
use crate::document::Document;
use crate::embeddings::{EmbeddingScope, EmbeddingStats, Embedder, embed_tree, embedding_stats};
use crate::error::Result;
use crate::navigator::{NavigationContext, Navigator, OutlineEntry};
use crate::node::Node;
use crate::search::{NodeContext, SearchEngine, SearchHit};
use crate::store::{DocumentInfo, NodeStore};
use crate::summarizer::{SummaryStats, Summarizer, summarize_tree, summary_stats};
use crate::tree::{Tree, TreeStats};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Number of related sections returned when the caller does not say.
pub const DEFAULT_RELATED_TOP_K: usize = 3;

/// Where to move from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Parent,
    Children,
    NextSibling,
    PreviousSibling,
    NextLeaf,
    PreviousLeaf,
}

/// Outcome of processing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessReport {
    pub document_id: String,
    pub title: String,
    pub tree: TreeStats,
    pub summaries: SummaryStats,
    pub embeddings: EmbeddingStats,
}

/// Statistics for a stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub document_id: String,
    pub title: String,
    pub tree: TreeStats,
    pub summaries: SummaryStats,
    pub embeddings: EmbeddingStats,
}

/// Document processing and retrieval over a store.
pub struct Velociraptor<S, M, E> {
    store: S,
    summarizer: M,
    embedder: E,
    chunker: Chunker,
    builder: TreeBuilder,
    search: SearchEngine,
    search_config: SearchConfig,
    embedding_scope: EmbeddingScope,
}

impl<S: NodeStore, M: Summarizer, E: Embedder> Velociraptor<S, M, E> {
    /// Assemble the pipeline from a validated configuration.
    pub fn new(config: &Config, store: S, summarizer: M, embedder: E) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            summarizer,
            embedder,
            chunker: Chunker::new(config.chunking.clone())?,
            builder: TreeBuilder::new(config.builder.clone()),
            search: SearchEngine::new(config.search.preview_length)
                .with_related_threshold(config.search.related_threshold),
            search_config: config.search.clone(),
            embedding_scope: config.embedding.scope,
        })
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load a text file and process it. The title defaults to the file stem.
    pub async fn process_document(&self, path: &Path, title: Option<&str>) -> Result<ProcessReport> {
        let mut document = Document::from_text_file(path)?;
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            document.title = title.to_string();
        }
        self.ingest(&document).await
    }

    /// Chunk, build, summarize, embed and store a document.
    pub async fn ingest(&self, document: &Document) -> Result<ProcessReport> {
        let document_id = new_document_id();
        info!(
            title = %document.title,
            pages = document.page_count(),
            document_id = %document_id,
            "processing document"
        );

        let mut tree = self.builder.build_from_pages(
            &self.chunker,
            &document.pages,
            &document_id,
            &document.title,
        );
        let summaries = summarize_tree(&self.summarizer, &mut tree).await;
        let embeddings = embed_tree(&self.embedder, &mut tree, self.embedding_scope).await;

        self.store.put_tree(&tree)?;
        info!(document_id = %document_id, nodes = tree.len(), "document stored");

        Ok(ProcessReport {
            document_id,
            title: document.title.clone(),
            tree: tree.stats(),
            summaries,
            embeddings,
        })
    }

    /// Embed `query` and search the store. Configured defaults fill in
    /// `top_k` and `threshold` when not given.
    pub async fn search(
        &self,
        query: &str,
        document_id: Option<&str>,
        top_k: Option<usize>,
        threshold: Option<f32>,
    ) -> Vec<SearchHit> {
        let Some(query_vector) = self.embedder.embed(query).await else {
            warn!(query, "query could not be embedded");
            return Vec::new();
        };

        self.search.search(
            &query_vector,
            &self.store,
            document_id,
            top_k.unwrap_or(self.search_config.top_k),
            threshold.unwrap_or(self.search_config.threshold),
        )
    }

    /// Outline of a stored document.
    pub fn document_outline(&self, document_id: &str) -> Option<OutlineEntry> {
        let tree = self.store.get_tree(document_id)?;
        Navigator::new(&self.store).outline(tree.root_id()?)
    }

    /// Parent, children, siblings and path to root of a node.
    pub fn node_context(&self, node_id: &str) -> Option<NodeContext> {
        let tree = self.tree_of(node_id)?;
        self.search.context_for_node(&tree, node_id)
    }

    /// Movement options around a node, including neighbours and breadcrumb.
    pub fn navigation_context(&self, node_id: &str) -> Option<NavigationContext> {
        Navigator::new(&self.store).context(node_id)
    }

    /// Sections similar to the given one.
    pub fn related_sections(&self, node_id: &str, top_k: Option<usize>) -> Vec<SearchHit> {
        match self.tree_of(node_id) {
            Some(tree) => self.search.find_related_sections(
                &tree,
                node_id,
                top_k.unwrap_or(DEFAULT_RELATED_TOP_K),
            ),
            None => Vec::new(),
        }
    }

    /// Nodes reached by moving from `node_id`.
    pub fn navigate(&self, node_id: &str, direction: Direction) -> Vec<Node> {
        let nav = Navigator::new(&self.store);
        match direction {
            Direction::Parent => nav.parent(node_id).into_iter().collect(),
            Direction::Children => nav.children(node_id),
            Direction::NextSibling => nav.next_sibling(node_id).into_iter().collect(),
            Direction::PreviousSibling => nav.previous_sibling(node_id).into_iter().collect(),
            Direction::NextLeaf => nav.next_leaf(node_id).into_iter().collect(),
            Direction::PreviousLeaf => nav.previous_leaf(node_id).into_iter().collect(),
        }
    }

    /// Tree, summary and embedding statistics for a document.
    pub fn document_stats(&self, document_id: &str) -> Option<DocumentStats> {
        let tree = self.store.get_tree(document_id)?;
        Some(DocumentStats {
            document_id: document_id.to_string(),
            title: tree.title.clone(),
            tree: tree.stats(),
            summaries: summary_stats(&tree),
            embeddings: embedding_stats(&tree),
        })
    }

    pub fn list_documents(&self) -> Vec<DocumentInfo> {
        self.store.list_documents()
    }

    /// Remove a document. Returns whether it existed.
    pub fn delete_document(&self, document_id: &str) -> Result<bool> {
        let deleted = self.store.delete_tree(document_id)?;
        if deleted {
            info!(document_id, "document deleted");
        }
        Ok(deleted)
    }

    fn tree_of(&self, node_id: &str) -> Option<Tree> {
        let node = self.store.get(node_id)?;
        self.store.get_tree(&node.document_id)
    }
}
