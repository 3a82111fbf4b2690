//! Embedding generation for tree nodes.

use crate::node::Node;
use crate::tree::Tree;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Text-to-vector service.
///
/// Returns `None` for empty input or when the provider fails.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Which nodes [`embed_tree`] visits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingScope {
    /// Leaves only.
    #[default]
    Leaves,
    /// Every node, internal ones included.
    AllNodes,
}

/// Embedding coverage of a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub total_nodes: usize,
    pub nodes_with_embeddings: usize,
    pub leaf_nodes: usize,
    pub leaves_with_embeddings: usize,
    pub leaf_completion_rate: f64,
}

/// Embed the summary (or, lacking one, the content) of each node in scope.
/// Nodes with no text are skipped; a failed call leaves the embedding unset.
pub async fn embed_tree<E: Embedder + ?Sized>(
    embedder: &E,
    tree: &mut Tree,
    scope: EmbeddingScope,
) -> EmbeddingStats {
    let targets: Vec<(String, String)> = match scope {
        EmbeddingScope::Leaves => tree.leaves(),
        EmbeddingScope::AllNodes => tree.nodes().iter().collect(),
    }
    .into_iter()
    .map(|n| (n.id.clone(), n.display_text().to_string()))
    .collect();

    for (id, text) in targets {
        if text.trim().is_empty() {
            debug!(node_id = %id, "no text to embed");
            continue;
        }
        let embedding = embedder.embed(&text).await;
        tree.set_embedding(&id, embedding);
    }

    let stats = embedding_stats(tree);
    info!(
        document_id = tree.document_id(),
        embedded = stats.nodes_with_embeddings,
        total = stats.total_nodes,
        "embedded tree"
    );
    stats
}

/// Embedding coverage of a tree.
pub fn embedding_stats(tree: &Tree) -> EmbeddingStats {
    let leaves = tree.leaves();
    let leaf_nodes = leaves.len();
    let leaves_with_embeddings = leaves.iter().filter(|n| has_embedding(n)).count();

    EmbeddingStats {
        total_nodes: tree.len(),
        nodes_with_embeddings: tree.nodes().iter().filter(|n| has_embedding(n)).count(),
        leaf_nodes,
        leaves_with_embeddings,
        leaf_completion_rate: if leaf_nodes > 0 {
            leaves_with_embeddings as f64 / leaf_nodes as f64
        } else {
            0.0
        },
    }
}

fn has_embedding(node: &Node) -> bool {
    node.embedding.as_ref().is_some_and(|e| !e.is_empty())
}
