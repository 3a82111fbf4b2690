//! Semantic search over document trees.
//!
//! Queries arrive as vectors; turning query text into a vector is the
//! embedder's job. Results carry a short preview and can be expanded with
//! the surrounding structure of the hit.

use crate::node::{Node, NodeBrief};
use crate::similarity::{self, Ranked};
use crate::store::NodeStore;
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::debug;

/// Default preview length in characters.
pub const DEFAULT_PREVIEW_LENGTH: usize = 200;

/// Minimum similarity for a section to count as related.
pub const RELATED_THRESHOLD: f32 = 0.5;

/// Fraction of the preview window in which a word break is preferred.
const WORD_BREAK_RATIO: f64 = 0.8;

/// A single search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub node: Node,
    pub similarity: f32,
    pub page_range: String,
    pub preview: String,
}

/// Structure surrounding a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeContext {
    pub current: NodeBrief,
    pub parent: Option<NodeBrief>,
    pub children: Vec<NodeBrief>,
    pub siblings: Vec<NodeBrief>,
    /// The node first, then its ancestors up to the root.
    pub path_to_root: Vec<NodeBrief>,
}

/// Ranks nodes against query vectors and shapes the results.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    preview_length: usize,
    related_threshold: f32,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_LENGTH)
    }
}

impl SearchEngine {
    pub fn new(preview_length: usize) -> Self {
        Self {
            preview_length,
            related_threshold: RELATED_THRESHOLD,
        }
    }

    pub fn with_related_threshold(mut self, threshold: f32) -> Self {
        self.related_threshold = threshold;
        self
    }

    /// Search every stored document, or only `document_id` when given.
    ///
    /// Documents are visited in listing order and nodes in construction
    /// order, which fixes the order of equal scores.
    pub fn search<S: NodeStore + ?Sized>(
        &self,
        query: &[f32],
        store: &S,
        document_id: Option<&str>,
        top_k: usize,
        threshold: f32,
    ) -> Vec<SearchHit> {
        let trees: Vec<Tree> = match document_id {
            Some(id) => store.get_tree(id).into_iter().collect(),
            None => store
                .list_documents()
                .iter()
                .filter_map(|doc| store.get_tree(&doc.document_id))
                .collect(),
        };
        debug!(documents = trees.len(), top_k, threshold, "searching store");

        let ranked = similarity::rank(
            query,
            trees.iter().flat_map(|t| t.nodes()),
            threshold,
            top_k,
        );
        self.hits(ranked)
    }

    /// Search the nodes of one in-memory tree.
    pub fn search_in_tree(
        &self,
        query: &[f32],
        tree: &Tree,
        top_k: usize,
        threshold: f32,
    ) -> Vec<SearchHit> {
        let ranked = similarity::rank(query, tree.nodes(), threshold, top_k);
        self.hits(ranked)
    }

    /// Sections whose embeddings are close to the given node's, excluding
    /// the node itself. A node without an embedding has no related sections.
    pub fn find_related_sections(&self, tree: &Tree, node_id: &str, top_k: usize) -> Vec<SearchHit> {
        let Some(embedding) = tree.get(node_id).and_then(|n| n.embedding.as_deref()) else {
            return Vec::new();
        };

        let ranked = similarity::rank(
            embedding,
            tree.nodes().iter().filter(|n| n.id != node_id),
            self.related_threshold,
            top_k,
        );
        self.hits(ranked)
    }

    /// Parent, children, siblings and path to root for a node.
    pub fn context_for_node(&self, tree: &Tree, node_id: &str) -> Option<NodeContext> {
        let node = tree.get(node_id)?;
        let briefs = |nodes: Vec<&Node>| -> Vec<NodeBrief> {
            nodes.into_iter().map(Node::brief).collect()
        };

        Some(NodeContext {
            current: node.brief(),
            parent: tree.parent(node_id).map(Node::brief),
            children: briefs(tree.children(node_id)),
            siblings: briefs(tree.siblings(node_id)),
            path_to_root: briefs(tree.path_to_root(node_id)),
        })
    }

    /// Preview of a node at this engine's length.
    pub fn preview(&self, node: &Node) -> String {
        generate_preview(node, self.preview_length)
    }

    fn hits(&self, ranked: Vec<Ranked<'_>>) -> Vec<SearchHit> {
        ranked
            .into_iter()
            .map(|r| SearchHit {
                node: r.node.clone(),
                similarity: r.similarity,
                page_range: r.node.page_range_label(),
                preview: self.preview(r.node),
            })
            .collect()
    }
}

/// Summary (or content) truncated to `max_length` characters.
///
/// When the last whitespace in the window falls within its final 20%, the
/// cut happens there; otherwise the text is cut at exactly `max_length`.
/// Truncated previews end with `...`.
pub fn generate_preview(node: &Node, max_length: usize) -> String {
    let text = node.display_text();
    let Some((cut, _)) = text.char_indices().nth(max_length) else {
        return text.to_string();
    };
    let window = &text[..cut];

    let word_break = window
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(byte, _)| byte)
        .filter(|&byte| window[..byte].chars().count() as f64 > max_length as f64 * WORD_BREAK_RATIO);

    match word_break {
        Some(byte) => format!("{}...", &window[..byte]),
        None => format!("{}...", window),
    }
}

/// Numbered report of search hits.
pub fn explain_results(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results found for query: '{}'", query);
    }

    let mut out = format!("Found {} results for query: '{}'\n\n", hits.len(), query);
    for (i, hit) in hits.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} (similarity: {:.3})",
            i + 1,
            hit.page_range,
            hit.similarity
        );
        let _ = writeln!(out, "   Preview: {}\n", hit.preview);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::tree::tests::sample_tree;

    fn embedded_tree() -> Tree {
        let mut tree = sample_tree();
        tree.set_embedding("a1", Some(vec![1.0, 0.0, 0.0]));
        tree.set_embedding("a2", Some(vec![0.9, 0.1, 0.0]));
        tree.set_embedding("b1", Some(vec![0.0, 1.0, 0.0]));
        tree.set_embedding("b", Some(vec![0.0, 0.0, 1.0]));
        tree
    }

    #[test]
    fn test_preview_short_text_unchanged() {
        let node = Node::new("n", "doc", "short text");
        assert_eq!(generate_preview(&node, 200), "short text");
    }

    #[test]
    fn test_preview_prefers_late_word_break() {
        // Last space at index 9 of a 10-char window: 9 > 8.
        let node = Node::new("n", "doc", "aaaa bbbb cccc");
        assert_eq!(generate_preview(&node, 10), "aaaa bbbb...");
    }

    #[test]
    fn test_preview_hard_cut_when_break_is_early() {
        // Last space at index 4 of a 10-char window: too early.
        let node = Node::new("n", "doc", "aaaa bbbbbbbbbbbb");
        assert_eq!(generate_preview(&node, 10), "aaaa bbbbb...");
    }

    #[test]
    fn test_preview_uses_summary_and_counts_chars() {
        let mut node = Node::new("n", "doc", "raw content");
        node.summary = Some("ééééééééééé".to_string());
        assert_eq!(generate_preview(&node, 5), "ééééé...");
    }

    #[test]
    fn test_search_in_tree() {
        let tree = embedded_tree();
        let engine = SearchEngine::default();

        let hits = engine.search_in_tree(&[1.0, 0.0, 0.0], &tree, 5, 0.7);
        let ids: Vec<&str> = hits.iter().map(|h| h.node.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert_eq!(hits[0].page_range, "Pages 1-10");
        assert_eq!(hits[0].preview, "first");
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);

        assert!(engine.search_in_tree(&[0.0, 0.0, 0.0], &tree, 5, 0.7).is_empty());
    }

    #[test]
    fn test_search_across_store() {
        let store = MemoryStore::new();
        store.put_tree(&embedded_tree()).unwrap();
        let engine = SearchEngine::default();

        let hits = engine.search(&[0.0, 1.0, 0.0], &store, None, 5, 0.7);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.id, "b1");

        let scoped = engine.search(&[0.0, 1.0, 0.0], &store, Some("doc"), 5, 0.7);
        assert_eq!(scoped, hits);
        assert!(engine.search(&[0.0, 1.0, 0.0], &store, Some("other"), 5, 0.7).is_empty());
    }

    #[test]
    fn test_related_sections_exclude_self() {
        let tree = embedded_tree();
        let engine = SearchEngine::default();

        let related = engine.find_related_sections(&tree, "a1", 3);
        let ids: Vec<&str> = related.iter().map(|h| h.node.id.as_str()).collect();
        assert_eq!(ids, vec!["a2"]);

        assert!(engine.find_related_sections(&tree, "root", 3).is_empty());
        assert!(engine.find_related_sections(&tree, "missing", 3).is_empty());
    }

    #[test]
    fn test_context_for_node() {
        let tree = sample_tree();
        let engine = SearchEngine::default();

        let context = engine.context_for_node(&tree, "a1").unwrap();
        assert_eq!(context.current.id, "a1");
        assert_eq!(context.parent.unwrap().id, "a");
        assert!(context.children.is_empty());
        assert_eq!(context.siblings.len(), 1);
        assert_eq!(context.siblings[0].id, "a2");
        let path: Vec<&str> = context.path_to_root.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(path, vec!["a1", "a", "root"]);

        assert!(engine.context_for_node(&tree, "missing").is_none());
    }

    #[test]
    fn test_explain_results() {
        assert_eq!(
            explain_results("nothing", &[]),
            "No results found for query: 'nothing'"
        );

        let tree = embedded_tree();
        let hits = SearchEngine::default().search_in_tree(&[1.0, 0.0, 0.0], &tree, 1, 0.7);
        let report = explain_results("intro", &hits);
        assert!(report.starts_with("Found 1 results for query: 'intro'"));
        assert!(report.contains("1. Pages 1-10 (similarity: 1.000)"));
        assert!(report.contains("   Preview: first"));
    }
}
