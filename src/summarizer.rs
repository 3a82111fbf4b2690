//! Bottom-up summarization of a built tree.
//!
//! Leaves are summarized from their text, parents from the summaries of
//! their children, deepest level first so children are always done before
//! their parent.

use crate::tree::Tree;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Summary given to an internal node whose children cannot be found.
pub const NO_CONTENT_SUMMARY: &str = "No content available";

/// Prefix of the placeholder a summarizer returns when its provider fails.
pub const SUMMARY_UNAVAILABLE: &str = "Summary unavailable";

/// Text-to-text service.
///
/// Implementations do not fail: a provider error becomes a placeholder
/// string, which is stored like any other summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize raw text. `context` describes where the text sits.
    async fn summarize(&self, content: &str, context: &str) -> String;

    /// Merge child summaries into one, for the given page range label.
    async fn synthesize(&self, child_summaries: &[String], page_range: &str) -> String;
}

/// How many nodes carry a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_nodes: usize,
    pub nodes_with_summaries: usize,
    pub completion_rate: f64,
}

/// Context line passed along with a leaf's text.
pub fn leaf_context(page_range: &str) -> String {
    format!("This is part of a document (pages {})", page_range)
}

/// Fill in the summary of every node, deepest level first.
pub async fn summarize_tree<S: Summarizer + ?Sized>(summarizer: &S, tree: &mut Tree) -> SummaryStats {
    for (level, ids) in tree.ids_by_level().into_iter().rev() {
        debug!(level, nodes = ids.len(), "summarizing level");
        for id in ids {
            let Some(node) = tree.get(&id) else {
                continue;
            };
            let page_range = node.page_range_label();

            let summary = if node.is_leaf() {
                let content = node.content.clone();
                summarizer.summarize(&content, &leaf_context(&page_range)).await
            } else {
                let children = tree.children(&id);
                if children.is_empty() {
                    NO_CONTENT_SUMMARY.to_string()
                } else {
                    let child_summaries: Vec<String> = children
                        .iter()
                        .filter_map(|c| c.summary_text())
                        .map(str::to_string)
                        .collect();
                    summarizer.synthesize(&child_summaries, &page_range).await
                }
            };

            tree.set_summary(&id, (!summary.is_empty()).then_some(summary));
        }
    }

    let stats = summary_stats(tree);
    info!(
        document_id = tree.document_id(),
        summarized = stats.nodes_with_summaries,
        total = stats.total_nodes,
        "summarized tree"
    );
    stats
}

/// Summary coverage of a tree.
pub fn summary_stats(tree: &Tree) -> SummaryStats {
    let total_nodes = tree.len();
    let nodes_with_summaries = tree
        .nodes()
        .iter()
        .filter(|n| n.summary_text().is_some())
        .count();

    SummaryStats {
        total_nodes,
        nodes_with_summaries,
        completion_rate: if total_nodes > 0 {
            nodes_with_summaries as f64 / total_nodes as f64
        } else {
            0.0
        },
    }
}
