//! Tree nodes.
//!
//! A node is a unit of document content at some level of abstraction:
//! leaves hold chunk text, branches and the root hold only the summary
//! produced for their children.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form node metadata.
pub type Metadata = BTreeMap<String, MetaValue>;

/// Metadata key marking a wrapper root created over several top-level nodes.
pub const IS_SYNTHETIC_ROOT: &str = "is_synthetic_root";

/// Role of a node in its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Branch,
    Leaf,
}

impl NodeKind {
    /// Lowercase name, as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Branch => "branch",
            NodeKind::Leaf => "leaf",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    /// Integer value, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetaValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean value, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<usize> for MetaValue {
    fn from(v: usize) -> Self {
        MetaValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

/// A node in a document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Node {
    /// Unique, opaque identifier.
    pub id: String,

    /// Raw chunk text. Empty for branches and synthetic roots.
    #[serde(default)]
    pub content: String,

    /// Generated summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Vector embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Role in the tree.
    pub kind: NodeKind,

    /// Parent node, absent for the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Children in document order.
    #[serde(default)]
    pub children_ids: Vec<String>,

    /// Owning document.
    pub document_id: String,

    /// Depth, root = 0.
    pub level: usize,

    /// First page covered (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_start: Option<usize>,

    /// Last page covered (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_end: Option<usize>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl Node {
    /// Create a leaf node.
    pub fn new(
        id: impl Into<String>,
        document_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            summary: None,
            embedding: None,
            kind: NodeKind::Leaf,
            parent_id: None,
            children_ids: Vec::new(),
            document_id: document_id.into(),
            level: 0,
            page_start: None,
            page_end: None,
            metadata: Metadata::new(),
        }
    }

    /// Set the page range.
    pub fn with_pages(mut self, page_start: Option<usize>, page_end: Option<usize>) -> Self {
        self.page_start = page_start;
        self.page_end = page_end;
        self
    }

    /// Set the level.
    pub fn with_level(mut self, level: usize) -> Self {
        self.level = level;
        self
    }

    /// Set the kind.
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Insert a metadata entry.
    pub fn with_meta(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Adopt `child`: records its id, points it back here and places it one
    /// level below. A leaf becomes a branch on its first child. Adopting the
    /// same child twice is a no-op.
    pub fn add_child(&mut self, child: &mut Node) {
        if self.children_ids.iter().any(|id| id == &child.id) {
            return;
        }
        self.children_ids.push(child.id.clone());
        child.parent_id = Some(self.id.clone());
        child.level = self.level + 1;

        if self.kind == NodeKind::Leaf {
            self.kind = NodeKind::Branch;
        }
    }

    /// Whether the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children_ids.is_empty()
    }

    /// Whether the node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Whether this is a wrapper root created over several top-level nodes.
    pub fn is_synthetic_root(&self) -> bool {
        self.metadata
            .get(IS_SYNTHETIC_ROOT)
            .and_then(MetaValue::as_bool)
            .unwrap_or(false)
    }

    /// Summary, if one was generated and is not empty.
    pub fn summary_text(&self) -> Option<&str> {
        self.summary.as_deref().filter(|s| !s.is_empty())
    }

    /// Summary if present, otherwise raw content.
    pub fn display_text(&self) -> &str {
        self.summary_text().unwrap_or(&self.content)
    }

    /// Number of pages covered, from metadata or the page range.
    pub fn page_count(&self) -> usize {
        if let Some(count) = self.metadata.get("page_count").and_then(MetaValue::as_int) {
            return usize::try_from(count).unwrap_or(0);
        }
        match (self.page_start, self.page_end) {
            (Some(start), Some(end)) if end >= start => end - start + 1,
            (Some(_), _) => 1,
            _ => 0,
        }
    }

    /// Human-readable page range.
    pub fn page_range_label(&self) -> String {
        match (self.page_start, self.page_end) {
            (None, _) => "N/A".to_string(),
            (Some(start), None) => format!("Page {}", start),
            (Some(start), Some(end)) if start == end => format!("Page {}", start),
            (Some(start), Some(end)) => format!("Pages {}-{}", start, end),
        }
    }

    /// Reduced view used in navigation and search context.
    pub fn brief(&self) -> NodeBrief {
        NodeBrief {
            id: self.id.clone(),
            summary: self.summary.clone(),
            page_range: self.page_range_label(),
            page_start: self.page_start,
            page_end: self.page_end,
            level: self.level,
        }
    }
}

/// Identifier, summary, page range and level of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeBrief {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub page_range: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_end: Option<usize>,
    pub level: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_child_links_both_ways() {
        let mut parent = Node::new("p", "doc", "").with_level(1);
        let mut child = Node::new("c", "doc", "text");

        parent.add_child(&mut child);

        assert_eq!(parent.children_ids, vec!["c".to_string()]);
        assert_eq!(child.parent_id.as_deref(), Some("p"));
        assert_eq!(child.level, 2);
        assert_eq!(parent.kind, NodeKind::Branch);
        assert!(!parent.is_leaf());
        assert!(child.is_leaf());
    }

    #[test]
    fn test_add_child_twice_is_noop() {
        let mut parent = Node::new("p", "doc", "");
        let mut child = Node::new("c", "doc", "");

        parent.add_child(&mut child);
        parent.add_child(&mut child);

        assert_eq!(parent.children_ids.len(), 1);
    }

    #[test]
    fn test_add_child_keeps_root_kind() {
        let mut root = Node::new("r", "doc", "").with_kind(NodeKind::Root);
        let mut child = Node::new("c", "doc", "");
        root.add_child(&mut child);
        assert_eq!(root.kind, NodeKind::Root);
    }

    #[test]
    fn test_page_range_label() {
        let node = Node::new("n", "doc", "");
        assert_eq!(node.page_range_label(), "N/A");
        assert_eq!(node.clone().with_pages(Some(3), None).page_range_label(), "Page 3");
        assert_eq!(node.clone().with_pages(Some(3), Some(3)).page_range_label(), "Page 3");
        assert_eq!(node.with_pages(Some(1), Some(10)).page_range_label(), "Pages 1-10");
    }

    #[test]
    fn test_display_text_prefers_summary() {
        let mut node = Node::new("n", "doc", "raw content");
        assert_eq!(node.display_text(), "raw content");

        node.summary = Some(String::new());
        assert_eq!(node.display_text(), "raw content");

        node.summary = Some("short summary".to_string());
        assert_eq!(node.display_text(), "short summary");
    }

    #[test]
    fn test_synthetic_root_flag() {
        let node = Node::new("r", "doc", "");
        assert!(!node.is_synthetic_root());
        assert!(node.with_meta(IS_SYNTHETIC_ROOT, true).is_synthetic_root());
    }

    #[test]
    fn test_page_count() {
        let node = Node::new("n", "doc", "").with_pages(Some(4), Some(9));
        assert_eq!(node.page_count(), 6);
        assert_eq!(node.with_meta("page_count", 2usize).page_count(), 2);
    }

    #[test]
    fn test_json_shape() {
        let node = Node::new("n", "doc", "text")
            .with_pages(Some(1), Some(2))
            .with_meta("char_count", 4usize)
            .with_meta("ratio", 0.5);
        let json = serde_json::to_value(&node).unwrap();

        assert_eq!(json["kind"], "leaf");
        assert_eq!(json["metadata"]["char_count"], 4);
        assert!(json.get("summary").is_none());

        let parsed: Node = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, node);
    }
}
