//! Document trees.
//!
//! A [`Tree`] owns every node of one document. Nodes are kept in
//! construction order (leaves first, then each level of parents) with an
//! id index on the side. Trees coming from outside the builder go through
//! [`Tree::assemble`], which rejects broken parent/child links.

use crate::error::{Result, VelociraptorError};
use crate::node::{Node, NodeKind};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Serialized form of a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TreeRecord {
    pub document_id: String,
    #[serde(default)]
    pub document_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_node_id: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// Counts describing a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub document_id: String,
    pub document_title: String,
    pub total_nodes: usize,
    pub leaf_nodes: usize,
    pub max_depth: usize,
}

/// All nodes of one document.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    document_id: String,
    /// Document title.
    pub title: String,
    root_id: Option<String>,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl Tree {
    /// A tree with no nodes and no root.
    pub fn empty(document_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Build from parts the caller guarantees to be consistent.
    pub(crate) fn from_parts(
        document_id: String,
        title: String,
        root_id: Option<String>,
        nodes: Vec<Node>,
    ) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        Self {
            document_id,
            title,
            root_id,
            nodes,
            index,
        }
    }

    /// Assemble a tree from a record, rejecting structural violations.
    pub fn assemble(record: TreeRecord) -> Result<Self> {
        let mut index = HashMap::with_capacity(record.nodes.len());
        for (i, node) in record.nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(VelociraptorError::structural(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }

        let tree = Self {
            document_id: record.document_id,
            title: record.document_title,
            root_id: record.root_node_id,
            nodes: record.nodes,
            index,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Check every structural invariant.
    pub fn validate(&self) -> Result<()> {
        let root_id = match (&self.root_id, self.nodes.is_empty()) {
            (None, true) => return Ok(()),
            (Some(id), true) => {
                return Err(VelociraptorError::structural(format!(
                    "root '{}' declared for a tree without nodes",
                    id
                )));
            }
            (None, false) => {
                return Err(VelociraptorError::structural(
                    "tree has nodes but no root",
                ));
            }
            (Some(id), false) => id,
        };

        let root = self.get(root_id).ok_or_else(|| {
            VelociraptorError::structural(format!("root '{}' is not in the tree", root_id))
        })?;
        if root.parent_id.is_some() {
            return Err(VelociraptorError::structural(format!(
                "root '{}' has a parent",
                root_id
            )));
        }
        if root.level != 0 || root.kind != NodeKind::Root {
            return Err(VelociraptorError::structural(format!(
                "root '{}' must be kind root at level 0",
                root_id
            )));
        }

        for node in &self.nodes {
            self.validate_node(node, root_id)?;
        }

        // Every node must hang off the root exactly once.
        let mut visited = HashSet::with_capacity(self.nodes.len());
        let mut stack = vec![root_id.as_str()];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                return Err(VelociraptorError::structural(format!(
                    "node '{}' reached twice from the root",
                    id
                )));
            }
            if let Some(node) = self.get(id) {
                stack.extend(node.children_ids.iter().map(String::as_str));
            }
        }
        if visited.len() != self.nodes.len() {
            return Err(VelociraptorError::structural(format!(
                "{} node(s) are not reachable from the root",
                self.nodes.len() - visited.len()
            )));
        }

        Ok(())
    }

    fn validate_node(&self, node: &Node, root_id: &str) -> Result<()> {
        if node.document_id != self.document_id {
            return Err(VelociraptorError::structural(format!(
                "node '{}' belongs to document '{}', not '{}'",
                node.id, node.document_id, self.document_id
            )));
        }

        if let (Some(start), Some(end)) = (node.page_start, node.page_end) {
            if start > end {
                return Err(VelociraptorError::structural(format!(
                    "node '{}' has page_start {} after page_end {}",
                    node.id, start, end
                )));
            }
        }

        match &node.parent_id {
            None if node.id != root_id => {
                return Err(VelociraptorError::structural(format!(
                    "node '{}' has no parent but is not the root",
                    node.id
                )));
            }
            None => {}
            Some(parent_id) => {
                let parent = self.get(parent_id).ok_or_else(|| {
                    VelociraptorError::structural(format!(
                        "node '{}' references missing parent '{}'",
                        node.id, parent_id
                    ))
                })?;
                let listed = parent
                    .children_ids
                    .iter()
                    .filter(|id| **id == node.id)
                    .count();
                if listed != 1 {
                    return Err(VelociraptorError::structural(format!(
                        "parent '{}' lists node '{}' {} time(s)",
                        parent_id, node.id, listed
                    )));
                }
                if node.level != parent.level + 1 {
                    return Err(VelociraptorError::structural(format!(
                        "node '{}' is at level {} under a parent at level {}",
                        node.id, node.level, parent.level
                    )));
                }
                if node.kind == NodeKind::Root {
                    return Err(VelociraptorError::structural(format!(
                        "node '{}' is kind root but has a parent",
                        node.id
                    )));
                }
                if (node.kind == NodeKind::Leaf) != node.children_ids.is_empty() {
                    return Err(VelociraptorError::structural(format!(
                        "node '{}' is kind {} with {} children",
                        node.id,
                        node.kind,
                        node.children_ids.len()
                    )));
                }
            }
        }

        let mut seen = HashSet::with_capacity(node.children_ids.len());
        for child_id in &node.children_ids {
            if !seen.insert(child_id) {
                return Err(VelociraptorError::structural(format!(
                    "node '{}' lists child '{}' more than once",
                    node.id, child_id
                )));
            }
            let child = self.get(child_id).ok_or_else(|| {
                VelociraptorError::structural(format!(
                    "node '{}' references missing child '{}'",
                    node.id, child_id
                ))
            })?;
            if child.parent_id.as_deref() != Some(node.id.as_str()) {
                return Err(VelociraptorError::structural(format!(
                    "child '{}' does not point back to '{}'",
                    child_id, node.id
                )));
            }
        }

        Ok(())
    }

    /// Serializable form, nodes in construction order.
    pub fn to_record(&self) -> TreeRecord {
        TreeRecord {
            document_id: self.document_id.clone(),
            document_title: self.title.clone(),
            root_node_id: self.root_id.clone(),
            nodes: self.nodes.clone(),
        }
    }

    /// Owning document id.
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Root node id, absent for an empty tree.
    pub fn root_id(&self) -> Option<&str> {
        self.root_id.as_deref()
    }

    /// Root node.
    pub fn root(&self) -> Option<&Node> {
        self.root_id.as_deref().and_then(|id| self.get(id))
    }

    /// Look up a node by id.
    pub fn get(&self, node_id: &str) -> Option<&Node> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    pub(crate) fn get_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        self.index.get(node_id).map(|&i| &mut self.nodes[i])
    }

    /// Whether the tree holds `node_id`.
    pub fn contains(&self, node_id: &str) -> bool {
        self.index.contains_key(node_id)
    }

    /// Nodes in construction order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Set a node's summary. Returns false for an unknown id.
    pub fn set_summary(&mut self, node_id: &str, summary: Option<String>) -> bool {
        match self.get_mut(node_id) {
            Some(node) => {
                node.summary = summary;
                true
            }
            None => false,
        }
    }

    /// Set a node's embedding. Returns false for an unknown id.
    pub fn set_embedding(&mut self, node_id: &str, embedding: Option<Vec<f32>>) -> bool {
        match self.get_mut(node_id) {
            Some(node) => {
                node.embedding = embedding;
                true
            }
            None => false,
        }
    }

    /// Replace a node with an updated copy and re-check the tree.
    /// The previous version is restored if the update breaks an invariant.
    pub fn replace_node(&mut self, node: Node) -> Result<()> {
        let Some(&i) = self.index.get(&node.id) else {
            return Err(VelociraptorError::NotFound(format!(
                "node '{}' in document '{}'",
                node.id, self.document_id
            )));
        };
        let previous = std::mem::replace(&mut self.nodes[i], node);
        if let Err(e) = self.validate() {
            self.nodes[i] = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Children in stored order. Unknown ids yield nothing.
    pub fn children(&self, node_id: &str) -> Vec<&Node> {
        self.get(node_id)
            .map(|n| n.children_ids.iter().filter_map(|c| self.get(c)).collect())
            .unwrap_or_default()
    }

    /// Parent of a node.
    pub fn parent(&self, node_id: &str) -> Option<&Node> {
        self.get(node_id)
            .and_then(|n| n.parent_id.as_deref())
            .and_then(|p| self.get(p))
    }

    /// Other children of the node's parent, in stored order.
    pub fn siblings(&self, node_id: &str) -> Vec<&Node> {
        self.parent(node_id)
            .map(|p| {
                p.children_ids
                    .iter()
                    .filter(|id| *id != node_id)
                    .filter_map(|id| self.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The node followed by its ancestors up to the root.
    pub fn path_to_root(&self, node_id: &str) -> Vec<&Node> {
        let mut path = Vec::new();
        let mut current = self.get(node_id);

        while let Some(node) = current {
            // A valid tree never needs more steps than it has nodes.
            if path.len() > self.nodes.len() {
                break;
            }
            path.push(node);
            current = node.parent_id.as_deref().and_then(|p| self.get(p));
        }

        path
    }

    /// Nodes without children, in document order.
    pub fn leaves(&self) -> Vec<&Node> {
        let mut leaves = Vec::new();
        let Some(root) = self.root() else {
            return leaves;
        };

        let mut visited = HashSet::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !visited.insert(node.id.as_str()) {
                continue;
            }
            if node.is_leaf() {
                leaves.push(node);
            } else {
                stack.extend(node.children_ids.iter().rev().filter_map(|c| self.get(c)));
            }
        }

        leaves
    }

    /// Node ids grouped by level.
    pub fn ids_by_level(&self) -> BTreeMap<usize, Vec<String>> {
        let mut levels: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for node in &self.nodes {
            levels.entry(node.level).or_default().push(node.id.clone());
        }
        levels
    }

    /// Deepest level in the tree.
    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.level).max().unwrap_or(0)
    }

    /// Tree statistics.
    pub fn stats(&self) -> TreeStats {
        TreeStats {
            document_id: self.document_id.clone(),
            document_title: self.title.clone(),
            total_nodes: self.nodes.len(),
            leaf_nodes: self.nodes.iter().filter(|n| n.is_leaf()).count(),
            max_depth: self.max_depth(),
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_record())
    }

    /// Parse and validate from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let record: TreeRecord = serde_json::from_str(json)
            .map_err(|e| VelociraptorError::Serialization(e.to_string()))?;
        Self::assemble(record)
    }
}
