//! Tree navigation.
//!
//! Read-only traversal over anything that can resolve a node by id: an
//! in-memory [`Tree`] or a [`NodeStore`](crate::store::NodeStore). Unknown
//! ids produce empty results. Every operation runs iteratively under a step
//! budget and tracks visited ids, so corrupt or cyclic data ends the walk
//! instead of looping.

use crate::node::{Node, NodeBrief, NodeKind};
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Default number of node lookups a single operation may perform.
pub const DEFAULT_MAX_STEPS: usize = 100_000;

/// Resolves nodes by id.
pub trait NodeLookup {
    /// The node with this id, if known.
    fn lookup(&self, node_id: &str) -> Option<Node>;
}

impl NodeLookup for Tree {
    fn lookup(&self, node_id: &str) -> Option<Node> {
        self.get(node_id).cloned()
    }
}

impl<L: NodeLookup + ?Sized> NodeLookup for &L {
    fn lookup(&self, node_id: &str) -> Option<Node> {
        (**self).lookup(node_id)
    }
}

/// One entry of a document outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub id: String,
    pub summary: String,
    pub page_range: String,
    pub level: usize,
    pub children: Vec<OutlineEntry>,
}

impl OutlineEntry {
    fn from_node(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            summary: node.summary_text().unwrap_or("Section").to_string(),
            page_range: node.page_range_label(),
            level: node.level,
            children: Vec::new(),
        }
    }

    /// Number of entries in this subtree.
    pub fn entry_count(&self) -> usize {
        1 + self.children.iter().map(OutlineEntry::entry_count).sum::<usize>()
    }

    /// Render as an indented list.
    pub fn format(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self, 0usize)];
        while let Some((entry, indent)) = stack.pop() {
            out.push_str(&format!(
                "{}{} [{}] {}\n",
                "  ".repeat(indent),
                entry.id,
                entry.page_range,
                entry.summary
            ));
            stack.extend(entry.children.iter().rev().map(|c| (c, indent + 1)));
        }
        out
    }
}

/// Everything around a node needed to move from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationContext {
    pub current: NodeBrief,
    pub kind: NodeKind,
    pub parent: Option<NodeBrief>,
    pub children: Vec<NodeBrief>,
    pub next_sibling: Option<NodeBrief>,
    pub previous_sibling: Option<NodeBrief>,
    /// Root first, ending at the current node.
    pub breadcrumb: Vec<NodeBrief>,
}

/// Remaining lookups for one operation.
struct Budget {
    remaining: usize,
    tripped: bool,
}

impl Budget {
    fn new(steps: usize) -> Self {
        Self {
            remaining: steps,
            tripped: false,
        }
    }

    fn take(&mut self) -> bool {
        if self.remaining == 0 {
            if !self.tripped {
                warn!("navigation step budget exhausted");
                self.tripped = true;
            }
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Traversal operations over a [`NodeLookup`].
pub struct Navigator<'a, L: NodeLookup + ?Sized> {
    lookup: &'a L,
    max_steps: usize,
}

impl<'a, L: NodeLookup + ?Sized> Navigator<'a, L> {
    /// Create a navigator with the default step budget.
    pub fn new(lookup: &'a L) -> Self {
        Self {
            lookup,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Override the step budget.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    fn fetch(&self, node_id: &str, budget: &mut Budget) -> Option<Node> {
        if !budget.take() {
            return None;
        }
        self.lookup.lookup(node_id)
    }

    /// Resolve a node.
    pub fn node(&self, node_id: &str) -> Option<Node> {
        self.lookup.lookup(node_id)
    }

    /// Parent of a node; absent for the root.
    pub fn parent(&self, node_id: &str) -> Option<Node> {
        let mut budget = Budget::new(self.max_steps);
        let node = self.fetch(node_id, &mut budget)?;
        self.fetch(node.parent_id.as_deref()?, &mut budget)
    }

    /// Children in stored order; empty for leaves.
    pub fn children(&self, node_id: &str) -> Vec<Node> {
        let mut budget = Budget::new(self.max_steps);
        match self.fetch(node_id, &mut budget) {
            Some(node) => node
                .children_ids
                .iter()
                .filter_map(|id| self.fetch(id, &mut budget))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Following entry in the parent's child list.
    pub fn next_sibling(&self, node_id: &str) -> Option<Node> {
        let mut budget = Budget::new(self.max_steps);
        let node = self.fetch(node_id, &mut budget)?;
        self.sibling_of(&node, 1, &mut budget)
    }

    /// Preceding entry in the parent's child list.
    pub fn previous_sibling(&self, node_id: &str) -> Option<Node> {
        let mut budget = Budget::new(self.max_steps);
        let node = self.fetch(node_id, &mut budget)?;
        self.sibling_of(&node, -1, &mut budget)
    }

    fn sibling_of(&self, node: &Node, offset: isize, budget: &mut Budget) -> Option<Node> {
        let parent = self.fetch(node.parent_id.as_deref()?, budget)?;
        let pos = parent.children_ids.iter().position(|id| *id == node.id)?;
        let target = pos.checked_add_signed(offset)?;
        self.fetch(parent.children_ids.get(target)?, budget)
    }

    /// Root-first path ending at the node. Empty for an unknown id.
    pub fn breadcrumb(&self, node_id: &str) -> Vec<Node> {
        let mut budget = Budget::new(self.max_steps);
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.fetch(node_id, &mut budget);

        while let Some(node) = current {
            if !seen.insert(node.id.clone()) {
                warn!(node_id = %node.id, "cycle in parent chain");
                break;
            }
            current = node
                .parent_id
                .as_deref()
                .and_then(|p| self.fetch(p, &mut budget));
            path.push(node);
        }

        path.reverse();
        path
    }

    /// Descend through first children until a leaf.
    pub fn first_leaf_in_subtree(&self, node: &Node) -> Option<Node> {
        let mut budget = Budget::new(self.max_steps);
        self.descend(node.clone(), true, &mut budget)
    }

    /// Descend through last children until a leaf.
    pub fn last_leaf_in_subtree(&self, node: &Node) -> Option<Node> {
        let mut budget = Budget::new(self.max_steps);
        self.descend(node.clone(), false, &mut budget)
    }

    fn descend(&self, mut node: Node, first: bool, budget: &mut Budget) -> Option<Node> {
        loop {
            let next = if first {
                node.children_ids.first()
            } else {
                node.children_ids.last()
            };
            match next {
                None => return Some(node),
                Some(id) => node = self.fetch(id, budget)?,
            }
        }
    }

    /// Next leaf in document order, absent after the last leaf.
    ///
    /// An internal node's next leaf is the first leaf of its subtree.
    pub fn next_leaf(&self, node_id: &str) -> Option<Node> {
        let mut budget = Budget::new(self.max_steps);
        let node = self.fetch(node_id, &mut budget)?;

        if let Some(first) = node.children_ids.first() {
            let child = self.fetch(first, &mut budget)?;
            return self.descend(child, true, &mut budget);
        }

        self.leaf_beyond(node, 1, &mut budget)
    }

    /// Previous leaf in document order, absent before the first leaf.
    ///
    /// For an internal node this is the leaf just before its subtree.
    pub fn previous_leaf(&self, node_id: &str) -> Option<Node> {
        let mut budget = Budget::new(self.max_steps);
        let node = self.fetch(node_id, &mut budget)?;
        self.leaf_beyond(node, -1, &mut budget)
    }

    /// Climb from `node` to the first ancestor-or-self with a sibling in
    /// direction `offset` and descend into that sibling.
    fn leaf_beyond(&self, node: Node, offset: isize, budget: &mut Budget) -> Option<Node> {
        let mut seen = HashSet::new();
        let mut current = node;

        loop {
            if !seen.insert(current.id.clone()) {
                warn!(node_id = %current.id, "cycle in parent chain");
                return None;
            }
            if let Some(sibling) = self.sibling_of(&current, offset, budget) {
                return self.descend(sibling, offset > 0, budget);
            }
            current = self.fetch(current.parent_id.as_deref()?, budget)?;
        }
    }

    /// Outline of the subtree rooted at `root_id`, children in stored order.
    pub fn outline(&self, root_id: &str) -> Option<OutlineEntry> {
        let mut budget = Budget::new(self.max_steps);
        let root = self.fetch(root_id, &mut budget)?;

        // Pre-order listing with each entry's parent position.
        let mut order: Vec<(Option<OutlineEntry>, Option<usize>)> = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(root, None)];

        while let Some((node, parent)) = stack.pop() {
            if !seen.insert(node.id.clone()) {
                warn!(node_id = %node.id, "node reached twice while building outline");
                continue;
            }
            let position = order.len();
            order.push((Some(OutlineEntry::from_node(&node)), parent));

            let children: Vec<Node> = node
                .children_ids
                .iter()
                .filter_map(|id| self.fetch(id, &mut budget))
                .collect();
            stack.extend(children.into_iter().rev().map(|c| (c, Some(position))));
        }

        // Descendants follow their ancestors, so walking backwards completes
        // every entry before it is attached to its parent.
        for i in (1..order.len()).rev() {
            let (entry, parent) = &mut order[i];
            let (Some(mut entry), Some(parent)) = (entry.take(), *parent) else {
                continue;
            };
            entry.children.reverse();
            if let Some(parent_entry) = order[parent].0.as_mut() {
                parent_entry.children.push(entry);
            }
        }

        let mut root_entry = order.into_iter().next()?.0?;
        root_entry.children.reverse();
        Some(root_entry)
    }

    /// Navigation context for a node.
    pub fn context(&self, node_id: &str) -> Option<NavigationContext> {
        let node = self.node(node_id)?;

        Some(NavigationContext {
            current: node.brief(),
            kind: node.kind,
            parent: self.parent(node_id).map(|n| n.brief()),
            children: self.children(node_id).iter().map(Node::brief).collect(),
            next_sibling: self.next_sibling(node_id).map(|n| n.brief()),
            previous_sibling: self.previous_sibling(node_id).map(|n| n.brief()),
            breadcrumb: self.breadcrumb(node_id).iter().map(Node::brief).collect(),
        })
    }
}

/// Outline of a whole tree, absent for an empty tree.
pub fn outline(tree: &Tree) -> Option<OutlineEntry> {
    Navigator::new(tree).outline(tree.root_id()?)
}
