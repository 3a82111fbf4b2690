//! Bottom-up tree construction.
//!
//! Chunks become leaves in order. Each round groups the current top level
//! into contiguous runs of `clamp(n / 3, 2, 5)` nodes and puts a parent over
//! every run, until one node is left. That node becomes the root; if grouping
//! was cut short by `max_levels` a synthetic root wraps whatever remains.

use crate::chunker::{Chunk, Chunker};
use crate::document::Page;
use crate::node::{IS_SYNTHETIC_ROOT, MetaValue, Node, NodeKind};
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};
use uuid::Uuid;

/// Smallest group a parent is created for (except a trailing remainder).
pub const MIN_GROUP_SIZE: usize = 2;
/// Largest group a parent is created for.
pub const MAX_GROUP_SIZE: usize = 5;

/// Group size used for a level with `n` nodes.
pub fn group_size(n: usize) -> usize {
    (n / 3).clamp(MIN_GROUP_SIZE, MAX_GROUP_SIZE)
}

/// Generate a fresh random document id.
pub fn new_document_id() -> String {
    Uuid::new_v4().to_string()
}

/// How node identifiers are generated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "strategy")]
pub enum IdStrategy {
    /// Random v4 UUIDs.
    #[default]
    Random,
    /// `{prefix}{n}` with a counter that restarts on every build.
    Sequential { prefix: String },
}

struct IdSource<'a> {
    strategy: &'a IdStrategy,
    next: usize,
}

impl IdSource<'_> {
    fn next_id(&mut self) -> String {
        match self.strategy {
            IdStrategy::Random => Uuid::new_v4().to_string(),
            IdStrategy::Sequential { prefix } => {
                self.next += 1;
                format!("{}{}", prefix, self.next)
            }
        }
    }
}

/// Options for tree construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderOptions {
    /// Maximum number of grouping rounds. `None` groups until one node is left.
    pub max_levels: Option<usize>,
    /// Identifier generation.
    pub ids: IdStrategy,
}

/// Builds trees from chunks.
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    options: BuilderOptions,
}

impl TreeBuilder {
    /// Create a builder.
    pub fn new(options: BuilderOptions) -> Self {
        Self { options }
    }

    /// Builder producing `{prefix}{n}` ids.
    pub fn sequential(prefix: impl Into<String>) -> Self {
        Self::new(BuilderOptions {
            ids: IdStrategy::Sequential {
                prefix: prefix.into(),
            },
            ..Default::default()
        })
    }

    /// Chunk `pages` and build the tree.
    pub fn build_from_pages(
        &self,
        chunker: &Chunker,
        pages: &[Page],
        document_id: &str,
        title: &str,
    ) -> Tree {
        let chunks = chunker.split(pages);
        debug!(pages = pages.len(), chunks = chunks.len(), "split pages");
        self.build(&chunks, document_id, title)
    }

    /// Build a tree whose leaves match `chunks` one to one.
    pub fn build(&self, chunks: &[Chunk], document_id: &str, title: &str) -> Tree {
        if chunks.is_empty() {
            return Tree::empty(document_id, title);
        }

        let mut ids = IdSource {
            strategy: &self.options.ids,
            next: 0,
        };
        let mut arena: Vec<Node> = Vec::with_capacity(chunks.len() * 2);

        for chunk in chunks {
            let leaf = Node::new(ids.next_id(), document_id, chunk.text.clone())
                .with_level(1)
                .with_pages(Some(chunk.page_start), Some(chunk.page_end))
                .with_meta("char_count", chunk.char_count())
                .with_meta("page_count", chunk.page_count);
            arena.push(leaf);
        }

        let mut current: Vec<usize> = (0..arena.len()).collect();
        let mut rounds = 0;

        while current.len() > 1 && self.options.max_levels.is_none_or(|max| rounds < max) {
            let size = group_size(current.len());
            debug!(nodes = current.len(), group_size = size, "grouping level");

            let mut parents = Vec::with_capacity(current.len().div_ceil(size));
            for group in current.chunks(size) {
                let parent = Node::new(ids.next_id(), document_id, "")
                    .with_kind(NodeKind::Branch)
                    .with_meta("child_count", group.len())
                    .with_meta(
                        "total_pages",
                        group.iter().map(|&i| pages_covered(&arena[i])).sum::<usize>(),
                    );
                parents.push(push_parent(&mut arena, parent, group));
            }

            current = parents;
            rounds += 1;
        }

        let root = if let &[only] = current.as_slice() {
            let node = &mut arena[only];
            node.kind = NodeKind::Root;
            node.level = 0;
            node.metadata
                .insert(IS_SYNTHETIC_ROOT.to_string(), MetaValue::Bool(false));
            only
        } else {
            let root = Node::new(ids.next_id(), document_id, "")
                .with_kind(NodeKind::Root)
                .with_meta("child_count", current.len())
                .with_meta(IS_SYNTHETIC_ROOT, true);
            push_parent(&mut arena, root, &current)
        };

        normalize_levels(&mut arena, root);

        let root_id = arena[root].id.clone();
        let tree = Tree::from_parts(
            document_id.to_string(),
            title.to_string(),
            Some(root_id),
            arena,
        );

        info!(
            document_id,
            leaves = chunks.len(),
            nodes = tree.len(),
            depth = tree.max_depth(),
            "built tree"
        );
        tree
    }
}

/// Push `parent` into the arena, give it the union page range of `children`
/// and adopt them. Returns the parent's index.
fn push_parent(arena: &mut Vec<Node>, mut parent: Node, children: &[usize]) -> usize {
    parent.page_start = children.iter().filter_map(|&i| arena[i].page_start).min();
    parent.page_end = children.iter().filter_map(|&i| arena[i].page_end).max();

    let p = arena.len();
    arena.push(parent);

    // Children always precede their parent in the arena.
    let (before, rest) = arena.split_at_mut(p);
    for &c in children {
        rest[0].add_child(&mut before[c]);
    }
    p
}

fn pages_covered(node: &Node) -> usize {
    ["page_count", "total_pages"]
        .iter()
        .find_map(|key| node.metadata.get(*key).and_then(MetaValue::as_int))
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(1)
}

/// Reassign levels top-down so every child sits one below its parent.
fn normalize_levels(arena: &mut [Node], root: usize) {
    let positions: std::collections::HashMap<String, usize> = arena
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect();

    arena[root].level = 0;
    let mut queue = VecDeque::from([root]);
    while let Some(i) = queue.pop_front() {
        let level = arena[i].level + 1;
        let children: Vec<usize> = arena[i]
            .children_ids
            .iter()
            .filter_map(|id| positions.get(id).copied())
            .collect();
        for c in children {
            arena[c].level = level;
            queue.push_back(c);
        }
    }
}
