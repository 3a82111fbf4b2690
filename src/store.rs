//! Node stores.
//!
//! A store holds whole trees and serves individual nodes by id. Node ids are
//! unique across everything one store holds. Every write re-validates the
//! affected tree, so a store never holds a tree with broken links.

use crate::error::{Result, VelociraptorError};
use crate::navigator::NodeLookup;
use crate::node::Node;
use crate::persistence::{self, SaveFormat};
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Listing entry for a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub document_id: String,
    pub title: String,
    pub root_node_id: Option<String>,
    pub node_count: usize,
}

/// Storage for document trees.
pub trait NodeStore: NodeLookup + Send + Sync {
    /// A node by id.
    fn get(&self, node_id: &str) -> Option<Node>;

    /// Replace a stored node with an updated copy.
    fn put(&self, node: Node) -> Result<()>;

    /// Store a tree, replacing any tree with the same document id.
    fn put_tree(&self, tree: &Tree) -> Result<()>;

    /// The tree of a document.
    fn get_tree(&self, document_id: &str) -> Option<Tree>;

    /// Remove a document. Returns whether it existed.
    fn delete_tree(&self, document_id: &str) -> Result<bool>;

    /// Stored documents, sorted by title then id.
    fn list_documents(&self) -> Vec<DocumentInfo>;
}

#[derive(Debug, Default)]
struct Inner {
    trees: HashMap<String, Tree>,
    /// node id -> document id
    owners: HashMap<String, String>,
}

impl Inner {
    fn insert(&mut self, tree: Tree) -> Result<()> {
        let document_id = tree.document_id().to_string();
        for node in tree.nodes() {
            if let Some(owner) = self.owners.get(&node.id) {
                if *owner != document_id {
                    return Err(VelociraptorError::structural(format!(
                        "node '{}' already belongs to document '{}'",
                        node.id, owner
                    )));
                }
            }
        }

        self.remove(&document_id);
        for node in tree.nodes() {
            self.owners.insert(node.id.clone(), document_id.clone());
        }
        self.trees.insert(document_id, tree);
        Ok(())
    }

    fn remove(&mut self, document_id: &str) -> Option<Tree> {
        let tree = self.trees.remove(document_id)?;
        for node in tree.nodes() {
            self.owners.remove(&node.id);
        }
        Some(tree)
    }

    fn replace_node(&mut self, node: Node) -> Result<String> {
        let document_id = self
            .owners
            .get(&node.id)
            .cloned()
            .ok_or_else(|| VelociraptorError::NotFound(format!("node '{}'", node.id)))?;
        let tree = self
            .trees
            .get_mut(&document_id)
            .ok_or_else(|| VelociraptorError::NotFound(format!("document '{}'", document_id)))?;
        tree.replace_node(node)?;
        Ok(document_id)
    }

    fn list(&self) -> Vec<DocumentInfo> {
        let mut docs: Vec<DocumentInfo> = self
            .trees
            .values()
            .map(|tree| DocumentInfo {
                document_id: tree.document_id().to_string(),
                title: tree.title.clone(),
                root_node_id: tree.root_id().map(str::to_string),
                node_count: tree.len(),
            })
            .collect();
        docs.sort_by(|a, b| {
            a.title
                .cmp(&b.title)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        docs
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| VelociraptorError::Store("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| VelociraptorError::Store("store lock poisoned".to_string()))
    }

    fn read_or_warn(&self) -> Option<RwLockReadGuard<'_, Inner>> {
        match self.read() {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(error = %e, "store read failed");
                None
            }
        }
    }
}

impl NodeLookup for MemoryStore {
    fn lookup(&self, node_id: &str) -> Option<Node> {
        self.get(node_id)
    }
}

impl NodeStore for MemoryStore {
    fn get(&self, node_id: &str) -> Option<Node> {
        let inner = self.read_or_warn()?;
        let document_id = inner.owners.get(node_id)?;
        inner.trees.get(document_id)?.get(node_id).cloned()
    }

    fn put(&self, node: Node) -> Result<()> {
        self.write()?.replace_node(node).map(|_| ())
    }

    fn put_tree(&self, tree: &Tree) -> Result<()> {
        tree.validate()?;
        self.write()?.insert(tree.clone())
    }

    fn get_tree(&self, document_id: &str) -> Option<Tree> {
        self.read_or_warn()?.trees.get(document_id).cloned()
    }

    fn delete_tree(&self, document_id: &str) -> Result<bool> {
        Ok(self.write()?.remove(document_id).is_some())
    }

    fn list_documents(&self) -> Vec<DocumentInfo> {
        self.read_or_warn().map(|inner| inner.list()).unwrap_or_default()
    }
}

/// Store keeping one file per document under a directory.
///
/// Trees are loaded when the store is opened and written through on every
/// change.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    format: SaveFormat,
    cache: MemoryStore,
}

impl FileStore {
    /// Open (creating if needed) a store directory and load its trees.
    pub fn open(dir: impl Into<PathBuf>, format: SaveFormat) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| VelociraptorError::io(&dir, e))?;

        let cache = MemoryStore::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| VelociraptorError::Store(e.to_string()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || !SaveFormat::recognizes(path) {
                continue;
            }

            let tree = persistence::load_tree(path)?;
            debug!(path = %path.display(), document_id = tree.document_id(), "loaded tree");
            cache.put_tree(&tree)?;
        }

        info!(
            dir = %dir.display(),
            documents = cache.list_documents().len(),
            "opened file store"
        );
        Ok(Self { dir, format, cache })
    }

    /// Directory holding the tree files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a document is written to.
    pub fn path_for(&self, document_id: &str) -> Result<PathBuf> {
        if document_id.is_empty()
            || document_id.starts_with('.')
            || document_id.contains(['/', '\\'])
        {
            return Err(VelociraptorError::Store(format!(
                "document id '{}' cannot be used as a file name",
                document_id
            )));
        }
        Ok(self
            .dir
            .join(format!("{}.{}", document_id, self.format.extension())))
    }

    fn save(&self, tree: &Tree) -> Result<()> {
        let path = self.path_for(tree.document_id())?;
        persistence::save_tree_with_format(tree, &path, self.format)?;
        debug!(path = %path.display(), "saved tree");
        Ok(())
    }

    /// Files that may hold this document, in any format.
    fn candidate_paths(&self, document_id: &str) -> Vec<PathBuf> {
        ["json", "bin", "bincode"]
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", document_id, ext)))
            .collect()
    }
}

impl NodeLookup for FileStore {
    fn lookup(&self, node_id: &str) -> Option<Node> {
        self.get(node_id)
    }
}

impl NodeStore for FileStore {
    fn get(&self, node_id: &str) -> Option<Node> {
        self.cache.get(node_id)
    }

    fn put(&self, node: Node) -> Result<()> {
        let mut inner = self.cache.write()?;
        let document_id = inner
            .owners
            .get(&node.id)
            .cloned()
            .ok_or_else(|| VelociraptorError::NotFound(format!("node '{}'", node.id)))?;
        let previous = inner
            .trees
            .get(&document_id)
            .cloned()
            .ok_or_else(|| VelociraptorError::NotFound(format!("document '{}'", document_id)))?;

        inner.replace_node(node)?;
        let saved = match inner.trees.get(&document_id) {
            Some(tree) => self.save(tree),
            None => Ok(()),
        };
        if saved.is_err() {
            // Node ids are unchanged by a replace, so owners stay valid.
            inner.trees.insert(document_id, previous);
        }
        saved
    }

    fn put_tree(&self, tree: &Tree) -> Result<()> {
        tree.validate()?;
        let document_id = tree.document_id();

        let mut inner = self.cache.write()?;
        let previous = inner.trees.get(document_id).cloned();
        inner.insert(tree.clone())?;

        if let Err(e) = self.save(tree) {
            inner.remove(document_id);
            if let Some(previous) = previous {
                if let Err(restore) = inner.insert(previous) {
                    warn!(document_id, error = %restore, "failed to restore tree");
                }
            }
            return Err(e);
        }
        Ok(())
    }

    fn get_tree(&self, document_id: &str) -> Option<Tree> {
        self.cache.get_tree(document_id)
    }

    fn delete_tree(&self, document_id: &str) -> Result<bool> {
        let existed = self.cache.delete_tree(document_id)?;
        if self.path_for(document_id).is_ok() {
            for path in self.candidate_paths(document_id) {
                if path.is_file() {
                    fs::remove_file(&path).map_err(|e| VelociraptorError::io(&path, e))?;
                }
            }
        }
        Ok(existed)
    }

    fn list_documents(&self) -> Vec<DocumentInfo> {
        self.cache.list_documents()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::Navigator;
    use crate::tree::tests::sample_tree;
    use crate::tree::TreeRecord;
    use tempfile::TempDir;

    fn other_tree() -> Tree {
        let root = Node::new("x", "doc-2", "only").with_kind(crate::node::NodeKind::Root);
        Tree::assemble(TreeRecord {
            document_id: "doc-2".to_string(),
            document_title: "Another".to_string(),
            root_node_id: Some("x".to_string()),
            nodes: vec![root],
        })
        .unwrap()
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let tree = sample_tree();
        store.put_tree(&tree).unwrap();

        assert_eq!(store.get("a1").unwrap().content, "first");
        assert!(store.get("missing").is_none());
        assert_eq!(store.get_tree("doc").unwrap().to_record(), tree.to_record());
        assert!(store.get_tree("nope").is_none());
    }

    #[test]
    fn test_put_updates_and_validates() {
        let store = MemoryStore::new();
        store.put_tree(&sample_tree()).unwrap();

        let mut node = store.get("a1").unwrap();
        node.summary = Some("updated".to_string());
        store.put(node).unwrap();
        assert_eq!(store.get("a1").unwrap().summary.as_deref(), Some("updated"));

        let mut broken = store.get("a1").unwrap();
        broken.parent_id = Some("ghost".to_string());
        assert!(matches!(
            store.put(broken),
            Err(VelociraptorError::StructuralViolation(_))
        ));
        assert_eq!(store.get("a1").unwrap().parent_id.as_deref(), Some("a"));

        assert!(matches!(
            store.put(Node::new("stranger", "doc", "")),
            Err(VelociraptorError::NotFound(_))
        ));
    }

    #[test]
    fn test_node_ids_unique_across_documents() {
        let store = MemoryStore::new();
        store.put_tree(&sample_tree()).unwrap();

        let clash = Tree::assemble(TreeRecord {
            document_id: "doc-3".to_string(),
            document_title: "Clash".to_string(),
            root_node_id: Some("root".to_string()),
            nodes: vec![Node::new("root", "doc-3", "").with_kind(crate::node::NodeKind::Root)],
        })
        .unwrap();
        assert!(store.put_tree(&clash).is_err());

        // Replacing the same document is fine.
        store.put_tree(&sample_tree()).unwrap();
        assert_eq!(store.list_documents().len(), 1);
    }

    #[test]
    fn test_list_and_delete() {
        let store = MemoryStore::new();
        store.put_tree(&sample_tree()).unwrap();
        store.put_tree(&other_tree()).unwrap();

        let docs = store.list_documents();
        let titles: Vec<&str> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Another", "Sample"]);
        assert_eq!(docs[1].node_count, 6);
        assert_eq!(docs[1].root_node_id.as_deref(), Some("root"));

        assert!(store.delete_tree("doc").unwrap());
        assert!(!store.delete_tree("doc").unwrap());
        assert!(store.get("a1").is_none());
        assert_eq!(store.list_documents().len(), 1);
    }

    #[test]
    fn test_navigator_over_store() {
        let store = MemoryStore::new();
        store.put_tree(&sample_tree()).unwrap();

        let nav = Navigator::new(&store);
        assert_eq!(nav.parent("a1").unwrap().id, "a");
        assert_eq!(nav.next_leaf("a2").unwrap().id, "b1");
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileStore::open(dir.path(), SaveFormat::Json).unwrap();
            store.put_tree(&sample_tree()).unwrap();
            store.put_tree(&other_tree()).unwrap();

            let mut node = store.get("b1").unwrap();
            node.summary = Some("persisted".to_string());
            store.put(node).unwrap();
        }
        assert!(dir.path().join("doc.json").is_file());

        let store = FileStore::open(dir.path(), SaveFormat::Json).unwrap();
        assert_eq!(store.list_documents().len(), 2);
        assert_eq!(store.get("b1").unwrap().summary.as_deref(), Some("persisted"));

        assert!(store.delete_tree("doc").unwrap());
        assert!(!dir.path().join("doc.json").exists());

        let reopened = FileStore::open(dir.path(), SaveFormat::Json).unwrap();
        assert_eq!(reopened.list_documents().len(), 1);
    }

    #[test]
    fn test_file_store_bincode_and_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "not a tree").unwrap();

        let store = FileStore::open(dir.path(), SaveFormat::Bincode).unwrap();
        store.put_tree(&sample_tree()).unwrap();
        assert!(dir.path().join("doc.bin").is_file());

        let reopened = FileStore::open(dir.path(), SaveFormat::Bincode).unwrap();
        assert_eq!(reopened.get_tree("doc").unwrap().len(), 6);
    }

    #[test]
    fn test_file_store_rejects_corrupt_tree() {
        let dir = TempDir::new().unwrap();
        let mut record = sample_tree().to_record();
        record.nodes.retain(|n| n.id != "a");
        fs::write(
            dir.path().join("doc.json"),
            serde_json::to_string(&record).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            FileStore::open(dir.path(), SaveFormat::Json),
            Err(VelociraptorError::StructuralViolation(_))
        ));
    }

    #[test]
    fn test_unsafe_document_id() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path(), SaveFormat::Json).unwrap();
        assert!(store.path_for("../escape").is_err());
        assert!(store.path_for("").is_err());
        assert!(store.path_for("abc-123").is_ok());
    }

    fn clash_tree() -> Tree {
        Tree::assemble(TreeRecord {
            document_id: "doc-3".to_string(),
            document_title: "Clash".to_string(),
            root_node_id: Some("root".to_string()),
            nodes: vec![Node::new("root", "doc-3", "").with_kind(crate::node::NodeKind::Root)],
        })
        .unwrap()
    }

    #[test]
    fn test_file_store_rejected_tree_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path(), SaveFormat::Json).unwrap();
        store.put_tree(&sample_tree()).unwrap();

        assert!(matches!(
            store.put_tree(&clash_tree()),
            Err(VelociraptorError::StructuralViolation(_))
        ));
        assert!(!dir.path().join("doc-3.json").exists());
        assert!(store.get_tree("doc-3").is_none());

        let reopened = FileStore::open(dir.path(), SaveFormat::Json).unwrap();
        assert_eq!(reopened.list_documents().len(), 1);
        assert_eq!(reopened.get("root").unwrap().document_id, "doc");
    }

    #[test]
    fn test_file_store_failed_save_rolls_back_tree() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path(), SaveFormat::Json).unwrap();
        // A directory where the file should go makes the write fail.
        fs::create_dir(dir.path().join("doc-2.json")).unwrap();

        assert!(matches!(
            store.put_tree(&other_tree()),
            Err(VelociraptorError::Io { .. })
        ));
        assert!(store.get("x").is_none());
        assert!(store.list_documents().is_empty());

        // A failed replacement keeps the earlier version.
        store.put_tree(&sample_tree()).unwrap();
        fs::remove_file(dir.path().join("doc.json")).unwrap();
        fs::create_dir(dir.path().join("doc.json")).unwrap();
        let mut changed = sample_tree();
        changed.title = "Changed".to_string();
        assert!(store.put_tree(&changed).is_err());
        assert_eq!(store.get_tree("doc").unwrap().title, "Sample");
        assert_eq!(store.get("a1").unwrap().document_id, "doc");
    }

    #[test]
    fn test_file_store_failed_node_save_rolls_back() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path(), SaveFormat::Json).unwrap();
        store.put_tree(&sample_tree()).unwrap();
        fs::remove_file(dir.path().join("doc.json")).unwrap();
        fs::create_dir(dir.path().join("doc.json")).unwrap();

        let mut node = store.get("a1").unwrap();
        node.summary = Some("unsaved".to_string());
        assert!(store.put(node).is_err());
        assert!(store.get("a1").unwrap().summary.is_none());
    }
}
