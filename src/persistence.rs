//! Persistence layer for saving/loading document trees.
//!
//! Supports both JSON (human-readable) and bincode (efficient binary) formats.
//! Loaded trees are re-validated, so a corrupted file is rejected instead of
//! producing a tree with dangling links.

use crate::error::{Result, VelociraptorError};
use crate::tree::{Tree, TreeRecord};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Save format for trees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    /// JSON format (human-readable, larger).
    #[default]
    Json,
    /// Bincode format (binary, compact).
    Bincode,
}

impl SaveFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => SaveFormat::Json,
            Some("bin") | Some("bincode") => SaveFormat::Bincode,
            _ => SaveFormat::Json, // Default to JSON
        }
    }

    /// File extension written for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Json => "json",
            SaveFormat::Bincode => "bin",
        }
    }

    /// Whether `path` carries an extension this module can load.
    pub fn recognizes(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("json") | Some("bin") | Some("bincode")
        )
    }
}

/// Save a tree to a file.
pub fn save_tree(tree: &Tree, path: &Path) -> Result<()> {
    let format = SaveFormat::from_path(path);
    save_tree_with_format(tree, path, format)
}

/// Save a tree with specific format.
pub fn save_tree_with_format(tree: &Tree, path: &Path, format: SaveFormat) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| VelociraptorError::io(parent, e))?;
        }
    }

    let record = tree.to_record();
    let data = match format {
        SaveFormat::Json => serde_json::to_string_pretty(&record)
            .map_err(|e| VelociraptorError::Serialization(e.to_string()))?
            .into_bytes(),
        SaveFormat::Bincode => {
            let config = bincode::config::standard();
            bincode::encode_to_vec(&record, config)
                .map_err(|e| VelociraptorError::Serialization(e.to_string()))?
        }
    };

    fs::write(path, &data).map_err(|e| VelociraptorError::io(path, e))?;

    Ok(())
}

/// Load a tree from a file.
pub fn load_tree(path: &Path) -> Result<Tree> {
    if !path.exists() {
        return Err(VelociraptorError::IndexNotFound(path.to_path_buf()));
    }

    let format = SaveFormat::from_path(path);
    load_tree_with_format(path, format)
}

/// Load a tree with specific format.
pub fn load_tree_with_format(path: &Path, format: SaveFormat) -> Result<Tree> {
    let data = fs::read(path).map_err(|e| VelociraptorError::io(path, e))?;

    let record: TreeRecord = match format {
        SaveFormat::Json => serde_json::from_slice(&data)
            .map_err(|e| VelociraptorError::Serialization(e.to_string()))?,
        SaveFormat::Bincode => {
            let config = bincode::config::standard();
            let (record, _): (TreeRecord, usize) = bincode::decode_from_slice(&data, config)
                .map_err(|e| VelociraptorError::Serialization(e.to_string()))?;
            record
        }
    };

    Tree::assemble(record)
}

/// Check if a tree file exists at the given path.
pub fn tree_exists(path: &Path) -> bool {
    path.exists() && path.is_file()
}

/// Get the size of a tree file in bytes.
pub fn tree_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path).map_err(|e| VelociraptorError::io(path, e))?;
    Ok(metadata.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TreeBuilder;
    use crate::chunker::{Chunker, ChunkerOptions};
    use crate::document::Page;
    use tempfile::TempDir;

    fn create_test_tree() -> Tree {
        let pages: Vec<Page> = (1..=23)
            .map(|n| Page::new(n, format!("Text of page {}", n)))
            .collect();
        let chunker = Chunker::new(ChunkerOptions::with_max_chunk_size(5)).unwrap();
        let mut tree =
            TreeBuilder::sequential("n").build_from_pages(&chunker, &pages, "doc-1", "Test Document");
        tree.set_summary("n1", Some("Chapter 1 summary".to_string()));
        tree.set_embedding("n1", Some(vec![0.25, -0.5, 1.0]));
        tree
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_tree.json");

        let original = create_test_tree();
        save_tree(&original, &path).unwrap();

        assert!(tree_exists(&path));

        let loaded = load_tree(&path).unwrap();
        assert_eq!(loaded.to_record(), original.to_record());
    }

    #[test]
    fn test_save_and_load_bincode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("test_tree.bin");

        let original = create_test_tree();
        save_tree(&original, &path).unwrap();

        assert!(tree_exists(&path));

        let loaded = load_tree(&path).unwrap();
        assert_eq!(loaded.to_record(), original.to_record());
        assert_eq!(
            loaded.get("n1").unwrap().embedding,
            Some(vec![0.25, -0.5, 1.0])
        );
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            SaveFormat::from_path(Path::new("test.json")),
            SaveFormat::Json
        );
        assert_eq!(
            SaveFormat::from_path(Path::new("test.bin")),
            SaveFormat::Bincode
        );
        assert_eq!(
            SaveFormat::from_path(Path::new("test.bincode")),
            SaveFormat::Bincode
        );
        assert_eq!(SaveFormat::from_path(Path::new("test")), SaveFormat::Json);
        assert!(SaveFormat::recognizes(Path::new("a.bincode")));
        assert!(!SaveFormat::recognizes(Path::new("notes.txt")));
    }

    #[test]
    fn test_load_nonexistent() {
        let result = load_tree(Path::new("/nonexistent/tree.json"));
        assert!(matches!(result, Err(VelociraptorError::IndexNotFound(_))));
    }

    #[test]
    fn test_load_rejects_dangling_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");

        let mut record = create_test_tree().to_record();
        let leaf = record.nodes.iter_mut().find(|n| n.id == "n1").unwrap();
        leaf.parent_id = Some("ghost".to_string());
        fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();

        assert!(matches!(
            load_tree(&path),
            Err(VelociraptorError::StructuralViolation(_))
        ));
    }

    #[test]
    fn test_tree_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_tree.json");

        let tree = create_test_tree();
        save_tree(&tree, &path).unwrap();

        let size = tree_size(&path).unwrap();
        assert!(size > 0);
    }

    #[test]
    fn test_json_is_readable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_tree.json");

        let tree = create_test_tree();
        save_tree(&tree, &path).unwrap();

        // Read as text and verify it's valid JSON
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("Test Document"));
        assert!(content.contains("Chapter 1 summary"));
        assert!(content.contains("\"kind\": \"leaf\""));
    }
}
