//! Page source for document processing.
//!
//! A document is an ordered list of numbered pages. Text extraction from
//! PDFs happens outside this crate; text files are split on a page
//! delimiter, form feed by default, which is what `pdftotext` emits.

use crate::error::{Result, VelociraptorError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default page delimiter (form feed).
pub const DEFAULT_PAGE_DELIMITER: &str = "\x0c";

/// A single page in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-indexed page number.
    pub number: usize,
    /// Text content of the page.
    pub text: String,
}

impl Page {
    /// Create a new page.
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }

    /// Number of characters on the page.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// A document consisting of zero or more pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document title.
    pub title: String,
    /// Original file path (if loaded from file).
    pub path: Option<PathBuf>,
    /// Pages in the document, in reading order.
    pub pages: Vec<Page>,
}

impl Document {
    /// Create a new document with given title and pages.
    pub fn new(title: impl Into<String>, pages: Vec<Page>) -> Self {
        Self {
            title: title.into(),
            path: None,
            pages,
        }
    }

    /// Load a text file, splitting pages on the form feed character.
    pub fn from_text_file(path: &Path) -> Result<Self> {
        Self::from_text_file_with_delimiter(path, DEFAULT_PAGE_DELIMITER)
    }

    /// Load a text file with a custom page delimiter.
    pub fn from_text_file_with_delimiter(path: &Path, delimiter: &str) -> Result<Self> {
        if !path.exists() {
            return Err(VelociraptorError::DocumentNotFound(path.to_path_buf()));
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| VelociraptorError::io(path, e))?;

        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();

        let mut document = Self::from_text(title, &content, delimiter);
        document.path = Some(path.to_path_buf());
        Ok(document)
    }

    /// Split raw text into pages on `delimiter`.
    ///
    /// Blank pages are kept so numbering and chunk boundaries follow the
    /// source. A delimiter at the very end terminates the last page rather
    /// than opening an empty one.
    pub fn from_text(title: impl Into<String>, content: &str, delimiter: &str) -> Self {
        let mut segments: Vec<&str> = content.split(delimiter).collect();
        if segments.last().is_some_and(|s| s.trim().is_empty()) {
            segments.pop();
        }

        let pages: Vec<Page> = segments
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                if text.trim().is_empty() {
                    debug!(page = i + 1, "blank page");
                }
                Page::new(i + 1, text)
            })
            .collect();

        Self::new(title, pages)
    }

    /// Get total number of pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Whether the document has no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Look up a page by its number.
    pub fn get_page(&self, number: usize) -> Option<&Page> {
        self.pages.iter().find(|p| p.number == number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_text_splits_on_delimiter() {
        let doc = Document::from_text("Doc", "one\x0ctwo\x0cthree", DEFAULT_PAGE_DELIMITER);
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.pages[0], Page::new(1, "one"));
        assert_eq!(doc.pages[2], Page::new(3, "three"));
    }

    #[test]
    fn test_blank_pages_are_kept_in_place() {
        let doc = Document::from_text("Doc", "one\x0c   \n\x0cthree", DEFAULT_PAGE_DELIMITER);
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.get_page(2).unwrap().text, "   \n");
        assert_eq!(doc.pages[2], Page::new(3, "three"));
    }

    #[test]
    fn test_trailing_delimiter_does_not_add_a_page() {
        let doc = Document::from_text("Doc", "one\x0ctwo\x0c", DEFAULT_PAGE_DELIMITER);
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.pages[1], Page::new(2, "two"));
    }

    #[test]
    fn test_empty_text_is_empty_document() {
        let doc = Document::from_text("Empty", "", DEFAULT_PAGE_DELIMITER);
        assert!(doc.is_empty());
    }

    #[test]
    fn test_from_text_file_uses_stem_as_title() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        write!(file, "page one---page two").unwrap();

        let doc = Document::from_text_file_with_delimiter(file.path(), "---").unwrap();
        let stem = file.path().file_stem().unwrap().to_str().unwrap();
        assert_eq!(doc.title, stem);
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_missing_file() {
        let result = Document::from_text_file(Path::new("/nonexistent/doc.txt"));
        assert!(matches!(result, Err(VelociraptorError::DocumentNotFound(_))));
    }

    #[test]
    fn test_char_count() {
        assert_eq!(Page::new(1, "héllo").char_count(), 5);
    }
}
