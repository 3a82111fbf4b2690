//! Page chunking.
//!
//! Groups an ordered page sequence into overlapping chunks bounded by a
//! page-count budget. Each chunk later becomes one leaf of the tree.

use crate::document::Page;
use crate::error::{Result, VelociraptorError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Separator placed between page texts inside a chunk.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Options controlling chunk boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerOptions {
    /// Maximum pages per chunk.
    pub max_chunk_size: usize,
    /// Minimum pages per chunk. Accepted for compatibility; a trailing chunk
    /// may still be shorter than this.
    pub min_chunk_size: usize,
    /// Pages repeated between consecutive chunks.
    pub overlap_pages: usize,
}

impl Default for ChunkerOptions {
    fn default() -> Self {
        Self {
            max_chunk_size: 10,
            min_chunk_size: 1,
            overlap_pages: 1,
        }
    }
}

impl ChunkerOptions {
    /// Options with the given chunk size and no overlap.
    pub fn with_max_chunk_size(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size,
            overlap_pages: 0,
            ..Default::default()
        }
    }

    /// Set the overlap.
    pub fn overlap(mut self, overlap_pages: usize) -> Self {
        self.overlap_pages = overlap_pages;
        self
    }

    /// Reject options that cannot produce chunks.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(VelociraptorError::InvalidConfig(
                "max_chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.min_chunk_size == 0 {
            return Err(VelociraptorError::InvalidConfig(
                "min_chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A contiguous run of pages merged into one text block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// First page number (inclusive).
    pub page_start: usize,
    /// Last page number (inclusive).
    pub page_end: usize,
    /// Page texts joined with a blank line.
    pub text: String,
    /// Number of pages merged.
    pub page_count: usize,
}

impl Chunk {
    /// Number of characters in the merged text.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Splits page sequences into chunks.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    options: ChunkerOptions,
}

impl Chunker {
    /// Create a chunker, rejecting a zero chunk size.
    pub fn new(options: ChunkerOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    /// The options in use.
    pub fn options(&self) -> &ChunkerOptions {
        &self.options
    }

    /// Split pages into chunks.
    ///
    /// The start index always advances by at least one page, so this
    /// terminates even when the overlap is as large as the chunk.
    pub fn split(&self, pages: &[Page]) -> Vec<Chunk> {
        let total = pages.len();
        let max = self.options.max_chunk_size.max(1);
        let overlap = self.options.overlap_pages;

        let mut chunks = Vec::new();
        let mut i = 0;

        while i < total {
            let chunk_end = i.saturating_add(max).min(total);
            let chunk_pages = &pages[i..chunk_end];

            debug!(
                start = i + 1,
                end = chunk_end,
                max_chunk_size = max,
                "creating chunk"
            );

            let text = chunk_pages
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join(PAGE_SEPARATOR);

            chunks.push(Chunk {
                page_start: chunk_pages[0].number,
                page_end: chunk_pages[chunk_pages.len() - 1].number,
                text,
                page_count: chunk_pages.len(),
            });

            i = if overlap > 0 {
                (i + 1).max(chunk_end.saturating_sub(overlap))
            } else {
                chunk_end
            };
        }

        chunks
    }
}
