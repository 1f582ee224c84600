//! Document Chunking
//!
//! Splits raw document text into overlapping fixed-size windows for
//! embedding and retrieval. The window advances by `size - overlap`
//! characters each step, so consecutive chunks share an `overlap`-sized
//! tail/head region.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("Invalid chunking configuration: {0}")]
    InvalidConfiguration(String),
}

/// A contiguous window of the source document used as a retrieval unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Position-derived identifier (`chunk_<sequence_index>`)
    pub id: String,
    /// Window text
    pub text: String,
    /// Zero-based position of this chunk within the document
    pub sequence_index: usize,
}

/// Collapse whitespace runs to single spaces and trim.
///
/// Extracted document text tends to carry hard line wraps, page breaks and
/// stray indentation; retrieval quality is better over normalized text.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `text` into chunks of `size` characters, each window starting
/// `size - overlap` characters after the previous one.
///
/// The last chunk may be shorter than `size`; it is still emitted if
/// non-empty. Windows are measured in characters and cut on char
/// boundaries, so multi-byte input is safe. Pure and deterministic.
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<Vec<Chunk>, ChunkerError> {
    if size == 0 {
        return Err(ChunkerError::InvalidConfiguration(
            "chunk size must be greater than zero".to_string(),
        ));
    }
    if overlap >= size {
        return Err(ChunkerError::InvalidConfiguration(format!(
            "overlap ({}) must be smaller than chunk size ({})",
            overlap, size
        )));
    }

    // Byte offset of every char boundary, plus the end of the text
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(pos, _)| pos)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < char_count {
        let end = (start + size).min(char_count);
        let window = &text[boundaries[start]..boundaries[end]];
        chunks.push(Chunk {
            id: format!("chunk_{}", chunks.len()),
            text: window.to_string(),
            sequence_index: chunks.len(),
        });
        if end == char_count {
            break;
        }
        start += step;
    }

    info!(chunks = chunks.len(), size, overlap, "Split text into chunks");
    Ok(chunks)
}
