
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{PagechatError, Result};

/// A bounded-size segment of source text, ready for embedding.
///
/// Chunks are created in bulk when page content changes and discarded
/// wholesale when the index is rebuilt; they are never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based id, contiguous within one split call.
    pub id: usize,
    /// The chunk text, including any overlap prefix. Never empty.
    pub text: String,
    /// Char offset of this chunk's fresh (non-overlap) content in the source.
    pub source_offset: Option<usize>,
}

/// Configuration for the text chunker. Sizes are in characters, not bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters, overlap included.
    pub max_size: usize,
    /// Characters repeated from the tail of the previous chunk.
    pub overlap: usize,
}

impl ChunkerConfig {
    /// Fine granularity, used for DOM highlighting.
    #[inline]
    pub fn fine() -> Self {
        Self {
            max_size: 350,
            overlap: 0,
        }
    }

    /// Coarse granularity, used for chat grounding.
    #[inline]
    pub fn coarse() -> Self {
        Self {
            max_size: 1000,
            overlap: 100,
        }
    }
}

impl Default for ChunkerConfig {
    #[inline]
    fn default() -> Self {
        Self::coarse()
    }
}

/// Separator priority, coarsest first. Pieces that still exceed the size
/// budget are re-split with the next level; past the last level the text
/// is hard-split at the character budget.
const SEPARATOR_LEVELS: usize = 4;

/// Split `content` into chunks no longer than `config.max_size` characters.
///
/// Splitting is lossless: every character of the input appears in exactly
/// one chunk's fresh content, in order, so concatenating the chunks with
/// overlap prefixes stripped reconstructs the input. Separators stay
/// attached to the preceding piece.
///
/// # Errors
/// `InvalidInput` when `max_size` is zero or `overlap >= max_size`.
#[inline]
pub fn split(content: &str, config: &ChunkerConfig) -> Result<Vec<Chunk>> {
    if config.max_size == 0 {
        return Err(PagechatError::InvalidInput(
            "max_size must be positive".to_string(),
        ));
    }
    if config.overlap >= config.max_size {
        return Err(PagechatError::InvalidInput(format!(
            "overlap ({}) must be smaller than max_size ({})",
            config.overlap, config.max_size
        )));
    }
    if content.is_empty() {
        return Ok(Vec::new());
    }

    // Fresh content per chunk is budgeted below max_size so that adding
    // the overlap prefix can never push a chunk over the limit.
    let budget = config.max_size - config.overlap;
    let mut segments = Vec::new();
    split_recursive(content, budget, 0, &mut segments);

    let mut chunks: Vec<Chunk> = Vec::with_capacity(segments.len());
    let mut offset = 0usize;
    for (id, segment) in segments.iter().enumerate() {
        let text = match chunks.last() {
            Some(previous) if config.overlap > 0 => {
                let mut text = tail_chars(&previous.text, config.overlap);
                text.push_str(segment);
                text
            }
            _ => segment.clone(),
        };
        chunks.push(Chunk {
            id,
            text,
            source_offset: Some(offset),
        });
        offset += segment.chars().count();
    }

    debug!(
        "Split {} chars into {} chunks (max_size {}, overlap {})",
        offset,
        chunks.len(),
        config.max_size,
        config.overlap
    );

    Ok(chunks)
}

fn split_recursive(text: &str, budget: usize, level: usize, out: &mut Vec<String>) {
    if text.chars().count() <= budget {
        if !text.is_empty() {
            out.push(text.to_string());
        }
        return;
    }

    if level >= SEPARATOR_LEVELS {
        hard_split(text, budget, out);
        return;
    }

    let pieces = pieces_at(text, level);
    if pieces.len() == 1 {
        split_recursive(text, budget, level + 1, out);
        return;
    }

    // Greedily merge adjacent pieces up to the budget; pieces that are
    // individually oversized recurse with the next separator.
    let mut current = String::new();
    let mut current_len = 0usize;
    for piece in pieces {
        let piece_len = piece.chars().count();
        if piece_len > budget {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            split_recursive(piece, budget, level + 1, out);
        } else if current_len + piece_len > budget {
            out.push(std::mem::replace(&mut current, piece.to_string()));
            current_len = piece_len;
        } else {
            current.push_str(piece);
            current_len += piece_len;
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
}

fn pieces_at(text: &str, level: usize) -> Vec<&str> {
    match level {
        0 => text.split_inclusive("\n\n").collect(),
        1 => text.split_inclusive('\n').collect(),
        2 => text.split_inclusive(['.', '!', '?']).collect(),
        _ => text.split_inclusive(' ').collect(),
    }
}

/// Last-resort split at exactly `budget` characters per piece.
fn hard_split(text: &str, budget: usize, out: &mut Vec<String>) {
    let mut current = String::new();
    let mut current_len = 0usize;
    for ch in text.chars() {
        current.push(ch);
        current_len += 1;
        if current_len == budget {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
}

/// The last `count` characters of `text`, or all of it when shorter.
fn tail_chars(text: &str, count: usize) -> String {
    let total = text.chars().count();
    text.chars().skip(total.saturating_sub(count)).collect()
}
