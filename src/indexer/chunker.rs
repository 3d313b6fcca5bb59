use serde::{Deserialize, Serialize};

use super::document::Document;

/// Chunk sizing, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared with the next chunk.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self { chunk_size: 1000, overlap: 100 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunk<'a> {
    pub text: &'a str,
    pub chunk_index: usize,
    /// Byte offset of the chunk within the source text.
    pub start: usize,
}

/// Lazy chunk sequence over a borrowed text. Holds no shared state, so a clone
/// taken before iterating replays the same chunks.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    chunk_size: usize,
    overlap: usize,
    next_start: Option<usize>,
    chunk_index: usize,
}

/// Split `text` into chunks of at most `chunk_size` characters, each starting
/// exactly `overlap` characters before the end of the previous one.
pub fn chunk_text(text: &str, config: ChunkConfig) -> Chunks<'_> {
    let chunk_size = config.chunk_size.max(1);
    let overlap = config.overlap.min(chunk_size - 1);
    Chunks {
        text,
        chunk_size,
        overlap,
        next_start: if text.is_empty() { None } else { Some(0) },
        chunk_index: 0,
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = TextChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start?;
        let text = self.text;

        let window_end = advance_chars(text, start, self.chunk_size);
        let end = if window_end >= text.len() {
            text.len()
        } else {
            // a chunk must reach past the overlap or the next one would not advance
            let min_end = advance_chars(text, start, self.overlap + 1);
            find_break_point(text, start, min_end, window_end)
        };

        self.next_start = if end >= text.len() {
            None
        } else {
            Some(retreat_chars(text, end, self.overlap))
        };

        let chunk = TextChunk {
            text: &text[start..end],
            chunk_index: self.chunk_index,
            start,
        };
        self.chunk_index += 1;
        Some(chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

/// Split a document into chunk documents that inherit its metadata plus a `chunk_index`.
pub fn chunk_document(document: &Document, config: ChunkConfig) -> impl Iterator<Item = Document> + '_ {
    chunk_text(&document.content, config).map(move |chunk| {
        let mut metadata = document.metadata.clone();
        metadata
            .extra
            .insert("chunk_index".to_string(), chunk.chunk_index.to_string());
        Document::new(chunk.text, metadata)
    })
}

/// Byte position `n` characters after `from`, capped at the end of the text.
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

/// Byte position `n` characters before `from`, floored at zero.
fn retreat_chars(text: &str, from: usize, n: usize) -> usize {
    if n == 0 {
        return from;
    }
    text[..from]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn find_break_point(text: &str, start: usize, min_end: usize, max_end: usize) -> usize {
    let segment = &text[start..max_end];

    for sentinel in ["\n\n", "\n", ". ", "? ", "! ", " "] {
        if let Some(pos) = segment.rfind(sentinel) {
            let end = start + pos + sentinel.len();
            if end >= min_end {
                return end;
            }
        }
    }
    max_end
}
