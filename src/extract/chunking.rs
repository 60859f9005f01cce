//! Fixed-window passage chunking.
//!
//! Pages are cut into overlapping character windows. Chunks never cross a
//! page boundary; a page shorter than the window yields exactly one chunk.
//! Window and overlap are measured in characters, not bytes, so Japanese
//! text chunks at the intended granularity.

use crate::config::{CHUNK_OVERLAP_CHARS, CHUNK_WINDOW_CHARS};

/// One passage-to-be: a window of page text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based page this chunk was cut from.
    pub page_number: u32,
    /// 0-based position of this chunk within its page.
    pub chunk_index: u32,
    pub text: String,
}

/// Cut one page of text into overlapping windows.
pub fn chunk_page(page_number: u32, text: &str) -> Vec<Chunk> {
    chunk_page_with(page_number, text, CHUNK_WINDOW_CHARS, CHUNK_OVERLAP_CHARS)
}

/// Window-parameterised variant; `overlap` must be smaller than `window`.
pub fn chunk_page_with(
    page_number: u32,
    text: &str,
    window: usize,
    overlap: usize,
) -> Vec<Chunk> {
    debug_assert!(overlap < window);

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = window - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_index = 0u32;

    loop {
        let end = (start + window).min(chars.len());
        chunks.push(Chunk {
            page_number,
            chunk_index,
            text: chars[start..end].iter().collect(),
        });
        if end == chars.len() {
            break;
        }
        start += step;
        chunk_index += 1;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_page_yields_one_chunk() {
        let chunks = chunk_page(3, "短いページ");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_number, 3);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "短いページ");
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(chunk_page(1, "").is_empty());
    }

    #[test]
    fn windows_overlap_by_configured_amount() {
        let text: String = "機械学習は統計と最適化の交点にある。"
            .chars()
            .cycle()
            .take(900)
            .collect();
        let chunks = chunk_page_with(1, &text, 400, 50);

        // 900 chars, step 350: starts at 0, 350, 700.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.chars().count(), 400);
        assert_eq!(chunks[1].text.chars().count(), 400);
        assert_eq!(chunks[2].text.chars().count(), 200);

        // Tail of one window equals the head of the next.
        let tail: String = chunks[0].text.chars().skip(350).collect();
        let head: String = chunks[1].text.chars().take(50).collect();
        assert_eq!(tail, head);
    }

    #[test]
    fn exact_window_length_does_not_spawn_empty_tail() {
        let text: String = "x".repeat(400);
        let chunks = chunk_page_with(1, &text, 400, 50);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn chunk_indices_are_dense_within_page() {
        let text: String = "y".repeat(1200);
        let chunks = chunk_page_with(7, &text, 400, 50);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index as usize, i);
            assert_eq!(chunk.page_number, 7);
        }
    }
}
