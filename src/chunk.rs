//! Paragraph-boundary text chunker.
//!
//! Splits a document's extracted text into [`TextChunk`]s of at most
//! `max_chars` characters. Splitting occurs only on paragraph boundaries
//! (`\n\n`); a paragraph is never cut, so a single paragraph longer than
//! `max_chars` becomes its own chunk.
//!
//! The packer is greedy and single-pass. When the next paragraph would
//! overflow the buffer, the buffer is closed and kept only if it holds at
//! least `min_chars` characters; short fragments are dropped. The only
//! chunk allowed below the floor is a document that is shorter than the
//! floor as a whole. Chunks never overlap, and each records its byte span in the source text plus a
//! SHA-256 hash of its content.

use sha2::{Digest, Sha256};

use crate::models::{SourceDocument, TextChunk};

pub const DEFAULT_MAX_CHARS: usize = 3000;
pub const DEFAULT_MIN_CHARS: usize = 500;

const SEPARATOR: &str = "\n\n";

struct Paragraph<'a> {
    text: &'a str,
    start: usize,
    end: usize,
    chars: usize,
}

struct Buffer<'a> {
    paras: Vec<Paragraph<'a>>,
    chars: usize,
}

impl<'a> Buffer<'a> {
    fn new() -> Self {
        Self {
            paras: Vec::new(),
            chars: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.paras.is_empty()
    }

    fn len_with(&self, para: &Paragraph<'_>) -> usize {
        if self.is_empty() {
            para.chars
        } else {
            self.chars + SEPARATOR.len() + para.chars
        }
    }

    fn push(&mut self, para: Paragraph<'a>) {
        self.chars = self.len_with(&para);
        self.paras.push(para);
    }

    fn take(&mut self) -> Buffer<'a> {
        std::mem::replace(self, Buffer::new())
    }
}

/// Chunk a document's text.
pub fn chunk_document(doc: &SourceDocument, max_chars: usize, min_chars: usize) -> Vec<TextChunk> {
    chunk_text(&doc.file_name, &doc.text, max_chars, min_chars)
}

/// Split text into chunks on paragraph boundaries.
/// Returns chunks with contiguous ordinals starting at 0.
pub fn chunk_text(
    source_file: &str,
    text: &str,
    max_chars: usize,
    min_chars: usize,
) -> Vec<TextChunk> {
    let mut closed: Vec<Buffer<'_>> = Vec::new();
    let mut current = Buffer::new();
    let mut split = false;

    for para in paragraphs(text) {
        if !current.is_empty() && current.len_with(&para) > max_chars {
            split = true;
            let full = current.take();
            if full.chars >= min_chars {
                closed.push(full);
            }
        }
        current.push(para);
    }

    // A sub-floor leftover survives only when it is the whole document.
    if !current.is_empty() && (current.chars >= min_chars || !split) {
        closed.push(current);
    }

    closed
        .into_iter()
        .enumerate()
        .map(|(i, buf)| make_chunk(source_file, i, &buf))
        .collect()
}

fn paragraphs(text: &str) -> impl Iterator<Item = Paragraph<'_>> {
    let mut offset = 0;
    text.split(SEPARATOR).filter_map(move |raw| {
        let raw_start = offset;
        offset += raw.len() + SEPARATOR.len();

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lead = raw.len() - raw.trim_start().len();
        let start = raw_start + lead;
        Some(Paragraph {
            text: trimmed,
            start,
            end: start + trimmed.len(),
            chars: trimmed.chars().count(),
        })
    })
}

fn make_chunk(source_file: &str, ordinal: usize, buf: &Buffer<'_>) -> TextChunk {
    let content = buf
        .paras
        .iter()
        .map(|p| p.text)
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let start = buf.paras.first().map(|p| p.start).unwrap_or(0);
    let end = buf.paras.last().map(|p| p.end).unwrap_or(start);

    TextChunk {
        source_file: source_file.to_string(),
        ordinal,
        span: (start, end),
        content,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(c: char, n: usize) -> String {
        std::iter::repeat(c).take(n).collect()
    }

    #[test]
    fn test_small_document_single_chunk() {
        let chunks = chunk_text("a.pdf", "Duration measures price sensitivity.", 3000, 500);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].content, "Duration measures price sensitivity.");
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("a.pdf", "", 3000, 500).is_empty());
        assert!(chunk_text("a.pdf", "\n\n  \n\n", 3000, 500).is_empty());
    }

    #[test]
    fn test_packs_paragraphs_greedily() {
        let text = [para('a', 400), para('b', 400), para('c', 400)].join("\n\n");
        let chunks = chunk_text("a.pdf", &text, 900, 100);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, format!("{}\n\n{}", para('a', 400), para('b', 400)));
        assert_eq!(chunks[1].content, para('c', 400));
    }

    #[test]
    fn test_oversized_paragraph_is_own_chunk() {
        let text = [para('a', 600), para('b', 5000), para('c', 600)].join("\n\n");
        let chunks = chunk_text("a.pdf", &text, 3000, 500);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].content.len(), 5000);
        for c in [&chunks[0], &chunks[2]] {
            assert!(c.content.chars().count() <= 3000);
        }
    }

    #[test]
    fn test_fragment_below_floor_is_dropped() {
        // 100-char buffer is closed by the 2950-char paragraph and discarded.
        let text = [para('x', 100), para('y', 2950), para('z', 2950)].join("\n\n");
        let chunks = chunk_text("a.pdf", &text, 3000, 500);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.starts_with('y'));
        assert!(chunks[1].content.starts_with('z'));
        assert!(chunks.iter().all(|c| c.content.chars().count() >= 500));
    }

    #[test]
    fn test_short_tail_after_full_chunks_is_dropped() {
        let text = [para('a', 2960), para('b', 50)].join("\n\n");
        let chunks = chunk_text("a.pdf", &text, 3000, 500);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, para('a', 2960));
    }

    #[test]
    fn test_short_tail_after_dropped_fragment_is_dropped() {
        // 652-char document: the 450-char head is closed below the floor,
        // so the 200-char tail is not the whole document either.
        let text = [para('x', 450), para('y', 200)].join("\n\n");
        let chunks = chunk_text("a.txt", &text, 600, 500);
        assert!(chunks.is_empty(), "got {:?}", chunks.iter().map(|c| c.content.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_document_below_floor_is_one_chunk() {
        let text = [para('x', 150), para('y', 200)].join("\n\n");
        let chunks = chunk_text("a.txt", &text, 600, 500);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
    }

    #[test]
    fn test_spans_point_into_source() {
        let text = format!("  {}\n\n\n\n{}\n\n{}  ", para('a', 700), para('b', 700), para('c', 2800));
        let chunks = chunk_text("a.pdf", &text, 3000, 500);
        assert_eq!(chunks.len(), 2);
        let (s0, e0) = chunks[0].span;
        assert!(text[s0..e0].starts_with('a'));
        assert!(text[s0..e0].ends_with('b'));
        let (s1, e1) = chunks[1].span;
        assert_eq!(&text[s1..e1], chunks[1].content);
        assert!(e0 <= s1);
    }

    #[test]
    fn test_chunks_preserve_paragraph_order() {
        let paras: Vec<String> = (0..40)
            .map(|i| format!("Paragraph {} {}", i, para('p', 150 + (i * 37) % 400)))
            .collect();
        let text = paras.join("\n\n");
        let chunks = chunk_text("a.pdf", &text, 1000, 200);

        let emitted: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.content.split("\n\n"))
            .collect();
        let mut cursor = paras.iter();
        for p in emitted {
            assert!(cursor.any(|orig| orig == p), "out of order or unknown paragraph");
        }
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = [para('a', 800), para('b', 900), para('c', 2500)].join("\n\n");
        let c1 = chunk_text("a.pdf", &text, 3000, 500);
        let c2 = chunk_text("a.pdf", &text, 3000, 500);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.content, b.content);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.span, b.span);
        }
    }
}
