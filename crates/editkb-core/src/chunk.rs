//! Paragraph- and sentence-boundary text chunker.
//!
//! Splits section bodies into [`TextChunk`]s that respect a configurable
//! `max_tokens` limit. Splitting occurs on paragraph boundaries (`\n\n`)
//! first; a paragraph that alone exceeds the budget is split at sentence
//! boundaries, and a sentence that still exceeds it is hard-split at the
//! nearest newline or space.
//!
//! Chunk ids are derived from the document id, section index, and chunk
//! index, so re-chunking unchanged text yields identical ids and hashes.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens` to `max_chars` using a 4 chars/token ratio.
//! 2. Split text on `\n\n` paragraph boundaries.
//! 3. Accumulate paragraphs into a buffer until adding the next paragraph
//!    would exceed `max_chars`, then flush.
//! 4. Paragraphs longer than `max_chars` are packed sentence by sentence.
//! 5. Sentences longer than `max_chars` are hard-split at whitespace.
//! 6. Blank sections produce no chunks.
//!
//! # Example
//!
//! ```rust
//! use editkb_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", 700);
//! assert_eq!(chunks.len(), 1);
//! ```

use sha2::{Digest, Sha256};

use crate::models::KnowledgeDocument;

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// A chunk of section text awaiting embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub document_id: String,
    pub chunk_id: String,
    pub section_index: usize,
    pub chunk_index: usize,
    pub heading: String,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// Chunk every section of `doc`, in section order.
pub fn chunk_document(doc: &KnowledgeDocument, max_tokens: usize) -> Vec<TextChunk> {
    let mut out = Vec::new();
    for (section_index, section) in doc.sections.iter().enumerate() {
        for (chunk_index, text) in chunk_text(&section.body, max_tokens)
            .into_iter()
            .enumerate()
        {
            out.push(TextChunk {
                document_id: doc.id.clone(),
                chunk_id: format!("{}::s{}:c{}", doc.id, section_index, chunk_index),
                section_index,
                chunk_index,
                heading: section.heading.clone(),
                hash: sha256_hex(text.as_bytes()),
                text,
            });
        }
    }
    out
}

/// Split text into pieces of at most `max_tokens × 4` bytes.
///
/// # Guarantees
///
/// - Blank input yields no pieces.
/// - Every piece is non-blank and within budget.
/// - Splits prefer paragraph, then sentence, then whitespace boundaries.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<String> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);
    let mut chunks = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.len() > max_chars {
            flush(&mut chunks, &mut current_buf);
            pack_sentences(trimmed, max_chars, &mut chunks);
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };
        if would_be > max_chars {
            flush(&mut chunks, &mut current_buf);
        }
        if !current_buf.is_empty() {
            current_buf.push_str("\n\n");
        }
        current_buf.push_str(trimmed);
    }
    flush(&mut chunks, &mut current_buf);

    chunks
}

fn flush(chunks: &mut Vec<String>, buf: &mut String) {
    if !buf.trim().is_empty() {
        chunks.push(buf.trim().to_string());
    }
    buf.clear();
}

/// Pack an oversized paragraph sentence by sentence.
fn pack_sentences(paragraph: &str, max_chars: usize, chunks: &mut Vec<String>) {
    let mut buf = String::new();
    for sentence in split_sentences(paragraph) {
        if sentence.len() > max_chars {
            flush(chunks, &mut buf);
            hard_split(sentence, max_chars, chunks);
            continue;
        }
        let would_be = if buf.is_empty() {
            sentence.len()
        } else {
            buf.len() + 1 + sentence.len()
        };
        if would_be > max_chars {
            flush(chunks, &mut buf);
        }
        if !buf.is_empty() {
            buf.push(' ');
        }
        buf.push_str(sentence);
    }
    flush(chunks, &mut buf);
}

/// Split after `.`, `!`, or `?` followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev_terminal = false;
    for (i, c) in text.char_indices() {
        if prev_terminal && c.is_whitespace() {
            let piece = text[start..i].trim();
            if !piece.is_empty() {
                out.push(piece);
            }
            start = i;
        }
        prev_terminal = matches!(c, '.' | '!' | '?');
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn hard_split(text: &str, max_chars: usize, chunks: &mut Vec<String>) {
    let mut remaining = text;
    while !remaining.is_empty() {
        let split_at = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
        let split_at = if split_at == 0 {
            next_char_boundary(remaining)
        } else {
            split_at
        };
        let actual_split = if split_at < remaining.len() {
            remaining[..split_at]
                .rfind('\n')
                .or_else(|| remaining[..split_at].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(split_at)
        } else {
            split_at
        };
        let actual_split = match snap_to_char_boundary(remaining, actual_split) {
            0 => next_char_boundary(remaining),
            n => n,
        };
        let piece = remaining[..actual_split].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        remaining = &remaining[actual_split..];
    }
}

fn next_char_boundary(s: &str) -> usize {
    s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentKind, Metadata, Section};

    fn doc(sections: &[(&str, &str)]) -> KnowledgeDocument {
        KnowledgeDocument {
            id: "guides/motion.md".to_string(),
            kind: DocumentKind::Guideline,
            metadata: Metadata::new(),
            sections: sections
                .iter()
                .map(|(h, b)| Section {
                    heading: h.to_string(),
                    level: 2,
                    body: b.to_string(),
                })
                .collect(),
            content_hash: String::new(),
        }
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 700);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("", 700).is_empty());
        assert!(chunk_text("  \n\n  ", 700).is_empty());
    }

    #[test]
    fn test_multiple_paragraphs_exceed_limit() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text(text, 7);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.len() <= 28, "chunk over budget: {:?}", c);
        }
    }

    #[test]
    fn test_long_paragraph_splits_on_sentences() {
        let text = "Zoom in on key numbers. Keep cuts short. Avoid stacking effects.";
        let chunks = chunk_text(text, 6);
        assert_eq!(
            chunks,
            vec![
                "Zoom in on key numbers.".to_string(),
                "Keep cuts short.".to_string(),
                "Avoid stacking effects.".to_string(),
            ]
        );
    }

    #[test]
    fn test_every_chunk_within_budget() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} talks about pacing and rhythm.", i))
            .collect::<Vec<_>>()
            .join(" ");
        for c in chunk_text(&text, 20) {
            assert!(c.len() <= 80, "chunk over budget: {}", c.len());
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = chunk_text(text, 3);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.is_empty());
        }
    }

    #[test]
    fn test_document_chunk_ids_deterministic() {
        let d = doc(&[("Zoom", "Alpha\n\nBeta"), ("", ""), ("Sound", "Gamma")]);
        let c1 = chunk_document(&d, 700);
        let c2 = chunk_document(&d, 700);
        assert_eq!(c1, c2);
        let ids: Vec<_> = c1.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["guides/motion.md::s0:c0", "guides/motion.md::s2:c0"]);
        assert_eq!(c1[1].heading, "Sound");
        assert_eq!(c1[1].section_index, 2);
    }

    #[test]
    fn test_chunk_hash_is_sha256_of_text() {
        let d = doc(&[("Zoom", "Alpha")]);
        let chunks = chunk_document(&d, 700);
        assert_eq!(chunks[0].hash, sha256_hex(b"Alpha"));
        assert_eq!(chunks[0].hash.len(), 64);
    }
}
