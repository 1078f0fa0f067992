//! Character-window chunking with structure-aware cut points.
//!
//! Text is cut into windows of at most `chunk_size` characters, consecutive windows sharing
//! exactly `overlap` characters. Inside each window the cut prefers, in order: a paragraph
//! break, a line break, the end of a sentence, any whitespace. Among cuts of the same kind the
//! latest one wins. A window with no usable boundary is cut hard at `chunk_size`.
//!
//! Cut points are never placed in the first half of a window (nor inside the overlap), which
//! keeps chunks from degenerating into slivers when boundaries cluster near the start.

use super::sanitize::normalize_source;
use super::types::{Chunk, ChunkMetadata, ChunkingError, DEFAULT_SOURCE_ID, DocumentSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Word,
}

impl Boundary {
    const PRIORITY: [Self; 4] = [Self::Paragraph, Self::Line, Self::Sentence, Self::Word];

    /// Whether cutting right before `chars[cut]` ends a segment on this kind of boundary.
    fn ends_at(self, chars: &[char], cut: usize) -> bool {
        let before = |offset: usize| cut.checked_sub(offset).and_then(|idx| chars.get(idx)).copied();
        match self {
            Self::Paragraph => before(1) == Some('\n') && before(2) == Some('\n'),
            Self::Line => before(1) == Some('\n'),
            Self::Sentence => {
                before(1).is_some_and(char::is_whitespace)
                    && matches!(before(2), Some('.' | '!' | '?'))
            }
            Self::Word => before(1).is_some_and(char::is_whitespace),
        }
    }
}

/// Split `text` into overlapping windows of at most `chunk_size` characters.
///
/// Empty input yields no chunks. Fails before doing any work when `chunk_size` is zero or
/// `overlap` is not strictly smaller than `chunk_size`.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(ChunkingError::InvalidConfiguration {
            chunk_size,
            overlap,
        });
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < total {
        let limit = (start + chunk_size).min(total);
        if limit == total {
            pieces.push(chars[start..].iter().collect());
            break;
        }

        let earliest = start + (overlap + 1).max(chunk_size / 2);
        let end = find_cut(&chars, earliest, limit).unwrap_or(limit);
        pieces.push(chars[start..end].iter().collect());
        start = end - overlap;
    }

    tracing::trace!(
        chars = total,
        chunk_size,
        overlap,
        chunks = pieces.len(),
        "Split text into chunks"
    );
    Ok(pieces)
}

fn find_cut(chars: &[char], earliest: usize, limit: usize) -> Option<usize> {
    if earliest > limit {
        return None;
    }
    Boundary::PRIORITY.iter().find_map(|boundary| {
        (earliest..=limit)
            .rev()
            .find(|&cut| boundary.ends_at(chars, cut))
    })
}

/// Attach contiguous positions, lengths, and provenance to split text.
pub fn attach_metadata(pieces: Vec<String>, source: &DocumentSource) -> Vec<Chunk> {
    let source = normalize_source(source);
    let source_id = source
        .source_id
        .unwrap_or_else(|| DEFAULT_SOURCE_ID.to_string());

    pieces
        .into_iter()
        .enumerate()
        .map(|(position, text)| {
            let length = text.chars().count();
            Chunk {
                text,
                metadata: ChunkMetadata {
                    position,
                    source_id: source_id.clone(),
                    length,
                    title: source.title.clone(),
                    url: source.url.clone(),
                    published_at: source.published_at,
                },
            }
        })
        .collect()
}

/// Split `text` and attach metadata in one step.
pub fn chunk_document(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    source: &DocumentSource,
) -> Result<Vec<Chunk>, ChunkingError> {
    Ok(attach_metadata(split(text, chunk_size, overlap)?, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Retrieval systems split text.\n\nEach chunk keeps a little of its \
        neighbour so that sentences straddling a cut remain searchable. Überlänge, naïve \
        façades, and emoji 🚀 count as single characters!\nShort line.\nAnother paragraph \
        follows with words but no full stop at the end";

    fn reconstruct(pieces: &[String], overlap: usize) -> String {
        let mut text = String::new();
        for (idx, piece) in pieces.iter().enumerate() {
            if idx == 0 {
                text.push_str(piece);
            } else {
                text.extend(piece.chars().skip(overlap));
            }
        }
        text
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert_eq!(
            split("text", 0, 0),
            Err(ChunkingError::InvalidConfiguration {
                chunk_size: 0,
                overlap: 0
            })
        );
        assert!(matches!(
            split("text", 10, 10),
            Err(ChunkingError::InvalidConfiguration { .. })
        ));
        assert!(split("", 10, 12).is_err());
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert_eq!(split("", 10, 2), Ok(Vec::new()));
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(split("tiny", 10, 3), Ok(vec!["tiny".to_string()]));
    }

    #[test]
    fn windows_respect_size_overlap_and_reconstruct() {
        for (chunk_size, overlap) in [(1, 0), (7, 0), (7, 6), (16, 4), (25, 5), (40, 10), (300, 50)] {
            let pieces = split(SAMPLE, chunk_size, overlap).expect("valid configuration");
            assert!(!pieces.is_empty());
            assert!(pieces.iter().all(|piece| !piece.is_empty()));
            assert!(
                pieces.iter().all(|piece| piece.chars().count() <= chunk_size),
                "chunk exceeded {chunk_size}"
            );
            for pair in pieces.windows(2) {
                let tail: String = pair[0]
                    .chars()
                    .skip(pair[0].chars().count() - overlap)
                    .collect();
                let head: String = pair[1].chars().take(overlap).collect();
                assert_eq!(tail, head, "overlap mismatch for ({chunk_size}, {overlap})");
            }
            assert_eq!(reconstruct(&pieces, overlap), SAMPLE);
        }
    }

    #[test]
    fn prefers_paragraph_then_sentence_boundaries() {
        let text = "First paragraph here.\n\nSecond paragraph is longer than the window.";
        let pieces = split(text, 30, 0).expect("split");
        assert_eq!(pieces[0], "First paragraph here.\n\n");

        let text = "One short sentence. Two more words and then some";
        let pieces = split(text, 30, 0).expect("split");
        assert_eq!(pieces[0], "One short sentence. ");
    }

    #[test]
    fn hard_cut_without_boundaries() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let pieces = split(text, 10, 3).expect("split");
        assert_eq!(pieces[0], "abcdefghij");
        assert_eq!(pieces[1], "hijklmnopq");
        assert_eq!(reconstruct(&pieces, 3), text);
    }

    #[test]
    fn two_sentence_text_splits_at_sentence_end() {
        let text = "Alpha methods are fast. Beta methods are slower.";
        let pieces = split(text, 25, 5).expect("split");
        assert!(pieces.len() >= 2);
        assert_eq!(pieces[0], "Alpha methods are fast. ");
        assert!(pieces.iter().all(|piece| piece.chars().count() <= 25));
        assert_eq!(reconstruct(&pieces, 5), text);
    }

    #[test]
    fn attach_metadata_numbers_chunks_and_counts_characters() {
        let chunks = attach_metadata(
            vec!["héllo".into(), "wörld".into()],
            &DocumentSource {
                source_id: Some(" paper-7 ".into()),
                url: Some("https://example.org/paper.pdf".into()),
                ..DocumentSource::default()
            },
        );

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.position, 0);
        assert_eq!(chunks[1].metadata.position, 1);
        assert_eq!(chunks[0].metadata.length, 5);
        assert!(chunks.iter().all(|chunk| chunk.metadata.source_id == "paper-7"));
        assert_eq!(
            chunks[1].metadata.url.as_deref(),
            Some("https://example.org/paper.pdf")
        );
    }

    #[test]
    fn chunk_document_defaults_source() {
        let chunks = chunk_document("plain text", 100, 10, &DocumentSource::default())
            .expect("chunks");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.source_id, DEFAULT_SOURCE_ID);
        assert!(chunks[0].metadata.title.is_none());
    }
}
