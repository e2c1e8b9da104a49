//! Sentence-aware chunking of post text.

use unicode_segmentation::UnicodeSegmentation;

/// A piece of post text with its character span in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
}

#[derive(Debug)]
struct Sentence<'a> {
    text: &'a str,
    start: usize,
    end: usize,
    chars: usize,
}

/// Split `text` into chunks of whole sentences of at most `max_chars`.
///
/// Sentences are packed greedily and joined with a single space. A sentence
/// longer than `max_chars` becomes a chunk on its own. After each chunk the
/// trailing sentences totalling at most `overlap_chars` are carried into the
/// next one, unless carrying them would leave no room for the next sentence.
pub fn chunk_by_sentences(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<TextChunk> {
    let sentences = split_sentences(text);
    let mut chunks = Vec::new();
    let mut buf: Vec<&Sentence<'_>> = Vec::new();
    // number of leading sentences in `buf` already emitted in the previous chunk
    let mut carried = 0;

    let mut i = 0;
    while i < sentences.len() {
        let sentence = &sentences[i];

        if sentence.chars > max_chars {
            if buf.len() > carried {
                chunks.push(join(&buf));
            }
            chunks.push(join(&[sentence]));
            buf.clear();
            carried = 0;
            i += 1;
            continue;
        }

        if joined_len(&buf) + usize::from(!buf.is_empty()) + sentence.chars <= max_chars {
            buf.push(sentence);
            i += 1;
            continue;
        }

        chunks.push(join(&buf));

        let mut keep = 0;
        let mut kept_chars = 0;
        for prev in buf.iter().rev() {
            let next = kept_chars + usize::from(keep > 0) + prev.chars;
            if next > overlap_chars {
                break;
            }
            kept_chars = next;
            keep += 1;
        }
        if keep > 0 && kept_chars + 1 + sentence.chars > max_chars {
            keep = 0;
        }

        buf.drain(..buf.len() - keep);
        carried = keep;
    }

    if buf.len() > carried {
        chunks.push(join(&buf));
    }

    chunks
}

/// Trimmed, non-empty sentences with their character spans.
fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    let mut sentences = Vec::new();
    let mut char_pos = 0;
    let mut byte_pos = 0;

    for (offset, raw) in text.split_sentence_bound_indices() {
        char_pos += text[byte_pos..offset].chars().count();
        byte_pos = offset;

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let leading = raw.len() - raw.trim_start().len();
        let start = char_pos + raw[..leading].chars().count();
        let chars = trimmed.chars().count();
        sentences.push(Sentence {
            text: trimmed,
            start,
            end: start + chars,
            chars,
        });
    }

    sentences
}

fn joined_len(buf: &[&Sentence<'_>]) -> usize {
    let chars: usize = buf.iter().map(|s| s.chars).sum();
    chars + buf.len().saturating_sub(1)
}

fn join(buf: &[&Sentence<'_>]) -> TextChunk {
    let text = buf.iter().map(|s| s.text).collect::<Vec<_>>().join(" ");
    TextChunk {
        text,
        char_start: buf.first().map_or(0, |s| s.start),
        char_end: buf.last().map_or(0, |s| s.end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunks: &[TextChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_by_sentences("", 100, 10).is_empty());
        assert!(chunk_by_sentences("   \n ", 100, 10).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let text = "Câu một. Câu hai.";
        let chunks = chunk_by_sentences(text, 100, 0);
        assert_eq!(texts(&chunks), vec!["Câu một. Câu hai."]);
        assert_eq!(chunks[0].char_start, 0);
        assert_eq!(chunks[0].char_end, text.chars().count());
    }

    #[test]
    fn test_greedy_packing_without_overlap() {
        let chunks = chunk_by_sentences("Aaaa. Bbbb. Cccc.", 11, 0);
        assert_eq!(texts(&chunks), vec!["Aaaa. Bbbb.", "Cccc."]);
        assert_eq!((chunks[0].char_start, chunks[0].char_end), (0, 11));
        assert_eq!((chunks[1].char_start, chunks[1].char_end), (12, 17));
    }

    #[test]
    fn test_overlap_carries_trailing_sentence() {
        let chunks = chunk_by_sentences("Aaaa. Bbbb. Cccc.", 11, 5);
        assert_eq!(texts(&chunks), vec!["Aaaa. Bbbb.", "Bbbb. Cccc."]);
        assert_eq!(chunks[1].char_start, 6);
    }

    #[test]
    fn test_long_sentence_is_own_chunk_in_order() {
        let chunks = chunk_by_sentences("Một. Hai ba bốn năm sáu bảy tám. Chín.", 10, 0);
        assert_eq!(
            texts(&chunks),
            vec!["Một.", "Hai ba bốn năm sáu bảy tám.", "Chín."]
        );
    }

    #[test]
    fn test_overlap_larger_than_budget_terminates() {
        let chunks = chunk_by_sentences("Aaaa. Bbbb. Cccc.", 5, 10);
        assert_eq!(texts(&chunks), vec!["Aaaa.", "Bbbb.", "Cccc."]);
    }

    #[test]
    fn test_spans_count_characters() {
        let text = "Đây là câu đầu tiên.  Tiếp theo là câu thứ hai!";
        let chunks = chunk_by_sentences(text, 25, 0);
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            let slice: String = text
                .chars()
                .skip(chunk.char_start)
                .take(chunk.char_end - chunk.char_start)
                .collect();
            assert_eq!(slice, chunk.text);
        }
    }
}
