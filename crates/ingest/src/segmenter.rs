use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

use crate::chunk::Chunk;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph break pattern"));

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[。！？.!?]+").expect("sentence break pattern"));

const SEPARATOR: &str = "\n\n";
const SEPARATOR_LEN: usize = 2;

fn is_sentence_end(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '.' | '!' | '?')
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Upper bound on chunk length, in characters
    pub max_chunk_size: usize,
    /// Characters carried from the tail of one chunk into the head of the next
    pub overlap: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 500,
            overlap: 50,
        }
    }
}

/// Splits document text into bounded, overlapping chunks on paragraph boundaries.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmenterConfig,
}

/// A trimmed paragraph and its character offset in the source text.
struct Paragraph<'a> {
    text: &'a str,
    start: usize,
    len: usize,
}

/// Running chunk under construction.
struct Buffer {
    text: String,
    start: usize,
    end: usize,
    len: usize,
}

impl Buffer {
    fn from_paragraph(para: &Paragraph<'_>) -> Self {
        Self {
            text: para.text.to_string(),
            start: para.start,
            end: para.start + para.len,
            len: para.len,
        }
    }

    fn append(&mut self, para: &Paragraph<'_>) {
        self.text.push_str(SEPARATOR);
        self.text.push_str(para.text);
        self.end = para.start + para.len;
        self.len += SEPARATOR_LEN + para.len;
    }
}

struct Piece {
    text: String,
    start: usize,
    end: usize,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn segment(&self, text: &str, document_id: &str) -> Vec<Chunk> {
        let max = self.config.max_chunk_size.max(1);
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut buffer: Option<Buffer> = None;

        for para in split_paragraphs(text) {
            if para.len > max {
                if let Some(done) = buffer.take() {
                    emit(&mut chunks, document_id, done);
                }
                for piece in split_long_paragraph(&para, max) {
                    let index = chunks.len();
                    chunks.push(Chunk::new(document_id, index, piece.text, piece.start, piece.end));
                }
                continue;
            }

            buffer = Some(match buffer.take() {
                None => Buffer::from_paragraph(&para),
                Some(mut current) if current.len + SEPARATOR_LEN + para.len <= max => {
                    current.append(&para);
                    current
                }
                Some(current) => {
                    let seed = self.overlap_seed(&current);
                    emit(&mut chunks, document_id, current);
                    match seed {
                        Some(mut next) => {
                            next.append(&para);
                            next
                        }
                        None => Buffer::from_paragraph(&para),
                    }
                }
            });
        }

        if let Some(done) = buffer {
            emit(&mut chunks, document_id, done);
        }

        debug!(document_id, chunks = chunks.len(), "segmented text");
        chunks
    }

    /// The trailing `overlap` characters of a closed buffer, which open the
    /// next chunk. A seeded chunk can hold up to `overlap + 2` characters
    /// beyond `max_chunk_size`.
    fn overlap_seed(&self, closed: &Buffer) -> Option<Buffer> {
        let take = self.config.overlap.min(closed.len);
        if take == 0 {
            return None;
        }

        let tail: String = closed.text.chars().skip(closed.len - take).collect();
        Some(Buffer {
            text: tail,
            start: closed.end - take,
            end: closed.end,
            len: take,
        })
    }

    /// Longest sentences first; a cheap stand-in for extractive summarisation.
    pub fn extract_key_sentences(&self, text: &str, top_k: usize) -> Vec<String> {
        let mut sentences: Vec<&str> = SENTENCE_BREAK
            .split(text)
            .map(str::trim)
            .filter(|s| s.chars().count() > 10)
            .collect();

        sentences.sort_by_key(|s| std::cmp::Reverse(s.chars().count()));
        sentences.into_iter().take(top_k).map(str::to_string).collect()
    }
}

fn emit(chunks: &mut Vec<Chunk>, document_id: &str, buffer: Buffer) {
    let index = chunks.len();
    chunks.push(Chunk::new(document_id, index, buffer.text, buffer.start, buffer.end));
}

/// Converts monotonically increasing byte offsets to character offsets.
struct CharCursor<'a> {
    text: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            byte: 0,
            chars: 0,
        }
    }

    fn advance_to(&mut self, byte: usize) -> usize {
        self.chars += self.text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

fn split_paragraphs(text: &str) -> Vec<Paragraph<'_>> {
    let mut paragraphs = Vec::new();
    let mut cursor = CharCursor::new(text);
    let mut from = 0;

    let bounds = PARAGRAPH_BREAK
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .chain(std::iter::once((text.len(), text.len())));

    for (to, next) in bounds {
        let raw = &text[from..to];
        let body = raw.trim();
        if !body.is_empty() {
            let lead = raw.len() - raw.trim_start().len();
            let start = cursor.advance_to(from + lead);
            paragraphs.push(Paragraph {
                text: body,
                start,
                len: body.chars().count(),
            });
        }
        from = next;
    }

    paragraphs
}

/// Sentence ranges (character indices, half-open) covering all of `chars`.
fn sentence_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        if is_sentence_end(chars[i]) {
            while i + 1 < chars.len() && is_sentence_end(chars[i + 1]) {
                i += 1;
            }
            spans.push((start, i + 1));
            start = i + 1;
        }
        i += 1;
    }
    if start < chars.len() {
        spans.push((start, chars.len()));
    }

    spans
}

fn split_long_paragraph(para: &Paragraph<'_>, max: usize) -> Vec<Piece> {
    let chars: Vec<char> = para.text.chars().collect();

    // Sentences over the limit are cut into fixed windows.
    let windows = sentence_spans(&chars).into_iter().flat_map(|(s, e)| {
        (s..e)
            .step_by(max)
            .map(move |w| (w, (w + max).min(e)))
    });

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    for (s, e) in windows {
        current = match current {
            Some((cs, _)) if e - cs <= max => Some((cs, e)),
            Some(done) => {
                ranges.push(done);
                Some((s, e))
            }
            None => Some((s, e)),
        };
    }
    if let Some(done) = current {
        ranges.push(done);
    }

    ranges
        .into_iter()
        .filter_map(|(s, e)| {
            let raw: String = chars[s..e].iter().collect();
            let lead = raw.chars().take_while(|c| c.is_whitespace()).count();
            let body = raw.trim();
            if body.is_empty() {
                return None;
            }
            let start = para.start + s + lead;
            Some(Piece {
                text: body.to_string(),
                start,
                end: start + body.chars().count(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter(max_chunk_size: usize, overlap: usize) -> Segmenter {
        Segmenter::new(SegmenterConfig {
            max_chunk_size,
            overlap,
        })
    }

    fn slice(text: &str, start: usize, end: usize) -> String {
        text.chars().skip(start).take(end - start).collect()
    }

    #[test]
    fn test_blank_input_yields_no_chunks() {
        let s = Segmenter::default();
        assert!(s.segment("", "doc").is_empty());
        assert!(s.segment("  \n\n \t \n", "doc").is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let text = "机器学习是人工智能的重要分支。清华大学计算机系在2023年发表了研究。";
        let chunks = Segmenter::default().segment(text, "doc1");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "doc1_chunk0");
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, text.chars().count());
    }

    #[test]
    fn test_paragraph_order_survives_overlap() {
        let paragraphs: Vec<String> = (0..9)
            .map(|i| format!("paragraph-{:02}-{}", i, "a".repeat(17)))
            .collect();
        let text = paragraphs.join("\n\n");
        let chunks = segmenter(100, 10).segment(&text, "doc");
        assert!(chunks.len() > 1);

        // Drop the reintroduced overlap head of every chunk after the first.
        let rebuilt: Vec<&str> = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    c.text.as_str()
                } else {
                    let at = c.text.find("\n\n").expect("seeded chunk");
                    &c.text[at + 2..]
                }
            })
            .collect();
        assert_eq!(rebuilt.join("\n\n"), text);

        for chunk in &chunks {
            assert_eq!(slice(&text, chunk.start_char, chunk.end_char), chunk.text);
        }
    }

    #[test]
    fn test_overlap_tail_opens_next_chunk() {
        let text = format!("{}\n\n{}", "x".repeat(60), "y".repeat(60));
        let chunks = segmenter(100, 20).segment(&text, "doc");

        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].text.starts_with(&"x".repeat(20)));
        assert_eq!(chunks[1].start_char, 40);
    }

    #[test]
    fn test_overlap_is_fixed_size() {
        let text = format!("{}\n\n{}", "x".repeat(60), "y".repeat(90));
        let chunks = segmenter(100, 50).segment(&text, "doc");

        assert_eq!(chunks.len(), 2);
        let head = chunks[1].text.chars().take_while(|c| *c == 'x').count();
        assert_eq!(head, 50);
        assert_eq!(chunks[1].start_char, 10);
        assert_eq!(chunks[1].char_len(), 50 + 2 + 90);
    }

    #[test]
    fn test_long_paragraph_splits_on_sentences() {
        let text = "第一句话很短。第二句话也很短。第三句话稍微长一点点。";
        let chunks = segmenter(20, 5).segment(text, "doc");

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["第一句话很短。第二句话也很短。", "第三句话稍微长一点点。"]);
        assert_eq!(chunks[1].start_char, 15);
        assert_eq!(chunks[1].chunk_id, "doc_chunk1");
    }

    #[test]
    fn test_oversized_sentence_is_windowed() {
        let text = "a".repeat(45);
        let chunks = segmenter(20, 5).segment(&text, "doc");

        let lens: Vec<usize> = chunks.iter().map(Chunk::char_len).collect();
        assert_eq!(lens, vec![20, 20, 5]);
    }

    #[test]
    fn test_offsets_never_move_backwards() {
        let text = format!(
            "{}\n\n{}\n\n\n{}。{}。\n\n{}",
            "短段落。",
            "b".repeat(70),
            "c".repeat(80),
            "d".repeat(50),
            "e".repeat(30)
        );
        let chunks = segmenter(100, 30).segment(&text, "doc");

        for pair in chunks.windows(2) {
            assert!(pair[0].start_char <= pair[1].start_char);
        }
        for chunk in &chunks {
            assert!(chunk.char_len() <= 100 + 30 + 2);
            assert_eq!(slice(&text, chunk.start_char, chunk.end_char).chars().count(), chunk.char_len());
        }
    }

    #[test]
    fn test_key_sentences_prefer_longer() {
        let text = "短句。这是一个相当长的句子，用来测试关键句提取。这一句也足够长，可以被选中吗？好。";
        let key = Segmenter::default().extract_key_sentences(text, 1);
        assert_eq!(key, vec!["这是一个相当长的句子，用来测试关键句提取".to_string()]);
    }
}
