use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    /// Position in segmentation order.
    pub index: usize,
    pub text: String,
    /// Character offsets into the source text, not bytes.
    pub start_char: usize,
    pub end_char: usize,
}

impl Chunk {
    pub fn new(
        document_id: &str,
        index: usize,
        text: String,
        start_char: usize,
        end_char: usize,
    ) -> Self {
        Self {
            chunk_id: Self::chunk_id(document_id, index),
            document_id: document_id.to_string(),
            index,
            text,
            start_char,
            end_char,
        }
    }

    /// Ids are positional, so they are only stable within one segmentation run.
    pub fn chunk_id(document_id: &str, index: usize) -> String {
        format!("{}_chunk{}", document_id, index)
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_follow_emission_index() {
        let chunk = Chunk::new("doc-7", 3, "hello".to_string(), 10, 15);
        assert_eq!(chunk.chunk_id, "doc-7_chunk3");
        assert_eq!(chunk.index, 3);
        assert_eq!(chunk.char_len(), 5);
    }
}
