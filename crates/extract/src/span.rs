/// Maps byte offsets of a `str` to character offsets.
pub struct CharIndex {
    boundaries: Vec<usize>,
}

impl CharIndex {
    pub fn new(text: &str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Self { boundaries }
    }

    /// Byte offsets inside a character round up to the next boundary.
    pub fn char_offset(&self, byte: usize) -> usize {
        match self.boundaries.binary_search(&byte) {
            Ok(i) | Err(i) => i,
        }
    }

    pub fn char_range(&self, start_byte: usize, end_byte: usize) -> (usize, usize) {
        (self.char_offset(start_byte), self.char_offset(end_byte))
    }
}

pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The first `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_to_char_offsets() {
        let text = "ab机器c";
        let index = CharIndex::new(text);
        assert_eq!(index.char_offset(0), 0);
        assert_eq!(index.char_offset(2), 2);
        assert_eq!(index.char_offset(5), 3);
        assert_eq!(index.char_offset(8), 4);
        assert_eq!(index.char_offset(text.len()), 5);
        assert_eq!(truncate_chars("机器学习", 2), "机器");
    }
}
