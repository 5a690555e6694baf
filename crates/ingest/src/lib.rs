pub mod chunk;
pub mod document;
pub mod reader;
pub mod segmenter;

pub use chunk::Chunk;
pub use document::{DocumentMetadata, FileType, ParseError, ParseStatus, ParsedDocument};
pub use reader::FileReader;
pub use segmenter::{Segmenter, SegmenterConfig};

use std::path::Path;

/// Fresh identifier for an uploaded document.
pub fn new_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Parse a file and segment its text. Parse failures yield no chunks.
pub async fn ingest_file(
    file_path: &Path,
    document_id: &str,
    segmenter: &Segmenter,
) -> (ParsedDocument, Vec<Chunk>) {
    let parsed = FileReader::parse(file_path).await;
    let chunks = if parsed.is_success() {
        segmenter.segment(&parsed.text, document_id)
    } else {
        Vec::new()
    };
    (parsed, chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ingest_markdown_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.md");
        std::fs::write(&path, "# 标题\n\n正文内容。").unwrap();

        let doc_id = new_document_id();
        let (parsed, chunks) = ingest_file(&path, &doc_id, &Segmenter::default()).await;
        assert!(parsed.is_success());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, format!("{}_chunk0", doc_id));
        assert_eq!(chunks[0].document_id, doc_id);
    }

    #[tokio::test]
    async fn test_ingest_unsupported_file_has_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slides.pptx");
        std::fs::write(&path, "data").unwrap();

        let (parsed, chunks) = ingest_file(&path, "d", &Segmenter::default()).await;
        assert_eq!(parsed.status, ParseStatus::Error);
        assert!(chunks.is_empty());
    }
}
