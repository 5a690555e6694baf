use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{Cursor, Read};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use crate::document::{DocumentMetadata, FileType, ParseError, ParsedDocument};

pub struct FileReader;

impl FileReader {
    /// Rejects unsupported files before any I/O happens.
    pub fn check_supported(path: &Path) -> Result<FileType, ParseError> {
        FileType::from_path(path)
    }

    /// Parse a file into text plus metadata. Never fails: problems are
    /// reported through `ParsedDocument::status`.
    pub async fn parse(path: &Path) -> ParsedDocument {
        let mut metadata = DocumentMetadata {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            ..Default::default()
        };

        let file_type = match Self::check_supported(path) {
            Ok(file_type) => file_type,
            Err(e) => return ParsedDocument::failure(metadata, e),
        };
        metadata.file_type = Some(file_type);

        match Self::read_content(path, file_type, metadata.clone()).await {
            Ok(parsed) => {
                info!(
                    file = %metadata.file_name,
                    file_type = file_type.as_str(),
                    chars = parsed.text.chars().count(),
                    "parsed document"
                );
                parsed
            }
            Err(e) => {
                warn!(file = %metadata.file_name, error = %e, "failed to parse document");
                ParsedDocument::failure(metadata, e)
            }
        }
    }

    async fn read_content(
        path: &Path,
        file_type: FileType,
        metadata: DocumentMetadata,
    ) -> Result<ParsedDocument, ParseError> {
        let io_err = |source| ParseError::Io {
            path: path.display().to_string(),
            source,
        };

        match file_type {
            FileType::Txt | FileType::Md => {
                let text = fs::read_to_string(path).await.map_err(io_err)?;
                Ok(ParsedDocument::success(text, metadata))
            }
            FileType::Pdf => {
                let bytes = fs::read(path).await.map_err(io_err)?;
                run_blocking(move || parse_pdf(&bytes, metadata)).await
            }
            FileType::Docx => {
                let bytes = fs::read(path).await.map_err(io_err)?;
                run_blocking(move || parse_docx(&bytes, metadata)).await
            }
        }
    }
}

async fn run_blocking<F>(f: F) -> Result<ParsedDocument, ParseError>
where
    F: FnOnce() -> Result<ParsedDocument, ParseError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ParseError::Pdf(format!("parser task failed: {}", e)))?
}

fn parse_pdf(bytes: &[u8], mut metadata: DocumentMetadata) -> Result<ParsedDocument, ParseError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ParseError::Pdf(e.to_string()))?;

    metadata.page_count = Some(doc.get_pages().len());
    metadata.title = pdf_info(&doc, b"Title");
    metadata.author = pdf_info(&doc, b"Author");
    metadata.subject = pdf_info(&doc, b"Subject");
    let created = pdf_info(&doc, b"CreationDate");
    if !created.is_empty() {
        metadata.created = Some(created);
    }

    let raw = pdf_extract::extract_text_from_mem(bytes).map_err(|e| ParseError::Pdf(e.to_string()))?;

    // pdf-extract separates pages with form feeds; normalise them to paragraph breaks.
    let text = raw
        .split('\u{c}')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(ParsedDocument::success(text, metadata))
}

fn pdf_info(doc: &lopdf::Document, key: &[u8]) -> String {
    let info = doc
        .trailer
        .get(b"Info")
        .and_then(|obj| match obj.as_reference() {
            Ok(id) => doc.get_dictionary(id),
            Err(_) => obj.as_dict(),
        });

    info.ok()
        .and_then(|dict| dict.get(key).ok())
        .and_then(|value| value.as_str().ok())
        .map(decode_pdf_string)
        .unwrap_or_default()
}

/// PDF text strings are either UTF-16BE with a BOM or a single-byte encoding.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units).trim().to_string()
    } else {
        String::from_utf8_lossy(bytes).trim().to_string()
    }
}

fn parse_docx(bytes: &[u8], mut metadata: DocumentMetadata) -> Result<ParsedDocument, ParseError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ParseError::Docx(e.to_string()))?;

    let body = read_zip_entry(&mut archive, "word/document.xml")?
        .ok_or_else(|| ParseError::Docx("word/document.xml not found".to_string()))?;
    let (paragraphs, paragraph_count) = docx_paragraphs(&body)?;
    metadata.paragraph_count = Some(paragraph_count);

    if let Some(core) = read_zip_entry(&mut archive, "docProps/core.xml")? {
        apply_core_properties(&core, &mut metadata)?;
    }

    Ok(ParsedDocument::success(paragraphs.join("\n\n"), metadata))
}

fn read_zip_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, ParseError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ParseError::Docx(e.to_string())),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| ParseError::Docx(format!("{}: {}", name, e)))?;
    Ok(Some(content))
}

/// Non-empty paragraph texts of a WordprocessingML body, plus the total
/// paragraph count. Table cells hold their own `w:p` elements, so table
/// text comes through as paragraphs too.
fn docx_paragraphs(xml: &str) -> Result<(Vec<String>, usize), ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_text = true,
                b"w:p" => current.clear(),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                b"w:p" => count += 1,
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| ParseError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    count += 1;
                    let text = current.trim();
                    if !text.is_empty() {
                        paragraphs.push(text.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Docx(format!("XML parsing error: {}", e))),
            _ => {}
        }
    }

    Ok((paragraphs, count))
}

fn apply_core_properties(xml: &str, metadata: &mut DocumentMetadata) -> Result<(), ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut field: Option<Vec<u8>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => field = Some(e.local_name().as_ref().to_vec()),
            Ok(Event::Text(t)) => {
                let Some(name) = field.as_deref() else { continue };
                let value = t
                    .unescape()
                    .map_err(|e| ParseError::Docx(e.to_string()))?
                    .trim()
                    .to_string();
                match name {
                    b"title" => metadata.title = value,
                    b"creator" => metadata.author = value,
                    b"subject" => metadata.subject = value,
                    b"created" => metadata.created = Some(value),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => field = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Docx(format!("core.xml: {}", e))),
            _ => {}
        }
    }

    Ok(())
}
