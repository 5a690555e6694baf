use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use index::{DocumentBundle, DocumentNode, IndexOutcome, Metadata};
use ingest::{DocumentMetadata, FileReader};

use crate::documents::DocumentRecord;
use crate::error::{ApiError, ApiResult};
use crate::metrics::TimedOperation;
use crate::state::AppState;

/// Response body for a processed document.
#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub file_name: String,
    pub file_type: String,
    pub text_length: usize,
    pub chunks_count: usize,
    pub entities_count: usize,
    pub relations_count: usize,
    pub metadata: DocumentMetadata,
    pub processing: IndexOutcome,
    pub status: &'static str,
}

impl From<&DocumentRecord> for IngestReport {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            document_id: record.document_id.clone(),
            file_name: record.file_name.clone(),
            file_type: record.file_type.clone(),
            text_length: record.text_length(),
            chunks_count: record.chunks_count,
            entities_count: record.entities.len(),
            relations_count: record.relations.len(),
            metadata: record.metadata.clone(),
            processing: record.processing.clone(),
            status: "success",
        }
    }
}

/// Copy a file into the upload directory and run it through
/// parse → segment → entities → relations → vector and graph indexing.
pub async fn ingest_path(state: &AppState, source: &Path) -> ApiResult<Arc<DocumentRecord>> {
    let file_type = FileReader::check_supported(source)
        .map_err(|e| ApiError::BadRequest(format!("不支持的文件类型: {e}")))?;

    let is_file = tokio::fs::metadata(source)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(ApiError::NotFound(format!(
            "File not found: {}",
            source.display()
        )));
    }

    let document_id = ingest::new_document_id();
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stored = store_upload(&state.config.server.upload_dir, source, &document_id, file_type.as_str())
        .await?;
    info!(%document_id, file = %file_name, "File uploaded");

    let timer = TimedOperation::start();
    let (parsed, chunks) = ingest::ingest_file(&stored, &document_id, &state.segmenter).await;
    if !parsed.is_success() {
        let reason = parsed.error.unwrap_or_else(|| "Parse error".to_string());
        if let Err(e) = tokio::fs::remove_file(&stored).await {
            warn!(path = %stored.display(), error = %e, "Failed to remove rejected upload");
        }
        return Err(ApiError::Internal(reason));
    }
    state.metrics.record_ingest(timer.elapsed(), chunks.len());

    let timer = TimedOperation::start();
    let extracted = extract::extract_all(
        &state.entity_extractor,
        &state.relation_extractor,
        &parsed.text,
    )
    .await?;
    state.metrics.record_extract(
        timer.elapsed(),
        extracted.entities.len(),
        extracted.relations.len(),
    );

    let mut metadata = parsed.metadata;
    metadata.file_name = file_name.clone();
    metadata.file_type = Some(file_type);

    let document = DocumentNode {
        id: document_id.clone(),
        file_name: file_name.clone(),
        title: metadata.title.clone(),
        author: metadata.author.clone(),
        created_at: metadata
            .created
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339()),
    };
    let mut chunk_metadata = Metadata::new();
    chunk_metadata.insert("file_name".into(), Value::from(file_name.as_str()));
    chunk_metadata.insert("file_type".into(), Value::from(file_type.as_str()));

    let timer = TimedOperation::start();
    let processing = state
        .indexer
        .index_document(DocumentBundle {
            document: &document,
            chunks: &chunks,
            chunk_metadata: &chunk_metadata,
            entities: &extracted.entities,
            relations: &extracted.relations,
        })
        .await;
    state.metrics.record_index(timer.elapsed());

    let record = state.documents.insert(DocumentRecord {
        document_id: document_id.clone(),
        file_name,
        file_type: file_type.as_str().to_string(),
        file_path: stored.to_string_lossy().into_owned(),
        text: parsed.text,
        chunks_count: chunks.len(),
        entities: extracted.entities,
        relations: extracted.relations,
        metadata,
        processing,
        created_at: Utc::now(),
    });

    info!(
        %document_id,
        chunks = record.chunks_count,
        entities = record.entities.len(),
        relations = record.relations.len(),
        "Document processed"
    );
    Ok(record)
}

async fn store_upload(
    upload_dir: &str,
    source: &Path,
    document_id: &str,
    extension: &str,
) -> ApiResult<PathBuf> {
    let dir = Path::new(upload_dir);
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to create upload directory: {e}")))?;
    let target = dir.join(format!("{document_id}.{extension}"));
    tokio::fs::copy(source, &target)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to store upload: {e}")))?;
    Ok(target)
}

/// Remove a document's chunks, graph data, stored file and registry record.
pub async fn delete_document(state: &AppState, document_id: &str) -> ApiResult<IndexOutcome> {
    let record = state
        .documents
        .remove(document_id)
        .ok_or_else(ApiError::document_not_found)?;

    let outcome = state.indexer.delete_document(document_id).await;
    if let Err(e) = tokio::fs::remove_file(&record.file_path).await {
        warn!(path = %record.file_path, error = %e, "Failed to remove stored file");
    }
    info!(document_id, ?outcome, "Document deleted");
    Ok(outcome)
}
