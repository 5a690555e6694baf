use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;

use crate::documents::DocumentRecord;
use crate::error::{ApiError, ApiResult};
use crate::pipeline::{self, IngestReport};
use crate::state::AppState;

const MAX_RELATIONS_RETURNED: usize = 100;

#[derive(Deserialize)]
pub struct IngestRequest {
    path: String,
}

fn lookup(state: &AppState, id: &str) -> ApiResult<Arc<DocumentRecord>> {
    state
        .documents
        .get(id)
        .ok_or_else(ApiError::document_not_found)
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> ApiResult<Json<IngestReport>> {
    let Json(request) = payload?;
    super::require_text("path", &request.path)?;
    let record = pipeline::ingest_path(&state, &PathBuf::from(&request.path)).await?;
    Ok(Json(IngestReport::from(record.as_ref())))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<Value> {
    let documents = state.documents.list();
    Json(json!({
        "total": documents.len(),
        "documents": documents,
    }))
}

pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = lookup(&state, &id)?;
    Ok(Json(json!(record.detail())))
}

pub async fn text(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = lookup(&state, &id)?;
    Ok(Json(json!({
        "document_id": record.document_id,
        "text": record.text,
    })))
}

pub async fn entities(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = lookup(&state, &id)?;
    Ok(Json(json!({
        "document_id": record.document_id,
        "entities_count": record.entities.len(),
        "entities": record.entities,
    })))
}

pub async fn relations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = lookup(&state, &id)?;
    let shown = record.relations.len().min(MAX_RELATIONS_RETURNED);
    Ok(Json(json!({
        "document_id": record.document_id,
        "relations_count": record.relations.len(),
        "relations": &record.relations[..shown],
    })))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let processing = pipeline::delete_document(&state, &id).await?;
    Ok(Json(json!({
        "message": "Document deleted successfully",
        "document_id": id,
        "processing": processing,
    })))
}

#[cfg(test)]
mod tests {
    use crate::documents::tests::record;
    use crate::routes::{router, tests::call};
    use crate::state::tests::test_state;
    use axum::http::StatusCode;
    use extract::{Predicate, Relation};
    use serde_json::json;

    #[tokio::test]
    async fn test_document_views() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let mut doc = record("doc-1", "Python 很流行");
        doc.relations = (0..150)
            .map(|i| Relation {
                subject: format!("A{i}"),
                predicate: Predicate::Related,
                object: format!("B{i}"),
                confidence: 0.65,
                evidence: String::new(),
            })
            .collect();
        state.documents.insert(doc);
        let app = router(state);

        let (status, body) = call(&app, "GET", "/api/documents", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);

        let (_, body) = call(&app, "GET", "/api/documents/doc-1", None).await;
        assert_eq!(body["relations_count"], 150);
        assert_eq!(body["text_length"], 10);

        let (_, body) = call(&app, "GET", "/api/documents/doc-1/text", None).await;
        assert_eq!(body["text"], "Python 很流行");

        let (_, body) = call(&app, "GET", "/api/documents/doc-1/entities", None).await;
        assert_eq!(body["entities"][0]["text"], "Python");

        let (_, body) = call(&app, "GET", "/api/documents/doc-1/relations", None).await;
        assert_eq!(body["relations_count"], 150);
        assert_eq!(body["relations"].as_array().unwrap().len(), 100);

        let (status, body) = call(&app, "GET", "/api/documents/nope/text", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Document not found");
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn test_ingest_and_delete_over_http() {
        let uploads = tempfile::tempdir().unwrap();
        let inputs = tempfile::tempdir().unwrap();
        let source = inputs.path().join("notes.txt");
        std::fs::write(&source, "推荐系统依赖深度学习。").unwrap();
        let app = router(test_state(uploads.path()));

        let (status, body) = call(
            &app,
            "POST",
            "/api/documents",
            Some(json!({ "path": source.to_string_lossy() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["processing"]["vector"]["status"], "indexed");
        let id = body["document_id"].as_str().unwrap().to_string();

        let (status, _) = call(&app, "DELETE", &format!("/api/documents/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "GET", &format!("/api/documents/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app,
            "POST",
            "/api/documents",
            Some(json!({ "path": inputs.path().join("deck.pptx").to_string_lossy() })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
