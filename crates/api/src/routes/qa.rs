use axum::{
    Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
};
use serde::Deserialize;
use std::sync::Arc;

use query::{Answer, SUMMARY_LENGTH_RANGE, Summary};

use super::{check_range, require_text};
use crate::error::{ApiError, ApiResult};
use crate::metrics::TimedOperation;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AskRequest {
    question: String,
    #[serde(default)]
    document_id: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default = "default_use_hybrid")]
    use_hybrid: bool,
}

fn default_use_hybrid() -> bool {
    true
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> ApiResult<Json<Answer>> {
    let Json(request) = payload?;
    require_text("question", &request.question)?;
    let top_k = request.top_k.unwrap_or(state.config.retrieval.default_top_k);
    let top_k = check_range("top_k", top_k, 1..=10)?;
    let rag = state.rag()?;

    if let Some(id) = &request.document_id {
        if !state.documents.contains(id) {
            return Err(ApiError::document_not_found());
        }
    }

    let timer = TimedOperation::start();
    let answer = rag
        .ask(
            &request.question,
            request.document_id.as_deref(),
            top_k,
            request.use_hybrid,
        )
        .await;
    state.metrics.record_query(timer.elapsed());
    Ok(Json(answer))
}

#[derive(Deserialize)]
pub struct SummarizeParams {
    #[serde(default = "default_max_length")]
    max_length: usize,
}

fn default_max_length() -> usize {
    500
}

pub async fn summarize(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    params: Result<Query<SummarizeParams>, QueryRejection>,
) -> ApiResult<Json<Summary>> {
    let Query(params) = params?;
    let max_length = check_range("max_length", params.max_length, SUMMARY_LENGTH_RANGE)?;
    let summary = state.rag()?.summarize_document(&id, max_length).await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use crate::routes::{router, tests::call};
    use crate::state::tests::test_state;
    use axum::http::StatusCode;
    use index::Metadata;
    use ingest::Chunk;
    use serde_json::json;

    #[tokio::test]
    async fn test_ask_without_provider_returns_sources() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state
            .indexer
            .vector()
            .unwrap()
            .add_chunks(
                &[Chunk::new("a", 0, "知识图谱 由 实体 组成".into(), 0, 13)],
                &Metadata::new(),
            )
            .await
            .unwrap();
        let app = router(state);

        let (status, body) = call(
            &app,
            "POST",
            "/api/qa/ask",
            Some(json!({ "question": "知识图谱" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sources"].as_array().unwrap().len(), 1);
        assert!(body["error"].is_string());

        let (status, _) = call(
            &app,
            "POST",
            "/api/qa/ask",
            Some(json!({ "question": "知识图谱", "top_k": 11 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/api/qa/ask",
            Some(json!({ "question": "知识图谱", "document_id": "missing" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_summarize_validation() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let (status, _) = call(&app, "POST", "/api/qa/summarize/a?max_length=50", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, "POST", "/api/qa/summarize/a", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "LLM provider not available");
    }
}
