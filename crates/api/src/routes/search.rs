use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use index::RetrievedResult;

use super::{check_range, require_text};
use crate::error::ApiResult;
use crate::metrics::TimedOperation;
use crate::state::AppState;

const MAX_TOP_K: usize = 20;

#[derive(Serialize)]
pub struct SearchResponse {
    query: String,
    results_count: usize,
    results: Vec<RetrievedResult>,
}

impl SearchResponse {
    fn new(query: String, results: Vec<RetrievedResult>) -> Self {
        Self {
            query,
            results_count: results.len(),
            results,
        }
    }
}

#[derive(Deserialize)]
pub struct SearchParams {
    query: String,
    top_k: Option<usize>,
    document_id: Option<String>,
}

pub async fn semantic(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<SearchResponse>> {
    let Query(params) = params?;
    require_text("query", &params.query)?;
    let top_k = params
        .top_k
        .unwrap_or(state.config.retrieval.default_top_k);
    let top_k = check_range("top_k", top_k, 1..=MAX_TOP_K)?;
    let retriever = state.retriever()?;

    let timer = TimedOperation::start();
    let results = retriever
        .search(&params.query, top_k, params.document_id.as_deref())
        .await?;
    state.metrics.record_query(timer.elapsed());

    Ok(Json(SearchResponse::new(params.query, results)))
}

#[derive(Deserialize)]
pub struct HybridParams {
    query: String,
    top_k: Option<usize>,
    semantic_weight: Option<f32>,
}

pub async fn hybrid(
    State(state): State<Arc<AppState>>,
    params: Result<Query<HybridParams>, QueryRejection>,
) -> ApiResult<Json<SearchResponse>> {
    let Query(params) = params?;
    require_text("query", &params.query)?;
    let top_k = params.top_k.unwrap_or(state.config.retrieval.hybrid_top_k);
    let top_k = check_range("top_k", top_k, 1..=MAX_TOP_K)?;
    let weight = params
        .semantic_weight
        .unwrap_or(state.config.retrieval.semantic_weight);
    let weight = check_range("semantic_weight", weight, 0.0..=1.0)?;
    let retriever = state.retriever()?;

    let timer = TimedOperation::start();
    let results = retriever.hybrid_search(&params.query, top_k, weight).await?;
    state.metrics.record_query(timer.elapsed());

    Ok(Json(SearchResponse::new(params.query, results)))
}
