use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use index::graph_store::{MAX_NEIGHBOR_DEPTH, MAX_NEIGHBOR_LIMIT};
use index::{GraphStats, Subgraph};

use super::{check_range, require_text};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<GraphStats>> {
    let stats = state.graph()?.stats().await?;
    Ok(Json(stats))
}

pub async fn document_graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Subgraph>> {
    state
        .graph()?
        .document_graph(&id)
        .await?
        .map(Json)
        .ok_or_else(ApiError::document_not_found)
}

#[derive(Deserialize)]
pub struct NeighborParams {
    #[serde(default = "default_depth")]
    max_depth: usize,
    #[serde(default = "default_neighbor_limit")]
    limit: usize,
}

fn default_depth() -> usize {
    2
}

fn default_neighbor_limit() -> usize {
    50
}

pub async fn entity_neighbors(
    State(state): State<Arc<AppState>>,
    Path(text): Path<String>,
    params: Result<Query<NeighborParams>, QueryRejection>,
) -> ApiResult<Json<Subgraph>> {
    let Query(params) = params?;
    let max_depth = check_range("max_depth", params.max_depth, 1..=MAX_NEIGHBOR_DEPTH)?;
    let limit = check_range("limit", params.limit, 1..=MAX_NEIGHBOR_LIMIT)?;

    state
        .graph()?
        .entity_neighbors(&text, max_depth, limit)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Entity not found: {text}")))
}

#[derive(Deserialize)]
pub struct LabelParams {
    label: String,
    #[serde(default = "default_label_limit")]
    limit: usize,
}

fn default_label_limit() -> usize {
    20
}

pub async fn search_by_label(
    State(state): State<Arc<AppState>>,
    params: Result<Query<LabelParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(params) = params?;
    require_text("label", &params.label)?;
    let limit = check_range("limit", params.limit, 1..=100)?;

    let label = params.label.to_uppercase();
    let entities = state.graph()?.search_by_label(&label, limit).await?;
    Ok(Json(json!({ "entities": entities })))
}

#[cfg(test)]
mod tests {
    use crate::routes::{router, tests::call};
    use crate::state::AppState;
    use crate::state::tests::test_state;
    use axum::http::StatusCode;
    use extract::Entity;
    use index::DocumentNode;
    use std::sync::Arc;

    async fn seeded() -> (tempfile::TempDir, Arc<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let graph = state.graph().unwrap().clone();
        graph
            .create_document(&DocumentNode {
                id: "d1".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        graph
            .add_mentions(
                "d1",
                &[
                    Entity::new("Rust", "TECH", 0, 4, 0.9),
                    Entity::new("清华大学", "ORG", 5, 9, 0.85),
                ],
            )
            .await
            .unwrap();
        (dir, state)
    }

    #[tokio::test]
    async fn test_graph_routes() {
        let (_dir, state) = seeded().await;
        let app = router(state);

        let (status, body) = call(&app, "GET", "/api/kg/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["documents"], 1);
        assert_eq!(body["entities"], 2);

        let (status, body) = call(&app, "GET", "/api/kg/graph/d1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nodes"].as_array().unwrap().len(), 2);

        let (status, _) = call(&app, "GET", "/api/kg/graph/unknown", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(&app, "GET", "/api/kg/search?label=org", None).await;
        assert_eq!(body["entities"][0]["text"], "清华大学");

        let (status, _) = call(&app, "GET", "/api/kg/entity/Rust?max_depth=9", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "GET", "/api/kg/search", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_graph_disabled_is_unavailable() {
        let state = AppState::assemble(
            crate::config::AppConfig::default(),
            extract::EntityExtractor::rules(),
            None,
            None,
            Arc::new(query::ProviderRegistry::new()),
            None,
        );
        let app = router(Arc::new(state));

        let (status, body) = call(&app, "GET", "/api/kg/stats", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Knowledge Graph not available");
    }
}
