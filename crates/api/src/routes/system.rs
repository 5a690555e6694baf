use axum::{Json, extract::State};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

async fn rag_available(state: &AppState) -> bool {
    state.rag.is_some() && state.registry.is_available().await
}

pub async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    let rag_qa = rag_available(&state).await;
    Json(json!({
        "message": "Welcome to the document knowledge graph API",
        "version": VERSION,
        "features": {
            "file_parsing": true,
            "nlp_processing": true,
            "knowledge_graph": state.indexer.graph().is_some(),
            "vector_search": state.retriever.is_some(),
            "rag_qa": rag_qa,
        }
    }))
}

/// Per-dependency status. Always 200; a down dependency is reported, not raised.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let knowledge_graph = match state.indexer.graph() {
        None => json!({ "status": "disconnected", "nodes": 0, "relationships": 0 }),
        Some(graph) => match graph.stats().await {
            Ok(stats) => json!({
                "status": "connected",
                "backend": graph.backend(),
                "nodes": stats.nodes,
                "relationships": stats.relationships,
            }),
            Err(e) => json!({
                "status": "error",
                "backend": graph.backend(),
                "error": format!("{:#}", e),
            }),
        },
    };

    let vector_store = match state.indexer.vector() {
        None => json!({ "status": "unavailable", "total_chunks": 0 }),
        Some(index) => match index.stats().await {
            Ok(stats) => json!({
                "status": "available",
                "backend": stats.backend,
                "embedder": stats.embedder,
                "total_chunks": stats.chunks,
            }),
            Err(e) => json!({
                "status": "error",
                "error": format!("{:#}", e),
            }),
        },
    };

    let current = state.registry.current().await;
    let rag_engine = if rag_available(&state).await {
        "available"
    } else {
        "unavailable"
    };
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "services": {
            "pdf_parser": "available",
            "word_parser": "available",
            "ner_engine": state.entity_extractor.strategy(),
            "knowledge_graph": knowledge_graph,
            "vector_store": vector_store,
            "rag_engine": rag_engine,
            "llm": current,
        },
        "documents": state.documents.len(),
    }))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "metrics": state.metrics.snapshot(),
        "cache": state.cache.as_ref().map(|c| c.stats()),
    }))
}

#[cfg(test)]
mod tests {
    use crate::routes::{router, tests::call};
    use crate::state::tests::test_state;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_root_and_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let (status, body) = call(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["features"]["knowledge_graph"], true);
        assert_eq!(body["features"]["rag_qa"], false);

        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["services"]["knowledge_graph"]["status"], "connected");
        assert_eq!(body["services"]["vector_store"]["total_chunks"], 0);
        assert_eq!(body["services"]["ner_engine"], "rules");
        assert_eq!(body["services"]["llm"]["provider"], "none");

        let (_, body) = call(&app, "GET", "/metrics", None).await;
        assert!(body["metrics"]["total_requests"].as_u64().unwrap() >= 2);
    }
}
