use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::error::{ApiError, ApiResult};
use crate::metrics::track_requests;
use crate::state::AppState;

mod documents;
mod kg;
mod llm;
mod qa;
mod search;
mod system;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        .route(
            "/api/documents",
            get(documents::list).post(documents::ingest),
        )
        .route(
            "/api/documents/:id",
            get(documents::detail).delete(documents::remove),
        )
        .route("/api/documents/:id/text", get(documents::text))
        .route("/api/documents/:id/entities", get(documents::entities))
        .route("/api/documents/:id/relations", get(documents::relations))
        .route("/api/kg/stats", get(kg::stats))
        .route("/api/kg/graph/:id", get(kg::document_graph))
        .route("/api/kg/entity/:text", get(kg::entity_neighbors))
        .route("/api/kg/search", get(kg::search_by_label))
        .route("/api/search", get(search::semantic))
        .route("/api/search/hybrid", get(search::hybrid))
        .route("/api/qa/ask", post(qa::ask))
        .route("/api/qa/summarize/:id", post(qa::summarize))
        .route("/api/llm/providers", get(llm::available))
        .route("/api/llm/providers/all", get(llm::all))
        .route("/api/llm/current", get(llm::current))
        .route("/api/llm/test", post(llm::test))
        .route("/api/llm/config", post(llm::configure))
        .route("/api/llm/switch", post(llm::switch))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Reject a parameter outside its allowed range.
fn check_range<T>(name: &str, value: T, range: RangeInclusive<T>) -> ApiResult<T>
where
    T: PartialOrd + Display + Copy,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ApiError::BadRequest(format!(
            "{name} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        )))
    }
}

fn require_text(name: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{name} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    pub(crate) async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[test]
    fn test_check_range() {
        assert_eq!(check_range("top_k", 5, 1..=20).unwrap(), 5);
        let err = check_range("semantic_weight", 1.5_f32, 0.0..=1.0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "semantic_weight must be between 0 and 1, got 1.5"
        );
        assert!(require_text("query", "  ").is_err());
    }
}
