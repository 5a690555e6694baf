use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use query::{CurrentProvider, TestOutcome};

use super::require_text;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn available(State(state): State<Arc<AppState>>) -> Json<Value> {
    let providers = state.registry.available().await;
    if providers.is_empty() {
        return Json(json!({
            "providers": [],
            "current": null,
            "message": "No LLM providers configured",
        }));
    }
    Json(json!({
        "providers": providers,
        "current": state.registry.current().await,
    }))
}

pub async fn all(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "providers": state.registry.all().await }))
}

pub async fn current(State(state): State<Arc<AppState>>) -> Json<CurrentProvider> {
    Json(state.registry.current().await)
}

#[derive(Deserialize)]
pub struct CredentialRequest {
    provider: String,
    api_key: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default = "default_set_as_current")]
    set_as_current: bool,
}

fn default_set_as_current() -> bool {
    true
}

pub async fn test(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CredentialRequest>, JsonRejection>,
) -> ApiResult<Json<TestOutcome>> {
    let Json(request) = payload?;
    require_text("api_key", &request.api_key)?;
    let outcome = state
        .registry
        .test(&request.provider, &request.api_key, request.model.as_deref())
        .await;
    if !outcome.success {
        return Err(ApiError::BadRequest(outcome.message));
    }
    Ok(Json(outcome))
}

pub async fn configure(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CredentialRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    require_text("api_key", &request.api_key)?;
    let model = request.model.as_deref();
    state
        .registry
        .configure(&request.provider, &request.api_key, model)
        .await?;

    let current = if request.set_as_current {
        state.registry.switch(&request.provider, model).await?
    } else {
        state.registry.current().await
    };
    info!(provider = %current.provider, model = %current.model, "LLM provider configured");

    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully configured {}", current.name),
        "current": current,
    })))
}

#[derive(Deserialize)]
pub struct SwitchRequest {
    provider: String,
    #[serde(default)]
    model: Option<String>,
}

pub async fn switch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SwitchRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    if !state.registry.is_available().await {
        return Err(ApiError::Unavailable("LLM provider"));
    }
    let current = state
        .registry
        .switch(&request.provider, request.model.as_deref())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully switched to {}", current.name),
        "current": current,
    })))
}

#[cfg(test)]
mod tests {
    use crate::routes::{router, tests::call};
    use crate::state::tests::test_state;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_registry_routes() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let (_, body) = call(&app, "GET", "/api/llm/providers", None).await;
        assert_eq!(body["providers"].as_array().unwrap().len(), 0);
        assert!(body["current"].is_null());

        let (status, _) = call(&app, "POST", "/api/llm/switch", Some(json!({ "provider": "qwen" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = call(
            &app,
            "POST",
            "/api/llm/config",
            Some(json!({ "provider": "qwen", "api_key": "sk-local", "model": "qwen-max" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current"]["provider"], "qwen");
        assert_eq!(body["current"]["model"], "qwen-max");

        let (_, body) = call(&app, "GET", "/api/llm/current", None).await;
        assert_eq!(body["name"], "千问 (通义千问)");

        let (_, body) = call(&app, "GET", "/api/llm/providers/all", None).await;
        assert_eq!(body["providers"].as_array().unwrap().len(), query::CATALOGUE.len());

        let (status, _) = call(&app, "POST", "/api/llm/switch", Some(json!({ "provider": "openai" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            "POST",
            "/api/llm/config",
            Some(json!({ "provider": "wenxin", "api_key": "k" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown provider: wenxin");

        let (status, body) = call(
            &app,
            "POST",
            "/api/llm/test",
            Some(json!({ "provider": "wenxin", "api_key": "k" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "未知的提供商: wenxin");
    }

    #[tokio::test]
    async fn test_body_must_be_json() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/llm/switch")
            .body(axum::body::Body::from("provider=qwen"))
            .unwrap();
        let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
