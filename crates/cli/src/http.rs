use crate::answer::{AnswerEngine, AskError};
use crate::limiter::RollingWindowLimiter;
use anyhow::{Context as AnyhowContext, Result};
use ashguard_retrieval::{ReinitMode, RetrievalError};
use axum::{
    body::Bytes,
    extract::State,
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub struct AppState {
    pub engine: AnswerEngine,
    pub limiter: RollingWindowLimiter,
    pub retry_after_secs: u64,
}

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: Option<String>,
}

#[derive(Deserialize, Default)]
struct ReinitRequest {
    #[serde(default)]
    mode: Option<ReinitMode>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/ask", post(http_ask))
        .route("/health", get(http_health))
        .route("/admin/reinit", post(http_reinit))
        .with_state(state)
}

pub async fn serve(bind: &str, state: Arc<AppState>) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    let local_addr = listener.local_addr()?;
    log::info!("Serving ask API: http://{local_addr}/api/ask");
    log::info!("Health endpoint: http://{local_addr}/health");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        log::info!("Shutting down");
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn http_ask(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let question = serde_json::from_slice::<AskRequest>(&body)
        .ok()
        .and_then(|req| req.question)
        .filter(|q| !q.trim().is_empty());
    let Some(question) = question else {
        return error_response(StatusCode::BAD_REQUEST, "No question provided");
    };

    if !state.limiter.try_acquire() {
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded, try again later",
        );
    }

    match state.engine.ask(&question).await {
        Ok(answer) => (StatusCode::OK, Json(answer)).into_response(),
        Err(err) => ask_error_response(&err, state.retry_after_secs),
    }
}

fn ask_error_response(err: &AskError, retry_after_secs: u64) -> Response {
    match err {
        AskError::Retrieval(RetrievalError::NotReady { phase }) => {
            let mut headers = HeaderMap::new();
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
            (
                StatusCode::SERVICE_UNAVAILABLE,
                headers,
                Json(json!({ "error": err.to_string(), "phase": phase })),
            )
                .into_response()
        }
        AskError::Retrieval(
            RetrievalError::Unavailable { .. } | RetrievalError::AlreadyInitializing,
        ) => error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        AskError::Retrieval(RetrievalError::EmptyQuestion) => {
            error_response(StatusCode::BAD_REQUEST, "No question provided")
        }
        AskError::Retrieval(RetrievalError::Embedding(_) | RetrievalError::Index(_)) => {
            log::error!("Retrieval failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        AskError::Llm(_) => {
            log::error!("{err}");
            error_response(StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}

async fn http_health(State(state): State<Arc<AppState>>) -> Response {
    let status = state.engine.service().status();
    Json(json!({
        "ready": status.phase == ashguard_retrieval::Phase::Ready,
        "phase": status.phase,
        "chunks": status.chunks,
    }))
    .into_response()
}

async fn http_reinit(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = if body.is_empty() {
        ReinitRequest::default()
    } else {
        match serde_json::from_slice::<ReinitRequest>(&body) {
            Ok(request) => request,
            Err(err) => {
                return error_response(StatusCode::BAD_REQUEST, format!("Invalid request: {err}"))
            }
        }
    };
    let mode = request.mode.unwrap_or(ReinitMode::Reload);

    let service = state.engine.service();
    match service.reinitialize(mode) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "accepted": true, "mode": mode, "phase": service.phase() })),
        )
            .into_response(),
        Err(err) => error_response(StatusCode::CONFLICT, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{LlmProvider, ProviderRequest};
    use ashguard_knowledge::{FetchError, Fetcher};
    use ashguard_retrieval::{InitStrategy, RetrievalService, ServiceConfig};
    use ashguard_vector_store::EmbeddingModel;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    const PAGE: &str = "https://example.org/ash";
    const TEXT: &str = "Wet down wildfire ash before cleanup and wear an N95.";

    struct StaticFetcher {
        stall: bool,
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, _url: &str, _timeout: Duration) -> Result<String, FetchError> {
            if self.stall {
                std::future::pending::<()>().await;
            }
            Ok(TEXT.to_string())
        }
    }

    struct EchoLlm;

    #[async_trait]
    impl LlmProvider for EchoLlm {
        async fn generate(&self, request: &ProviderRequest<'_>) -> anyhow::Result<String> {
            Ok(format!("Generated from {} chars.", request.prompt.len()))
        }
    }

    async fn spawn_app(
        tmp: &TempDir,
        strategy: InitStrategy,
        stall: bool,
        rate_limit: usize,
    ) -> (String, RetrievalService) {
        let config = ServiceConfig {
            data_dir: tmp.path().join("data"),
            sources: vec![PAGE.to_string()],
            init_strategy: strategy,
            ..ServiceConfig::default()
        };
        let service = RetrievalService::new(
            config,
            Arc::new(EmbeddingModel::stub()),
            Arc::new(StaticFetcher { stall }),
        )
        .unwrap();
        service.start().await.unwrap();

        let state = Arc::new(AppState {
            engine: AnswerEngine::new(service.clone(), Arc::new(EchoLlm), 3, 500),
            limiter: RollingWindowLimiter::new(rate_limit, Duration::from_secs(60)),
            retry_after_secs: 7,
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        (format!("http://{addr}"), service)
    }

    #[tokio::test]
    async fn test_ask_returns_answer_with_sources() {
        let tmp = TempDir::new().unwrap();
        let (base, _service) = spawn_app(&tmp, InitStrategy::Eager, false, 10).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/ask"))
            .json(&json!({ "question": "How do I clean up ash?" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["sources"], json!([PAGE]));
        let answer = body["answer"].as_str().unwrap();
        assert!(answer.contains(&format!("Source: {PAGE}")));
        assert!(answer.ends_with(crate::answer::DISCLAIMER));

        let health: serde_json::Value = client
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health, json!({ "ready": true, "phase": "ready", "chunks": 1 }));
    }

    #[tokio::test]
    async fn test_missing_question_is_bad_request() {
        let tmp = TempDir::new().unwrap();
        let (base, _service) = spawn_app(&tmp, InitStrategy::Eager, false, 10).await;
        let client = reqwest::Client::new();

        for body in ["{}", r#"{"question":"  "}"#, "not json"] {
            let resp = client
                .post(format!("{base}/api/ask"))
                .body(body)
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let json: serde_json::Value = resp.json().await.unwrap();
            assert_eq!(json["error"], "No question provided");
        }
    }

    #[tokio::test]
    async fn test_not_ready_is_503_with_retry_after() {
        let tmp = TempDir::new().unwrap();
        let (base, service) = spawn_app(&tmp, InitStrategy::Lazy, true, 10).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/ask"))
            .json(&json!({ "question": "Is the air safe?" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers()[RETRY_AFTER], "7");
        assert_eq!(service.phase(), ashguard_retrieval::Phase::Initializing);

        let reinit = reqwest::Client::new()
            .post(format!("{base}/admin/reinit"))
            .json(&json!({ "mode": "refetch" }))
            .send()
            .await
            .unwrap();
        assert_eq!(reinit.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_before_retrieval() {
        let tmp = TempDir::new().unwrap();
        let (base, _service) = spawn_app(&tmp, InitStrategy::Eager, false, 1).await;
        let client = reqwest::Client::new();
        let ask = || {
            client
                .post(format!("{base}/api/ask"))
                .json(&json!({ "question": "masks?" }))
                .send()
        };

        assert_eq!(ask().await.unwrap().status(), StatusCode::OK);
        assert_eq!(ask().await.unwrap().status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
