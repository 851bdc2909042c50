use std::net::SocketAddr;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::bot::BotHandler;
use crate::config::AppConfig;
use crate::guard::RequestGuard;
use crate::models::Update;
use crate::telegram::TelegramClient;

#[derive(Clone)]
struct AppState {
    bot: BotHandler,
    telegram: TelegramClient,
    guard: RequestGuard,
}

pub async fn run_server(
    config: AppConfig,
    bot: BotHandler,
    telegram: TelegramClient,
    guard: RequestGuard,
) -> Result<()> {
    let app = router(AppState {
        bot,
        telegram,
        guard,
    });

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Acknowledges the update right away; answering can take a while and
/// Telegram retries webhooks that do not respond promptly.
async fn webhook(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    if body.is_empty() {
        tracing::warn!("webhook received without data");
        return Err(ApiError::bad_request("no data".to_string()));
    }

    let update: Update = serde_json::from_slice(&body)
        .map_err(|err| ApiError::bad_request(format!("invalid update: {err}")))?;
    let update_id = update.update_id;

    tokio::spawn(async move {
        if let Err(err) = state.bot.handle_update(update).await {
            tracing::error!(update_id, error = %format!("{err:#}"), "update processing failed");
        }
    });

    tracing::info!(update_id, "webhook accepted");
    Ok(Json(json!({ "status": "ok" })))
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "DesignBot API is running",
        "status": "online",
        "version": crate::VERSION,
        "endpoints": {
            "webhook": "/webhook (POST)",
            "health": "/health (GET)",
        },
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let in_flight = state.guard.in_flight_count();
    match state.telegram.get_me().await {
        Ok(identity) => Json(json!({
            "status": "healthy",
            "version": crate::VERSION,
            "in_flight": in_flight,
            "bot_info": {
                "id": identity.id,
                "username": identity.username,
                "first_name": identity.first_name,
            },
        })),
        Err(err) => {
            tracing::warn!(error = %err, "telegram unreachable during health check");
            Json(json!({
                "status": "degraded",
                "version": crate::VERSION,
                "in_flight": in_flight,
                "error": err.to_string(),
            }))
        }
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({ "status": "error", "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tokio::sync::Semaphore;
    use tower::ServiceExt;

    use super::*;
    use crate::chat::ChatService;
    use crate::delivery::AnswerDeliveryPipeline;
    use crate::documents::DocumentStore;
    use crate::ollama::OllamaClient;
    use crate::qdrant_store::QdrantStore;
    use crate::retrieval::Retriever;

    fn test_state() -> AppState {
        let mut config = AppConfig::from_env();
        config.telegram.token = "123:test".to_string();
        config.telegram.api_base_url = "http://127.0.0.1:9".to_string();

        let telegram = TelegramClient::new(&config.telegram).expect("telegram client");
        let ollama = OllamaClient::new(config.ollama_base_url.clone()).expect("ollama client");
        let qdrant = QdrantStore::new(
            config.qdrant_base_url.clone(),
            config.qdrant_collection.clone(),
        )
        .expect("qdrant client");
        let retriever = Retriever::new(qdrant, ollama.clone(), config.models.embedding_model.clone());
        let chat = ChatService::new(config.clone(), ollama, retriever, Arc::new(Semaphore::new(1)));
        let guard = RequestGuard::new();
        let pipeline = AnswerDeliveryPipeline::new(guard.clone(), config.delivery_settings());
        let bot = BotHandler::new(
            telegram.clone(),
            chat,
            pipeline,
            DocumentStore::new(config.documents_dir.clone()),
        );

        AppState {
            bot,
            telegram,
            guard,
        }
    }

    async fn post_webhook(body: &'static str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .expect("request");
        let response = router(test_state()).oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn webhook_rejects_empty_body() {
        let (status, body) = post_webhook("").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn webhook_rejects_unparsable_update() {
        let (status, body) = post_webhook("{\"not\": \"an update\"}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"]
            .as_str()
            .is_some_and(|message| message.starts_with("invalid update")));
    }

    #[tokio::test]
    async fn webhook_acknowledges_valid_update() {
        let (status, body) = post_webhook("{\"update_id\": 42}").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn index_describes_the_service() {
        let request = Request::builder()
            .uri("/")
            .body(Body::empty())
            .expect("request");
        let response = router(test_state()).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body["status"], "online");
        assert_eq!(body["endpoints"]["webhook"], "/webhook (POST)");
    }
}
