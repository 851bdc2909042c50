use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use designbot::bot::BotHandler;
use designbot::chat::ChatService;
use designbot::documents::DocumentStore;
use designbot::ollama::OllamaClient;
use designbot::qdrant_store::QdrantStore;
use designbot::retrieval::Retriever;
use designbot::telegram::TelegramClient;
use designbot::{run_server, AnswerDeliveryPipeline, AppConfig, RequestGuard};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    let ollama = OllamaClient::new(config.ollama_base_url.clone())?;
    let qdrant = QdrantStore::new(
        config.qdrant_base_url.clone(),
        config.qdrant_collection.clone(),
    )?;
    let retriever = Retriever::new(qdrant, ollama.clone(), config.models.embedding_model.clone());

    let generation_limit = Arc::new(Semaphore::new(2));
    let chat = ChatService::new(config.clone(), ollama, retriever, generation_limit);

    let guard = RequestGuard::new();
    let pipeline = AnswerDeliveryPipeline::new(guard.clone(), config.delivery_settings());
    let telegram = TelegramClient::new(&config.telegram)?;
    let documents = DocumentStore::new(config.documents_dir.clone());
    if !documents.root().is_dir() {
        tracing::warn!(
            path = %documents.root().display(),
            "documents folder missing; listings and downloads will be empty"
        );
    }

    let bot = BotHandler::new(telegram.clone(), chat, pipeline, documents);
    run_server(config, bot, telegram, guard).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
