use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use designbot::chat::ChatService;
use designbot::commands::Topic;
use designbot::models::{Delivery, DeliveryUnit, Principal};
use designbot::ollama::OllamaClient;
use designbot::qdrant_store::QdrantStore;
use designbot::retrieval::Retriever;
use designbot::{AnswerDeliveryPipeline, AppConfig, RequestGuard};

#[derive(Parser, Debug)]
#[command(name = "ask")]
#[command(about = "Answer a design question in the terminal and print the messages the bot would send")]
struct Cli {
    /// Ground the answer on the document library instead of the model alone.
    #[arg(long, default_value_t = false)]
    search: bool,
    #[arg(long, default_value_t = 0)]
    user: i64,
    /// Overrides MAX_CHUNK_SIZE.
    #[arg(long)]
    max_chunk_size: Option<usize>,
    #[arg(required = true)]
    question: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(max_chunk_size) = cli.max_chunk_size {
        config.max_chunk_size = max_chunk_size;
    }

    let ollama = OllamaClient::new(config.ollama_base_url.clone())?;
    let qdrant = QdrantStore::new(
        config.qdrant_base_url.clone(),
        config.qdrant_collection.clone(),
    )?;
    let retriever = Retriever::new(qdrant, ollama.clone(), config.models.embedding_model.clone());
    let chat = ChatService::new(config.clone(), ollama, retriever, Arc::new(Semaphore::new(1)));
    let pipeline = AnswerDeliveryPipeline::new(RequestGuard::new(), config.delivery_settings());

    let question = cli.question.join(" ");
    let delivery = pipeline
        .deliver_with(Principal(cli.user), || async {
            if cli.search {
                chat.answer_from_documents(&question).await
            } else {
                chat.answer_general(Topic::General, &question).await
            }
        })
        .await;

    match delivery {
        Delivery::Delivered(units) => {
            for unit in units {
                match unit {
                    DeliveryUnit::Chunk(chunk) => {
                        let marker = if chunk.is_final { " (final)" } else { "" };
                        println!(
                            "--- chunk {}{} [{} chars] ---",
                            chunk.index,
                            marker,
                            chunk.text.char_len()
                        );
                        println!("{}", chunk.text);
                    }
                    DeliveryUnit::Citations(block) => {
                        println!("--- references ---");
                        println!("{block}");
                    }
                }
            }
        }
        Delivery::Failed(notice) => println!("{notice}"),
        Delivery::Rejected => println!("request rejected: already in flight"),
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
