use std::env;
use std::path::PathBuf;

use crate::delivery::DeliverySettings;

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub answer_model: String,
    pub embedding_model: String,
    pub max_output_tokens: usize,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub token: String,
    pub api_base_url: String,
    pub parse_mode: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub documents_dir: PathBuf,
    pub ollama_base_url: String,
    pub qdrant_base_url: String,
    pub qdrant_collection: String,
    pub search_top_k: usize,
    pub max_chunk_size: usize,
    pub max_references: Option<usize>,
    pub models: ModelConfig,
    pub telegram: TelegramConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("DESIGNBOT_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            documents_dir: env::var("DOCUMENTS_FOLDER")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./documents")),
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string()),
            qdrant_base_url: env::var("QDRANT_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:6333".to_string()),
            qdrant_collection: env::var("QDRANT_COLLECTION")
                .unwrap_or_else(|_| "design_chunks".to_string()),
            search_top_k: parse_var("SEARCH_TOP_K").unwrap_or(5),
            max_chunk_size: parse_var("MAX_CHUNK_SIZE").unwrap_or(3_500),
            max_references: parse_var("MAX_REFERENCES"),
            models: ModelConfig {
                answer_model: env::var("ANSWER_MODEL")
                    .unwrap_or_else(|_| "qwen2.5:14b-instruct".to_string()),
                embedding_model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "mxbai-embed-large".to_string()),
                max_output_tokens: parse_var("MAX_OUTPUT_TOKENS").unwrap_or(700),
            },
            telegram: TelegramConfig {
                token: env::var("TELEGRAM_TOKEN").unwrap_or_default(),
                api_base_url: env::var("TELEGRAM_API_BASE")
                    .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
                parse_mode: env::var("TELEGRAM_PARSE_MODE")
                    .unwrap_or_else(|_| "MarkdownV2".to_string()),
            },
        }
    }

    pub fn delivery_settings(&self) -> DeliverySettings {
        DeliverySettings {
            max_chunk_size: self.max_chunk_size,
            max_references: self.max_references,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
