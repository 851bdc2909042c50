pub mod bot;
pub mod chat;
pub mod citations;
pub mod commands;
pub mod config;
pub mod delivery;
pub mod documents;
pub mod error;
pub mod guard;
pub mod markup;
pub mod models;
pub mod ollama;
pub mod qdrant_store;
pub mod retrieval;
pub mod segment;
pub mod server;
pub mod telegram;

pub use config::AppConfig;
pub use delivery::{AnswerDeliveryPipeline, DeliverySettings};
pub use error::DeliveryError;
pub use guard::RequestGuard;
pub use server::run_server;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
