use std::sync::Arc;

use anyhow::Result;
use regex::Regex;
use tokio::sync::Semaphore;

use crate::citations::{display_name, format_pages};
use crate::commands::Topic;
use crate::config::AppConfig;
use crate::models::{GeneratedAnswer, PassageRecord};
use crate::ollama::OllamaClient;
use crate::retrieval::Retriever;

pub const NOT_FOUND_MESSAGE: &str = "❓ I couldn't find documents related to your question.";

const PASSAGE_CHAR_LIMIT: usize = 1_500;

/// Produces raw answers: either from the model alone or grounded on
/// retrieved passages.
#[derive(Clone)]
pub struct ChatService {
    config: AppConfig,
    ollama: OllamaClient,
    retriever: Retriever,
    generation_limit: Arc<Semaphore>,
}

impl ChatService {
    pub fn new(
        config: AppConfig,
        ollama: OllamaClient,
        retriever: Retriever,
        generation_limit: Arc<Semaphore>,
    ) -> Self {
        Self {
            config,
            ollama,
            retriever,
            generation_limit,
        }
    }

    pub async fn answer_general(&self, topic: Topic, question: &str) -> Result<GeneratedAnswer> {
        let framed = format!("{}{}", topic.context_prefix(), question.trim());
        tracing::info!(topic = topic.as_str(), question = %preview(&framed), "generating answer");

        let prompt = build_general_prompt(&framed);
        let text = self.generate(&prompt).await?;
        Ok(GeneratedAnswer {
            text,
            passages: vec![],
        })
    }

    pub async fn answer_from_documents(&self, question: &str) -> Result<GeneratedAnswer> {
        tracing::info!(question = %preview(question), "searching documents");

        let passages = self
            .retriever
            .retrieve(question, self.config.search_top_k)
            .await?;
        if passages.is_empty() {
            return Ok(GeneratedAnswer {
                text: NOT_FOUND_MESSAGE.to_string(),
                passages,
            });
        }

        let prompt = build_grounded_prompt(question, &passages);
        let text = self.generate(&prompt).await?;
        Ok(GeneratedAnswer { text, passages })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let _permit = self.generation_limit.acquire().await?;
        let text = self
            .ollama
            .generate_text(
                &self.config.models.answer_model,
                prompt,
                self.config.models.max_output_tokens,
                0.2,
            )
            .await?;

        let text = strip_wrapping_fence(text);
        if text.is_empty() {
            anyhow::bail!("model returned an empty answer");
        }
        Ok(text)
    }
}

fn build_general_prompt(question: &str) -> String {
    format!(
        "You are DesignBot, an assistant specialised in UX and UI design.\n\
         Answer clearly and practically, with concrete examples where they help.\n\
         Use short paragraphs separated by blank lines. Use **bold** for key terms.\n\
         Never wrap the whole answer in a code block.\n\n\
         Question:\n{question}\n"
    )
}

fn build_grounded_prompt(question: &str, passages: &[PassageRecord]) -> String {
    let context = passages
        .iter()
        .enumerate()
        .map(|(index, passage)| {
            let excerpt: String = passage.text.chars().take(PASSAGE_CHAR_LIMIT).collect();
            format!(
                "[S{}] {} (p. {})\n{}",
                index + 1,
                display_name(&passage.source_document),
                format_pages(&passage.page_numbers),
                excerpt.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are DesignBot, an assistant specialised in UX and UI design.\n\
         Answer using only the excerpts below. If they do not cover the question, say so.\n\
         Use short paragraphs separated by blank lines. Do not list the sources at the end; \
         they are sent separately.\n\n\
         Excerpts:\n{context}\n\n\
         Question:\n{question}\n"
    )
}

fn strip_wrapping_fence(answer: String) -> String {
    let text = answer.trim();
    if !text.starts_with("```") {
        return text.to_string();
    }

    match Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```$") {
        Ok(re) => match re.captures(text).and_then(|caps| caps.get(1)) {
            Some(body) => body.as_str().trim().to_string(),
            None => text.to_string(),
        },
        Err(_) => text.to_string(),
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(50).collect();
    if text.chars().count() > 50 {
        out.push_str("...");
    }
    out
}
