use std::cmp::Ordering;

use anyhow::Result;

use crate::models::PassageRecord;
use crate::ollama::OllamaClient;
use crate::qdrant_store::QdrantStore;

/// Question → most similar document passages.
#[derive(Clone)]
pub struct Retriever {
    qdrant: QdrantStore,
    ollama: OllamaClient,
    embedding_model: String,
}

impl Retriever {
    pub fn new(
        qdrant: QdrantStore,
        ollama: OllamaClient,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            qdrant,
            ollama,
            embedding_model: embedding_model.into(),
        }
    }

    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<PassageRecord>> {
        let embedding = self.ollama.embed(&self.embedding_model, question).await?;
        let mut passages = self.qdrant.search(&embedding, top_k).await?;
        rank_passages(&mut passages);
        passages.truncate(top_k);
        Ok(passages)
    }
}

/// Highest score first; passages without text are useless as context.
fn rank_passages(passages: &mut Vec<PassageRecord>) {
    passages.retain(|passage| !passage.text.trim().is_empty());
    passages.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(doc: &str, text: &str, score: f32) -> PassageRecord {
        PassageRecord {
            source_document: doc.to_string(),
            page_numbers: Default::default(),
            text: text.to_string(),
            score,
        }
    }

    #[test]
    fn ranking_drops_empty_passages_and_sorts_by_score() {
        let mut passages = vec![
            passage("a.pdf", "low", 0.2),
            passage("b.pdf", "   ", 0.9),
            passage("c.pdf", "high", 0.7),
        ];
        rank_passages(&mut passages);

        let docs: Vec<_> = passages.iter().map(|p| p.source_document.as_str()).collect();
        assert_eq!(docs, vec!["c.pdf", "a.pdf"]);
    }
}
