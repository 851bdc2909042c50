use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::models::PassageRecord;

/// Read-only client for the Qdrant collection holding document passages.
#[derive(Clone)]
pub struct QdrantStore {
    client: Client,
    base_url: String,
    collection: String,
}

impl QdrantStore {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build qdrant http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
        })
    }

    pub async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<PassageRecord>> {
        if vector.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        );
        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("failed to contact qdrant during search")?
            .error_for_status()
            .context("qdrant search returned non-success status")?
            .json::<SearchResponse>()
            .await
            .context("failed to decode qdrant search response")?;

        Ok(response
            .result
            .into_iter()
            .filter_map(ScoredPoint::into_passage)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: Option<PassagePayload>,
}

#[derive(Debug, Deserialize)]
struct PassagePayload {
    #[serde(default)]
    document: String,
    #[serde(default)]
    pages: Vec<u32>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: String,
}

impl ScoredPoint {
    fn into_passage(self) -> Option<PassageRecord> {
        let payload = self.payload?;
        Some(PassageRecord {
            source_document: payload.document,
            page_numbers: payload.pages.into_iter().chain(payload.page).collect(),
            text: payload.text,
            score: self.score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_pages_are_merged() {
        let response: SearchResponse = serde_json::from_value(json!({
            "result": [
                { "score": 0.82, "payload": { "document": "UI_Patterns/Buttons.pdf", "pages": [4, 3], "page": 7, "text": "Primary buttons..." } },
                { "score": 0.40, "payload": null },
                { "score": 0.31, "payload": { "document": "Accessibility.pdf" } }
            ]
        }))
        .expect("decode");

        let passages: Vec<_> = response
            .result
            .into_iter()
            .filter_map(ScoredPoint::into_passage)
            .collect();

        assert_eq!(passages.len(), 2);
        assert_eq!(
            passages[0].page_numbers.iter().copied().collect::<Vec<_>>(),
            vec![3, 4, 7]
        );
        assert!(passages[1].page_numbers.is_empty());
    }
}
