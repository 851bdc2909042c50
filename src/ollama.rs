use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Embedding and generation client for a local Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build ollama http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let input = text.trim();
        if input.is_empty() {
            anyhow::bail!("cannot embed an empty question");
        }

        // /api/embed replaced /api/embeddings; older servers only have the latter.
        match self.embed_current(model, input).await {
            Ok(vector) => Ok(vector),
            Err(current_err) => self.embed_legacy(model, input).await.map_err(|legacy_err| {
                anyhow::anyhow!(
                    "ollama embedding failed via /api/embed ({current_err}) and \
                     /api/embeddings ({legacy_err}); is `{model}` pulled?"
                )
            }),
        }
    }

    async fn embed_current(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct EmbedReq<'a> {
            model: &'a str,
            input: &'a str,
        }

        #[derive(Deserialize)]
        struct EmbedResp {
            embeddings: Vec<Vec<f32>>,
        }

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedReq { model, input: text })
            .send()
            .await
            .context("failed to call ollama /api/embed")?;
        let response = check_status(response, "/api/embed").await?;

        response
            .json::<EmbedResp>()
            .await
            .context("failed to decode ollama /api/embed response")?
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("ollama /api/embed returned no embeddings"))
    }

    async fn embed_legacy(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct EmbeddingReq<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct EmbeddingResp {
            embedding: Vec<f32>,
        }

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&EmbeddingReq {
                model,
                prompt: text,
            })
            .send()
            .await
            .context("failed to call ollama /api/embeddings")?;
        let response = check_status(response, "/api/embeddings").await?;

        Ok(response
            .json::<EmbeddingResp>()
            .await
            .context("failed to decode ollama /api/embeddings response")?
            .embedding)
    }

    pub async fn generate_text(
        &self,
        model: &str,
        prompt: &str,
        num_predict: usize,
        temperature: f32,
    ) -> Result<String> {
        #[derive(Serialize)]
        struct GenerateReq<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            options: GenerateOptions,
        }

        #[derive(Serialize)]
        struct GenerateOptions {
            num_predict: usize,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct GenerateResp {
            response: String,
        }

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&GenerateReq {
                model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    num_predict,
                    temperature,
                },
            })
            .send()
            .await
            .context("failed to call ollama /api/generate")?;
        let response = check_status(response, "/api/generate").await?;

        let generated = response
            .json::<GenerateResp>()
            .await
            .context("failed to decode ollama /api/generate response")?;
        Ok(generated.response.trim().to_string())
    }
}

async fn check_status(response: reqwest::Response, route: &str) -> Result<reqwest::Response> {
    if response.status() == StatusCode::OK {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("ollama {route} returned {status}: {}", error_body(&body))
}

fn error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|json| json.get("error").and_then(|v| v.as_str()).map(str::to_string))
        .unwrap_or_else(|| trimmed.to_string())
}
