use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::TelegramConfig;
use crate::models::{DeliveryUnit, ReplyMarkup};

/// Minimal Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    api_url: String,
    parse_mode: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a ReplyMarkup>,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.token.trim().is_empty() {
            anyhow::bail!("TELEGRAM_TOKEN is required");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build telegram http client")?;
        Ok(Self {
            client,
            api_url: format!(
                "{}/bot{}",
                config.api_base_url.trim_end_matches('/'),
                config.token
            ),
            parse_mode: config.parse_mode.clone(),
        })
    }

    pub async fn get_me(&self) -> Result<BotIdentity> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Plain text, no markup parsing.
    pub async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text, None, None).await
    }

    pub async fn send_with_markup(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: &ReplyMarkup,
    ) -> Result<()> {
        self.send_message(chat_id, text, None, Some(reply_markup))
            .await
    }

    /// Sends one delivery unit; answer chunks use the configured dialect.
    pub async fn send_unit(&self, chat_id: i64, unit: &DeliveryUnit) -> Result<()> {
        match unit {
            DeliveryUnit::Chunk(chunk) => {
                self.send_message(
                    chat_id,
                    chunk.text.as_str(),
                    Some(self.parse_mode.as_str()),
                    None,
                )
                .await
            }
            DeliveryUnit::Citations(block) => self.send_text(chat_id, block).await,
        }
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<&str>,
        reply_markup: Option<&ReplyMarkup>,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                &SendMessage {
                    chat_id,
                    text,
                    parse_mode,
                    reply_markup,
                },
            )
            .await?;
        Ok(())
    }

    pub async fn send_typing(&self, chat_id: i64) -> Result<()> {
        let _: bool = self
            .call(
                "sendChatAction",
                &serde_json::json!({ "chat_id": chat_id, "action": "typing" }),
            )
            .await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut body = serde_json::json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = serde_json::Value::from(text);
        }
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    pub async fn send_document(&self, chat_id: i64, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read document {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")
            .context("invalid document mime type")?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);

        let response = self
            .client
            .post(format!("{}/sendDocument", self.api_url))
            .multipart(form)
            .send()
            .await
            .context("failed to call telegram sendDocument")?
            .json::<ApiResponse<serde_json::Value>>()
            .await
            .context("failed to decode telegram sendDocument response")?;
        unwrap_response(response, "sendDocument").map(|_| ())
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.api_url, method))
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to call telegram {method}"))?
            .json::<ApiResponse<T>>()
            .await
            .with_context(|| format!("failed to decode telegram {method} response"))?;
        unwrap_response(response, method)
    }
}

fn unwrap_response<T>(response: ApiResponse<T>, method: &str) -> Result<T> {
    if !response.ok {
        anyhow::bail!(
            "telegram {method} failed: {}",
            response
                .description
                .unwrap_or_else(|| "no description".to_string())
        );
    }
    response
        .result
        .ok_or_else(|| anyhow::anyhow!("telegram {method} returned no result"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_surface_the_description() {
        let response: ApiResponse<bool> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: can't parse entities"}"#,
        )
        .expect("decode");
        let err = unwrap_response(response, "sendMessage").unwrap_err();
        assert!(err.to_string().contains("can't parse entities"));
    }

    fn decode<T: for<'de> Deserialize<'de>>(raw: &str) -> ApiResponse<T> {
        serde_json::from_str(raw).expect("decode")
    }

    #[test]
    fn generic_results_decode_without_a_default() {
        let response: ApiResponse<BotIdentity> =
            decode(r#"{"ok":true,"result":{"id":7,"username":"designbot"}}"#);
        let identity = unwrap_response(response, "getMe").expect("identity");
        assert_eq!(identity.id, 7);
        assert_eq!(identity.username.as_deref(), Some("designbot"));

        let response: ApiResponse<serde_json::Value> = decode(r#"{"ok":false}"#);
        assert!(response.result.is_none());
        assert!(unwrap_response(response, "sendDocument").is_err());
    }

    #[test]
    fn message_body_omits_absent_fields() {
        let body = serde_json::to_value(SendMessage {
            chat_id: 10,
            text: "hi",
            parse_mode: None,
            reply_markup: None,
        })
        .expect("encode");
        assert_eq!(body, serde_json::json!({ "chat_id": 10, "text": "hi" }));
    }

    #[test]
    fn missing_token_is_rejected() {
        let config = TelegramConfig {
            token: String::new(),
            api_base_url: "https://api.telegram.org".to_string(),
            parse_mode: "MarkdownV2".to_string(),
        };
        assert!(TelegramClient::new(&config).is_err());
    }
}
