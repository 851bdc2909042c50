use std::time::Instant;

use anyhow::Result;

use crate::chat::ChatService;
use crate::citations::aggregate;
use crate::commands::{
    download_callback, list_callback, main_keyboard_rows, parse_callback, parse_message,
    CallbackAction, Category, Command, Topic, BACK_MAIN,
};
use crate::delivery::{AnswerDeliveryPipeline, BUSY_NOTICE};
use crate::documents::{CategoryListing, DocumentStore};
use crate::markup::visible_text;
use crate::models::{
    CallbackQuery, Citation, Delivery, DeliveryUnit, InlineKeyboardButton, InlineKeyboardMarkup,
    KeyboardButton, Message, Principal, ReplyKeyboardMarkup, ReplyMarkup, Update,
};
use crate::telegram::TelegramClient;

// Telegram rejects callback data longer than this many bytes.
const CALLBACK_DATA_LIMIT: usize = 64;

const WELCOME_TEXT: &str = "🎨 DesignBot, your UX/UI design assistant\n\n\
    I can help with:\n\n\
    • /design: design principles and theory\n\
    • /ux: research, usability and user experience\n\
    • /ui: interfaces, patterns and components\n\
    • /tools: guides for Figma, Sketch, Adobe XD\n\
    • /search: search the design library\n\n\
    💡 Use /ask for any other design question.";

const HELP_TEXT: &str = "🎨 UX/UI design commands\n\n\
    📋 Focused questions:\n\
    • /design <question>: design principles and theory\n\
    • /ux <question>: research and user experience\n\
    • /ui <question>: interfaces and visual patterns\n\
    • /tools <question>: Figma, Sketch and friends\n\n\
    🔍 Search:\n\
    • /search <query>: answer from the design library\n\
    • /ask <question>: general design questions\n\n\
    📚 Browse the library by category with the buttons below.";

const SEARCH_HELP_TEXT: &str = "🔍 Searching the UX/UI library\n\n\
    • /search <topic>: search the design resources\n\
    • /design, /ux, /ui, /tools <question>: focused answers\n\n\
    Example: /search atomic design";

const MENU_TEXT: &str = "🎨 What are we designing today?\n\n\
    Try /design, /ux, /ui, /tools or /ask followed by your question, \
    or /search <topic> to search the library.";

const SEARCH_USAGE: &str = "❌ Usage: /search <your query>";
const SEARCH_PROGRESS: &str = "⏳ Generating an answer from the most relevant documents...";

/// Routes Telegram updates to the answer pipeline and the document library.
#[derive(Clone)]
pub struct BotHandler {
    telegram: TelegramClient,
    chat: ChatService,
    pipeline: AnswerDeliveryPipeline,
    documents: DocumentStore,
}

impl BotHandler {
    pub fn new(
        telegram: TelegramClient,
        chat: ChatService,
        pipeline: AnswerDeliveryPipeline,
        documents: DocumentStore,
    ) -> Self {
        Self {
            telegram,
            chat,
            pipeline,
            documents,
        }
    }

    pub async fn handle_update(&self, update: Update) -> Result<()> {
        if let Some(callback) = update.callback_query {
            return self.handle_callback(callback).await;
        }
        if let Some(message) = update.message {
            return self.handle_message(message).await;
        }
        tracing::debug!(update_id = update.update_id, "ignoring update without message");
        Ok(())
    }

    async fn handle_message(&self, message: Message) -> Result<()> {
        let chat_id = message.chat.id;
        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };
        let principal = Principal(message.from.as_ref().map_or(chat_id, |user| user.id));

        match parse_message(text) {
            Command::Start => self.send_welcome(chat_id).await,
            Command::Help => self.send_help(chat_id).await,
            Command::Usage(topic) => self.telegram.send_text(chat_id, topic.usage()).await,
            Command::SearchUsage => self.telegram.send_text(chat_id, SEARCH_USAGE).await,
            Command::SearchHelp => self.telegram.send_text(chat_id, SEARCH_HELP_TEXT).await,
            Command::Menu => self.telegram.send_text(chat_id, MENU_TEXT).await,
            Command::Browse(category) => self.send_category_prompt(chat_id, category).await,
            Command::Ask { topic, question } => {
                self.answer_question(chat_id, principal, topic, &question)
                    .await
            }
            Command::Search { question } => {
                self.search_documents(chat_id, principal, &question).await
            }
        }
    }

    async fn answer_question(
        &self,
        chat_id: i64,
        principal: Principal,
        topic: Topic,
        question: &str,
    ) -> Result<()> {
        let started = Instant::now();
        let delivery = self
            .pipeline
            .deliver_with(principal, || async {
                self.notify_progress(chat_id, topic.progress_notice()).await;
                self.chat.answer_general(topic, question).await
            })
            .await;

        self.dispatch(chat_id, &delivery).await?;
        tracing::info!(
            %principal,
            topic = topic.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "question handled"
        );
        Ok(())
    }

    async fn search_documents(
        &self,
        chat_id: i64,
        principal: Principal,
        question: &str,
    ) -> Result<()> {
        let started = Instant::now();
        let mut cited: Vec<Citation> = Vec::new();
        let cited_slot = &mut cited;

        let delivery = self
            .pipeline
            .deliver_with(principal, || async move {
                self.notify_progress(chat_id, SEARCH_PROGRESS).await;
                let generated = self.chat.answer_from_documents(question).await?;
                *cited_slot = aggregate(&generated.passages);
                Ok(generated)
            })
            .await;

        self.dispatch(chat_id, &delivery).await?;
        if matches!(delivery, Delivery::Delivered(_)) {
            self.offer_downloads(chat_id, &cited).await?;
        }

        tracing::info!(
            %principal,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search handled"
        );
        Ok(())
    }

    async fn notify_progress(&self, chat_id: i64, notice: &str) {
        if let Err(err) = self.telegram.send_typing(chat_id).await {
            tracing::debug!(error = %err, "typing indicator failed");
        }
        if let Err(err) = self.telegram.send_text(chat_id, notice).await {
            tracing::warn!(error = %err, "progress notice failed");
        }
    }

    async fn dispatch(&self, chat_id: i64, delivery: &Delivery) -> Result<()> {
        match delivery {
            Delivery::Rejected => self.telegram.send_text(chat_id, BUSY_NOTICE).await,
            Delivery::Failed(notice) => self.telegram.send_text(chat_id, notice).await,
            Delivery::Delivered(units) => {
                for unit in units {
                    if let Err(err) = self.telegram.send_unit(chat_id, unit).await {
                        let Some(plain) = plain_fallback(unit) else {
                            return Err(err);
                        };
                        tracing::warn!(
                            error = %err,
                            "markup rejected by transport, resending as plain text"
                        );
                        self.telegram.send_text(chat_id, &plain).await?;
                    }
                }
                Ok(())
            }
        }
    }

    async fn offer_downloads(&self, chat_id: i64, citations: &[Citation]) -> Result<()> {
        let mut keyboard = InlineKeyboardMarkup::default();
        for citation in citations {
            let Some(entry) = self.documents.resolve(&citation.display_name) else {
                continue;
            };
            match download_button(
                format!("📥 Download {}", citation.display_name),
                &entry.relative_path,
            ) {
                Some(button) => keyboard.push_row(button),
                None => {
                    tracing::debug!(path = %entry.relative_path, "path too long for a download button")
                }
            }
        }

        if keyboard.is_empty() {
            return Ok(());
        }
        self.telegram
            .send_with_markup(
                chat_id,
                "Pick a document to download:",
                &ReplyMarkup::Inline(keyboard),
            )
            .await
    }

    async fn handle_callback(&self, callback: CallbackQuery) -> Result<()> {
        let Some(chat_id) = callback.message.as_ref().map(|message| message.chat.id) else {
            return self.telegram.answer_callback_query(&callback.id, None).await;
        };
        let data = callback.data.as_deref().unwrap_or_default();

        match parse_callback(data) {
            CallbackAction::UnknownCategory(key) => {
                tracing::debug!(%key, "unknown category requested");
                self.telegram
                    .answer_callback_query(&callback.id, Some("Category not available"))
                    .await
            }
            action => {
                self.telegram.answer_callback_query(&callback.id, None).await?;
                match action {
                    CallbackAction::Download(path) => self.send_document(chat_id, &path).await,
                    CallbackAction::List(category) => self.send_listing(chat_id, category).await,
                    CallbackAction::BackToHelp => self.send_help(chat_id).await,
                    CallbackAction::BackToStart | CallbackAction::UnknownCategory(_) => {
                        self.send_welcome(chat_id).await
                    }
                }
            }
        }
    }

    async fn send_document(&self, chat_id: i64, relative_path: &str) -> Result<()> {
        let path = match self.documents.open(relative_path) {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(error = %err, "download refused");
                return self
                    .telegram
                    .send_text(chat_id, "❌ The requested file does not exist")
                    .await;
            }
        };

        match self.telegram.send_document(chat_id, &path).await {
            Ok(()) => {
                tracing::info!(path = relative_path, "document sent");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "sending document failed");
                self.telegram
                    .send_text(chat_id, "❌ Error sending the document")
                    .await
            }
        }
    }

    async fn send_listing(&self, chat_id: i64, category: Category) -> Result<()> {
        let listing = match self.documents.list_category(category) {
            Ok(listing) => listing,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "listing documents failed");
                return self
                    .telegram
                    .send_text(chat_id, "❌ Error listing resources")
                    .await;
            }
        };

        match listing {
            CategoryListing::MissingFolder => {
                self.telegram
                    .send_text(
                        chat_id,
                        &format!(
                            "📁 The {} folder is under construction.\n\n💡 Use /search to look through every resource.",
                            category.folder()
                        ),
                    )
                    .await
            }
            CategoryListing::Empty => {
                self.telegram
                    .send_text(
                        chat_id,
                        &format!(
                            "📚 No resources in {} yet.\n\n🔍 Try /search <topic> to find related content.",
                            category.folder()
                        ),
                    )
                    .await
            }
            CategoryListing::Documents(entries) => {
                let mut keyboard = InlineKeyboardMarkup::default();
                for entry in entries {
                    let label = format!("📄 {}", entry.display_name);
                    if let Some(button) = download_button(label, &entry.relative_path) {
                        keyboard.push_row(button);
                    }
                }
                keyboard.push_row(InlineKeyboardButton::new("⬅️ Back", BACK_MAIN));
                self.telegram
                    .send_with_markup(
                        chat_id,
                        &format!("📚 {} resources:", category.label()),
                        &ReplyMarkup::Inline(keyboard),
                    )
                    .await
            }
        }
    }

    async fn send_category_prompt(&self, chat_id: i64, category: Category) -> Result<()> {
        let mut keyboard = InlineKeyboardMarkup::default();
        keyboard.push_row(InlineKeyboardButton::new(
            "See resources",
            list_callback(category),
        ));
        self.telegram
            .send_with_markup(
                chat_id,
                category.description(),
                &ReplyMarkup::Inline(keyboard),
            )
            .await
    }

    async fn send_welcome(&self, chat_id: i64) -> Result<()> {
        let keyboard = ReplyKeyboardMarkup {
            keyboard: main_keyboard_rows()
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|text| KeyboardButton {
                            text: text.to_string(),
                        })
                        .collect()
                })
                .collect(),
            resize_keyboard: true,
        };
        self.telegram
            .send_with_markup(chat_id, WELCOME_TEXT, &ReplyMarkup::Reply(keyboard))
            .await
    }

    async fn send_help(&self, chat_id: i64) -> Result<()> {
        let mut keyboard = InlineKeyboardMarkup::default();
        for category in [
            Category::UxResearch,
            Category::UiPatterns,
            Category::DesignSystems,
            Category::CaseStudies,
        ] {
            keyboard.push_row(InlineKeyboardButton::new(
                category.label(),
                list_callback(category),
            ));
        }
        self.telegram
            .send_with_markup(chat_id, HELP_TEXT, &ReplyMarkup::Inline(keyboard))
            .await
    }
}

/// Download button for `relative_path`, or `None` when its callback data
/// would exceed Telegram's limit.
fn download_button(label: String, relative_path: &str) -> Option<InlineKeyboardButton> {
    let data = download_callback(relative_path);
    (data.len() <= CALLBACK_DATA_LIMIT).then(|| InlineKeyboardButton::new(label, data))
}

/// Plain-text resend for a unit whose markup the transport refused. Only
/// answer chunks have one.
fn plain_fallback(unit: &DeliveryUnit) -> Option<String> {
    match unit {
        DeliveryUnit::Chunk(chunk) => Some(visible_text(chunk.text.as_str())),
        DeliveryUnit::Citations(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::sanitize;
    use crate::models::MessageChunk;

    #[test]
    fn download_buttons_respect_the_callback_limit() {
        let button = download_button("📄 Atomic Design".to_string(), "UI_Patterns/Atomic_Design.pdf")
            .expect("short path fits");
        assert_eq!(button.callback_data, "download#UI_Patterns/Atomic_Design.pdf");
        assert_eq!(button.text, "📄 Atomic Design");

        let long_path = format!("Case_Studies/{}.pdf", "a".repeat(60));
        assert!(download_button("📄 Long".to_string(), &long_path).is_none());
    }

    #[test]
    fn callback_limit_is_measured_in_bytes() {
        let path = format!("{}.pdf", "é".repeat(26));
        assert!(download_callback(&path).chars().count() <= CALLBACK_DATA_LIMIT);
        assert!(download_button("📄 é".to_string(), &path).is_none());
    }

    #[test]
    fn rejected_chunks_fall_back_to_visible_text() {
        let unit = DeliveryUnit::Chunk(MessageChunk {
            index: 0,
            text: sanitize("**Grid** spacing is 8px + 4px."),
            is_final: true,
        });
        assert_eq!(
            plain_fallback(&unit).as_deref(),
            Some("Grid spacing is 8px + 4px.")
        );
    }

    #[test]
    fn citation_blocks_have_no_fallback() {
        let unit = DeliveryUnit::Citations("📚 References consulted:\n\n• A (p. 1)\n".to_string());
        assert!(plain_fallback(&unit).is_none());
    }
}
