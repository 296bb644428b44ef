use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{ChatAction, InlineKeyboard, MessagingCapabilities},
    Result,
};

/// Outbound messaging port.
///
/// Text is Telegram-style HTML. Implementations treat "message is not
/// modified" on edits as success.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    /// Upload a local file as an audio message.
    async fn send_audio(&self, chat_id: ChatId, path: &Path, caption_html: &str)
        -> Result<MessageRef>;

    /// Upload an in-memory payload as a document.
    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        data: Vec<u8>,
        caption_html: &str,
    ) -> Result<MessageRef>;
}
