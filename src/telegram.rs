//! Reply delivery using teloxide.

use std::path::PathBuf;

use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, MessageId, ReplyParameters};
use tracing::{debug, info};

use crate::config::is_url;
use crate::intake::Reply;
use crate::report::{TransportError, TransportErrorKind};

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i32>,
    ) -> Result<(), TransportError> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);

        if let Some(msg_id) = reply_to_message_id {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id)));
        }

        request.await.map(|_| ()).map_err(|e| TransportError::from(&e))
    }

    /// Send an image by URL or local path, with a caption.
    pub async fn send_image(
        &self,
        chat_id: i64,
        image: &str,
        caption: &str,
        reply_to_message_id: Option<i32>,
    ) -> Result<(), TransportError> {
        info!("📷 Sending image {} to chat {}", image, chat_id);

        let input_file = if is_url(image) {
            let url = reqwest::Url::parse(image).map_err(|e| TransportError {
                kind: TransportErrorKind::Other,
                message: format!("invalid image URL '{image}': {e}"),
            })?;
            InputFile::url(url)
        } else {
            InputFile::file(PathBuf::from(image))
        };

        let mut request = self.bot.send_photo(ChatId(chat_id), input_file).caption(caption);

        if let Some(msg_id) = reply_to_message_id {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id)));
        }

        request.await.map(|_| ()).map_err(|e| TransportError::from(&e))
    }

    pub async fn send_reply(
        &self,
        chat_id: i64,
        reply: &Reply,
        reply_to_message_id: Option<i32>,
    ) -> Result<(), TransportError> {
        match reply {
            Reply::Text(text) => self.send_text(chat_id, text, reply_to_message_id).await,
            Reply::Image { image_url, caption } => {
                self.send_image(chat_id, image_url, caption, reply_to_message_id).await
            }
        }
    }

    /// Send chunks in order, stopping at the first failure.
    pub async fn send_chunks(&self, chat_id: i64, chunks: &[String]) -> Result<(), TransportError> {
        for (idx, chunk) in chunks.iter().enumerate() {
            debug!("Sending chunk {}/{} to chat {}", idx + 1, chunks.len(), chat_id);
            self.send_text(chat_id, chunk, None).await?;
        }
        Ok(())
    }
}
