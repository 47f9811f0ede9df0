//! Telegram client using teloxide.

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile};
use tracing::{info, warn};

use crate::assistant::scheduler::Notifier;

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Send plain text. Returns the new message id.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, String> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send to {chat_id}: {e}");
                warn!("{}", msg);
                msg
            })
    }

    /// Send a voice note from OGG Opus bytes.
    pub async fn send_voice(&self, chat_id: i64, voice_data: Vec<u8>) -> Result<i64, String> {
        info!("Sending voice to chat {} ({} bytes)", chat_id, voice_data.len());
        let input_file = InputFile::memory(voice_data).file_name("voice.ogg");

        self.bot
            .send_voice(ChatId(chat_id), input_file)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send voice: {e}");
                warn!("{}", msg);
                msg
            })
    }

    /// Download a file (e.g. a voice note) by id.
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, String> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(|e| format!("Failed to get file info: {e}"))?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| format!("Failed to download file: {e}"))?;

        info!("Downloaded {} ({} bytes)", file.path, data.len());
        Ok(data)
    }
}

impl Notifier for TelegramClient {
    /// Identities are Telegram user ids, which double as private chat ids.
    async fn notify(&self, identity: &str, text: &str) -> Result<(), String> {
        let chat_id: i64 = identity
            .parse()
            .map_err(|_| format!("Not a Telegram chat id: {identity:?}"))?;
        self.send_message(chat_id, text).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_rejects_non_numeric_identity() {
        let client = TelegramClient::new(Bot::new("123456789:TEST"));
        let err = client.notify("oleg", "hi").await.unwrap_err();
        assert!(err.contains("oleg"));
    }
}
