//! Telegram bot transport.
//!
//! Outbound messages go through [`ChatSend`]; inbound messages are read with a
//! manual `getUpdates` long-polling loop and handed over as [`ChatMessage`]s.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, MessageId, ReplyParameters, UpdateKind};
use teloxide::{ApiError, RequestError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::ChatMessage;
use crate::error::ChatError;

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Long-polling timeout sent to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u32 = 30;

/// Sending text into the chat network.
#[async_trait]
pub trait ChatSend: Send + Sync {
    /// Sends `text` to `chat_id`, optionally as a reply to `reply_to`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError`] if the ids are malformed or the send fails.
    async fn send(&self, chat_id: &str, text: &str, reply_to: Option<&str>)
    -> Result<(), ChatError>;
}

/// Telegram bot client.
#[derive(Clone)]
pub struct TelegramChat {
    bot: Bot,
}

impl TelegramChat {
    /// Creates a client for `token`.
    ///
    /// The HTTP timeout is longer than the long-polling timeout so a poll is
    /// never cut off before Telegram answers.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Client`] if the HTTP client cannot be built.
    pub fn new(token: &SecretString) -> Result<Self, ChatError> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(45))
            .build()
            .map_err(|e| ChatError::Client(e.to_string()))?;
        Ok(Self {
            bot: Bot::with_client(token.expose_secret(), client),
        })
    }

    /// Verifies the token, clears any webhook and returns the bot's username.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Telegram`] if either API call fails.
    pub async fn connect(&self) -> Result<Option<String>, ChatError> {
        let me = self.bot.get_me().await?;
        self.bot.delete_webhook().send().await?;
        info!(username = ?me.username, "telegram bot connected (webhook cleared)");
        Ok(me.username.clone())
    }

    /// Spawns the polling loop. Text messages are sent to `messages` until
    /// `cancel` fires or the receiver is dropped.
    pub fn listen(
        &self,
        messages: mpsc::UnboundedSender<ChatMessage>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let bot = self.bot.clone();
        tokio::spawn(poll_updates(bot, messages, cancel))
    }
}

impl std::fmt::Debug for TelegramChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChat").finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatSend for TelegramChat {
    async fn send(
        &self,
        chat_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<(), ChatError> {
        let chat = parse_chat_id(chat_id)?;
        let reply = reply_to.map(parse_message_id).transpose()?;

        for (index, chunk) in split_message(text, MAX_MESSAGE_CHARS).into_iter().enumerate() {
            let mut request = self.bot.send_message(chat, chunk);
            if let (0, Some(id)) = (index, reply) {
                request =
                    request.reply_parameters(ReplyParameters::new(id).allow_sending_without_reply());
            }
            request.await?;
        }
        debug!(chat_id, "chat message sent");
        Ok(())
    }
}

async fn poll_updates(
    bot: Bot,
    messages: mpsc::UnboundedSender<ChatMessage>,
    cancel: CancellationToken,
) {
    info!("starting telegram polling loop");
    let mut offset: i32 = 0;

    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = bot
                .get_updates()
                .offset(offset)
                .timeout(POLL_TIMEOUT_SECS)
                .allowed_updates(vec![AllowedUpdate::Message])
                .send() => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    let UpdateKind::Message(msg) = update.kind else {
                        debug!("ignoring non-message update");
                        continue;
                    };
                    let Some(message) = chat_message_from(&msg) else {
                        debug!(chat_id = msg.chat.id.0, "ignoring non-text message");
                        continue;
                    };
                    if messages.send(message).is_err() {
                        debug!("chat receiver dropped, stopping polling");
                        return;
                    }
                }
            }
            Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                warn!("telegram polling disabled: another instance is running with this token");
                break;
            }
            Err(e) => {
                warn!(error = %e, "telegram getUpdates failed");
                let wait = match &e {
                    RequestError::RetryAfter(wait) => wait.duration(),
                    _ => Duration::from_secs(5),
                };
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(wait) => {}
                }
            }
        }
    }
    info!("telegram polling stopped");
}

/// Converts a text message; other message types yield `None`.
pub fn chat_message_from(msg: &Message) -> Option<ChatMessage> {
    let text = msg.text()?;
    let sender_name = msg
        .from
        .as_ref()
        .map(|user| user.username.clone().unwrap_or_else(|| user.first_name.clone()))
        .unwrap_or_default();

    Some(ChatMessage {
        chat_id: msg.chat.id.0.to_string(),
        sender_name,
        message_id: msg.id.0.to_string(),
        text: text.to_string(),
    })
}

fn parse_chat_id(value: &str) -> Result<ChatId, ChatError> {
    value
        .trim()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| ChatError::InvalidId {
            what: "chat id",
            value: value.to_string(),
        })
}

fn parse_message_id(value: &str) -> Result<MessageId, ChatError> {
    value
        .trim()
        .parse::<i32>()
        .map(MessageId)
        .map_err(|_| ChatError::InvalidId {
            what: "message id",
            value: value.to_string(),
        })
}

/// Splits `text` into chunks of at most `max_chars` characters, preferring
/// to break after a newline.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars || max_chars == 0 {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.chars().count() > max_chars {
        let hard = rest
            .char_indices()
            .nth(max_chars)
            .map_or(rest.len(), |(i, _)| i);
        let cut = rest[..hard].rfind('\n').map_or(hard, |i| i + 1);
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
