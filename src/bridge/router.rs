//! Message routing between the relay network and the chat network.
//!
//! Relay events are forwarded into the configured chat unless they were
//! authored by the bridge itself. Chat messages are either posted to the
//! relay channel or, when they start with the query prefix, answered through
//! the retrieval pipeline. Every failure on the chat side ends in the same
//! apology reply.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::agent::Responder;
use crate::chat::ChatSend;
use crate::core::{ChatMessage, Command, RelayEvent, summarize_key};
use crate::error::{AgentError, BridgeError};
use crate::relay::RelayPublish;

/// The only error text chat users ever see.
pub const APOLOGY: &str =
    "Sorry, there was an error processing your request. Please try again later.";

/// What happened to one inbound message or event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// A relay event was sent to the chat.
    Forwarded,
    /// A chat message was published; carries the event id.
    Published(String),
    /// A query was answered in the chat.
    Answered,
    /// Handling failed and the sender got the apology.
    Apologized,
    /// Nothing to do (own message or own event).
    Ignored,
}

/// Routes traffic between the two networks.
pub struct MessageBridge {
    chat: Arc<dyn ChatSend>,
    relay: Arc<dyn RelayPublish>,
    responder: Arc<dyn Responder>,
    chat_id: String,
    public_key: String,
    command_prefix: String,
    chat_username: Option<String>,
}

impl MessageBridge {
    /// Creates a bridge that forwards relay events into `chat_id`.
    ///
    /// The bridge's own public key is taken from `relay`.
    pub fn new(
        chat: Arc<dyn ChatSend>,
        relay: Arc<dyn RelayPublish>,
        responder: Arc<dyn Responder>,
        chat_id: impl Into<String>,
    ) -> Self {
        let public_key = relay.public_key();
        Self {
            chat,
            relay,
            responder,
            chat_id: chat_id.into(),
            public_key,
            command_prefix: "/q".to_string(),
            chat_username: None,
        }
    }

    /// Overrides the bridge's public key used for echo suppression.
    #[must_use]
    pub fn with_public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = key.into();
        self
    }

    /// Overrides the query command prefix.
    #[must_use]
    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }

    /// Sets the bot's own chat username; its messages are never routed.
    #[must_use]
    pub fn with_chat_username(mut self, username: Option<String>) -> Self {
        self.chat_username = username;
        self
    }

    /// Forwards a relay event to the chat.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Chat`] if the chat send fails.
    pub async fn on_relay_event(&self, event: &RelayEvent) -> Result<Routed, BridgeError> {
        if event.author_key.eq_ignore_ascii_case(&self.public_key) {
            debug!(event_id = %event.id, "dropping own relay event");
            return Ok(Routed::Ignored);
        }

        let text = format!(
            "From Nostr user {}:\n\n{}",
            summarize_key(&event.author_key),
            event.content
        );
        self.chat.send(&self.chat_id, &text, None).await?;
        info!(event_id = %event.id, chat_id = %self.chat_id, "relay event forwarded");
        Ok(Routed::Forwarded)
    }

    /// Handles a chat message: post it to the relay channel or answer it.
    ///
    /// Publish and pipeline failures are answered with [`APOLOGY`] and are
    /// not errors.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Chat`] only if the reply itself cannot be sent.
    pub async fn on_chat_message(&self, message: &ChatMessage) -> Result<Routed, BridgeError> {
        if self.is_own_message(message) {
            debug!(message_id = %message.message_id, "ignoring own chat message");
            return Ok(Routed::Ignored);
        }

        match message.command(&self.command_prefix) {
            Command::Post(text) => {
                let content = format!("From @{} on Telegram:\n\n{text}", message.sender_name);
                match self.relay.publish(&content).await {
                    Ok(event_id) => {
                        info!(
                            chat_id = %message.chat_id,
                            event_id = %event_id,
                            "chat message published"
                        );
                        Ok(Routed::Published(event_id))
                    }
                    Err(e) => {
                        error!(chat_id = %message.chat_id, error = %e, "publish failed");
                        self.apologize(message).await
                    }
                }
            }
            Command::Query(question) => match self.answer(question).await {
                Ok(answer) => {
                    self.reply(message, &answer).await?;
                    info!(chat_id = %message.chat_id, "query answered");
                    Ok(Routed::Answered)
                }
                Err(e) => {
                    error!(chat_id = %message.chat_id, error = %e, "query failed");
                    self.apologize(message).await
                }
            },
        }
    }

    async fn answer(&self, question: &str) -> Result<String, BridgeError> {
        let answer = self.responder.answer(question).await?;
        if answer.trim().is_empty() {
            return Err(AgentError::ResponseParse {
                message: "model returned an empty answer".to_string(),
                content: answer,
            }
            .into());
        }
        Ok(answer)
    }

    fn is_own_message(&self, message: &ChatMessage) -> bool {
        self.chat_username
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(&message.sender_name))
    }

    async fn reply(&self, message: &ChatMessage, text: &str) -> Result<(), BridgeError> {
        self.chat
            .send(&message.chat_id, text, Some(&message.message_id))
            .await?;
        Ok(())
    }

    async fn apologize(&self, message: &ChatMessage) -> Result<Routed, BridgeError> {
        self.reply(message, APOLOGY).await?;
        Ok(Routed::Apologized)
    }
}
