//! Long-running bridge service.
//!
//! Wires the configured clients together and runs two concurrent loops: one
//! consuming the merged relay subscription, one consuming chat messages.
//! Both stop when the shared cancellation token fires.

use std::sync::Arc;

use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::router::MessageBridge;
use crate::agent::{AgentConfig, ModelClient, Orchestrator, PromptSet, Responder};
use crate::chat::{ChatSend, TelegramChat};
use crate::config::BridgeConfig;
use crate::core::{ChatMessage, SubscriptionFilter};
use crate::error::BridgeError;
use crate::rag::RagClient;
use crate::relay::{MultiRelaySubscriber, NostrPublisher, RelayPublish, Subscription};

/// The bridge with its production clients.
pub struct BridgeService {
    config: BridgeConfig,
    chat: Arc<TelegramChat>,
    publisher: Arc<dyn RelayPublish>,
    responder: Arc<dyn Responder>,
}

impl BridgeService {
    /// Builds every client from configuration. Nothing connects yet.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] if a client cannot be constructed.
    pub fn from_config(config: BridgeConfig, agent: &AgentConfig) -> Result<Self, BridgeError> {
        let llm = Arc::new(ModelClient::from_config(agent)?);
        let retrieval = Arc::new(RagClient::new(&config.rag_url));
        let prompts = PromptSet::load(agent.prompt_dir.as_deref());
        let responder = Arc::new(Orchestrator::new(llm, retrieval, prompts));

        let publisher = NostrPublisher::new(
            config.secret_key.expose_secret(),
            config.publish_relay.as_str(),
            config.channel_id.as_str(),
        )?
        .with_kind(config.event_kind)
        .with_ack_timeout(config.publish_timeout);

        let chat = Arc::new(TelegramChat::new(&config.telegram_token)?);

        Ok(Self {
            config,
            chat,
            publisher: Arc::new(publisher),
            responder,
        })
    }

    /// Connects to both networks and routes messages until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Chat`] if the bot cannot connect at startup.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), BridgeError> {
        let username = self.chat.connect().await?;

        let bridge = MessageBridge::new(
            Arc::clone(&self.chat) as Arc<dyn ChatSend>,
            Arc::clone(&self.publisher),
            Arc::clone(&self.responder),
            self.config.chat_id.as_str(),
        )
        .with_public_key(self.config.public_key.as_str())
        .with_command_prefix(self.config.command_prefix.as_str())
        .with_chat_username(username);

        let filter = SubscriptionFilter::starting_after(
            self.config.channel_id.as_str(),
            self.config.result_limit,
            [self.config.event_kind],
            self.config.start_grace,
        );
        let subscription =
            MultiRelaySubscriber::new(filter, self.config.relays.iter().cloned()).start_with(&cancel);

        let (chat_tx, chat_rx) = mpsc::unbounded_channel();
        let poller = self.chat.listen(chat_tx, cancel.clone());

        info!(
            relays = self.config.relays.len(),
            publish_relay = %self.config.publish_relay,
            chat_id = %self.config.chat_id,
            "bridge running"
        );
        run_loops(Arc::new(bridge), subscription, chat_rx, cancel).await;

        let _ = poller.await;
        info!("bridge stopped");
        Ok(())
    }
}

/// Runs the relay loop and the chat loop until `cancel` fires or both
/// inputs are exhausted.
///
/// Relay events are handled one at a time in arrival order. Each chat
/// message is handled on its own task so a slow query does not hold up
/// other messages.
pub async fn run_loops(
    bridge: Arc<MessageBridge>,
    mut subscription: Subscription,
    mut chat_messages: mpsc::UnboundedReceiver<ChatMessage>,
    cancel: CancellationToken,
) {
    let relay_loop = {
        let bridge = Arc::clone(&bridge);
        let cancel = cancel.clone();
        async move {
            loop {
                let event = tokio::select! {
                    () = cancel.cancelled() => break,
                    event = subscription.next() => event,
                };
                let Some(event) = event else { break };
                if let Err(e) = bridge.on_relay_event(&event).await {
                    error!(event_id = %event.id, error = %e, "failed to forward relay event");
                }
            }
        }
    };

    let chat_loop = async move {
        let mut handlers = JoinSet::new();
        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => break,
                message = chat_messages.recv() => message,
            };
            let Some(message) = message else { break };
            let bridge = Arc::clone(&bridge);
            handlers.spawn(async move {
                if let Err(e) = bridge.on_chat_message(&message).await {
                    error!(
                        chat_id = %message.chat_id,
                        message_id = %message.message_id,
                        error = %e,
                        "failed to reply to chat message"
                    );
                }
            });
            while handlers.try_join_next().is_some() {}
        }
        if cancel.is_cancelled() {
            handlers.shutdown().await;
        } else {
            while handlers.join_next().await.is_some() {}
        }
    };

    tokio::join!(relay_loop, chat_loop);
}
