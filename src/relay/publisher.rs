//! Signing and publishing channel messages.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use nostr::{Event, EventBuilder, EventId, Keys, Kind, Tag, TagKind};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use super::protocol::{ClientMessage, RelayMessage, decode, encode};
use crate::core::{CHANNEL_MESSAGE_KIND, EVENT_REF_TAG};
use crate::error::RelayError;

/// Default wait for the relay's `OK`.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posting to the relay network under the bridge's identity.
#[async_trait]
pub trait RelayPublish: Send + Sync {
    /// Publishes `content` as a channel message and returns the event id.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] if signing, delivery or acknowledgement fails.
    async fn publish(&self, content: &str) -> Result<String, RelayError>;

    /// Hex public key events are signed with.
    fn public_key(&self) -> String;
}

/// Parses a hex or `nsec` secret key.
///
/// # Errors
///
/// Returns [`RelayError::Signing`] if the key is malformed.
pub fn parse_keys(secret_key: &str) -> Result<Keys, RelayError> {
    Keys::parse(secret_key.trim()).map_err(|e| RelayError::Signing {
        message: format!("invalid secret key: {e}"),
    })
}

/// Publishes signed channel messages to a single relay.
///
/// A fresh connection is opened per message and closed once the relay has
/// acknowledged it.
pub struct NostrPublisher {
    keys: Keys,
    endpoint: String,
    channel_id: String,
    relay_hint: String,
    kind: u16,
    ack_timeout: Duration,
}

impl NostrPublisher {
    /// Creates a publisher that posts to `endpoint`, replying to the channel
    /// root `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Signing`] if `secret_key` is malformed.
    pub fn new(
        secret_key: &str,
        endpoint: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Result<Self, RelayError> {
        let endpoint = endpoint.into();
        Ok(Self {
            keys: parse_keys(secret_key)?,
            relay_hint: endpoint.clone(),
            endpoint,
            channel_id: channel_id.into(),
            kind: CHANNEL_MESSAGE_KIND,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        })
    }

    /// Overrides how long to wait for the acknowledgement.
    #[must_use]
    pub const fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Overrides the event kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: u16) -> Self {
        self.kind = kind;
        self
    }

    /// Overrides the relay URL written into the channel tag.
    #[must_use]
    pub fn with_relay_hint(mut self, hint: impl Into<String>) -> Self {
        self.relay_hint = hint.into();
        self
    }

    /// Builds and signs the event for `content`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Signing`] if signing fails.
    pub fn sign(&self, content: &str) -> Result<Event, RelayError> {
        let root = Tag::custom(
            TagKind::custom(EVENT_REF_TAG),
            [
                self.channel_id.clone(),
                self.relay_hint.clone(),
                "root".to_string(),
            ],
        );

        EventBuilder::new(Kind::from(self.kind), content)
            .tag(root)
            .sign_with_keys(&self.keys)
            .map_err(|e| RelayError::Signing {
                message: e.to_string(),
            })
    }

    async fn deliver(&self, frame: String, event_id: EventId) -> Result<(), RelayError> {
        let (socket, _response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| self.transport(&e))?;
        let (mut sink, mut stream) = socket.split();

        sink.send(Message::Text(frame.into()))
            .await
            .map_err(|e| self.transport(&e))?;

        let outcome = loop {
            let Some(frame) = stream.next().await else {
                break Err(RelayError::Closed {
                    endpoint: self.endpoint.clone(),
                });
            };
            match frame.map_err(|e| self.transport(&e))? {
                Message::Text(text) => match decode(text.as_str()) {
                    Some(RelayMessage::Ok {
                        event_id: acked,
                        status,
                        message,
                    }) if acked == event_id => {
                        break if status {
                            Ok(())
                        } else {
                            Err(RelayError::Rejected {
                                endpoint: self.endpoint.clone(),
                                message,
                            })
                        };
                    }
                    Some(RelayMessage::Notice(message)) => {
                        debug!(endpoint = %self.endpoint, notice = %message, "relay notice");
                    }
                    _ => {}
                },
                Message::Close(_) => {
                    break Err(RelayError::Closed {
                        endpoint: self.endpoint.clone(),
                    });
                }
                _ => {}
            }
        };

        let _ = sink.close().await;
        outcome
    }

    fn transport(&self, error: &impl std::fmt::Display) -> RelayError {
        RelayError::Transport {
            endpoint: self.endpoint.clone(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Debug for NostrPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NostrPublisher")
            .field("public_key", &self.keys.public_key().to_hex())
            .field("endpoint", &self.endpoint)
            .field("channel_id", &self.channel_id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RelayPublish for NostrPublisher {
    async fn publish(&self, content: &str) -> Result<String, RelayError> {
        let event = self.sign(content)?;
        let event_id = event.id;
        let frame = encode(&ClientMessage::event(event))?;

        tokio::time::timeout(self.ack_timeout, self.deliver(frame, event_id))
            .await
            .map_err(|_| RelayError::Timeout {
                endpoint: self.endpoint.clone(),
                secs: self.ack_timeout.as_secs(),
            })??;

        let event_id = event_id.to_hex();
        info!(endpoint = %self.endpoint, event_id = %event_id, "event published");
        Ok(event_id)
    }

    fn public_key(&self) -> String {
        self.keys.public_key().to_hex()
    }
}
