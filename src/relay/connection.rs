//! Per-endpoint relay connection.
//!
//! Each endpoint runs as its own task: connect, issue the subscription,
//! forward verified and admitted events, and reconnect with exponential
//! backoff until cancelled. A dead endpoint only ever delays itself. On
//! cancellation an open subscription is released with `CLOSE`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use nostr::Filter;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::protocol::{
    ClientMessage, RelayMessage, SubscriptionId, decode, encode, verified_event,
};
use super::subscriber::EventGate;
use crate::core::RelayEvent;
use crate::error::RelayError;

/// Reconnect delays for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay after the first failure, and after any successful session.
    pub initial: Duration,
    /// Upper bound for the doubling delay.
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay following `current`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

/// Why a session ended without an error.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// The relay closed the socket or the subscription.
    Closed,
    /// Nobody is listening for events any more.
    ReceiverGone,
    /// The subscription was cancelled locally.
    Cancelled,
}

/// Everything an endpoint task needs.
pub(crate) struct EndpointTask {
    pub(crate) endpoint: String,
    pub(crate) subscription_id: SubscriptionId,
    pub(crate) filter: Filter,
    pub(crate) gate: Arc<EventGate>,
    pub(crate) events: mpsc::UnboundedSender<RelayEvent>,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) cancel: CancellationToken,
}

impl EndpointTask {
    /// Connection loop with auto-reconnect. Returns on cancellation or when
    /// the event receiver has been dropped.
    pub(crate) async fn run(self) {
        let mut backoff = self.policy.initial;

        loop {
            info!(endpoint = %self.endpoint, "connecting to relay");

            match self.session(&mut backoff).await {
                Ok(SessionEnd::ReceiverGone | SessionEnd::Cancelled) => break,
                Ok(SessionEnd::Closed) => {
                    debug!(endpoint = %self.endpoint, "relay session closed");
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "relay connection failed");
                }
            }

            debug!(
                endpoint = %self.endpoint,
                delay_ms = backoff.as_millis(),
                "reconnecting after delay"
            );
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(backoff) => {}
            }
            backoff = self.policy.next_delay(backoff);
        }

        debug!(endpoint = %self.endpoint, "relay task stopped");
    }

    /// Single connection: connect, subscribe, then forward frames until the
    /// relay hangs up or the task is cancelled.
    async fn session(&self, backoff: &mut Duration) -> Result<SessionEnd, RelayError> {
        let connected = tokio::select! {
            () = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            connected = connect_async(self.endpoint.as_str()) => connected,
        };
        let (socket, _response) = connected.map_err(|e| self.transport(&e))?;
        let (mut sink, mut stream) = socket.split();

        let request = encode(&ClientMessage::req(
            self.subscription_id.clone(),
            self.filter.clone(),
        ))?;
        sink.send(Message::Text(request.into()))
            .await
            .map_err(|e| self.transport(&e))?;

        info!(endpoint = %self.endpoint, "subscribed to relay");
        *backoff = self.policy.initial;

        let end = loop {
            let frame = tokio::select! {
                () = self.cancel.cancelled() => break SessionEnd::Cancelled,
                frame = stream.next() => frame,
            };
            let Some(frame) = frame else {
                return Ok(SessionEnd::Closed);
            };
            match frame.map_err(|e| self.transport(&e))? {
                Message::Text(text) => {
                    if let Some(end) = self.handle_text(text.as_str()) {
                        if end == SessionEnd::Closed {
                            return Ok(end);
                        }
                        break end;
                    }
                }
                Message::Ping(data) => {
                    sink.send(Message::Pong(data))
                        .await
                        .map_err(|e| self.transport(&e))?;
                }
                Message::Close(_) => return Ok(SessionEnd::Closed),
                _ => {}
            }
        };

        // The relay still holds the subscription open; release it.
        let close = encode(&ClientMessage::close(self.subscription_id.clone()))?;
        if let Err(e) = sink.send(Message::Text(close.into())).await {
            debug!(endpoint = %self.endpoint, error = %e, "failed to send CLOSE");
        }
        let _ = sink.close().await;
        debug!(endpoint = %self.endpoint, "subscription closed");
        Ok(end)
    }

    /// Handles one text frame; `Some` ends the session.
    fn handle_text(&self, text: &str) -> Option<SessionEnd> {
        match decode(text) {
            Some(RelayMessage::Event {
                subscription_id,
                event,
            }) if subscription_id == self.subscription_id => match verified_event(&event) {
                Ok(event) => {
                    if self.gate.admit(&event) && self.events.send(event).is_err() {
                        return Some(SessionEnd::ReceiverGone);
                    }
                }
                Err(reason) => {
                    warn!(
                        endpoint = %self.endpoint,
                        event_id = %event.id,
                        reason = %reason,
                        "dropping unverifiable event"
                    );
                }
            },
            Some(RelayMessage::EndOfStoredEvents(_)) => {
                debug!(endpoint = %self.endpoint, "stored events delivered");
            }
            Some(RelayMessage::Notice(message)) => {
                info!(endpoint = %self.endpoint, notice = %message, "relay notice");
            }
            Some(RelayMessage::Closed {
                subscription_id,
                message,
            }) if subscription_id == self.subscription_id => {
                warn!(endpoint = %self.endpoint, reason = %message, "relay closed subscription");
                return Some(SessionEnd::Closed);
            }
            _ => trace!(endpoint = %self.endpoint, "ignoring frame"),
        }
        None
    }

    fn transport(&self, error: &impl std::fmt::Display) -> RelayError {
        RelayError::Transport {
            endpoint: self.endpoint.clone(),
            message: error.to_string(),
        }
    }
}
