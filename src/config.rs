//! Bridge configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.
//! Every required value that is still missing after that is a startup error.

use std::time::Duration;

use nostr::PublicKey;
use secrecy::{ExposeSecret, SecretString};

use crate::core::CHANNEL_MESSAGE_KIND;
use crate::error::ConfigError;
use crate::relay::parse_keys;

/// Relays subscribed to when none are configured.
pub const DEFAULT_RELAYS: [&str; 2] = [
    "wss://nostr-relay.psfoundation.info",
    "wss://relay.damus.io",
];
/// Default query command prefix.
pub const DEFAULT_COMMAND_PREFIX: &str = "/q";
/// Events created earlier than startup plus this window are never forwarded.
const DEFAULT_START_GRACE_SECS: u64 = 3;
/// Backlog requested from each relay.
const DEFAULT_RESULT_LIMIT: usize = 10;
/// How long to wait for a relay to acknowledge a published event.
const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 10;

/// Everything the bridge needs besides the language model.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Channel root event id; scopes the subscription and tags posts.
    pub channel_id: String,
    /// Secret key events are signed with (hex or `nsec`).
    pub secret_key: SecretString,
    /// Hex public key treated as the bridge's own identity.
    pub public_key: String,
    /// Telegram bot token.
    pub telegram_token: SecretString,
    /// Chat relay events are forwarded into.
    pub chat_id: String,
    /// Retrieval service base URL.
    pub rag_url: String,
    /// Relays to subscribe to.
    pub relays: Vec<String>,
    /// Relay posts are published to.
    pub publish_relay: String,
    /// Prefix selecting the query command.
    pub command_prefix: String,
    /// Grace window added to the start time.
    pub start_grace: Duration,
    /// Backlog requested from each relay.
    pub result_limit: usize,
    /// Event kind subscribed to and published.
    pub event_kind: u16,
    /// Wait for the relay's acknowledgement.
    pub publish_timeout: Duration,
}

impl BridgeConfig {
    /// Creates a new builder for `BridgeConfig`.
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for the first missing or invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().from_env().build()
    }
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("channel_id", &self.channel_id)
            .field("secret_key", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .field("telegram_token", &"[REDACTED]")
            .field("chat_id", &self.chat_id)
            .field("rag_url", &self.rag_url)
            .field("relays", &self.relays)
            .field("publish_relay", &self.publish_relay)
            .field("command_prefix", &self.command_prefix)
            .field("start_grace", &self.start_grace)
            .field("result_limit", &self.result_limit)
            .field("event_kind", &self.event_kind)
            .field("publish_timeout", &self.publish_timeout)
            .finish()
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Clone, Default)]
pub struct BridgeConfigBuilder {
    channel_id: Option<String>,
    secret_key: Option<SecretString>,
    public_key: Option<String>,
    telegram_token: Option<SecretString>,
    chat_id: Option<String>,
    rag_url: Option<String>,
    relays: Option<Vec<String>>,
    publish_relay: Option<String>,
    command_prefix: Option<String>,
    start_grace: Option<Duration>,
    result_limit: Option<usize>,
    event_kind: Option<u16>,
    publish_timeout: Option<Duration>,
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env(name).and_then(|v| v.trim().parse().ok())
}

/// Splits a comma separated relay list, dropping blanks.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl BridgeConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        self.channel_id = self.channel_id.or_else(|| env("NOSTR_CHANNEL_ID"));
        self.secret_key = self
            .secret_key
            .or_else(|| env("BOT_NOSTR_PRIV_KEY").map(SecretString::new));
        self.public_key = self.public_key.or_else(|| env("BOT_NOSTR_PUB_KEY"));
        self.telegram_token = self
            .telegram_token
            .or_else(|| env("TELEGRAM_BOT_TOKEN").map(SecretString::new));
        self.chat_id = self.chat_id.or_else(|| env("CHATID"));
        self.rag_url = self.rag_url.or_else(|| env("RAG_URL"));
        self.relays = self
            .relays
            .or_else(|| env("NOSTR_RELAYS").map(|v| split_list(&v)));
        self.publish_relay = self.publish_relay.or_else(|| env("NOSTR_PUBLISH_RELAY"));
        self.command_prefix = self
            .command_prefix
            .or_else(|| env("BRIDGE_COMMAND_PREFIX"));
        self.start_grace = self
            .start_grace
            .or_else(|| env_parsed("NOSTR_START_GRACE_SECS").map(Duration::from_secs));
        self.result_limit = self
            .result_limit
            .or_else(|| env_parsed("NOSTR_RESULT_LIMIT"));
        self.event_kind = self.event_kind.or_else(|| env_parsed("NOSTR_EVENT_KIND"));
        self.publish_timeout = self
            .publish_timeout
            .or_else(|| env_parsed("NOSTR_PUBLISH_TIMEOUT_SECS").map(Duration::from_secs));
        self
    }

    /// Sets the channel root event id.
    #[must_use]
    pub fn channel_id(mut self, id: impl Into<String>) -> Self {
        self.channel_id = Some(id.into());
        self
    }

    /// Sets the signing key.
    #[must_use]
    pub fn secret_key(mut self, key: impl Into<String>) -> Self {
        self.secret_key = Some(SecretString::new(key.into()));
        self
    }

    /// Sets the bridge's public key explicitly (hex or `npub`). It must
    /// belong to the secret key.
    #[must_use]
    pub fn public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = Some(key.into());
        self
    }

    /// Sets the Telegram bot token.
    #[must_use]
    pub fn telegram_token(mut self, token: impl Into<String>) -> Self {
        self.telegram_token = Some(SecretString::new(token.into()));
        self
    }

    /// Sets the target chat id.
    #[must_use]
    pub fn chat_id(mut self, id: impl Into<String>) -> Self {
        self.chat_id = Some(id.into());
        self
    }

    /// Sets the retrieval service base URL.
    #[must_use]
    pub fn rag_url(mut self, url: impl Into<String>) -> Self {
        self.rag_url = Some(url.into());
        self
    }

    /// Sets the relays to subscribe to.
    #[must_use]
    pub fn relays<I, S>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relays = Some(relays.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the relay posts are published to.
    #[must_use]
    pub fn publish_relay(mut self, url: impl Into<String>) -> Self {
        self.publish_relay = Some(url.into());
        self
    }

    /// Sets the query command prefix.
    #[must_use]
    pub fn command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = Some(prefix.into());
        self
    }

    /// Sets the start grace window.
    #[must_use]
    pub const fn start_grace(mut self, grace: Duration) -> Self {
        self.start_grace = Some(grace);
        self
    }

    /// Sets the per-relay backlog limit.
    #[must_use]
    pub const fn result_limit(mut self, limit: usize) -> Self {
        self.result_limit = Some(limit);
        self
    }

    /// Sets the event kind.
    #[must_use]
    pub const fn event_kind(mut self, kind: u16) -> Self {
        self.event_kind = Some(kind);
        self
    }

    /// Sets the publish acknowledgement timeout.
    #[must_use]
    pub const fn publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = Some(timeout);
        self
    }

    /// Builds the [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for the first absent required value
    /// and [`ConfigError::Invalid`] for malformed keys, chat ids or relay URLs.
    pub fn build(self) -> Result<BridgeConfig, ConfigError> {
        let channel_id = required(self.channel_id, "NOSTR_CHANNEL_ID")?;
        let secret_key = self
            .secret_key
            .filter(|k| !k.expose_secret().trim().is_empty())
            .ok_or(ConfigError::Missing {
                name: "BOT_NOSTR_PRIV_KEY",
            })?;
        let telegram_token = self
            .telegram_token
            .filter(|t| !t.expose_secret().trim().is_empty())
            .ok_or(ConfigError::Missing {
                name: "TELEGRAM_BOT_TOKEN",
            })?;
        let chat_id = required(self.chat_id, "CHATID")?;
        let rag_url = required(self.rag_url, "RAG_URL")?;

        let keys = parse_keys(secret_key.expose_secret()).map_err(|e| ConfigError::Invalid {
            name: "BOT_NOSTR_PRIV_KEY",
            message: e.to_string(),
        })?;
        let public_key = match self.public_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {
                let parsed = PublicKey::parse(key).map_err(|e| ConfigError::Invalid {
                    name: "BOT_NOSTR_PUB_KEY",
                    message: e.to_string(),
                })?;
                if parsed != keys.public_key() {
                    return Err(ConfigError::Invalid {
                        name: "BOT_NOSTR_PUB_KEY",
                        message: "does not belong to BOT_NOSTR_PRIV_KEY".to_string(),
                    });
                }
                parsed.to_hex()
            }
            _ => keys.public_key().to_hex(),
        };

        if chat_id.trim().parse::<i64>().is_err() {
            return Err(ConfigError::Invalid {
                name: "CHATID",
                message: format!("expected a numeric chat id, got {chat_id:?}"),
            });
        }

        let relays = self
            .relays
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_RELAYS.iter().map(ToString::to_string).collect());
        for relay in &relays {
            check_relay_url(relay, "NOSTR_RELAYS")?;
        }
        let publish_relay = match self.publish_relay {
            Some(url) => {
                check_relay_url(&url, "NOSTR_PUBLISH_RELAY")?;
                url
            }
            None => relays
                .first()
                .cloned()
                .unwrap_or_else(|| DEFAULT_RELAYS[0].to_string()),
        };

        Ok(BridgeConfig {
            channel_id,
            secret_key,
            public_key,
            telegram_token,
            chat_id: chat_id.trim().to_string(),
            rag_url: rag_url.trim_end_matches('/').to_string(),
            relays,
            publish_relay,
            command_prefix: self
                .command_prefix
                .unwrap_or_else(|| DEFAULT_COMMAND_PREFIX.to_string()),
            start_grace: self
                .start_grace
                .unwrap_or(Duration::from_secs(DEFAULT_START_GRACE_SECS)),
            result_limit: self.result_limit.unwrap_or(DEFAULT_RESULT_LIMIT),
            event_kind: self.event_kind.unwrap_or(CHANNEL_MESSAGE_KIND),
            publish_timeout: self
                .publish_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS)),
        })
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing { name })
}

fn check_relay_url(url: &str, name: &'static str) -> Result<(), ConfigError> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            name,
            message: format!("relay URL must use ws:// or wss://, got {url:?}"),
        })
    }
}
