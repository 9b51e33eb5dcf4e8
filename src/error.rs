//! Error types for the bridge.
//!
//! Each concern gets its own enum so callers can decide how to recover:
//! configuration errors are fatal at startup, transport errors are absorbed
//! at the bridge boundary, and extraction failures never surface at all.

use thiserror::Error;

/// Result alias for CLI command execution.
pub type Result<T> = std::result::Result<T, CommandError>;

/// Configuration errors. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required value was not provided by the CLI or the environment.
    #[error("missing required configuration value: {name}")]
    Missing {
        /// Environment variable (or setting) name.
        name: &'static str,
    },

    /// A value was provided but could not be used.
    #[error("invalid configuration value for {name}: {message}")]
    Invalid {
        /// Environment variable (or setting) name.
        name: &'static str,
        /// What was wrong with it.
        message: String,
    },
}

/// Errors from the language-model side of the pipeline.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model API call failed.
    #[error("language model request failed: {message}")]
    ApiRequest {
        /// Error description.
        message: String,
        /// HTTP status code, when known.
        status: Option<u16>,
    },

    /// The model responded but the content could not be used.
    #[error("failed to parse model response: {message}")]
    ResponseParse {
        /// Error description.
        message: String,
        /// The raw response content.
        content: String,
    },

    /// The question was rejected before any call was made.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Why the question was rejected.
        message: String,
    },

    /// Unknown provider name in configuration.
    #[error("unsupported LLM provider: {name}")]
    UnsupportedProvider {
        /// Provider name.
        name: String,
    },
}

/// Errors from the retrieval service.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("retrieval request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("retrieval service returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
}

/// Errors from relay connections and publishing.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Websocket connect or I/O failure.
    #[error("relay websocket error on {endpoint}: {message}")]
    Transport {
        /// Relay URL.
        endpoint: String,
        /// Error description.
        message: String,
    },

    /// Event construction or signing failed.
    #[error("failed to sign event: {message}")]
    Signing {
        /// Error description.
        message: String,
    },

    /// The relay acknowledged the event with `OK false`.
    #[error("relay {endpoint} rejected event: {message}")]
    Rejected {
        /// Relay URL.
        endpoint: String,
        /// Reason given by the relay.
        message: String,
    },

    /// No acknowledgement arrived in time.
    #[error("relay {endpoint} did not acknowledge event within {secs}s")]
    Timeout {
        /// Relay URL.
        endpoint: String,
        /// Timeout that elapsed.
        secs: u64,
    },

    /// The relay closed the connection before acknowledging.
    #[error("relay {endpoint} closed the connection before acknowledging")]
    Closed {
        /// Relay URL.
        endpoint: String,
    },

    /// Frame encoding failure.
    #[error("relay message encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from the chat network.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The bot API request failed.
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),

    /// The HTTP client for the bot API could not be built.
    ///
    /// Carries the message only: the bot library pins its own `reqwest`.
    #[error("failed to build chat HTTP client: {0}")]
    Client(String),

    /// A chat or message id could not be parsed.
    #[error("invalid {what}: {value}")]
    InvalidId {
        /// Which id was invalid.
        what: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Failure while handling one inbound message or event.
///
/// The bridge logs these and answers the user with a fixed apology.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Language-model failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Retrieval-service failure.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Relay publish failure.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Chat send failure.
    #[error(transparent)]
    Chat(#[from] ChatError),
}

/// Errors returned by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A command failed while running.
    #[error("command failed: {0}")]
    ExecutionFailed(String),

    /// Output formatting failed.
    #[error("output formatting failed: {0}")]
    Output(#[from] serde_json::Error),

    /// Reading input failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
