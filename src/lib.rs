//! # nostr-bridge
//!
//! Bridges a relay-network channel and a Telegram chat, and answers chat
//! questions with a retrieval-augmented language model.
//!
//! ## Overview
//!
//! - Channel messages are received from several relays at once. The
//!   [`relay::MultiRelaySubscriber`] drops events older than startup (plus a
//!   short grace window) and events already seen on another relay, then the
//!   [`bridge::MessageBridge`] forwards them into the chat.
//! - Chat messages are signed and published to the channel. Messages that
//!   start with the query prefix (`/q` by default) go through
//!   [`agent::Orchestrator`] instead: the question is rewritten into a search
//!   query, the knowledge base is searched, and the model's answer is posted
//!   as a reply.
//! - Model output is parsed leniently by [`core::extract_object`], which
//!   repairs common near-JSON mistakes.
//!
//! ## Example
//!
//! ```
//! use nostr_bridge::core::extract_object;
//!
//! let object = extract_object("```json\n{\"query\": unquotedWord}\n```");
//! assert_eq!(
//!     object.and_then(|o| o.get("query").cloned()),
//!     Some(serde_json::json!("unquotedWord"))
//! );
//! ```

pub mod agent;
pub mod bridge;
pub mod chat;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod rag;
pub mod relay;

pub use agent::{AgentConfig, LanguageModel, Orchestrator, QueryOptimizer, Responder};
pub use bridge::{APOLOGY, BridgeService, MessageBridge, Routed};
pub use chat::{ChatSend, TelegramChat};
pub use config::BridgeConfig;
pub use core::{ChatMessage, RelayEvent, SubscriptionFilter, extract_object};
pub use error::{BridgeError, CommandError, ConfigError, Result};
pub use rag::{KnowledgeAugmenter, RagClient, RetrievalService};
pub use relay::{MultiRelaySubscriber, NostrPublisher, RelayPublish, Subscription};
