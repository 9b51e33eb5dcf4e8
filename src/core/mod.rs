//! Core data types shared by both sides of the bridge.
//!
//! Nothing in here performs I/O: relay events and filters, chat messages
//! and command parsing, and the JSON extraction used on model output.

pub mod chat;
pub mod event;
pub mod extract;

pub use chat::{ChatMessage, Command, parse_command};
pub use event::{
    CHANNEL_MESSAGE_KIND, EVENT_REF_TAG, RelayEvent, SubscriptionFilter, summarize_key,
};
pub use extract::{Rule, extract_object, locate_payload, normalize};
