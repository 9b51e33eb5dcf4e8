//! Chat-network messages and command parsing.

use serde::{Deserialize, Serialize};

/// A text message received from the chat network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Chat the message was posted in.
    pub chat_id: String,
    /// Display handle of the sender.
    pub sender_name: String,
    /// Platform message id, used for reply threading.
    pub message_id: String,
    /// Message text.
    pub text: String,
}

/// What a chat message asks the bridge to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Forward the text to the relay network.
    Post(&'a str),
    /// Answer the question with the retrieval pipeline.
    Query(&'a str),
}

impl ChatMessage {
    /// Classifies the message against the query command prefix.
    ///
    /// The prefix must be followed by whitespace, the end of the text, or a
    /// `@botname` suffix as group chats send it (`/q@my_bot question`).
    #[must_use]
    pub fn command(&self, prefix: &str) -> Command<'_> {
        parse_command(&self.text, prefix)
    }
}

/// Classifies `text` against the query command `prefix`.
#[must_use]
pub fn parse_command<'a>(text: &'a str, prefix: &str) -> Command<'a> {
    if prefix.is_empty() {
        return Command::Post(text);
    }
    let Some(rest) = text.trim_start().strip_prefix(prefix) else {
        return Command::Post(text);
    };
    let rest = if let Some(mention) = rest.strip_prefix('@') {
        mention.find(char::is_whitespace).map_or("", |i| &mention[i..])
    } else {
        rest
    };
    match rest.chars().next() {
        None => Command::Query(""),
        Some(c) if c.is_whitespace() => Command::Query(rest.trim()),
        Some(_) => Command::Post(text),
    }
}
