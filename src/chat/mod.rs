//! Chat network access.

pub mod telegram;

pub use telegram::{ChatSend, TelegramChat};
