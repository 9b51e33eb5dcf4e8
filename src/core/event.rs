//! Relay events and subscription filters.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nostr::{Alphabet, Filter, Kind, SingleLetterTag};
use serde::{Deserialize, Serialize};

/// Event kind for public channel messages.
pub const CHANNEL_MESSAGE_KIND: u16 = 42;

/// Tag name used for event references (channel roots, replies).
pub const EVENT_REF_TAG: &str = "e";

/// A single event as delivered by a relay.
///
/// Field names follow the relay wire format; the signature is not kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    /// Event id, unique across the relay network.
    pub id: String,
    /// Hex public key of the author.
    #[serde(rename = "pubkey")]
    pub author_key: String,
    /// Creation time in unix seconds, as claimed by the author.
    pub created_at: u64,
    /// Event kind.
    #[serde(default)]
    pub kind: u16,
    /// Raw tags.
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    /// Message text.
    #[serde(default)]
    pub content: String,
}

impl RelayEvent {
    /// Event ids referenced by `e` tags, in tag order.
    pub fn topic_refs(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().filter_map(|tag| match tag.as_slice() {
            [name, value, ..] if name == EVENT_REF_TAG => Some(value.as_str()),
            _ => None,
        })
    }
}

/// Subscription parameters shared by every relay endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFilter {
    /// Channel (root event) id the subscription is scoped to.
    pub topic: String,
    /// Backlog size requested from each relay.
    pub result_limit: usize,
    /// Accepted event kinds.
    pub event_kinds: BTreeSet<u16>,
    /// Events created before this unix time are never forwarded.
    pub start_time: u64,
}

impl SubscriptionFilter {
    /// Creates a filter with an explicit start time.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        result_limit: usize,
        event_kinds: impl IntoIterator<Item = u16>,
        start_time: u64,
    ) -> Self {
        Self {
            topic: topic.into(),
            result_limit,
            event_kinds: event_kinds.into_iter().collect(),
            start_time,
        }
    }

    /// Creates a filter whose start time is now plus `grace`.
    ///
    /// The grace window keeps relays' stored backlog, which arrives right
    /// after subscribing, from being replayed into the chat.
    #[must_use]
    pub fn starting_after(
        topic: impl Into<String>,
        result_limit: usize,
        event_kinds: impl IntoIterator<Item = u16>,
        grace: Duration,
    ) -> Self {
        Self::new(topic, result_limit, event_kinds, start_time_after(grace))
    }

    /// Returns `true` if the event is not older than the start time.
    #[must_use]
    pub const fn is_fresh(&self, event: &RelayEvent) -> bool {
        event.created_at >= self.start_time
    }

    /// Returns `true` if the event has an accepted kind and references the
    /// topic. Relays are not trusted to have applied the filter.
    #[must_use]
    pub fn matches(&self, event: &RelayEvent) -> bool {
        self.event_kinds.contains(&event.kind) && event.topic_refs().any(|r| r == self.topic)
    }

    /// The `REQ` filter sent to relays.
    ///
    /// No `since` is sent: the backlog is requested and then dropped by
    /// [`is_fresh`](Self::is_fresh).
    #[must_use]
    pub fn to_filter(&self) -> Filter {
        Filter::new()
            .kinds(self.event_kinds.iter().copied().map(Kind::from))
            .custom_tag(SingleLetterTag::lowercase(Alphabet::E), self.topic.clone())
            .limit(self.result_limit)
    }
}

/// Unix seconds of `now + grace`, rounded down.
#[must_use]
pub fn start_time_after(grace: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    (now + grace).as_secs()
}

/// Short form of a public key: first four and last four characters.
#[must_use]
pub fn summarize_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let head: String = chars.iter().take(4).collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("{head}...{tail}")
}
