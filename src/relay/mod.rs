//! Relay network access: wire codec, endpoint connections, the merged
//! subscription and the signing publisher.

pub mod connection;
pub mod protocol;
pub mod publisher;
pub mod subscriber;

pub use connection::ReconnectPolicy;
pub use protocol::{ClientMessage, RelayMessage, SubscriptionId};
pub use publisher::{NostrPublisher, RelayPublish, parse_keys};
pub use subscriber::{EventGate, MultiRelaySubscriber, SeenEventSet, Subscription};
