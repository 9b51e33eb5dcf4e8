//! Multi-relay subscriber.
//!
//! One logical subscription fanned out over several relay endpoints. Every
//! endpoint is an independent producer; events pass a shared gate (kind and
//! topic, start time, seen-id set) before they reach the single merged
//! stream, so an event delivered by several relays is emitted once.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use super::connection::{EndpointTask, ReconnectPolicy};
use super::protocol::SubscriptionId;
use crate::core::{RelayEvent, SubscriptionFilter};

/// Subscription id sent in every `REQ`.
pub const DEFAULT_SUBSCRIPTION_ID: &str = "bridge";

/// Ids of events already emitted.
///
/// Unbounded: it lives as long as its subscriber and never evicts.
#[derive(Debug, Default)]
pub struct SeenEventSet {
    ids: Mutex<HashSet<String>>,
}

impl SeenEventSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id`. Returns `true` if it had not been seen before.
    ///
    /// Test and insert happen under one lock, so two producers racing on
    /// the same id cannot both get `true`.
    pub fn insert(&self, id: &str) -> bool {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        if ids.contains(id) {
            false
        } else {
            ids.insert(id.to_string())
        }
    }

    /// Number of ids recorded.
    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Filter, time and duplicate check shared by all endpoint tasks.
#[derive(Debug)]
pub struct EventGate {
    filter: SubscriptionFilter,
    seen: SeenEventSet,
}

impl EventGate {
    /// Creates a gate for `filter` with an empty seen set.
    pub fn new(filter: SubscriptionFilter) -> Self {
        Self {
            filter,
            seen: SeenEventSet::new(),
        }
    }

    /// Decides whether `event` is emitted.
    ///
    /// Off-filter and stale events are rejected before the seen set is
    /// touched, so they never occupy an id.
    pub fn admit(&self, event: &RelayEvent) -> bool {
        if !self.filter.matches(event) {
            trace!(event_id = %event.id, kind = event.kind, "event outside filter");
            return false;
        }
        if !self.filter.is_fresh(event) {
            trace!(event_id = %event.id, created_at = event.created_at, "stale event");
            return false;
        }
        if !self.seen.insert(&event.id) {
            trace!(event_id = %event.id, "duplicate event");
            return false;
        }
        true
    }

    /// Ids admitted so far.
    pub fn seen(&self) -> &SeenEventSet {
        &self.seen
    }

    /// The filter this gate applies.
    pub const fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }
}

/// Subscribes to the same filter on a set of relay endpoints.
///
/// Consumed by [`start`](Self::start); create a new instance to subscribe
/// again.
#[derive(Debug, Clone)]
pub struct MultiRelaySubscriber {
    filter: SubscriptionFilter,
    endpoints: Vec<String>,
    subscription_id: String,
    policy: ReconnectPolicy,
}

impl MultiRelaySubscriber {
    /// Creates a subscriber. Duplicate endpoint URLs are connected once.
    pub fn new<I, S>(filter: SubscriptionFilter, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique = HashSet::new();
        let endpoints = endpoints
            .into_iter()
            .map(Into::into)
            .filter(|url: &String| unique.insert(url.clone()))
            .collect();

        Self {
            filter,
            endpoints,
            subscription_id: DEFAULT_SUBSCRIPTION_ID.to_string(),
            policy: ReconnectPolicy::default(),
        }
    }

    /// Overrides the reconnect delays.
    #[must_use]
    pub const fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Overrides the subscription id.
    #[must_use]
    pub fn with_subscription_id(mut self, id: impl Into<String>) -> Self {
        self.subscription_id = id.into();
        self
    }

    /// Endpoints that will be connected.
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Spawns one task per endpoint and returns the merged event stream.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(self) -> Subscription {
        self.start_with(&CancellationToken::new())
    }

    /// Like [`start`](Self::start), stopping when `parent` is cancelled.
    pub fn start_with(self, parent: &CancellationToken) -> Subscription {
        let cancel = parent.child_token();
        let gate = Arc::new(EventGate::new(self.filter));
        let wire_filter = gate.filter().to_filter();
        let subscription_id = SubscriptionId::new(self.subscription_id);
        let (events, receiver) = mpsc::unbounded_channel();

        info!(
            endpoints = self.endpoints.len(),
            start_time = gate.filter().start_time,
            "starting relay subscription"
        );

        for endpoint in self.endpoints {
            let task = EndpointTask {
                endpoint,
                subscription_id: subscription_id.clone(),
                filter: wire_filter.clone(),
                gate: Arc::clone(&gate),
                events: events.clone(),
                policy: self.policy,
                cancel: cancel.clone(),
            };
            tokio::spawn(task.run());
        }

        Subscription {
            receiver,
            gate,
            cancel,
        }
    }
}

/// Merged, de-duplicated event stream.
///
/// Dropping it stops every endpoint task; each sends `CLOSE` for its open
/// subscription.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<RelayEvent>,
    gate: Arc<EventGate>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Next admitted event, in arrival order. `None` once every endpoint
    /// task has stopped.
    pub async fn next(&mut self) -> Option<RelayEvent> {
        self.receiver.recv().await
    }

    /// Stops all endpoint tasks, closing their relay subscriptions. Events
    /// already admitted can still be read.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Number of distinct events emitted so far.
    pub fn emitted(&self) -> usize {
        self.gate.seen().len()
    }
}

impl Stream for Subscription {
    type Item = RelayEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
