//! In-process websocket relay used by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use nostr::{EventBuilder, Keys, Kind, Tag, TagKind, Timestamp};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// How the relay answers published events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// `OK true`, and the event is broadcast to subscribers.
    Accept,
    /// `OK false`.
    Reject,
    /// No answer at all.
    Silent,
}

/// Handle to a running relay.
#[derive(Clone)]
pub struct MockRelay {
    pub url: String,
    published: Arc<Mutex<Vec<Value>>>,
    subscriptions: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    live: broadcast::Sender<Value>,
}

impl MockRelay {
    /// Starts a relay that replays `stored` to every new subscription.
    pub async fn start(stored: Vec<Value>, ack: Ack) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|_| unreachable!());
        let addr = listener.local_addr().unwrap_or_else(|_| unreachable!());
        let (live, _) = broadcast::channel(64);

        let relay = Self {
            url: format!("ws://{addr}"),
            published: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            live,
        };

        let server = relay.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let connection = server.clone();
                let stored = stored.clone();
                tokio::spawn(async move { connection.serve(stream, stored, ack).await });
            }
        });
        relay
    }

    async fn serve(self, stream: tokio::net::TcpStream, stored: Vec<Value>, ack: Ack) {
        let Ok(socket) = accept_async(stream).await else {
            return;
        };
        let (mut sink, mut source) = socket.split();
        let mut live = self.live.subscribe();
        let mut subscription: Option<String> = None;

        loop {
            tokio::select! {
                frame = source.next() => {
                    let Some(Ok(Message::Text(text))) = frame else { break };
                    let frame: Vec<Value> = serde_json::from_str(text.as_str()).unwrap_or_default();
                    match frame.first().and_then(Value::as_str) {
                        Some("REQ") => {
                            let id = frame.get(1).and_then(Value::as_str).unwrap_or_default().to_string();
                            for event in &stored {
                                let _ = sink.send(text_frame(&json!(["EVENT", id, event]))).await;
                            }
                            let _ = sink.send(text_frame(&json!(["EOSE", id]))).await;
                            subscription = Some(id);
                            self.subscriptions.fetch_add(1, Ordering::SeqCst);
                        }
                        Some("CLOSE") => {
                            if frame.get(1).and_then(Value::as_str) == subscription.as_deref() {
                                subscription = None;
                                self.closes.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                        Some("EVENT") => {
                            let event = frame.get(1).cloned().unwrap_or_default();
                            let id = event["id"].clone();
                            match ack {
                                Ack::Accept => {
                                    // Broadcast before recording so a test that
                                    // waits on `published` sees the echo queued.
                                    let _ = self.live.send(event.clone());
                                    if let Ok(mut published) = self.published.lock() {
                                        published.push(event);
                                    }
                                    let _ = sink.send(text_frame(&json!(["OK", id, true, ""]))).await;
                                }
                                Ack::Reject => {
                                    let _ = sink
                                        .send(text_frame(&json!(["OK", id, false, "blocked: test relay"])))
                                        .await;
                                }
                                Ack::Silent => {}
                            }
                        }
                        _ => {}
                    }
                }
                event = live.recv() => {
                    let Ok(event) = event else { break };
                    if let Some(id) = &subscription {
                        let _ = sink.send(text_frame(&json!(["EVENT", id, event]))).await;
                    }
                }
            }
        }
    }

    /// Sends `event` to every open subscription.
    pub fn broadcast(&self, event: Value) {
        let _ = self.live.send(event);
    }

    /// Events accepted through `EVENT` frames.
    pub fn published(&self) -> Vec<Value> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Number of `REQ` frames received.
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Number of `CLOSE` frames received for an open subscription.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Waits until at least `n` subscriptions are open.
    pub async fn wait_for_subscriptions(&self, n: usize) {
        wait_until(|| self.subscriptions() >= n).await;
    }
}

fn text_frame(value: &Value) -> Message {
    Message::Text(value.to_string().into())
}

/// Polls `condition` every 10 ms for up to five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Current unix time in seconds.
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Channel root every test event is tagged with.
pub const CHANNEL: &str = "channel-root";

/// A kind-42 channel message signed by `keys`, in wire form.
pub fn signed_event(keys: &Keys, created_at: u64, content: &str) -> Value {
    signed_event_with(keys, 42, CHANNEL, created_at, content)
}

/// Like [`signed_event`] with an explicit kind and channel.
pub fn signed_event_with(keys: &Keys, kind: u16, channel: &str, created_at: u64, content: &str) -> Value {
    let event = EventBuilder::new(Kind::from(kind), content)
        .tag(Tag::custom(TagKind::custom("e"), [channel, "", "root"]))
        .custom_created_at(Timestamp::from(created_at))
        .sign_with_keys(keys)
        .unwrap_or_else(|_| unreachable!());
    serde_json::to_value(&event).unwrap_or_default()
}

/// The `id` field of a wire event.
pub fn event_id(event: &Value) -> String {
    event["id"].as_str().unwrap_or_default().to_string()
}
