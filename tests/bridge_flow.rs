//! End-to-end routing through the bridge with test doubles for every network.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{Ack, CHANNEL, MockRelay, now, signed_event, wait_until};
use nostr::Keys;
use nostr_bridge::agent::{LanguageModel, Orchestrator, PromptSet, QueryOptimizer};
use nostr_bridge::bridge::{APOLOGY, MessageBridge, Routed, run_loops};
use nostr_bridge::chat::ChatSend;
use nostr_bridge::core::{CHANNEL_MESSAGE_KIND, ChatMessage, SubscriptionFilter, summarize_key};
use nostr_bridge::error::{AgentError, ChatError, RelayError, RetrievalError};
use nostr_bridge::rag::{KnowledgeAugmenter, RetrievalService};
use nostr_bridge::relay::{MultiRelaySubscriber, NostrPublisher, RelayPublish};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const SECRET: &str = "6b911fd37cdf5c81d4c0adb1ab7fa822ed253ab0ad9aa18d77257c88b29b718e";

/// Answers optimizer prompts and answer prompts differently, recording both.
struct ScriptedModel {
    optimizer_reply: String,
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(optimizer_reply: &str, answer: &str) -> Arc<Self> {
        Arc::new(Self {
            optimizer_reply: optimizer_reply.to_string(),
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn prompt(&self, prompt: &str) -> Result<String, AgentError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if prompt.contains("optimized semantic query") {
            Ok(self.optimizer_reply.clone())
        } else {
            Ok(self.answer.clone())
        }
    }
}

struct FixedRetrieval {
    documents: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl FixedRetrieval {
    fn new(documents: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            documents: documents.iter().map(ToString::to_string).collect(),
            queries: Mutex::new(Vec::new()),
        })
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RetrievalService for FixedRetrieval {
    async fn query(&self, query: &str) -> Result<Vec<String>, RetrievalError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        Ok(self.documents.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Sent {
    chat_id: String,
    text: String,
    reply_to: Option<String>,
}

#[derive(Default)]
struct RecordingChat {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingChat {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatSend for RecordingChat {
    async fn send(
        &self,
        chat_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<(), ChatError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(Sent {
                chat_id: chat_id.to_string(),
                text: text.to_string(),
                reply_to: reply_to.map(ToString::to_string),
            });
        }
        Ok(())
    }
}

struct StubRelay {
    fail: bool,
    published: Mutex<Vec<String>>,
}

impl StubRelay {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            published: Mutex::new(Vec::new()),
        })
    }

    fn published(&self) -> Vec<String> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RelayPublish for StubRelay {
    async fn publish(&self, content: &str) -> Result<String, RelayError> {
        if self.fail {
            return Err(RelayError::Closed {
                endpoint: "wss://relay.example".to_string(),
            });
        }
        if let Ok(mut published) = self.published.lock() {
            published.push(content.to_string());
        }
        Ok("event-id".to_string())
    }

    fn public_key(&self) -> String {
        "b".repeat(64)
    }
}

fn chat_message(text: &str) -> ChatMessage {
    ChatMessage {
        chat_id: "-100123".to_string(),
        sender_name: "alice".to_string(),
        message_id: "77".to_string(),
        text: text.to_string(),
    }
}

fn bridge_with(
    chat: &Arc<RecordingChat>,
    relay: Arc<dyn RelayPublish>,
    model: Arc<ScriptedModel>,
    retrieval: Arc<FixedRetrieval>,
) -> MessageBridge {
    let orchestrator = Orchestrator::new(model, retrieval, PromptSet::default());
    MessageBridge::new(
        Arc::clone(chat) as Arc<dyn ChatSend>,
        relay,
        Arc::new(orchestrator),
        "-100123",
    )
}

#[tokio::test]
async fn test_query_is_answered_with_one_reply_and_no_publish() {
    let chat = Arc::new(RecordingChat::default());
    let relay = StubRelay::new(false);
    let model = ScriptedModel::new(
        "```json\n{\"query\": \"fog computing\"}\n```",
        "Fog computing extends cloud services to the network edge.",
    );
    let retrieval = FixedRetrieval::new(&["fog doc", "edge doc"]);
    let bridge = bridge_with(
        &chat,
        Arc::clone(&relay) as Arc<dyn RelayPublish>,
        Arc::clone(&model),
        Arc::clone(&retrieval),
    );

    let routed = bridge
        .on_chat_message(&chat_message("/q what is fog computing?"))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(routed, Routed::Answered);
    assert_eq!(retrieval.queries(), vec!["fog computing".to_string()]);
    assert!(relay.published().is_empty());

    let sent = chat.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat_id, "-100123");
    assert_eq!(sent[0].reply_to.as_deref(), Some("77"));
    assert!(sent[0].text.contains("Fog computing extends cloud services"));

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Document 1 of 2"));
    assert!(prompts[1].contains("Document 2 of 2"));
    assert!(prompts[1].contains("what is fog computing?"));
}

#[tokio::test]
async fn test_plain_message_is_published_with_attribution() {
    let chat = Arc::new(RecordingChat::default());
    let relay = StubRelay::new(false);
    let bridge = bridge_with(
        &chat,
        Arc::clone(&relay) as Arc<dyn RelayPublish>,
        ScriptedModel::new("{}", "unused"),
        FixedRetrieval::new(&[]),
    );

    let routed = bridge
        .on_chat_message(&chat_message("hello channel"))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(routed, Routed::Published("event-id".to_string()));
    assert_eq!(
        relay.published(),
        vec!["From @alice on Telegram:\n\nhello channel".to_string()]
    );
    assert!(chat.sent().is_empty());
}

#[tokio::test]
async fn test_publish_failure_sends_apology() {
    let chat = Arc::new(RecordingChat::default());
    let bridge = bridge_with(
        &chat,
        StubRelay::new(true),
        ScriptedModel::new("{}", "unused"),
        FixedRetrieval::new(&[]),
    );

    let routed = bridge
        .on_chat_message(&chat_message("hello channel"))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(routed, Routed::Apologized);
    let sent = chat.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, APOLOGY);
    assert_eq!(sent[0].chat_id, "-100123");
}

#[tokio::test]
async fn test_optimizer_falls_back_to_original_query() {
    let model = ScriptedModel::new("I cannot produce JSON today.", "unused");
    let optimizer = QueryOptimizer::new(model.clone(), Arc::new(PromptSet::default()));

    assert_eq!(optimizer.optimize("find X").await, "find X");
    assert_eq!(model.prompts().len(), 1);
}

#[tokio::test]
async fn test_knowledge_rendering_edges() {
    let empty = KnowledgeAugmenter::new(FixedRetrieval::new(&[]));
    assert_eq!(empty.augment("anything").await.unwrap_or_default(), "");

    let single = KnowledgeAugmenter::new(FixedRetrieval::new(&["only doc"]));
    let rendered = single.augment("anything").await.unwrap_or_default();
    assert!(rendered.contains("Document 1 of 1"));
    assert!(rendered.contains("only doc"));
    assert!(!rendered.contains("Document 2"));
}

#[tokio::test]
async fn test_own_events_are_not_echoed_back_into_chat() {
    let relay = MockRelay::start(Vec::new(), Ack::Accept).await;
    let publisher = NostrPublisher::new(SECRET, relay.url.as_str(), "channel-root")
        .unwrap_or_else(|_| unreachable!())
        .with_ack_timeout(Duration::from_secs(5));

    let chat = Arc::new(RecordingChat::default());
    let bridge = Arc::new(bridge_with(
        &chat,
        Arc::new(publisher),
        ScriptedModel::new("{}", "unused"),
        FixedRetrieval::new(&[]),
    ));

    let subscription = MultiRelaySubscriber::new(
        SubscriptionFilter::new(CHANNEL, 10, [CHANNEL_MESSAGE_KIND], 0),
        [relay.url.clone()],
    )
    .start();
    relay.wait_for_subscriptions(1).await;

    let (chat_tx, chat_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let loops = tokio::spawn(run_loops(
        Arc::clone(&bridge),
        subscription,
        chat_rx,
        cancel.clone(),
    ));

    let _ = chat_tx.send(chat_message("hello"));
    wait_until(|| relay.published().len() == 1).await;
    assert_eq!(relay.published().len(), 1);

    // Relay events are handled in order, so once the foreign event shows up
    // the echoed one has already been dropped.
    let stranger = Keys::generate();
    relay.broadcast(signed_event(&stranger, now(), "hi bridge"));
    wait_until(|| !chat.sent().is_empty()).await;

    let sent = chat.sent();
    assert_eq!(sent.len(), 1, "got {sent:?}");
    let author = summarize_key(&stranger.public_key().to_hex());
    assert!(sent[0].text.starts_with(&format!("From Nostr user {author}:")));
    assert!(sent[0].text.ends_with("hi bridge"));

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), loops).await;
}
