use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use proactive_bot::{PROACTIVE_MESSAGE, ProactiveBot, TriggerDispatcher};
use proactive_core::{
    Activity, BotAdapter, ConversationReference, ProactiveRequest, testkit::RecordingSender,
};
use proactive_state::{
    ConversationState, MemoryStorage, Result as StateResult, StateKey, Storage, StoredState,
};
use serde_json::json;

/// Memory storage that counts writes.
#[derive(Default)]
struct CountingStorage {
    inner: MemoryStorage,
    writes: AtomicUsize,
}

#[async_trait]
impl Storage for CountingStorage {
    async fn read(&self, key: &str) -> StateResult<Option<StoredState>> {
        self.inner.read(key).await
    }

    async fn write(&self, record: StoredState) -> StateResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(record).await
    }

    async fn delete(&self, key: &str) -> StateResult<()> {
        self.inner.delete(key).await
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    seen: Mutex<Vec<ProactiveRequest>>,
}

#[async_trait]
impl TriggerDispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: ProactiveRequest) {
        self.seen.lock().unwrap().push(request);
    }
}

struct Harness {
    adapter: BotAdapter,
    bot: ProactiveBot,
    sender: Arc<RecordingSender>,
    storage: Arc<CountingStorage>,
    dispatcher: Arc<RecordingDispatcher>,
    state: ConversationState,
}

impl Harness {
    fn new() -> Self {
        let sender = Arc::new(RecordingSender::new());
        let storage = Arc::new(CountingStorage::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let state = ConversationState::new(storage.clone());
        Self {
            adapter: BotAdapter::new(sender.clone()),
            bot: ProactiveBot::new(state.clone(), dispatcher.clone()),
            sender,
            storage,
            dispatcher,
            state,
        }
    }

    async fn turn(&self, activity: Activity) {
        self.adapter
            .process_activity(activity, &self.bot)
            .await
            .expect("turn succeeds");
    }

    fn writes(&self) -> usize {
        self.storage.writes.load(Ordering::SeqCst)
    }

    async fn stored_reference(&self) -> Option<ConversationReference> {
        self.state
            .reference(&StateKey::new("emulator", "conv-1"))
            .await
            .unwrap()
    }
}

fn activity(value: serde_json::Value) -> Activity {
    let mut base = json!({
        "channelId": "emulator",
        "serviceUrl": "http://localhost:50000",
        "from": { "id": "user-1", "name": "User" },
        "recipient": { "id": "bot-1", "name": "Bot" },
        "conversation": { "id": "conv-1" }
    });
    if let (Some(base), Some(extra)) = (base.as_object_mut(), value.as_object()) {
        base.extend(extra.clone());
    }
    serde_json::from_value(base).unwrap()
}

fn message(id: &str, text: &str) -> Activity {
    activity(json!({ "type": "message", "id": id, "text": text }))
}

fn join(id: &str, members: &[&str]) -> Activity {
    let members: Vec<_> = members.iter().map(|m| json!({ "id": m })).collect();
    activity(json!({ "type": "conversationUpdate", "id": id, "membersAdded": members }))
}

#[tokio::test]
async fn counter_increments_once_per_message() {
    let harness = Harness::new();
    for i in 1..=5 {
        harness.turn(message(&format!("m{i}"), &format!("hi {i}"))).await;
    }

    let expected: Vec<_> = (1..=5).map(|i| format!("Turn {i}: You sent 'hi {i}'")).collect();
    assert_eq!(harness.sender.texts(), expected);
    assert!(harness.dispatcher.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn replies_answer_the_inbound_activity() {
    let harness = Harness::new();
    harness.turn(message("in-9", "hello")).await;

    let sent = harness.sender.sent();
    let (_, reply) = &sent[0];
    assert_eq!(reply.reply_to_id.as_deref(), Some("in-9"));
    assert_eq!(reply.from.as_ref().map(|a| a.id.as_str()), Some("bot-1"));
    assert_eq!(reply.recipient.as_ref().map(|a| a.id.as_str()), Some("user-1"));
}

#[tokio::test]
async fn message_without_text_echoes_empty() {
    let harness = Harness::new();
    harness
        .turn(activity(json!({ "type": "message", "id": "m1" })))
        .await;
    assert_eq!(harness.sender.texts(), ["Turn 1: You sent ''"]);
    assert!(harness.dispatcher.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn join_writes_one_reference_regardless_of_member_count() {
    let harness = Harness::new();
    let event = join("j1", &["user-1", "user-2", "bot-1"]);
    let expected = event.conversation_reference();

    harness.turn(event).await;

    assert_eq!(harness.writes(), 1);
    assert_eq!(harness.sender.texts(), ["conversationUpdate event detected"]);
    assert_eq!(harness.stored_reference().await, Some(expected));
}

#[tokio::test]
async fn bot_only_join_records_and_replies_nothing() {
    let harness = Harness::new();
    harness.turn(join("j1", &["bot-1"])).await;
    harness.turn(join("j2", &[])).await;

    assert_eq!(harness.writes(), 0);
    assert!(harness.sender.sent().is_empty());
    assert_eq!(harness.stored_reference().await, None);
}

#[tokio::test]
async fn other_activities_are_ignored() {
    let harness = Harness::new();
    harness
        .turn(activity(json!({ "type": "typing", "id": "t1" })))
        .await;
    assert_eq!(harness.writes(), 0);
    assert!(harness.sender.sent().is_empty());
}

#[tokio::test]
async fn proactive_text_dispatches_exactly_one_request() {
    let harness = Harness::new();
    harness.turn(join("j1", &["user-1"])).await;
    let stored = harness.stored_reference().await.unwrap();

    harness.turn(message("m1", "Proactive: ping")).await;

    let seen = harness.dispatcher.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].conversation_reference, stored);
    assert_eq!(seen[0].message, PROACTIVE_MESSAGE);
    assert_eq!(
        harness.sender.texts().last().map(String::as_str),
        Some("Turn 1: You sent 'Proactive: ping'")
    );
}

#[tokio::test]
async fn messages_never_store_a_reference() {
    let harness = Harness::new();
    let first = message("m1", "proactive please");
    let addressed_to = first.conversation_reference();

    harness.turn(first).await;
    harness.turn(message("m2", "again")).await;

    assert_eq!(harness.writes(), 2);
    assert_eq!(harness.stored_reference().await, None);
    let seen = harness.dispatcher.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].conversation_reference, addressed_to);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_turns_of_one_conversation_keep_every_increment() {
    let harness = Arc::new(Harness::new());
    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move { harness.turn(message(&format!("m{i}"), "x")).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let mut turns: Vec<u64> = harness
        .sender
        .texts()
        .iter()
        .filter_map(|text| text.strip_prefix("Turn "))
        .filter_map(|rest| rest.split(':').next())
        .map(|n| n.parse().unwrap())
        .collect();
    turns.sort_unstable();
    assert_eq!(turns, (1..=20).collect::<Vec<_>>());
}
