use std::sync::Arc;

use proactive_state::{ConversationState, StateKey, shared_memory_storage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Counter {
    count: u64,
}

async fn increment(state: &ConversationState, key: &StateKey) -> u64 {
    let mut turn = state.load(key).await.unwrap();
    let mut counter: Counter = turn.get_or_default("Counter").unwrap();
    tokio::task::yield_now().await;
    counter.count += 1;
    turn.set("Counter", &counter).unwrap();
    state.save_changes(&mut turn).await.unwrap();
    counter.count
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_conversation_turns_never_lose_updates() {
    let state = Arc::new(ConversationState::new(shared_memory_storage(None)));
    let key = StateKey::new("msteams", "19:shared");

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let state = Arc::clone(&state);
            let key = key.clone();
            tokio::spawn(async move { increment(&state, &key).await })
        })
        .collect();
    let mut observed = Vec::new();
    for task in tasks {
        observed.push(task.await.unwrap());
    }
    observed.sort_unstable();

    assert_eq!(observed, (1..=32).collect::<Vec<_>>());
    let turn = state.load(&key).await.unwrap();
    assert_eq!(turn.get::<Counter>("Counter").unwrap().unwrap().count, 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn conversations_are_independent() {
    let state = Arc::new(ConversationState::new(shared_memory_storage(None)));
    let first = StateKey::new("msteams", "a");
    let second = StateKey::new("msteams", "b");

    let held = state.load(&first).await.unwrap();
    assert_eq!(increment(&state, &second).await, 1);
    drop(held);

    assert_eq!(increment(&state, &first).await, 1);
    assert_eq!(increment(&state, &second).await, 2);
}
