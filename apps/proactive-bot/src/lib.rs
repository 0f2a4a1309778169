//! Echo bot with proactive delivery.
//!
//! Inbound activities arrive on `POST /api/messages`. Message turns bump a per-conversation
//! counter and echo the text; join events capture a conversation reference. Any message that
//! starts with "proactive" makes the bot call its own `POST /api/proactive` endpoint, which
//! replays the stored reference and pushes a message outside the original turn.

pub mod bot;
pub mod config;
pub mod error;
pub mod http;
pub mod trigger;

use std::time::Duration;

use proactive_state::SharedStorage;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, warn};

pub use bot::{COUNTER_PROPERTY, CounterState, PROACTIVE_MESSAGE, ProactiveBot, is_proactive_trigger};
pub use config::BotConfig;
pub use error::ApiError;
pub use http::{AppState, build_router};
pub use trigger::{
    HttpTriggerDispatcher, QueuedTriggerDispatcher, SharedTriggerDispatcher, TriggerDispatcher,
};

/// How often expired state is swept for a given retention.
pub fn purge_interval(ttl: Duration) -> Duration {
    (ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(300))
}

/// Periodically drops conversation state older than the storage retention.
pub fn spawn_purge_task(storage: SharedStorage, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match storage.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "expired conversation state purged"),
                Err(err) => warn!(error = %err, "conversation state purge failed"),
            }
        }
    })
}
