use async_trait::async_trait;
use proactive_core::{ActivityHandler, ConversationReference, ProactiveRequest, TurnContext};
use proactive_state::{ConversationState, REFERENCE_PROPERTY, StateKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::trigger::SharedTriggerDispatcher;

pub const PROACTIVE_MESSAGE: &str = "This is a proactive message.";
pub const COUNTER_PROPERTY: &str = "CounterState";

const TRIGGER_PREFIX: &str = "proactive";

/// Number of message turns seen in one conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub count: u64,
}

/// `true` when the trimmed, lowercased text starts with "proactive".
pub fn is_proactive_trigger(text: Option<&str>) -> bool {
    text.is_some_and(|t| t.trim().to_lowercase().starts_with(TRIGGER_PREFIX))
}

/// Echo bot that remembers where each conversation lives and can ask to be called back.
pub struct ProactiveBot {
    state: ConversationState,
    dispatcher: SharedTriggerDispatcher,
}

impl ProactiveBot {
    pub fn new(state: ConversationState, dispatcher: SharedTriggerDispatcher) -> Self {
        Self { state, dispatcher }
    }

    async fn on_message(&self, turn: &TurnContext) -> anyhow::Result<()> {
        let activity = turn.activity();
        let text = activity.text.clone().unwrap_or_default();
        let key = StateKey::from_reference(turn.reference());

        let mut state = self.state.load(&key).await?;
        let mut counter: CounterState = state.get_or_default(COUNTER_PROPERTY)?;
        counter.count += 1;
        state.set(COUNTER_PROPERTY, &counter)?;

        // Only a join stores the reference; the self-call falls back to this turn's address.
        let stored: Option<ConversationReference> = state.get(REFERENCE_PROPERTY)?;
        self.state.save_changes(&mut state).await?;
        drop(state);

        if is_proactive_trigger(activity.text.as_deref()) {
            info!(stored = stored.is_some(), "proactive trigger requested");
            let reference = stored.unwrap_or_else(|| activity.conversation_reference());
            self.dispatcher
                .dispatch(ProactiveRequest::new(reference, PROACTIVE_MESSAGE))
                .await;
        }

        turn.send_text(format!("Turn {}: You sent '{}'", counter.count, text)).await?;
        Ok(())
    }

    async fn on_members_added(&self, turn: &TurnContext) -> anyhow::Result<()> {
        let activity = turn.activity();
        let own_id = activity.recipient.as_ref().map(|account| account.id.as_str());
        if !activity
            .members_added
            .iter()
            .any(|member| Some(member.id.as_str()) != own_id)
        {
            debug!("only the bot joined; nothing to record");
            return Ok(());
        }

        let key = StateKey::from_reference(turn.reference());
        let mut state = self.state.load(&key).await?;
        state.set(REFERENCE_PROPERTY, &activity.conversation_reference())?;
        self.state.save_changes(&mut state).await?;
        drop(state);
        info!("conversation reference captured");

        turn.send_text(format!("{} event detected", activity.r#type)).await?;
        Ok(())
    }
}

#[async_trait]
impl ActivityHandler for ProactiveBot {
    async fn on_turn(&self, turn: &TurnContext) -> anyhow::Result<()> {
        let activity = turn.activity();
        if activity.is_message() {
            self.on_message(turn).await
        } else if !activity.members_added.is_empty() {
            self.on_members_added(turn).await
        } else {
            debug!(activity_type = %activity.r#type, "activity ignored");
            Ok(())
        }
    }
}
