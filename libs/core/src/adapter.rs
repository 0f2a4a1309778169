use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{Instrument, info_span};

use crate::activity::Activity;
use crate::turn::{ActivityHandler, SharedActivitySender, TurnContext};

/// Runs inbound activities through the bot as live turns.
#[derive(Clone)]
pub struct BotAdapter {
    sender: SharedActivitySender,
}

impl BotAdapter {
    pub fn new(sender: SharedActivitySender) -> Self {
        Self { sender }
    }

    pub fn sender(&self) -> SharedActivitySender {
        Arc::clone(&self.sender)
    }

    pub async fn process_activity(
        &self,
        activity: Activity,
        handler: &dyn ActivityHandler,
    ) -> Result<()> {
        if activity.conversation_id().is_none() {
            bail!("activity has no conversation id");
        }
        let span = info_span!(
            "turn",
            activity_type = %activity.r#type,
            channel_id = activity.channel_id.as_deref().unwrap_or_default(),
            conversation_id = activity.conversation_id().unwrap_or_default(),
            activity_id = activity.id.as_deref().unwrap_or_default(),
        );
        let turn = TurnContext::for_activity(activity, self.sender());
        handler.on_turn(&turn).instrument(span).await
    }
}
