use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;

use crate::activity::{Activity, ResourceResponse};
use crate::error::AdapterError;
use crate::reference::ConversationReference;

/// Transport seam: delivers one outgoing activity to the conversation a reference points at.
#[async_trait]
pub trait ActivitySender: Send + Sync {
    async fn send_activity(
        &self,
        reference: &ConversationReference,
        activity: Activity,
    ) -> Result<ResourceResponse, AdapterError>;
}

pub type SharedActivitySender = Arc<dyn ActivitySender>;

/// Bot logic invoked once per turn.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    async fn on_turn(&self, turn: &TurnContext) -> anyhow::Result<()>;
}

/// Context of one turn, bound to a single conversation.
///
/// Live turns are built from an inbound activity; continuation turns are built from a stored
/// [`ConversationReference`] and never touch the inbound listener.
pub struct TurnContext {
    activity: Activity,
    reference: ConversationReference,
    reply_to_id: Option<String>,
    continuation: bool,
    sender: SharedActivitySender,
    responded: AtomicBool,
}

impl TurnContext {
    pub fn for_activity(activity: Activity, sender: SharedActivitySender) -> Self {
        let reference = activity.conversation_reference();
        Self {
            reply_to_id: activity.id.clone(),
            activity,
            reference,
            continuation: false,
            sender,
            responded: AtomicBool::new(false),
        }
    }

    pub fn for_continuation(reference: ConversationReference, sender: SharedActivitySender) -> Self {
        Self {
            activity: reference.continuation_activity(),
            reference,
            reply_to_id: None,
            continuation: true,
            sender,
            responded: AtomicBool::new(false),
        }
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn reference(&self) -> &ConversationReference {
        &self.reference
    }

    pub fn conversation_id(&self) -> &str {
        self.reference.conversation_id()
    }

    pub fn is_continuation(&self) -> bool {
        self.continuation
    }

    /// Whether at least one activity was delivered during this turn.
    pub fn responded(&self) -> bool {
        self.responded.load(Ordering::SeqCst)
    }

    pub async fn send_activity(
        &self,
        mut activity: Activity,
    ) -> Result<ResourceResponse, AdapterError> {
        activity.apply_conversation_reference(&self.reference);
        if activity.reply_to_id.is_none() {
            activity.reply_to_id = self.reply_to_id.clone();
        }
        activity.ensure_defaults();
        let response = self.sender.send_activity(&self.reference, activity).await?;
        self.responded.store(true, Ordering::SeqCst);
        Ok(response)
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<ResourceResponse, AdapterError> {
        self.send_activity(Activity::message(text)).await
    }
}
