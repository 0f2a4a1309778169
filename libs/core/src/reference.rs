use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::activity::{Activity, ChannelAccount, ConversationAccount, activity_types};

/// Name of the synthetic event a continuation turn is built around.
pub const CONTINUE_CONVERSATION_EVENT: &str = "ContinueConversation";

/// Snapshot of the routing data needed to re-enter a conversation outside of a live turn.
///
/// ```
/// use proactive_core::{ConversationAccount, ConversationReference};
///
/// let reference = ConversationReference {
///     conversation: ConversationAccount::new("conv-1"),
///     channel_id: "msteams".into(),
///     service_url: "https://smba.trafficmanager.net/emea/".into(),
///     ..Default::default()
/// };
/// assert!(reference.validate().is_ok());
/// assert_eq!(reference.conversation_id(), "conv-1");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConversationReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<ChannelAccount>,
    #[serde(default)]
    pub conversation: ConversationAccount,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub service_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("conversation reference has no channel id")]
    MissingChannel,
    #[error("conversation reference has no conversation id")]
    MissingConversation,
    #[error("conversation reference has an invalid service url: {0}")]
    InvalidServiceUrl(String),
}

impl ConversationReference {
    pub fn conversation_id(&self) -> &str {
        &self.conversation.id
    }

    /// Checks that the reference can address a conversation at all. Whether the channel still
    /// accepts it is only known at delivery time.
    pub fn validate(&self) -> Result<(), ReferenceError> {
        if self.channel_id.trim().is_empty() {
            return Err(ReferenceError::MissingChannel);
        }
        if self.conversation.id.trim().is_empty() {
            return Err(ReferenceError::MissingConversation);
        }
        match Url::parse(&self.service_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
            _ => Err(ReferenceError::InvalidServiceUrl(self.service_url.clone())),
        }
    }

    /// Builds the inbound event a continuation turn carries. Sender and recipient are restored
    /// to their inbound orientation so the turn looks like it arrived on this conversation.
    pub fn continuation_activity(&self) -> Activity {
        let mut activity = Activity::new(activity_types::EVENT);
        activity.name = Some(CONTINUE_CONVERSATION_EVENT.to_string());
        activity.channel_id = Some(self.channel_id.clone());
        activity.service_url = Some(self.service_url.clone());
        activity.conversation = Some(self.conversation.clone());
        activity.from = self.user.clone();
        activity.recipient = self.bot.clone();
        activity.locale = self.locale.clone();
        activity.with_generated_id()
    }
}

/// Payload accepted by the proactive trigger endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProactiveRequest {
    pub conversation_reference: ConversationReference,
    pub message: String,
}

impl ProactiveRequest {
    pub fn new(conversation_reference: ConversationReference, message: impl Into<String>) -> Self {
        Self {
            conversation_reference,
            message: message.into(),
        }
    }
}
