use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::reference::ConversationReference;

/// Activity type names used on the wire.
pub mod activity_types {
    pub const MESSAGE: &str = "message";
    pub const CONVERSATION_UPDATE: &str = "conversationUpdate";
    pub const EVENT: &str = "event";
}

/// Bot Framework activity as exchanged with the channel connector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub r#type: String,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_added: Vec<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_removed: Vec<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Activity {
    /// Creates a new activity with the provided type and empty payload.
    pub fn new(r#type: impl Into<String>) -> Self {
        Self {
            id: None,
            r#type: r#type.into(),
            timestamp: None,
            channel_id: None,
            service_url: None,
            from: None,
            recipient: None,
            conversation: None,
            text: None,
            name: None,
            members_added: Vec::new(),
            members_removed: Vec::new(),
            reply_to_id: None,
            locale: None,
            attachments: Vec::new(),
            entities: Vec::new(),
            channel_data: None,
            value: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Plain text message activity.
    pub fn message(text: impl Into<String>) -> Self {
        let mut activity = Self::new(activity_types::MESSAGE);
        activity.text = Some(text.into());
        activity
    }

    pub fn is_message(&self) -> bool {
        self.r#type.eq_ignore_ascii_case(activity_types::MESSAGE)
    }

    /// Conversation id, if the activity carries a non-empty one.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation
            .as_ref()
            .map(|conversation| conversation.id.as_str())
            .filter(|id| !id.trim().is_empty())
    }

    /// Snapshots the routing information of an inbound activity so the conversation can be
    /// re-entered later. The sender becomes the reference's user and the recipient its bot.
    pub fn conversation_reference(&self) -> ConversationReference {
        ConversationReference {
            activity_id: self.id.clone(),
            user: self.from.clone(),
            bot: self.recipient.clone(),
            conversation: self.conversation.clone().unwrap_or_default(),
            channel_id: self.channel_id.clone().unwrap_or_default(),
            service_url: self.service_url.clone().unwrap_or_default(),
            locale: self.locale.clone(),
        }
    }

    /// Addresses an outgoing activity to the conversation captured by `reference`.
    pub fn apply_conversation_reference(&mut self, reference: &ConversationReference) {
        self.channel_id = Some(reference.channel_id.clone());
        self.service_url = Some(reference.service_url.clone());
        self.conversation = Some(reference.conversation.clone());
        self.from = reference.bot.clone();
        self.recipient = reference.user.clone();
        if self.locale.is_none() {
            self.locale = reference.locale.clone();
        }
    }

    pub(crate) fn ensure_defaults(&mut self) {
        if self.r#type.trim().is_empty() {
            self.r#type = activity_types::MESSAGE.into();
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(OffsetDateTime::now_utc());
        }
    }

    pub(crate) fn with_generated_id(mut self) -> Self {
        if self.id.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            self.id = Some(Uuid::new_v4().to_string());
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_object_id: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl ConversationAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// Identifier returned by the channel after an activity was accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResourceResponse {
    #[serde(default)]
    pub id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn join_event() -> Activity {
        serde_json::from_value(json!({
            "type": "conversationUpdate",
            "id": "act-1",
            "channelId": "msteams",
            "serviceUrl": "https://smba.trafficmanager.net/emea/",
            "from": { "id": "user-1", "name": "Ada" },
            "recipient": { "id": "bot-1", "name": "Proactive" },
            "conversation": { "id": "conv-1", "tenantId": "tenant-9" },
            "membersAdded": [{ "id": "user-1" }, { "id": "bot-1" }],
            "locale": "en-US",
            "customField": 42
        }))
        .expect("activity json")
    }

    #[test]
    fn deserializes_wire_activity_and_keeps_unknown_fields() {
        let activity = join_event();
        assert_eq!(activity.r#type, "conversationUpdate");
        assert_eq!(activity.members_added.len(), 2);
        assert_eq!(activity.conversation_id(), Some("conv-1"));
        assert_eq!(activity.extra.get("customField"), Some(&json!(42)));
        assert!(!activity.is_message());
    }

    #[test]
    fn reference_swaps_sender_and_recipient_roles() {
        let reference = join_event().conversation_reference();
        assert_eq!(reference.user.as_ref().map(|u| u.id.as_str()), Some("user-1"));
        assert_eq!(reference.bot.as_ref().map(|b| b.id.as_str()), Some("bot-1"));
        assert_eq!(reference.activity_id.as_deref(), Some("act-1"));
        assert_eq!(reference.channel_id, "msteams");
        assert_eq!(reference.conversation.tenant_id.as_deref(), Some("tenant-9"));
    }

    #[test]
    fn outgoing_activity_is_addressed_from_the_bot() {
        let reference = join_event().conversation_reference();
        let mut reply = Activity::message("hi");
        reply.apply_conversation_reference(&reference);
        assert_eq!(reply.from.as_ref().map(|a| a.id.as_str()), Some("bot-1"));
        assert_eq!(reply.recipient.as_ref().map(|a| a.id.as_str()), Some("user-1"));
        assert_eq!(reply.conversation_id(), Some("conv-1"));
        assert_eq!(reply.locale.as_deref(), Some("en-US"));
    }

    #[test]
    fn blank_conversation_id_is_treated_as_missing() {
        let mut activity = Activity::message("x");
        activity.conversation = Some(ConversationAccount::new("  "));
        assert_eq!(activity.conversation_id(), None);
    }
}
