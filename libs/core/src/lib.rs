//! Core contracts for proactive bots.
//!
//! This crate holds the activity model exchanged with channels, the conversation reference
//! snapshot that lets a bot re-enter a conversation later, the turn context handed to bot
//! logic, and the continuation engine that builds synthetic turns from stored references.
pub mod activity;
pub mod adapter;
pub mod backoff;
pub mod connector;
pub mod continuation;
pub mod error;
pub mod reference;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
pub mod turn;

pub use activity::{
    Activity, Attachment, ChannelAccount, ConversationAccount, ResourceResponse, activity_types,
};
pub use adapter::BotAdapter;
pub use connector::{ConnectorClient, ConnectorCredentials};
pub use continuation::ContinuationEngine;
pub use error::AdapterError;
pub use reference::{
    CONTINUE_CONVERSATION_EVENT, ConversationReference, ProactiveRequest, ReferenceError,
};
pub use turn::{ActivityHandler, ActivitySender, SharedActivitySender, TurnContext};

/// Re-exported so callers can build cancellation signals for continuations.
pub use tokio_util::sync::CancellationToken;
