//! In-process doubles for exercising bots without a channel connector.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::activity::{Activity, ResourceResponse};
use crate::error::AdapterError;
use crate::reference::ConversationReference;
use crate::turn::ActivitySender;

/// Failure the [`RecordingSender`] reports instead of accepting an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    AccessDenied,
    Unavailable,
}

/// Captures every activity handed to the transport.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(ConversationReference, Activity)>>,
    failure: Mutex<Option<SendFailure>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, failure: Option<SendFailure>) {
        *self.failure.lock().expect("failure lock") = failure;
    }

    pub fn sent(&self) -> Vec<(ConversationReference, Activity)> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|(_, activity)| activity.text)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().expect("sent lock").clear();
    }
}

#[async_trait]
impl ActivitySender for RecordingSender {
    async fn send_activity(
        &self,
        reference: &ConversationReference,
        activity: Activity,
    ) -> Result<ResourceResponse, AdapterError> {
        let failure = *self.failure.lock().expect("failure lock");
        match failure {
            Some(SendFailure::AccessDenied) => {
                return Err(AdapterError::access_denied("recording sender denies access"));
            }
            Some(SendFailure::Unavailable) => {
                return Err(AdapterError::transport(
                    Some(503),
                    "recording sender unavailable",
                    false,
                ));
            }
            None => {}
        }
        let mut sent = self.sent.lock().expect("sent lock");
        sent.push((reference.clone(), activity));
        Ok(ResourceResponse {
            id: Some(format!("recorded-{}", sent.len())),
        })
    }
}
