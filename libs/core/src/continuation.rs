use std::{future::Future, sync::Arc};

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::AdapterError;
use crate::reference::ConversationReference;
use crate::turn::{SharedActivitySender, TurnContext};

/// Re-enters a previously captured conversation from outside any live turn.
///
/// The engine's contract ends once the callback ran against a turn bound to the target
/// conversation; whether the user actually received anything is up to the sender.
#[derive(Clone)]
pub struct ContinuationEngine {
    app_id: String,
    sender: SharedActivitySender,
}

impl ContinuationEngine {
    pub fn new(app_id: impl Into<String>, sender: SharedActivitySender) -> Self {
        Self {
            app_id: app_id.into(),
            sender,
        }
    }

    #[instrument(
        name = "continue_conversation",
        skip_all,
        fields(channel_id = %reference.channel_id, conversation_id = %reference.conversation.id)
    )]
    pub async fn continue_conversation<F, Fut>(
        &self,
        app_id: &str,
        reference: ConversationReference,
        callback: F,
        cancel: CancellationToken,
    ) -> Result<(), AdapterError>
    where
        F: FnOnce(TurnContext) -> Fut + Send,
        Fut: Future<Output = Result<(), AdapterError>> + Send,
    {
        if app_id != self.app_id {
            counter!("proactive_continuation_total", "outcome" => "denied").increment(1);
            return Err(AdapterError::access_denied(format!(
                "application id '{app_id}' is not allowed to continue conversations"
            )));
        }
        if let Err(err) = reference.validate() {
            counter!("proactive_continuation_total", "outcome" => "denied").increment(1);
            return Err(err.into());
        }
        if cancel.is_cancelled() {
            counter!("proactive_continuation_total", "outcome" => "cancelled").increment(1);
            return Err(AdapterError::Cancelled);
        }

        let turn = TurnContext::for_continuation(reference, Arc::clone(&self.sender));
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AdapterError::Cancelled),
            result = callback(turn) => result,
        };

        let outcome = match &result {
            Ok(()) => "ok",
            Err(AdapterError::Cancelled) => "cancelled",
            Err(AdapterError::AccessDenied(_)) => "denied",
            Err(_) => "failed",
        };
        counter!("proactive_continuation_total", "outcome" => outcome).increment(1);
        match &result {
            Ok(()) => debug!("continuation callback completed"),
            Err(err) => warn!(error = %err, "continuation failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{Activity, ChannelAccount, ConversationAccount, ResourceResponse};
    use crate::turn::ActivitySender;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        sent: Mutex<Vec<Activity>>,
        deny: bool,
    }

    #[async_trait]
    impl ActivitySender for Capture {
        async fn send_activity(
            &self,
            _reference: &ConversationReference,
            activity: Activity,
        ) -> Result<ResourceResponse, AdapterError> {
            if self.deny {
                return Err(AdapterError::access_denied("token rejected"));
            }
            self.sent.lock().await.push(activity);
            Ok(ResourceResponse::default())
        }
    }

    fn reference(conversation: &str) -> ConversationReference {
        ConversationReference {
            activity_id: Some("act-1".into()),
            user: Some(ChannelAccount::new("user-1")),
            bot: Some(ChannelAccount::new("bot-1")),
            conversation: ConversationAccount::new(conversation),
            channel_id: "emulator".into(),
            service_url: "http://localhost:50000".into(),
            locale: None,
        }
    }

    #[tokio::test]
    async fn callback_receives_turn_bound_to_reference() {
        let capture = Arc::new(Capture::default());
        let engine = ContinuationEngine::new("app-1", capture.clone());
        let seen = Arc::new(Mutex::new(None));
        let seen_in_callback = Arc::clone(&seen);

        engine
            .continue_conversation(
                "app-1",
                reference("conv-42"),
                move |turn| async move {
                    *seen_in_callback.lock().await = Some(turn.conversation_id().to_string());
                    turn.send_text("proactive hello").await.map(|_| ())
                },
                CancellationToken::new(),
            )
            .await
            .expect("continuation succeeds");

        assert_eq!(seen.lock().await.as_deref(), Some("conv-42"));
        let sent = capture.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].conversation_id(), Some("conv-42"));
        assert_eq!(sent[0].text.as_deref(), Some("proactive hello"));
    }

    #[tokio::test]
    async fn foreign_app_id_is_denied_before_callback() {
        let engine = ContinuationEngine::new("app-1", Arc::new(Capture::default()));
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);

        let err = engine
            .continue_conversation(
                "someone-else",
                reference("conv-1"),
                move |_turn| async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                CancellationToken::new(),
            )
            .await
            .expect_err("app id mismatch");

        assert!(err.is_access_denied());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_reference_is_access_denied() {
        let engine = ContinuationEngine::new("", Arc::new(Capture::default()));
        let mut broken = reference("conv-1");
        broken.service_url = "nowhere".into();

        let err = engine
            .continue_conversation("", broken, |_turn| async { Ok(()) }, CancellationToken::new())
            .await
            .expect_err("invalid reference");
        assert!(err.is_access_denied());
    }

    #[tokio::test]
    async fn sender_denial_passes_through() {
        let capture = Arc::new(Capture {
            deny: true,
            ..Capture::default()
        });
        let engine = ContinuationEngine::new("app-1", capture);

        let err = engine
            .continue_conversation(
                "app-1",
                reference("conv-1"),
                |turn| async move { turn.send_text("hi").await.map(|_| ()) },
                CancellationToken::new(),
            )
            .await
            .expect_err("denied by transport");
        assert!(err.is_access_denied());
    }

    #[tokio::test]
    async fn cancellation_stops_a_pending_callback() {
        let engine = ContinuationEngine::new("app-1", Arc::new(Capture::default()));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = engine
            .continue_conversation(
                "app-1",
                reference("conv-1"),
                |_turn| std::future::pending::<Result<(), AdapterError>>(),
                cancel,
            )
            .await
            .expect_err("cancelled");
        assert!(matches!(err, AdapterError::Cancelled));
    }

    #[tokio::test]
    async fn serialized_reference_is_still_accepted() {
        let capture = Arc::new(Capture::default());
        let engine = ContinuationEngine::new("app-1", capture.clone());
        let original = reference("conv-round-trip");
        let json = serde_json::to_string(&original).unwrap();
        let restored: ConversationReference = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);

        engine
            .continue_conversation(
                "app-1",
                restored,
                |turn| async move { turn.send_text("again").await.map(|_| ()) },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            capture.sent.lock().await[0].conversation_id(),
            Some("conv-round-trip")
        );
    }
}
