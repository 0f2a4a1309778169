use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use proactive_core::ProactiveRequest;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};
use url::Url;

/// Hands a proactive request to whatever eventually calls the trigger endpoint.
///
/// Dispatch is best effort: implementations never report failures back to the turn.
#[async_trait]
pub trait TriggerDispatcher: Send + Sync {
    async fn dispatch(&self, request: ProactiveRequest);
}

pub type SharedTriggerDispatcher = Arc<dyn TriggerDispatcher>;

/// POSTs requests to the trigger endpoint and drops any failure after logging it.
pub struct HttpTriggerDispatcher {
    http: reqwest::Client,
    url: Url,
}

impl HttpTriggerDispatcher {
    pub fn new(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl TriggerDispatcher for HttpTriggerDispatcher {
    async fn dispatch(&self, request: ProactiveRequest) {
        let conversation_id = request.conversation_reference.conversation.id.clone();
        match self
            .http
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                counter!("proactive_trigger_dispatch_total", "outcome" => "ok").increment(1);
                debug!(%conversation_id, "proactive trigger accepted");
            }
            Ok(response) => {
                counter!("proactive_trigger_dispatch_total", "outcome" => "rejected").increment(1);
                warn!(
                    %conversation_id,
                    status = response.status().as_u16(),
                    "proactive trigger rejected"
                );
            }
            Err(err) => {
                counter!("proactive_trigger_dispatch_total", "outcome" => "failed").increment(1);
                warn!(%conversation_id, error = %err, "proactive trigger call failed");
            }
        }
    }
}

/// Enqueues requests for a background worker, so dispatching never waits on the network.
pub struct QueuedTriggerDispatcher {
    tx: mpsc::UnboundedSender<ProactiveRequest>,
}

impl QueuedTriggerDispatcher {
    /// Spawns the worker that drains the queue into `inner`. The worker stops once every
    /// handle to the returned dispatcher is dropped.
    pub fn spawn(inner: SharedTriggerDispatcher) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProactiveRequest>();
        let worker = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                inner.dispatch(request).await;
            }
            debug!("proactive trigger worker stopped");
        });
        (Self { tx }, worker)
    }
}

#[async_trait]
impl TriggerDispatcher for QueuedTriggerDispatcher {
    async fn dispatch(&self, request: ProactiveRequest) {
        if self.tx.send(request).is_err() {
            counter!("proactive_trigger_dispatch_total", "outcome" => "dropped").increment(1);
            warn!("proactive trigger worker is gone; request dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proactive_core::{ConversationAccount, ConversationReference};
    use tokio::sync::Mutex;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<ProactiveRequest>>,
    }

    #[async_trait]
    impl TriggerDispatcher for Collect {
        async fn dispatch(&self, request: ProactiveRequest) {
            self.seen.lock().await.push(request);
        }
    }

    fn request(conversation: &str) -> ProactiveRequest {
        ProactiveRequest::new(
            ConversationReference {
                conversation: ConversationAccount::new(conversation),
                channel_id: "emulator".into(),
                service_url: "http://localhost:9000".into(),
                ..Default::default()
            },
            "hello",
        )
    }

    #[tokio::test]
    async fn queue_forwards_in_order() {
        let inner = Arc::new(Collect::default());
        let (queue, worker) = QueuedTriggerDispatcher::spawn(inner.clone());
        queue.dispatch(request("a")).await;
        queue.dispatch(request("b")).await;
        drop(queue);
        worker.await.unwrap();

        let seen = inner.seen.lock().await;
        let ids: Vec<_> = seen
            .iter()
            .map(|r| r.conversation_reference.conversation.id.as_str())
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn http_failures_are_logged_and_dropped() {
        // Nothing listens on port 9 of the loopback interface.
        let url = Url::parse("http://127.0.0.1:9/api/proactive").unwrap();
        let dispatcher = HttpTriggerDispatcher::new(reqwest::Client::new(), url);
        dispatcher.dispatch(request("a")).await;
        assert!(logs_contain("proactive trigger call failed"));
    }
}
