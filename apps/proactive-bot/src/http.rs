use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    routing::{any, get, post},
};
use proactive_core::{
    Activity, BotAdapter, CancellationToken, ContinuationEngine, ProactiveRequest,
    SharedActivitySender,
};
use proactive_state::{ConversationState, SharedStorage, StateKey};
use proactive_telemetry::record_turn_fields;
use tracing::{Instrument, error, field, info, info_span, warn};

use crate::bot::ProactiveBot;
use crate::error::ApiError;
use crate::trigger::SharedTriggerDispatcher;

/// Everything the HTTP handlers share.
#[derive(Clone)]
pub struct AppState {
    pub adapter: BotAdapter,
    pub bot: Arc<ProactiveBot>,
    pub engine: ContinuationEngine,
    pub conversations: ConversationState,
    pub app_id: String,
    pub delivery_timeout: Duration,
}

impl AppState {
    pub fn new(
        app_id: impl Into<String>,
        sender: SharedActivitySender,
        storage: SharedStorage,
        dispatcher: SharedTriggerDispatcher,
        delivery_timeout: Duration,
    ) -> Self {
        let app_id = app_id.into();
        let conversations = ConversationState::new(storage);
        Self {
            adapter: BotAdapter::new(Arc::clone(&sender)),
            bot: Arc::new(ProactiveBot::new(conversations.clone(), dispatcher)),
            engine: ContinuationEngine::new(app_id.clone(), sender),
            conversations,
            app_id,
            delivery_timeout,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/messages", post(messages))
        .route("/api/proactive", any(proactive))
        .route("/healthz", get(healthz))
        .with_state(Arc::new(state))
}

async fn healthz() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn messages(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let activity: Activity = serde_json::from_slice(&body)
        .map_err(|err| ApiError::bad_request(format!("invalid activity: {err}")))?;
    if activity.conversation_id().is_none() {
        return Err(ApiError::bad_request("activity has no conversation id"));
    }
    state
        .adapter
        .process_activity(activity, state.bot.as_ref())
        .await
        .map_err(|err| {
            error!(error = ?err, "turn failed");
            ApiError::Internal(err)
        })?;
    Ok(StatusCode::OK)
}

async fn proactive(
    State(state): State<Arc<AppState>>,
    method: Method,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    if method != Method::POST {
        return Err(ApiError::MethodNotAllowed);
    }
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is empty"));
    }
    let text = std::str::from_utf8(&body)
        .map_err(|_| ApiError::bad_request("request body is not valid UTF-8"))?;
    let request: ProactiveRequest = serde_json::from_str(text)
        .map_err(|err| ApiError::bad_request(format!("invalid proactive request: {err}")))?;

    let span = info_span!(
        "proactive_trigger",
        channel_id = field::Empty,
        conversation_id = field::Empty,
        activity_id = field::Empty
    );
    let requested = &request.conversation_reference;
    record_turn_fields(
        &span,
        &requested.channel_id,
        requested.conversation_id(),
        requested.activity_id.as_deref(),
    );
    deliver(state, request).instrument(span).await
}

async fn deliver(
    state: Arc<AppState>,
    request: ProactiveRequest,
) -> Result<StatusCode, ApiError> {
    if let Err(err) = request.conversation_reference.validate() {
        warn!(error = %err, "rejected invalid conversation reference");
        return Err(ApiError::Forbidden(err.to_string()));
    }
    let key = StateKey::from_reference(&request.conversation_reference);
    let Some(reference) = state.conversations.reference(&key).await? else {
        warn!("no stored reference for conversation");
        return Err(ApiError::Forbidden("conversation is not known to this bot".into()));
    };

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    let message = request.message;
    let delivery = state.engine.continue_conversation(
        &state.app_id,
        reference,
        move |turn| async move { turn.send_text(message).await.map(|_| ()) },
        cancel.clone(),
    );

    match tokio::time::timeout(state.delivery_timeout, delivery).await {
        Ok(Ok(())) => {
            info!("proactive message delivered");
            Ok(StatusCode::OK)
        }
        Ok(Err(err)) => Err(err.into()),
        Err(_) => {
            cancel.cancel();
            warn!(
                timeout_ms = state.delivery_timeout.as_millis() as u64,
                "proactive delivery timed out"
            );
            Err(ApiError::DeliveryTimeout)
        }
    }
}
