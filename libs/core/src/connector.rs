//! HTTP transport for the Bot Connector REST API.
//!
//! Outgoing activities are posted to `{serviceUrl}/v3/conversations/{id}/activities`, using an
//! app token obtained with the client-credentials grant. Retryable failures (throttling,
//! server errors, network) are retried a bounded number of times with jittered backoff.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::counter;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::activity::{Activity, ResourceResponse};
use crate::backoff;
use crate::error::AdapterError;
use crate::reference::ConversationReference;
use crate::turn::ActivitySender;

pub const DEFAULT_AUTH_BASE: &str = "https://login.microsoftonline.com";
pub const DEFAULT_TENANT: &str = "botframework.com";
const CONNECTOR_SCOPE: &str = "https://api.botframework.com/.default";
const MAX_ATTEMPTS: u32 = 3;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Application identity used to authenticate against the connector.
#[derive(Debug, Clone, Default)]
pub struct ConnectorCredentials {
    pub app_id: String,
    pub app_password: String,
    pub tenant_id: String,
}

impl ConnectorCredentials {
    pub fn new(
        app_id: impl Into<String>,
        app_password: impl Into<String>,
        tenant_id: Option<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_password: app_password.into(),
            tenant_id: tenant_id
                .filter(|tenant| !tenant.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TENANT.into()),
        }
    }

    /// Local emulator sessions run without an app id and skip authentication.
    pub fn is_anonymous(&self) -> bool {
        self.app_id.trim().is_empty()
    }
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

pub struct ConnectorClient {
    http: reqwest::Client,
    credentials: ConnectorCredentials,
    auth_base: String,
    token: Mutex<Option<CachedToken>>,
}

impl ConnectorClient {
    pub fn new(
        http: reqwest::Client,
        credentials: ConnectorCredentials,
        auth_base: Option<String>,
    ) -> Self {
        Self {
            http,
            credentials,
            auth_base: auth_base.unwrap_or_else(|| DEFAULT_AUTH_BASE.into()),
            token: Mutex::new(None),
        }
    }

    fn token_url(&self) -> String {
        let base = self.auth_base.trim_end_matches('/');
        format!("{base}/{}/oauth2/v2.0/token", self.credentials.tenant_id)
    }

    pub(crate) fn activities_url(
        service_url: &str,
        conversation_id: &str,
        reply_to_id: Option<&str>,
    ) -> Result<Url, AdapterError> {
        let mut url = Url::parse(service_url)
            .map_err(|err| AdapterError::access_denied(format!("invalid service url: {err}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                AdapterError::access_denied(format!("service url cannot be a base: {service_url}"))
            })?;
            segments
                .pop_if_empty()
                .extend(["v3", "conversations", conversation_id, "activities"]);
            if let Some(reply_to_id) = reply_to_id {
                segments.push(reply_to_id);
            }
        }
        Ok(url)
    }

    async fn bearer_token(&self) -> Result<Option<String>, AdapterError> {
        if self.credentials.is_anonymous() {
            return Ok(None);
        }
        if self.auth_base.starts_with("mock://") {
            return Ok(Some("mock-token".into()));
        }

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN
        {
            return Ok(Some(token.token.clone()));
        }
        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(Some(token))
    }

    async fn invalidate_token(&self) {
        self.token.lock().await.take();
    }

    async fn fetch_token(&self) -> Result<CachedToken, AdapterError> {
        let form = [
            ("client_id", self.credentials.app_id.as_str()),
            ("client_secret", self.credentials.app_password.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", CONNECTOR_SCOPE),
        ];
        let response = self.http.post(self.token_url()).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    AdapterError::access_denied(format!(
                        "token request rejected: status={} body={}",
                        status.as_u16(),
                        body
                    ))
                }
                _ => classify(status, body),
            });
        }
        let parsed: TokenResponse = serde_json::from_str(&body)?;
        Ok(CachedToken {
            token: parsed.access_token,
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in.unwrap_or(3_600)),
        })
    }

    async fn post_once(
        &self,
        url: &Url,
        activity: &Activity,
    ) -> Result<ResourceResponse, AdapterError> {
        let mut request = self.http.post(url.clone()).json(activity);
        if let Some(token) = self.bearer_token().await? {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        counter!("connector_send_total", "status" => status.as_str().to_string()).increment(1);
        let body = response.text().await?;
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.invalidate_token().await;
            }
            return Err(classify(status, body));
        }
        if body.trim().is_empty() {
            return Ok(ResourceResponse::default());
        }
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }
}

fn classify(status: StatusCode, body: String) -> AdapterError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            AdapterError::access_denied(format!(
                "connector refused delivery: status={} body={}",
                status.as_u16(),
                body
            ))
        }
        _ => {
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            AdapterError::transport(
                Some(status.as_u16()),
                format!("status={} body={}", status.as_u16(), body),
                retryable,
            )
        }
    }
}

#[async_trait]
impl ActivitySender for ConnectorClient {
    async fn send_activity(
        &self,
        reference: &ConversationReference,
        activity: Activity,
    ) -> Result<ResourceResponse, AdapterError> {
        let url = Self::activities_url(
            &reference.service_url,
            reference.conversation_id(),
            activity.reply_to_id.as_deref(),
        )?;

        let mut attempt = 0;
        loop {
            match self.post_once(&url, &activity).await {
                Ok(response) => {
                    debug!(
                        conversation_id = %reference.conversation_id(),
                        activity_id = ?response.id,
                        "activity delivered"
                    );
                    return Ok(response);
                }
                Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    warn!(
                        error = %err,
                        attempt = attempt + 1,
                        conversation_id = %reference.conversation_id(),
                        "connector send failed; retrying"
                    );
                    backoff::sleep(attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
