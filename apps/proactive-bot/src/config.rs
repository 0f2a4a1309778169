use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use proactive_state::StorageSettings;
use url::Url;

const DEFAULT_BIND: &str = "0.0.0.0:3978";
const DEFAULT_TRIGGER_URL: &str = "http://localhost:3978/api/proactive";
const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bind: SocketAddr,
    pub app_id: String,
    pub app_password: String,
    pub tenant_id: Option<String>,
    pub auth_base: Option<String>,
    pub trigger_url: Url,
    pub delivery_timeout: Duration,
    pub storage: StorageSettings,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let bind = var("BIND")
            .unwrap_or_else(|| DEFAULT_BIND.into())
            .parse()
            .context("invalid BIND address")?;
        let trigger_url = Url::parse(
            &var("PROACTIVE_TRIGGER_URL").unwrap_or_else(|| DEFAULT_TRIGGER_URL.into()),
        )
        .context("invalid PROACTIVE_TRIGGER_URL")?;
        let delivery_timeout = match var("PROACTIVE_DELIVERY_TIMEOUT_MS") {
            Some(raw) => {
                let ms: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid PROACTIVE_DELIVERY_TIMEOUT_MS '{raw}'"))?;
                if ms == 0 {
                    bail!("PROACTIVE_DELIVERY_TIMEOUT_MS must be greater than zero");
                }
                ms
            }
            None => DEFAULT_DELIVERY_TIMEOUT_MS,
        };

        Ok(Self {
            bind,
            app_id: var("MICROSOFT_APP_ID").unwrap_or_default(),
            app_password: var("MICROSOFT_APP_PASSWORD").unwrap_or_default(),
            tenant_id: var("MICROSOFT_APP_TENANT_ID"),
            auth_base: var("CONNECTOR_AUTH_BASE"),
            trigger_url,
            delivery_timeout: Duration::from_millis(delivery_timeout),
            storage: StorageSettings::from_lookup(&lookup)?,
        })
    }
}
