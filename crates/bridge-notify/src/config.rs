//! Configuration for the webhook bridge.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use bridge_delivery::{BackoffPolicy, BackoffStrategy, ClientConfig};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::notifier::{EndpointAuth, NotificationEndpoints};

const CONFIG_FILE: &str = "bridge.toml";

const ENV_PREFIX: &str = "BRIDGE_";

const REDACTED: &str = "***";

/// Bridge configuration with defaults, file, and environment overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed `BRIDGE_` (highest priority)
/// 2. Configuration file (`bridge.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Endpoints and secrets have no defaults. A notification whose endpoint is
/// not configured is refused rather than sent somewhere unexpected.
///
/// # Example
///
/// ```no_run
/// use bridge_notify::BridgeConfig;
///
/// let config = BridgeConfig::load().expect("Failed to load configuration");
/// println!("{:?}", config.redacted());
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    // Retry
    /// Total delivery attempts per notification.
    ///
    /// Environment variable: `BRIDGE_MAX_ATTEMPTS`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failed attempt in milliseconds.
    ///
    /// Environment variable: `BRIDGE_RETRY_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Ceiling for any delay in milliseconds.
    ///
    /// Environment variable: `BRIDGE_RETRY_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Random spread applied to delays (0.0 to 0.2).
    ///
    /// Environment variable: `BRIDGE_RETRY_JITTER_FACTOR`
    #[serde(default)]
    pub retry_jitter_factor: f64,

    // Client
    /// Per-attempt timeout in seconds.
    ///
    /// Environment variable: `BRIDGE_DELIVERY_TIMEOUT_SECONDS`
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_seconds: u64,
    /// User agent sent with every webhook.
    ///
    /// Environment variable: `BRIDGE_USER_AGENT`
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // Payloads
    /// Base URL of the audition app, used to derive audition links.
    ///
    /// Environment variable: `BRIDGE_AUDITION_BASE_URL`
    #[serde(default = "default_audition_base_url")]
    pub audition_base_url: String,

    // Endpoints
    /// Receiver of opportunity-created events.
    ///
    /// Environment variable: `BRIDGE_OPPORTUNITY_WEBHOOK_URL`
    #[serde(default)]
    pub opportunity_webhook_url: Option<String>,
    /// Receiver of audition-submission events.
    ///
    /// Environment variable: `BRIDGE_SUBMISSION_WEBHOOK_URL`
    #[serde(default)]
    pub submission_webhook_url: Option<String>,
    /// Receiver of new-project events.
    ///
    /// Environment variable: `BRIDGE_NEW_PROJECT_WEBHOOK_URL`
    #[serde(default)]
    pub new_project_webhook_url: Option<String>,

    // Secrets
    /// Shared secret sent as `x-webhook-secret`.
    ///
    /// Environment variable: `BRIDGE_WEBHOOK_SECRET`
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Token sent as `Authorization: Bearer`.
    ///
    /// Environment variable: `BRIDGE_SERVICE_TOKEN`
    #[serde(default)]
    pub service_token: Option<String>,
}

impl BridgeConfig {
    /// Loads configuration from defaults, `bridge.toml` and `BRIDGE_`
    /// environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Like [`Self::load`], reading the file layer from `path`. A missing
    /// file is skipped.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment.extract().context("Failed to load bridge configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Converts to the dispatcher's retry policy.
    pub fn to_backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter_factor: self.retry_jitter_factor,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Converts to HTTP client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.delivery_timeout_seconds),
            user_agent: self.user_agent.clone(),
            ..ClientConfig::default()
        }
    }

    /// Parsed endpoints and credentials.
    pub fn endpoints(&self) -> Result<NotificationEndpoints> {
        Ok(NotificationEndpoints {
            opportunity_created: parse_endpoint(
                "opportunity_webhook_url",
                self.opportunity_webhook_url.as_deref(),
            )?,
            audition_submission: parse_endpoint(
                "submission_webhook_url",
                self.submission_webhook_url.as_deref(),
            )?,
            new_project: parse_endpoint(
                "new_project_webhook_url",
                self.new_project_webhook_url.as_deref(),
            )?,
            auth: EndpointAuth {
                webhook_secret: non_blank(self.webhook_secret.as_deref()),
                service_token: non_blank(self.service_token.as_deref()),
            },
        })
    }

    /// Copy with every secret masked, for logging.
    pub fn redacted(&self) -> Self {
        let mask = |secret: &Option<String>| secret.as_ref().map(|_| REDACTED.to_string());
        Self {
            webhook_secret: mask(&self.webhook_secret),
            service_token: mask(&self.service_token),
            ..self.clone()
        }
    }

    /// Validates configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be greater than 0");
        }

        if self.retry_base_delay_ms == 0 {
            anyhow::bail!("retry_base_delay_ms must be greater than 0");
        }

        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            anyhow::bail!("retry_base_delay_ms cannot exceed retry_max_delay_ms");
        }

        if !(0.0..=bridge_delivery::backoff::MAX_JITTER_FACTOR).contains(&self.retry_jitter_factor)
        {
            anyhow::bail!("retry_jitter_factor must be between 0.0 and 0.2");
        }

        if !(1..=300).contains(&self.delivery_timeout_seconds) {
            anyhow::bail!("delivery_timeout_seconds must be between 1 and 300");
        }

        Url::parse(&self.audition_base_url).context("audition_base_url is not a valid URL")?;
        self.endpoints()?;

        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_jitter_factor: 0.0,
            delivery_timeout_seconds: default_delivery_timeout(),
            user_agent: default_user_agent(),
            audition_base_url: default_audition_base_url(),
            opportunity_webhook_url: None,
            submission_webhook_url: None,
            new_project_webhook_url: None,
            webhook_secret: None,
            service_token: None,
        }
    }
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = self.redacted();
        f.debug_struct("BridgeConfig")
            .field("max_attempts", &redacted.max_attempts)
            .field("retry_base_delay_ms", &redacted.retry_base_delay_ms)
            .field("retry_max_delay_ms", &redacted.retry_max_delay_ms)
            .field("retry_jitter_factor", &redacted.retry_jitter_factor)
            .field("delivery_timeout_seconds", &redacted.delivery_timeout_seconds)
            .field("user_agent", &redacted.user_agent)
            .field("audition_base_url", &redacted.audition_base_url)
            .field("opportunity_webhook_url", &redacted.opportunity_webhook_url)
            .field("submission_webhook_url", &redacted.submission_webhook_url)
            .field("new_project_webhook_url", &redacted.new_project_webhook_url)
            .field("webhook_secret", &redacted.webhook_secret)
            .field("service_token", &redacted.service_token)
            .finish()
    }
}

fn parse_endpoint(name: &str, value: Option<&str>) -> Result<Option<Url>> {
    let Some(value) = non_blank(value) else {
        return Ok(None);
    };

    let url = Url::parse(&value).with_context(|| format!("{name} is not a valid URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("{name} must use http or https");
    }
    Ok(Some(url))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

fn default_max_attempts() -> u32 {
    bridge_delivery::DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60000
}

fn default_delivery_timeout() -> u64 {
    bridge_delivery::DEFAULT_TIMEOUT_SECONDS
}

fn default_user_agent() -> String {
    concat!("vetted-bridge/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_audition_base_url() -> String {
    "http://localhost:5173".to_string()
}
