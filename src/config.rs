//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The file path defaults to `config.yaml` but can be specified
//! via `-f` flag or `LOOKOUT_CONFIG` environment variable.
//!
//! Sources are merged in order (later overrides earlier):
//!
//! 1. **YAML config file** - base configuration
//! 2. **Environment variables** - variables prefixed with `LOOKOUT_`
//!
//! For nested values, use double underscores: `LOOKOUT_PROVIDER__WEBHOOK_SECRET`
//! sets `provider.webhook_secret`.
//!
//! Startup is fail-fast: a missing webhook secret aborts unless
//! `provider.allow_unverified` is set explicitly, so a deployment can never
//! silently run without webhook authentication.

use clap::Parser;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Simple CLI args - just for specifying the config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "LOOKOUT_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Payment provider webhook settings
    pub provider: ProviderConfig,
    /// Breach lookup service settings
    pub lookup: LookupConfig,
    /// Email delivery settings
    pub email: EmailConfig,
    /// Fulfillment retry and idempotency settings
    pub fulfillment: FulfillmentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            provider: ProviderConfig::default(),
            lookup: LookupConfig::default(),
            email: EmailConfig::default(),
            fulfillment: FulfillmentConfig::default(),
        }
    }
}

/// Inbound webhook authentication settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Header carrying the provider's HMAC signature
    pub signature_header: String,
    /// Shared secret used to authenticate inbound webhooks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
    /// Accept unsigned webhooks when no secret is configured.
    /// Development only; startup fails without either this or a secret.
    pub allow_unverified: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            signature_header: "x-razorpay-signature".to_string(),
            webhook_secret: None,
            allow_unverified: false,
        }
    }
}

/// Breach lookup service settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LookupConfig {
    /// Lookup endpoint URL
    pub base_url: String,
    /// API key sent in the `X-API-Key` header
    pub api_key: String,
    /// Request timeout; expiry is treated as a transient failure
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: "https://leakcheck.io/api/public".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Email delivery settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmailConfig {
    /// From address for outgoing mail
    pub from_email: String,
    /// Display name for outgoing mail
    pub from_name: String,
    /// Transport to deliver through
    pub transport: EmailTransportConfig,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from_email: "reports@localhost".to_string(),
            from_name: "Email Risk Reports".to_string(),
            transport: EmailTransportConfig::default(),
        }
    }
}

/// Email transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum EmailTransportConfig {
    /// SMTP relay with credentials
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
        use_tls: bool,
    },
    /// Write messages to a directory; for development and testing
    File { path: String },
}

impl Default for EmailTransportConfig {
    fn default() -> Self {
        Self::File {
            path: "./emails".to_string(),
        }
    }
}

/// Fulfillment retry and idempotency settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FulfillmentConfig {
    /// Backoff schedule for transient failures, in seconds per attempt.
    /// An empty schedule disables retries.
    pub retry_schedule_secs: Vec<u64>,
    /// How long a processed payment id blocks duplicate deliveries
    #[serde(with = "humantime_serde")]
    pub dedup_retention: Duration,
    /// Soft cap on tracked payment ids; reaching it triggers an eviction sweep
    pub dedup_max_entries: usize,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            retry_schedule_secs: vec![1, 5, 15],
            dedup_retention: Duration::from_secs(24 * 60 * 60),
            dedup_max_entries: 10_000,
        }
    }
}

impl FulfillmentConfig {
    pub fn retry_schedule(&self) -> Vec<Duration> {
        self.retry_schedule_secs.iter().map(|s| Duration::from_secs(*s)).collect()
    }
}

impl Config {
    /// Load configuration from the YAML file and environment overrides.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let figment = Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("LOOKOUT_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Enforce the invariants a running deployment must hold.
    pub fn validate(&self) -> anyhow::Result<()> {
        let secret_missing = self.provider.webhook_secret.as_deref().is_none_or(str::is_empty);
        if secret_missing && !self.provider.allow_unverified {
            anyhow::bail!(
                "provider.webhook_secret is not set; refusing to start. \
                 Set the secret, or explicitly opt in to unauthenticated webhooks \
                 with provider.allow_unverified (unsafe outside development)"
            );
        }
        if secret_missing {
            tracing::warn!(
                "no webhook secret configured and allow_unverified is set: \
                 inbound webhooks will NOT be authenticated"
            );
        }
        if self.lookup.api_key.is_empty() {
            tracing::warn!("lookup.api_key is empty; breach lookups will likely be rejected upstream");
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
