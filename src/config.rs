use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::client::RateLimitConfig;
use crate::api::error::ApiError;

pub const KRAKEN_API_KEY_VAR: &str = "KRAKEN_API_KEY";
pub const KRAKEN_API_SECRET_VAR: &str = "KRAKEN_API_SECRET";

/// Client configuration. Every section and field has a default, so an empty
/// document is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub kraken: KrakenConfig,
    pub binance: BinanceConfig,
    pub ledger: LedgerConfig,
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, ApiError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KrakenConfig {
    pub base_url: String,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for KrakenConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.kraken.com".to_string(),
            requests_per_second: 1,
            burst_size: 3,
        }
    }
}

impl KrakenConfig {
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: self.requests_per_second,
            burst_size: self.burst_size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinanceConfig {
    pub stream_url: String,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            stream_url: "wss://stream.binance.com:9443".to_string(),
        }
    }
}

/// Ledger pagination behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Fixed wait after the exchange reports its rate limit
    pub rate_limit_backoff_secs: u64,
    /// `None` retries rate-limited pages forever
    pub max_rate_limit_retries: Option<u32>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rate_limit_backoff_secs: 5,
            max_rate_limit_retries: None,
        }
    }
}

impl LedgerConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }
}

/// API key pair. Never printed in full.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Read `KRAKEN_API_KEY` and `KRAKEN_API_SECRET` from the environment
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let read = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ApiError::InvalidCredentials(format!("{} is not set", name)))
        };

        Ok(Self::new(read(KRAKEN_API_KEY_VAR)?, read(KRAKEN_API_SECRET_VAR)?))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Masked API key (last 4 characters)
    pub fn preview(&self) -> String {
        let len = self.api_key.chars().count();
        if len <= 4 {
            "*".repeat(len)
        } else {
            let tail: String = self.api_key.chars().skip(len - 4).collect();
            format!("{}...{}", "*".repeat(4), tail)
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.preview())
            .field("api_secret", &"<redacted>")
            .finish()
    }
}
