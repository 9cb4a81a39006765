use std::collections::BTreeMap;

use async_trait::async_trait;

use super::error::ApiError;

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// HTTP methods used by the exchange endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Request parameters, kept sorted by key so encodings are reproducible
pub type Params = BTreeMap<String, String>;

/// Encode parameters as `k1=v1&k2=v2`, ordered by key
pub fn encode_params(params: &Params) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

/// Raw response handed back by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one (signed, when the endpoint is private) request to an exchange.
///
/// Implementations own authentication and the HTTP client. Exchange-level
/// errors are carried in-band in the body and are left for the caller to
/// inspect; only network failures are returned as `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the exchange name (e.g., "kraken")
    fn exchange_name(&self) -> &str;

    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        params: &Params,
    ) -> Result<TransportResponse, ApiError>;
}
