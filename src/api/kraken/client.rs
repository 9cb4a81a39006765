use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use sha2::{Digest, Sha256, Sha512};

use crate::api::{
    client::{encode_params, HttpMethod, Params, Transport, TransportResponse},
    error::ApiError,
    rate_limiter::RateLimiter,
};
use crate::config::{Credentials, KrakenConfig};

type HmacSha512 = Hmac<Sha512>;

struct SigningKey {
    api_key: String,
    secret: Vec<u8>, // base64-decoded API secret
}

/// Kraken REST transport.
///
/// Private endpoints (`POST`) get a nonce and, when credentials are present,
/// the `API-Key` / `API-Sign` headers. Public endpoints go out as plain `GET`.
pub struct KrakenClient {
    base_url: String,
    signing: Option<SigningKey>,
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
    last_nonce: AtomicU64,
}

impl KrakenClient {
    /// Create an authenticated client. The secret must be valid base64.
    pub fn new(credentials: &Credentials, config: &KrakenConfig) -> Result<Self, ApiError> {
        let secret = general_purpose::STANDARD
            .decode(credentials.api_secret())
            .map_err(|e| ApiError::InvalidCredentials(format!("API secret is not base64: {}", e)))?;

        log::info!("Kraken client using API key {}", credentials.preview());

        let mut client = Self::public(config);
        client.signing = Some(SigningKey {
            api_key: credentials.api_key().to_string(),
            secret,
        });
        Ok(client)
    }

    /// Create a client for public endpoints only
    pub fn public(config: &KrakenConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            signing: None,
            http_client: reqwest::Client::new(),
            rate_limiter: RateLimiter::new(&config.rate_limit()),
            last_nonce: AtomicU64::new(0),
        }
    }

    pub fn has_auth(&self) -> bool {
        self.signing.is_some()
    }

    /// Millisecond nonce, strictly increasing across calls on this client
    fn next_nonce(&self) -> u64 {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let previous = self
            .last_nonce
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or(now);
        now.max(previous + 1)
    }

    /// API-Sign: HMAC-SHA512 over path + SHA256(nonce + post data), keyed with the decoded secret
    fn sign(secret: &[u8], path: &str, nonce: u64, post_data: &str) -> Result<String, ApiError> {
        let digest = Sha256::digest(format!("{}{}", nonce, post_data).as_bytes());

        let mut mac = HmacSha512::new_from_slice(secret)
            .map_err(|e| ApiError::InvalidCredentials(e.to_string()))?;
        mac.update(path.as_bytes());
        mac.update(&digest);

        Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    fn build_headers(&self, path: &str, nonce: u64, post_data: &str) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        if let Some(signing) = &self.signing {
            let signature = Self::sign(&signing.secret, path, nonce, post_data)?;
            headers.insert(
                "API-Key",
                HeaderValue::from_str(&signing.api_key)
                    .map_err(|e| ApiError::AuthenticationError(format!("Invalid API key: {}", e)))?,
            );
            headers.insert(
                "API-Sign",
                HeaderValue::from_str(&signature)
                    .map_err(|e| ApiError::AuthenticationError(format!("Invalid signature: {}", e)))?,
            );
        }

        Ok(headers)
    }
}

#[async_trait]
impl Transport for KrakenClient {
    fn exchange_name(&self) -> &str {
        "kraken"
    }

    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        params: &Params,
    ) -> Result<TransportResponse, ApiError> {
        self.rate_limiter.acquire().await;

        let url = format!("{}{}", self.base_url, path);
        let request = match method {
            HttpMethod::Get => {
                let query = encode_params(params);
                let url = if query.is_empty() { url } else { format!("{}?{}", url, query) };
                self.http_client.get(&url)
            }
            HttpMethod::Post => {
                let nonce = self.next_nonce();
                let mut signed = params.clone();
                signed.insert("nonce".to_string(), nonce.to_string());
                let post_data = encode_params(&signed);
                let headers = self.build_headers(path, nonce, &post_data)?;
                self.http_client.post(&url).headers(headers).body(post_data)
            }
        };

        log::debug!("{} {}", method.as_str(), path);
        let response = request.send().await?;

        let status = response.status();
        if status == 401 || status == 403 {
            return Err(ApiError::AuthenticationError(
                "Invalid API credentials or permissions".to_string(),
            ));
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            body: response.text().await?,
        })
    }
}
