pub mod binance;
pub mod client;
pub mod error;
pub mod kraken;
pub mod normalize;
pub mod rate_limiter;

pub use client::{HttpMethod, Params, RateLimitConfig, Transport, TransportResponse};
pub use error::{ApiError, ClassificationError, FieldDecodeError};
pub use rate_limiter::RateLimiter;
