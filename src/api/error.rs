use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),

    #[error("Invalid API response: {0}")]
    ParseError(String),

    #[error("Exchange API error: {0}")]
    ExchangeError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error(transparent)]
    FieldDecode(#[from] FieldDecodeError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::ParseError(err.to_string())
    }
}

/// A numeric or time field of one raw record could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field} {raw_value:?}: {reason}")]
pub struct FieldDecodeError {
    pub field: &'static str,
    pub raw_value: String,
    pub reason: String,
}

impl FieldDecodeError {
    pub fn new(field: &'static str, raw_value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field,
            raw_value: raw_value.into(),
            reason: reason.into(),
        }
    }
}

/// A stream frame did not match any known shape, or its matched shape failed to decode.
#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("frame too short to classify: {len} bytes, inspection window is {window}")]
    Truncated { len: usize, window: usize },

    #[error("frame is not part of a multiplexed stream")]
    UnrecognizedFrame,

    #[error("malformed {kind} frame: {source}")]
    MalformedPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
