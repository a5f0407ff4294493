//! Error handling

use std::fmt;

/// Everything that can go wrong while processing an item or setting up a batch.
///
/// Inside the per-item pipeline every variant is treated as transient and
/// triggers a retry.
#[derive(Debug)]
pub enum BatchError {
    /// Transport-level failure talking to a remote API (connect, timeout, body read)
    Http(reqwest::Error),
    /// The API answered but not in the shape we expected
    Response(String),
    /// An endpoint answered 429
    RateLimited(&'static str),
    /// The tool-call arguments did not contain a usable JSON object
    PromptParse {
        /// The raw arguments string returned by the model
        raw: String,
        /// Why parsing failed
        reason: String,
    },
    /// The image payload was not valid base64
    Decode(base64::DecodeError),
    /// Local filesystem failure
    Io(std::io::Error),
    /// Reading or writing CSV failed
    Csv(csv::Error),
    /// Remote storage rejected the upload
    Upload(String),
    /// Obtaining remote storage credentials failed
    Auth(String),
    /// The input sheet could not be read
    Input(String),
    /// The concurrency limiter was closed
    Limiter,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(err) => write!(f, "HTTP request failed: {err}"),
            Self::Response(msg) => write!(f, "Unexpected API response: {msg}"),
            Self::RateLimited(endpoint) => {
                write!(f, "Rate limit was hit on {endpoint}, request should now be retried")
            }
            Self::PromptParse { raw, reason } => {
                write!(f, "Failed to parse imagePrompt ({reason}) from: {raw}")
            }
            Self::Decode(err) => write!(f, "Error decoding b64 content: {err}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Csv(err) => write!(f, "CSV error: {err}"),
            Self::Upload(msg) => write!(f, "Error uploading image to Drive: {msg}"),
            Self::Auth(msg) => write!(f, "Drive authentication failed: {msg}"),
            Self::Input(msg) => write!(f, "Failed to read input: {msg}"),
            Self::Limiter => write!(f, "Concurrency limiter closed"),
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            Self::Decode(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Csv(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BatchError {
    fn from(err: reqwest::Error) -> Self {
        BatchError::Http(err)
    }
}

impl From<base64::DecodeError> for BatchError {
    fn from(err: base64::DecodeError) -> Self {
        BatchError::Decode(err)
    }
}

impl From<std::io::Error> for BatchError {
    fn from(err: std::io::Error) -> Self {
        BatchError::Io(err)
    }
}

impl From<csv::Error> for BatchError {
    fn from(err: csv::Error) -> Self {
        BatchError::Csv(err)
    }
}

impl From<calamine::Error> for BatchError {
    fn from(err: calamine::Error) -> Self {
        BatchError::Input(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for BatchError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        BatchError::Auth(err.to_string())
    }
}

impl From<url::ParseError> for BatchError {
    fn from(err: url::ParseError) -> Self {
        BatchError::Response(format!("invalid endpoint URL: {err}"))
    }
}

impl From<tokio::sync::AcquireError> for BatchError {
    fn from(_: tokio::sync::AcquireError) -> Self {
        BatchError::Limiter
    }
}
