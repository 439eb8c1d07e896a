use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared by every crate in the workspace.
///
/// Variants carry enough structure (status codes, counts, hashes) that
/// callers never have to inspect rendered messages; retry classification in
/// particular works off [`Error::status`] alone.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hex in {field}")]
    InvalidHex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("file index too short: got {0} bytes, need at least 16")]
    IndexTooShort(usize),

    #[error("invalid range header {0:?}")]
    InvalidRange(String),

    #[error("upload start failed: {reason}")]
    UploadStartFailed { reason: String },

    #[error("multipart start malformed: expected {expected} {what}, got {actual}")]
    StartMalformed {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("transfer failed: status {status}, {body}")]
    TransferFailed { status: u16, body: String },

    #[error("finish upload failed: {0}")]
    FinishFailed(#[source] HttpError),

    #[error("file already exists on server (duplicate shard): {body}")]
    DuplicateShard { body: String },

    #[error("create meta failed: {0}")]
    CreateMetaFailed(#[source] HttpError),

    #[error("no shards found for file {file_id}")]
    NoShards { file_id: String },

    #[error("hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("unknown-size upload exceeds {limit} byte limit - size must be known for larger streams")]
    UnknownSizeTooLarge { limit: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::TransferFailed { status, .. } => Some(*status),
            Error::FinishFailed(e) | Error::CreateMetaFailed(e) | Error::Http(e) => Some(e.status),
            Error::DuplicateShard { .. } => Some(500),
            Error::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Client errors that will repeat verbatim (400, 401, 403, 404) are
    /// final; everything else, including timeouts and 5xx, is retryable.
    pub fn is_retryable(&self) -> bool {
        if matches!(self, Error::Cancelled) {
            return false;
        }
        !matches!(self.status(), Some(400 | 401 | 403 | 404))
    }
}

/// A failed HTTP exchange with the response details preserved.
#[derive(Debug)]
pub struct HttpError {
    pub operation: &'static str,
    pub status: u16,
    pub body: Vec<u8>,
    /// Human-readable message decoded from the `{error, message}` JSON body,
    /// falling back to the raw body text.
    pub message: String,
    retry_after: Option<Duration>,
}

impl HttpError {
    pub fn new(operation: &'static str, status: u16, body: Vec<u8>) -> Self {
        let message = parse_backend_message(&body);
        Self {
            operation,
            status,
            body,
            message,
            retry_after: None,
        }
    }

    /// Consume a response into an error, capturing status, rate-limit
    /// headers and body.
    pub async fn from_response(operation: &'static str, resp: reqwest::Response) -> Self {
        let status = resp.status().as_u16();
        let retry_after = parse_retry_after(resp.headers());
        let body = resp.bytes().await.unwrap_or_default().to_vec();
        let message = parse_backend_message(&body);
        Self {
            operation,
            status,
            body,
            message,
            retry_after,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    /// 408, 429 and all 5xx responses are worth retrying.
    pub fn is_temporary(&self) -> bool {
        self.status == 408 || self.status == 429 || self.status >= 500
    }

    /// Server-requested retry delay, or zero when the response carried none.
    pub fn retry_after(&self) -> Duration {
        self.retry_after.unwrap_or_default()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{} failed: status {}", self.operation, self.status)
        } else {
            write!(
                f,
                "{} failed: {} (status {})",
                self.operation, self.message, self.status
            )
        }
    }
}

impl std::error::Error for HttpError {}

fn parse_backend_message(body: &[u8]) -> String {
    #[derive(serde::Deserialize)]
    struct BackendError {
        #[serde(default)]
        error: String,
        #[serde(default)]
        message: String,
    }

    match serde_json::from_slice::<BackendError>(body) {
        Ok(be) if !be.message.is_empty() => be.message,
        Ok(be) if !be.error.is_empty() => be.error,
        _ => String::from_utf8_lossy(body).trim().to_string(),
    }
}

/// Extract a retry delay from rate-limit headers.
///
/// The gateway's own `x-internxt-ratelimit-reset` (milliseconds) takes
/// precedence; otherwise the standard `Retry-After` header is honored in
/// both its delta-seconds and HTTP-date forms.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    if let Some(v) = headers
        .get("x-internxt-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
    {
        if let Ok(ms) = v.parse::<u64>() {
            if ms > 0 {
                return Some(Duration::from_millis(ms));
            }
        }
    }

    let v = headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim();

    if let Ok(secs) = v.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let date = chrono::DateTime::parse_from_rfc2822(v).ok()?;
    let delta = date.signed_duration_since(chrono::Utc::now());
    delta.to_std().ok()
}
