//! Presigned-URL chunk transfer.

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use tokio_util::sync::CancellationToken;

use cirrus_core::error::{Error, Result};
use cirrus_core::run_cancellable;

#[derive(Debug, Clone)]
pub struct TransferResult {
    pub etag: String,
}

/// PUT `body` to a presigned URL.
///
/// The body is consumed exactly once; a retrying caller must construct a
/// fresh body over the same bytes. `size` becomes the exact
/// `Content-Length`.
pub async fn transfer(
    http: &reqwest::Client,
    cancel: &CancellationToken,
    url: &str,
    body: impl Into<reqwest::Body>,
    size: u64,
) -> Result<TransferResult> {
    let req = http
        .put(url)
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(CONTENT_LENGTH, size)
        .body(body);

    let resp = run_cancellable(cancel, async { Ok(req.send().await?) }).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::TransferFailed {
            status: status.as_u16(),
            body,
        });
    }

    let etag = resp
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim_matches('"')
        .to_string();

    Ok(TransferResult { etag })
}
