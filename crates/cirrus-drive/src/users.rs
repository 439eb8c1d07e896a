//! Account usage and limit queries.

use anyhow::Context as _;
use reqwest::Method;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use cirrus_core::error::{Error, HttpError, Result};
use cirrus_core::run_cancellable;

use crate::DriveClient;

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub drive: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limit {
    pub max_space_bytes: i64,
}

impl DriveClient {
    /// Current account usage in bytes.
    pub async fn get_usage(&self, cancel: &CancellationToken) -> Result<Usage> {
        let request = self.request(Method::GET, self.endpoints().usage());
        let resp = run_cancellable(cancel, async { Ok(request.send().await?) }).await?;
        if !resp.status().is_success() {
            return Err(Error::Http(
                HttpError::from_response("get usage", resp).await,
            ));
        }
        let body = resp.bytes().await?;
        serde_json::from_slice(&body)
            .context("failed to decode usage response")
            .map_err(Error::Other)
    }

    /// Maximum storage available to the account, in bytes.
    pub async fn get_limit(&self, cancel: &CancellationToken) -> Result<Limit> {
        let request = self.request(Method::GET, self.endpoints().limit());
        let resp = run_cancellable(cancel, async { Ok(request.send().await?) }).await?;
        if !resp.status().is_success() {
            return Err(Error::Http(
                HttpError::from_response("get limit", resp).await,
            ));
        }
        let body = resp.bytes().await?;
        serde_json::from_slice(&body)
            .context("failed to decode limit response")
            .map_err(Error::Other)
    }
}
