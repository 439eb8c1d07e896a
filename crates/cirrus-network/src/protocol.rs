//! Start-upload, finish-upload and bucket-file-info calls.

use anyhow::Context as _;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use tokio_util::sync::CancellationToken;

use cirrus_core::error::{Error, HttpError, Result};
use cirrus_core::run_cancellable;

use crate::client::NETWORK_VERSION;
use crate::endpoints::Endpoints;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// One part's reservation in the start-upload request.
#[derive(Debug, Clone, Serialize)]
pub struct UploadPartSpec {
    pub index: u32,
    pub size: u64,
}

#[derive(Serialize)]
struct StartUploadRequest<'a> {
    uploads: &'a [UploadPartSpec],
}

/// One reserved upload slot. Single-part slots carry `url`; multipart slots
/// carry `upload_id` plus one presigned URL per part.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadSlot {
    pub index: u32,
    pub uuid: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub urls: Vec<String>,
    #[serde(rename = "UploadId", default)]
    pub upload_id: Option<String>,
}

impl UploadSlot {
    /// The presigned URL for a single-part transfer, whichever field the
    /// server chose to populate.
    pub fn single_url(&self) -> Option<&str> {
        self.urls.first().or(self.url.as_ref()).map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
pub struct StartUploadResponse {
    #[serde(default)]
    pub uploads: Vec<UploadSlot>,
}

/// Single-part shard record sent to finish-upload.
#[derive(Debug, Clone, Serialize)]
pub struct Shard {
    pub hash: String,
    pub uuid: String,
}

/// One uploaded part; `PartNumber` is 1-indexed on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// Multipart shard record sent to finish-upload.
#[derive(Debug, Clone, Serialize)]
pub struct MultipartShard {
    pub uuid: String,
    pub hash: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
    pub parts: Vec<CompletedPart>,
}

#[derive(Serialize)]
struct FinishUploadRequest<T: Serialize> {
    index: String,
    shards: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinishUploadResponse {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub index: String,
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketFileInfo {
    #[serde(default)]
    pub bucket: String,
    pub index: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub shards: Vec<ShardInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShardInfo {
    pub index: u32,
    pub hash: String,
    pub url: String,
}

/// Authenticated client for the Network (blob) tier.
#[derive(Debug, Clone)]
pub struct NetworkClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    basic_auth: String,
}

impl NetworkClient {
    pub fn new(http: reqwest::Client, endpoints: Endpoints, basic_auth: String) -> Self {
        Self {
            http,
            endpoints,
            basic_auth,
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, &self.basic_auth)
            .header("internxt-version", NETWORK_VERSION)
    }

    /// Reserve all parts of an upload at once. `num_parts` becomes the
    /// `multiparts` query parameter (required by the server when > 1).
    pub async fn start_upload(
        &self,
        cancel: &CancellationToken,
        bucket_id: &str,
        specs: &[UploadPartSpec],
        num_parts: u64,
    ) -> Result<StartUploadResponse> {
        let url = self.endpoints.start_upload(bucket_id);
        tracing::debug!(bucket = bucket_id, num_parts, "start upload");

        let req = self
            .request(Method::POST, url)
            .query(&[("multiparts", num_parts)])
            .json(&StartUploadRequest { uploads: specs })
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE);

        let resp = run_cancellable(cancel, async { Ok(req.send().await?) }).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::UploadStartFailed {
                reason: format!("status {}: {body}", status.as_u16()),
            });
        }

        let body = resp.bytes().await?;
        serde_json::from_slice(&body)
            .context("failed to decode start upload response")
            .map_err(Error::Other)
    }

    /// Complete a single-part upload, registering its shards.
    pub async fn finish_upload(
        &self,
        cancel: &CancellationToken,
        bucket_id: &str,
        index: &str,
        shards: Vec<Shard>,
    ) -> Result<FinishUploadResponse> {
        self.finish(cancel, bucket_id, index, shards, "finish upload")
            .await
    }

    /// Complete a multipart upload session.
    pub async fn finish_multipart_upload(
        &self,
        cancel: &CancellationToken,
        bucket_id: &str,
        index: &str,
        shard: MultipartShard,
    ) -> Result<FinishUploadResponse> {
        self.finish(cancel, bucket_id, index, vec![shard], "finish multipart upload")
            .await
    }

    async fn finish<T: Serialize>(
        &self,
        cancel: &CancellationToken,
        bucket_id: &str,
        index: &str,
        shards: Vec<T>,
        operation: &'static str,
    ) -> Result<FinishUploadResponse> {
        let url = self.endpoints.finish_upload(bucket_id);
        let req = self
            .request(Method::POST, url)
            .json(&FinishUploadRequest {
                index: index.to_string(),
                shards,
            })
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE);

        let resp = run_cancellable(cancel, async { Ok(req.send().await?) }).await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;

        if !(200..300).contains(&status) {
            let body_str = String::from_utf8_lossy(&body).into_owned();
            // The server reports an identical pre-existing blob as a unique
            // index violation; callers may treat that as success.
            if status == 500 && body_str.contains("duplicate key error") {
                return Err(Error::DuplicateShard { body: body_str });
            }
            return Err(Error::FinishFailed(HttpError::new(
                operation,
                status,
                body.to_vec(),
            )));
        }

        serde_json::from_slice(&body)
            .with_context(|| format!("failed to decode {operation} response"))
            .map_err(Error::Other)
    }

    /// Look up a stored file's shards and encryption index.
    pub async fn get_bucket_file_info(
        &self,
        cancel: &CancellationToken,
        bucket_id: &str,
        file_id: &str,
    ) -> Result<BucketFileInfo> {
        let url = self.endpoints.file_info(bucket_id, file_id);
        let req = self.request(Method::GET, url);

        let resp = run_cancellable(cancel, async { Ok(req.send().await?) }).await?;
        if !resp.status().is_success() {
            return Err(Error::Http(
                HttpError::from_response("get bucket file info", resp).await,
            ));
        }

        let body = resp.bytes().await?;
        serde_json::from_slice(&body)
            .context("failed to decode bucket file info response")
            .map_err(Error::Other)
    }
}

/// The server serializes absent lists as `null`; treat that as empty.
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt: Option<Vec<T>> = Option::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}
