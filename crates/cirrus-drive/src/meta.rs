//! File metadata operations: create (with the eventual-consistency retry),
//! delete, rename, existence checks and thumbnail registration.

use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use cirrus_core::config::ENCRYPT_VERSION;
use cirrus_core::error::{Error, HttpError, Result};
use cirrus_core::{run_cancellable, sleep_cancellable};
use cirrus_network::client::DRIVE_VERSION;

use crate::DriveClient;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// How long to wait before the single retry when create-meta 404s on a
/// folder that is not yet visible.
const NOT_FOUND_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMetaRequest {
    pub name: String,
    pub bucket: String,
    /// Network-tier file id; `null` for empty files, which never touch the
    /// blob tier.
    pub file_id: Option<String>,
    pub encrypt_version: String,
    pub folder_uuid: String,
    pub size: u64,
    pub plain_name: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub creation_time: DateTime<Utc>,
    pub date: DateTime<Utc>,
    pub modification_time: DateTime<Utc>,
}

impl CreateMetaRequest {
    pub fn new(
        plain_name: &str,
        bucket: &str,
        file_id: Option<String>,
        folder_uuid: &str,
        file_type: &str,
        size: u64,
        mod_time: DateTime<Utc>,
    ) -> Self {
        Self {
            name: plain_name.to_string(),
            bucket: bucket.to_string(),
            file_id,
            encrypt_version: ENCRYPT_VERSION.to_string(),
            folder_uuid: folder_uuid.to_string(),
            size,
            plain_name: plain_name.to_string(),
            file_type: file_type.to_string(),
            creation_time: mod_time,
            date: mod_time,
            modification_time: mod_time,
        }
    }
}

/// A file's metadata record as returned by the Drive tier.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaFile {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub encrypt_version: String,
    #[serde(default)]
    pub folder_uuid: String,
    #[serde(default)]
    pub plain_name: String,
    #[serde(rename = "type", default)]
    pub file_type: String,
    /// The server sends this as either a number or a string.
    #[serde(default)]
    pub size: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl MetaFile {
    pub fn size_bytes(&self) -> u64 {
        match &self.size {
            serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
            serde_json::Value::String(s) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistenceQuery {
    pub plain_name: String,
    #[serde(rename = "type")]
    pub file_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistenceCheck {
    pub exists: bool,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub plain_name: String,
    #[serde(rename = "type", default)]
    pub file_type: String,
}

#[derive(Deserialize)]
struct ExistenceResponse {
    #[serde(default)]
    files: Vec<ExistenceCheck>,
}

/// Registration payload for a generated thumbnail.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateThumbnailRequest {
    pub file_uuid: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub size: u64,
    pub max_width: u32,
    pub max_height: u32,
    pub bucket_id: String,
    pub bucket_file: String,
    pub encrypt_version: String,
}

impl DriveClient {
    /// Create file metadata.
    ///
    /// Waits out the consistency window for a just-created parent folder,
    /// then on a 404 (folder still not visible) waits 500 ms and retries
    /// exactly once. Both safeguards coexist on purpose.
    pub async fn create_meta(
        &self,
        cancel: &CancellationToken,
        req: &CreateMetaRequest,
    ) -> Result<MetaFile> {
        self.consistency()
            .await_folder(cancel, &req.folder_uuid)
            .await?;

        match self.do_create_meta(cancel, req).await {
            Err(Error::CreateMetaFailed(http)) if http.status_code() == 404 => {
                tracing::debug!(
                    folder = %req.folder_uuid,
                    "create meta hit 404, retrying once after delay"
                );
                sleep_cancellable(cancel, NOT_FOUND_RETRY_DELAY).await?;
                self.do_create_meta(cancel, req).await
            }
            other => other,
        }
    }

    async fn do_create_meta(
        &self,
        cancel: &CancellationToken,
        req: &CreateMetaRequest,
    ) -> Result<MetaFile> {
        let request = self
            .request(Method::POST, self.endpoints().create_file())
            .header("internxt-version", DRIVE_VERSION)
            .json(req)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE);

        let resp = run_cancellable(cancel, async { Ok(request.send().await?) }).await?;
        if !resp.status().is_success() {
            return Err(Error::CreateMetaFailed(
                HttpError::from_response("create meta", resp).await,
            ));
        }

        let body = resp.bytes().await?;
        serde_json::from_slice(&body)
            .context("failed to decode create meta response")
            .map_err(Error::Other)
    }

    /// Delete a file record by UUID.
    pub async fn delete_file(&self, cancel: &CancellationToken, uuid: &str) -> Result<()> {
        let request = self.request(Method::DELETE, self.endpoints().file(uuid));
        let resp = run_cancellable(cancel, async { Ok(request.send().await?) }).await?;
        if !resp.status().is_success() {
            return Err(Error::Http(
                HttpError::from_response("delete file", resp).await,
            ));
        }
        Ok(())
    }

    /// Rename a file; `new_type` replaces the extension when given.
    pub async fn rename_file(
        &self,
        cancel: &CancellationToken,
        uuid: &str,
        new_plain_name: &str,
        new_type: Option<&str>,
    ) -> Result<()> {
        let mut payload = serde_json::json!({ "plainName": new_plain_name });
        if let Some(t) = new_type {
            payload["type"] = serde_json::Value::String(t.to_string());
        }

        let request = self
            .request(Method::PUT, self.endpoints().file_meta(uuid))
            .json(&payload);

        let resp = run_cancellable(cancel, async { Ok(request.send().await?) }).await?;
        if !resp.status().is_success() {
            return Err(Error::Http(
                HttpError::from_response("rename file", resp).await,
            ));
        }
        Ok(())
    }

    /// Ask which of the given names already exist in a folder.
    pub async fn check_file_existence(
        &self,
        cancel: &CancellationToken,
        parent_uuid: &str,
        files: &[ExistenceQuery],
    ) -> Result<Vec<ExistenceCheck>> {
        let request = self
            .request(Method::POST, self.endpoints().files_existence(parent_uuid))
            .json(&serde_json::json!({ "files": files }));

        let resp = run_cancellable(cancel, async { Ok(request.send().await?) }).await?;
        if !resp.status().is_success() {
            return Err(Error::Http(
                HttpError::from_response("check file existence", resp).await,
            ));
        }

        let body = resp.bytes().await?;
        let parsed: ExistenceResponse = serde_json::from_slice(&body)
            .context("failed to decode existence response")
            .map_err(Error::Other)?;
        Ok(parsed.files)
    }

    /// Register a generated thumbnail against its file.
    pub async fn create_thumbnail(
        &self,
        cancel: &CancellationToken,
        req: &CreateThumbnailRequest,
    ) -> Result<()> {
        let request = self
            .request(Method::POST, self.endpoints().thumbnail())
            .json(req);

        let resp = run_cancellable(cancel, async { Ok(request.send().await?) }).await?;
        if !resp.status().is_success() {
            return Err(Error::Http(
                HttpError::from_response("create thumbnail", resp).await,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_meta_request_wire_shape() {
        let mod_time = "2024-03-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let req = CreateMetaRequest::new(
            "report",
            "bucket-1",
            Some("network-id".into()),
            "folder-uuid",
            "pdf",
            2048,
            mod_time,
        );
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["plainName"], "report");
        assert_eq!(json["name"], "report");
        assert_eq!(json["fileId"], "network-id");
        assert_eq!(json["encryptVersion"], "03-aes");
        assert_eq!(json["folderUuid"], "folder-uuid");
        assert_eq!(json["type"], "pdf");
        assert_eq!(json["size"], 2048);
        assert!(json["creationTime"]
            .as_str()
            .unwrap()
            .starts_with("2024-03-01T10:00:00"));
    }

    #[test]
    fn empty_file_serializes_null_file_id() {
        let req = CreateMetaRequest::new(
            "empty",
            "bucket-1",
            None,
            "folder-uuid",
            "",
            0,
            Utc::now(),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert!(json["fileId"].is_null());
        assert_eq!(json["size"], 0);
    }

    #[test]
    fn meta_file_size_number_or_string() {
        let numeric: MetaFile =
            serde_json::from_str(r#"{"uuid":"u","size":123}"#).unwrap();
        assert_eq!(numeric.size_bytes(), 123);

        let stringy: MetaFile =
            serde_json::from_str(r#"{"uuid":"u","size":"456"}"#).unwrap();
        assert_eq!(stringy.size_bytes(), 456);

        let absent: MetaFile = serde_json::from_str(r#"{"uuid":"u"}"#).unwrap();
        assert_eq!(absent.size_bytes(), 0);
    }
}
