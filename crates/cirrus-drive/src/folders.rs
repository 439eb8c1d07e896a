//! Folder tree operations: create, delete, paginated listings.

use anyhow::Context as _;
use chrono::Utc;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use cirrus_core::error::{Error, HttpError, Result};
use cirrus_core::run_cancellable;

use crate::meta::MetaFile;
use crate::DriveClient;

const PAGE_SIZE: usize = 50;
// backstop against a server that keeps returning full pages
const MAX_PAGES: usize = 10_000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub plain_name: String,
    pub parent_folder_uuid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub creation_time: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub modification_time: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub uuid: String,
    #[serde(default)]
    pub plain_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Folder {
    pub fn display_name(&self) -> &str {
        self.plain_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("unnamed")
    }
}

/// Pagination controls for folder-content listings.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub offset: usize,
    pub limit: usize,
    pub sort: Option<String>,
    pub order: Option<String>,
}

impl ListOptions {
    fn query(&self) -> [(String, String); 4] {
        let limit = if self.limit == 0 { PAGE_SIZE } else { self.limit };
        [
            ("offset".into(), self.offset.to_string()),
            ("limit".into(), limit.to_string()),
            (
                "sort".into(),
                self.sort.clone().unwrap_or_else(|| "plainName".into()),
            ),
            ("order".into(), self.order.clone().unwrap_or_else(|| "ASC".into())),
        ]
    }
}

#[derive(Deserialize)]
struct FoldersWrapper {
    #[serde(default)]
    folders: Vec<Folder>,
}

#[derive(Deserialize)]
struct FilesWrapper {
    #[serde(default)]
    files: Vec<MetaFile>,
}

impl DriveClient {
    /// Create a folder and start its consistency window.
    ///
    /// Timestamps are auto-filled when the caller leaves them empty.
    pub async fn create_folder(
        &self,
        cancel: &CancellationToken,
        mut req: CreateFolderRequest,
    ) -> Result<Folder> {
        let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);
        if req.creation_time.is_empty() {
            req.creation_time = now.clone();
        }
        if req.modification_time.is_empty() {
            req.modification_time = now;
        }

        let request = self
            .request(Method::POST, self.endpoints().folders())
            .json(&req);

        let resp = run_cancellable(cancel, async { Ok(request.send().await?) }).await?;
        if !resp.status().is_success() {
            return Err(Error::Http(
                HttpError::from_response("create folder", resp).await,
            ));
        }

        let body = resp.bytes().await?;
        let folder: Folder = serde_json::from_slice(&body)
            .context("failed to decode create folder response")
            .map_err(Error::Other)?;

        self.consistency().track(&folder.uuid);
        tracing::debug!(uuid = %folder.uuid, name = %req.plain_name, "folder created");
        Ok(folder)
    }

    /// Delete a folder by UUID. The server answers 204 on success.
    pub async fn delete_folder(&self, cancel: &CancellationToken, uuid: &str) -> Result<()> {
        let request = self.request(Method::DELETE, self.endpoints().folder(uuid));
        let resp = run_cancellable(cancel, async { Ok(request.send().await?) }).await?;
        if !resp.status().is_success() {
            return Err(Error::Http(
                HttpError::from_response("delete folder", resp).await,
            ));
        }
        Ok(())
    }

    /// List one page of child folders.
    pub async fn list_folders(
        &self,
        cancel: &CancellationToken,
        parent_uuid: &str,
        opts: &ListOptions,
    ) -> Result<Vec<Folder>> {
        let request = self
            .request(Method::GET, self.endpoints().folder_content_folders(parent_uuid))
            .query(&opts.query());

        let resp = run_cancellable(cancel, async { Ok(request.send().await?) }).await?;
        if !resp.status().is_success() {
            return Err(Error::Http(
                HttpError::from_response("list folders", resp).await,
            ));
        }

        let body = resp.bytes().await?;
        let wrapper: FoldersWrapper = serde_json::from_slice(&body)
            .context("failed to decode folders listing")
            .map_err(Error::Other)?;
        Ok(wrapper.folders)
    }

    /// List one page of child files.
    pub async fn list_files(
        &self,
        cancel: &CancellationToken,
        parent_uuid: &str,
        opts: &ListOptions,
    ) -> Result<Vec<MetaFile>> {
        let request = self
            .request(Method::GET, self.endpoints().folder_content_files(parent_uuid))
            .query(&opts.query());

        let resp = run_cancellable(cancel, async { Ok(request.send().await?) }).await?;
        if !resp.status().is_success() {
            return Err(Error::Http(
                HttpError::from_response("list files", resp).await,
            ));
        }

        let body = resp.bytes().await?;
        let wrapper: FilesWrapper = serde_json::from_slice(&body)
            .context("failed to decode files listing")
            .map_err(Error::Other)?;
        Ok(wrapper.files)
    }

    /// All child files, paging until a short page.
    pub async fn list_all_files(
        &self,
        cancel: &CancellationToken,
        parent_uuid: &str,
    ) -> Result<Vec<MetaFile>> {
        let mut out = Vec::new();
        let mut offset = 0;
        for _ in 0..MAX_PAGES {
            let page = self
                .list_files(
                    cancel,
                    parent_uuid,
                    &ListOptions {
                        offset,
                        ..Default::default()
                    },
                )
                .await?;
            let full = page.len() == PAGE_SIZE;
            out.extend(page);
            if !full {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(out)
    }

    /// All child folders, paging until a short page.
    pub async fn list_all_folders(
        &self,
        cancel: &CancellationToken,
        parent_uuid: &str,
    ) -> Result<Vec<Folder>> {
        let mut out = Vec::new();
        let mut offset = 0;
        for _ in 0..MAX_PAGES {
            let page = self
                .list_folders(
                    cancel,
                    parent_uuid,
                    &ListOptions {
                        offset,
                        ..Default::default()
                    },
                )
                .await?;
            let full = page.len() == PAGE_SIZE;
            out.extend(page);
            if !full {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(out)
    }
}
