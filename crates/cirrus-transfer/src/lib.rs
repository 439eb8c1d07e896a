//! cirrus-transfer: the upload/download engine.
//!
//! [`Engine::upload`] is the single public entry point for uploads: it routes
//! empty files straight to metadata, buffers unknown-size streams, picks
//! single-part or multipart by size, and captures thumbnail sources on the
//! way through. Downloads run the symmetric path with range support.

mod dispatch;
mod download;
mod multipart;
mod retry;
mod thumbnail;
mod upload;

pub use download::DownloadStream;
pub use retry::{retry, RetryPolicy};
pub use thumbnail::{is_supported_format, PendingThumbnails, Thumbnail, ThumbnailGenerator};

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use cirrus_core::error::{Error, Result};
use cirrus_core::Config;
use cirrus_drive::{ConsistencyTracker, DriveClient, MetaFile};
use cirrus_network::{build_client, Endpoints, NetworkClient};

use thumbnail::PendingThumbnails as Pending;

/// Shared transfer engine. Cheap to clone; all clones share one HTTP
/// connection pool, one consistency tracker and one thumbnail backlog.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    cfg: Config,
    http: reqwest::Client,
    network: NetworkClient,
    drive: DriveClient,
    pending_thumbnails: Pending,
    thumbnail_generator: Option<Arc<dyn ThumbnailGenerator>>,
}

impl Engine {
    pub fn new(cfg: Config) -> Result<Self> {
        Self::build(cfg, None)
    }

    /// An engine that also generates and uploads thumbnails for supported
    /// image formats in the background.
    pub fn with_thumbnailer(cfg: Config, generator: Arc<dyn ThumbnailGenerator>) -> Result<Self> {
        Self::build(cfg, Some(generator))
    }

    fn build(cfg: Config, generator: Option<Arc<dyn ThumbnailGenerator>>) -> Result<Self> {
        let http = build_client(&cfg.client_tag)?;
        let endpoints = Endpoints::new(&cfg.base_url);
        let network = NetworkClient::new(http.clone(), endpoints.clone(), cfg.basic_auth.clone());
        let consistency = ConsistencyTracker::new(cfg.consistency_window());
        let drive = DriveClient::new(http.clone(), endpoints, cfg.token.clone(), consistency);

        Ok(Self {
            inner: Arc::new(EngineInner {
                cfg,
                http,
                network,
                drive,
                pending_thumbnails: Pending::default(),
                thumbnail_generator: generator,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.cfg
    }

    pub fn network(&self) -> &NetworkClient {
        &self.inner.network
    }

    pub fn drive(&self) -> &DriveClient {
        &self.inner.drive
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(crate) fn generator(&self) -> Option<&Arc<dyn ThumbnailGenerator>> {
        self.inner.thumbnail_generator.as_ref()
    }

    pub(crate) fn pending(&self) -> &Pending {
        &self.inner.pending_thumbnails
    }

    /// Block until all background thumbnail uploads have finished. Called
    /// once at shutdown.
    pub async fn wait_pending_thumbnails(&self) {
        self.inner.pending_thumbnails.wait().await;
    }

    /// Upload a file from disk, taking its size and mtime from the
    /// filesystem.
    pub async fn upload_file(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        folder_uuid: &str,
    ) -> Result<MetaFile> {
        let meta = tokio::fs::metadata(path).await?;
        let mod_time: DateTime<Utc> = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Other(anyhow::anyhow!("invalid file name: {}", path.display())))?
            .to_string();

        let file = tokio::fs::File::open(path).await?;
        self.upload(cancel, folder_uuid, &file_name, file, Some(meta.len()), mod_time)
            .await
    }
}

/// Split a file name into (stem, extension-without-dot).
pub(crate) fn split_name_ext(file_name: &str) -> (String, String) {
    let path = Path::new(file_name);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
        .to_string();
    (name, ext)
}

/// Wrap an error with a contextual prefix, letting cancellation through
/// untouched so callers can still match on it.
pub(crate) fn with_context(err: Error, context: &str) -> Error {
    match err {
        Error::Cancelled => Error::Cancelled,
        other => Error::Other(anyhow::Error::new(other).context(context.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_name_ext_variants() {
        assert_eq!(split_name_ext("report.pdf"), ("report".into(), "pdf".into()));
        assert_eq!(
            split_name_ext("archive.tar.gz"),
            ("archive.tar".into(), "gz".into())
        );
        assert_eq!(split_name_ext("README"), ("README".into(), "".into()));
        assert_eq!(split_name_ext("photo.JPG"), ("photo".into(), "JPG".into()));
    }

    #[test]
    fn with_context_preserves_cancellation() {
        let wrapped = with_context(Error::Cancelled, "failed to transfer chunk 3");
        assert!(matches!(wrapped, Error::Cancelled));

        let wrapped = with_context(
            Error::TransferFailed {
                status: 500,
                body: "boom".into(),
            },
            "failed to transfer chunk 3",
        );
        assert!(wrapped.to_string().contains("failed to transfer chunk 3"));
    }
}
