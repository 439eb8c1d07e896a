//! Thumbnail capture and background upload.
//!
//! Image decode/resize is not this library's business: callers plug in a
//! [`ThumbnailGenerator`]. The engine tees eligible plaintext into memory
//! during upload, then a background task generates the PNG, uploads it
//! through the ordinary single-part path and registers it against the file.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};

use chrono::Utc;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cirrus_core::error::{Error, Result};
use cirrus_drive::CreateThumbnailRequest;

use crate::retry::{retry, RetryPolicy};
use crate::Engine;

/// File extensions eligible for thumbnail generation.
pub const SUPPORTED_FORMATS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "tif", "tiff"];

pub fn is_supported_format(ext: &str) -> bool {
    let normalized = ext.trim_start_matches('.').to_ascii_lowercase();
    SUPPORTED_FORMATS.contains(&normalized.as_str())
}

/// A generated thumbnail: PNG bytes plus the bounding box it was fitted to.
pub struct Thumbnail {
    pub data: Vec<u8>,
    pub max_width: u32,
    pub max_height: u32,
}

/// Image decoding and resizing, supplied by the embedding application.
pub trait ThumbnailGenerator: Send + Sync {
    fn generate(&self, source: &[u8], source_format: &str) -> anyhow::Result<Thumbnail>;
}

/// Plaintext tee used by the dispatcher to capture thumbnail sources.
#[derive(Clone, Default)]
pub(crate) struct CaptureBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub(crate) fn take(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.lock().expect("capture buffer lock poisoned"))
    }

    fn extend(&self, data: &[u8]) {
        self.inner
            .lock()
            .expect("capture buffer lock poisoned")
            .extend_from_slice(data);
    }
}

pub(crate) struct CaptureReader<R> {
    inner: R,
    buffer: CaptureBuffer,
}

impl<R: AsyncRead + Unpin> CaptureReader<R> {
    pub(crate) fn new(inner: R, buffer: CaptureBuffer) -> Self {
        Self { inner, buffer }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CaptureReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = &mut *self;
        let before = buf.filled().len();
        ready!(Pin::new(&mut me.inner).poll_read(cx, buf))?;
        me.buffer.extend(&buf.filled()[before..]);
        Poll::Ready(Ok(()))
    }
}

/// Lifecycle handle over in-flight background thumbnail uploads. The CLI
/// drains it before exiting so fire-and-forget tasks are not killed
/// mid-upload.
#[derive(Clone, Default)]
pub struct PendingThumbnails {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl PendingThumbnails {
    pub(crate) fn register(&self, handle: JoinHandle<()>) {
        self.handles
            .lock()
            .expect("pending thumbnails lock poisoned")
            .push(handle);
    }

    /// Await every registered task, including ones registered while
    /// waiting.
    pub async fn wait(&self) {
        loop {
            let handle = self
                .handles
                .lock()
                .expect("pending thumbnails lock poisoned")
                .pop();
            match handle {
                Some(handle) => {
                    let _ = handle.await;
                }
                None => break,
            }
        }
    }
}

impl Engine {
    pub(crate) fn spawn_thumbnail_upload(
        &self,
        file_uuid: String,
        source_format: String,
        source: Vec<u8>,
    ) {
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            // Detached from the upload's token: cancelling the foreground
            // call must not kill an already-committed thumbnail.
            let cancel = CancellationToken::new();
            if let Err(err) = engine
                .upload_thumbnail(&cancel, &file_uuid, &source_format, &source)
                .await
            {
                tracing::warn!(file = %file_uuid, error = %err, "thumbnail upload failed");
            }
        });
        self.pending().register(handle);
    }

    async fn upload_thumbnail(
        &self,
        cancel: &CancellationToken,
        file_uuid: &str,
        source_format: &str,
        source: &[u8],
    ) -> Result<()> {
        let Some(generator) = self.generator() else {
            return Ok(());
        };

        let thumbnail = generator
            .generate(source, source_format)
            .map_err(|e| Error::Other(e.context("failed to generate thumbnail")))?;
        let size = thumbnail.data.len() as u64;

        let name = format!("thumb_{file_uuid}.png");
        let meta = self
            .upload_single(
                cancel,
                &self.config().root_folder_uuid,
                &name,
                std::io::Cursor::new(thumbnail.data),
                Some(size),
                Utc::now(),
            )
            .await?;

        let request = CreateThumbnailRequest {
            file_uuid: file_uuid.to_string(),
            file_type: "png".to_string(),
            size,
            max_width: thumbnail.max_width,
            max_height: thumbnail.max_height,
            bucket_id: meta.bucket.clone(),
            bucket_file: meta.file_id.clone().unwrap_or_default(),
            encrypt_version: meta.encrypt_version.clone(),
        };

        retry(RetryPolicy::THUMBNAIL, cancel, |_| {
            let request = request.clone();
            async move { self.drive().create_thumbnail(cancel, &request).await }
        })
        .await?;

        tracing::debug!(file = %file_uuid, size, "thumbnail registered");
        Ok(())
    }
}
