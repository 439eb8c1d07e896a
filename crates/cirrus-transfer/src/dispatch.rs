//! Upload dispatcher: the single public entry point.

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use cirrus_core::error::{Error, Result};
use cirrus_drive::{CreateMetaRequest, MetaFile};

use crate::thumbnail::{is_supported_format, CaptureBuffer, CaptureReader};
use crate::{split_name_ext, Engine};

impl Engine {
    /// Upload a stream into `folder_uuid`.
    ///
    /// Routing rules:
    /// - zero bytes: metadata only, `fileId = null` — the blob tier is
    ///   never touched;
    /// - unknown size (`plain_size: None`): buffered up to the configured
    ///   cap, then re-dispatched with the measured size;
    /// - below `multipart_min_size`: single-part, else multipart.
    ///
    /// Supported image formats within the thumbnail size bound get their
    /// plaintext teed into memory; a background task generates and uploads
    /// the thumbnail after the metadata exists.
    pub async fn upload(
        &self,
        cancel: &CancellationToken,
        folder_uuid: &str,
        file_name: &str,
        input: impl AsyncRead + Send + Unpin + 'static,
        plain_size: Option<u64>,
        mod_time: DateTime<Utc>,
    ) -> Result<MetaFile> {
        let cfg = self.config();

        let (mut reader, size): (Box<dyn AsyncRead + Send + Unpin>, u64) = match plain_size {
            Some(size) => (Box::new(input), size),
            None => {
                let limit = cfg.transfer.max_unknown_size_buffer;
                let mut buf = Vec::new();
                let mut limited = input.take(limit + 1);
                limited.read_to_end(&mut buf).await?;
                if buf.len() as u64 > limit {
                    return Err(Error::UnknownSizeTooLarge { limit });
                }
                let size = buf.len() as u64;
                tracing::debug!(file = file_name, size, "buffered unknown-size stream");
                (Box::new(std::io::Cursor::new(buf)), size)
            }
        };

        let (name, ext) = split_name_ext(file_name);

        if size == 0 {
            let req =
                CreateMetaRequest::new(&name, &cfg.bucket, None, folder_uuid, &ext, 0, mod_time);
            return self.drive().create_meta(cancel, &req).await;
        }

        let capture = (self.generator().is_some()
            && is_supported_format(&ext)
            && size <= cfg.transfer.max_thumbnail_source_size)
            .then(CaptureBuffer::default);
        if let Some(buffer) = &capture {
            reader = Box::new(CaptureReader::new(reader, buffer.clone()));
        }

        let meta = if size >= cfg.transfer.multipart_min_size {
            self.upload_multipart(cancel, folder_uuid, file_name, reader, size, mod_time)
                .await?
        } else {
            self.upload_single(cancel, folder_uuid, file_name, reader, Some(size), mod_time)
                .await?
        };

        if let Some(buffer) = capture {
            let source = buffer.take();
            if !source.is_empty() {
                self.spawn_thumbnail_upload(meta.uuid.clone(), ext, source);
            }
        }

        Ok(meta)
    }
}
