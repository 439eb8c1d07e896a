//! Single-part streaming upload.
//!
//! The start-upload call runs on a background task while the first 5 MiB of
//! ciphertext is pre-read, which hides one round trip on long-RTT links.
//! The body sent to the presigned URL is the pre-buffer chained with the
//! rest of the encrypting reader.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use cirrus_core::error::{Error, Result};
use cirrus_crypto::{compute_file_hash, generate_file_key, generate_index, CipherReader, HashReader, SharedHasher};
use cirrus_drive::{CreateMetaRequest, MetaFile};
use cirrus_network::{transfer, Shard, UploadPartSpec};

use crate::{split_name_ext, Engine};

/// Ciphertext pre-read while start-upload is in flight.
const PRE_READ_MAX: u64 = 5 * 1024 * 1024;

impl Engine {
    /// Encrypt `input` and upload it as a single blob, then create its
    /// metadata. `plain_size: None` means unknown length; the whole
    /// encrypted stream is buffered first (the 1 GiB cap lives in the
    /// dispatcher).
    pub(crate) async fn upload_single<R>(
        &self,
        cancel: &CancellationToken,
        folder_uuid: &str,
        file_name: &str,
        input: R,
        plain_size: Option<u64>,
        mod_time: DateTime<Utc>,
    ) -> Result<MetaFile>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let cfg = self.config();
        let plain_index = generate_index();
        let (key, iv) = generate_file_key(&cfg.mnemonic, &cfg.bucket, &plain_index)?;

        let hasher = SharedHasher::new();
        let mut encrypted = HashReader::new(CipherReader::encrypt(input, &key, &iv), hasher.clone());

        // Unknown length: buffer all ciphertext to learn the size before
        // the start call can be issued.
        let (size, mut prebuf) = match plain_size {
            Some(size) => (size, Vec::new()),
            None => {
                let mut buf = Vec::new();
                encrypted.read_to_end(&mut buf).await?;
                let size = buf.len() as u64;
                (size, buf)
            }
        };

        let start_task = {
            let network = self.network().clone();
            let bucket = cfg.bucket.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                network
                    .start_upload(&cancel, &bucket, &[UploadPartSpec { index: 0, size }], 1)
                    .await
            })
        };

        // Pre-read ciphertext while the start call is in flight.
        if plain_size.is_some() && size > 0 {
            let target = size.min(PRE_READ_MAX) as usize;
            prebuf.reserve(target);
            let mut chunk = vec![0u8; 64 * 1024];
            while prebuf.len() < target {
                let want = chunk.len().min(target - prebuf.len());
                let n = encrypted.read(&mut chunk[..want]).await?;
                if n == 0 {
                    break;
                }
                prebuf.extend_from_slice(&chunk[..n]);
            }
        }

        let start = start_task
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!("start upload task failed: {e}")))??;
        let slot = start.uploads.first().ok_or_else(|| Error::UploadStartFailed {
            reason: "empty uploads array in start response".into(),
        })?;
        let upload_url = slot
            .single_url()
            .ok_or_else(|| Error::UploadStartFailed {
                reason: "start response carries no upload url".into(),
            })?
            .to_string();

        tracing::debug!(
            file = file_name,
            size,
            prebuffered = prebuf.len(),
            "transferring encrypted blob"
        );

        let body_stream = futures::stream::iter([Ok::<_, std::io::Error>(Bytes::from(prebuf))])
            .chain(ReaderStream::new(encrypted));
        let body = reqwest::Body::wrap_stream(body_stream);
        transfer(self.http(), cancel, &upload_url, body, size).await?;

        let hash = compute_file_hash(&hasher.digest());
        let finish = self
            .network()
            .finish_upload(
                cancel,
                &cfg.bucket,
                &plain_index,
                vec![Shard {
                    hash,
                    uuid: slot.uuid.clone(),
                }],
            )
            .await?;

        let (name, ext) = split_name_ext(file_name);
        let req = CreateMetaRequest::new(
            &name,
            &cfg.bucket,
            Some(finish.id),
            folder_uuid,
            &ext,
            size,
            mod_time,
        );
        let meta = self.drive().create_meta(cancel, &req).await?;

        tracing::info!(
            file = file_name,
            uuid = %meta.uuid,
            size,
            "uploaded"
        );
        Ok(meta)
    }
}
