//! Multipart upload: encrypt-all-then-upload.
//!
//! CTR keystream positions depend on byte order, so one cipher instance
//! encrypts all chunks sequentially up front; only the resulting immutable
//! ciphertext chunks are uploaded concurrently. A partial encryption
//! failure aborts the whole session — the shared cipher cannot resume
//! mid-chunk.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use cirrus_core::error::{Error, Result};
use cirrus_core::Config;
use cirrus_crypto::{
    compute_file_hash, generate_file_key, generate_index, new_cipher, Aes256Ctr, StreamCipher,
};
use cirrus_drive::{CreateMetaRequest, MetaFile};
use cirrus_network::{transfer, CompletedPart, MultipartShard, UploadPartSpec};

use crate::retry::{retry, RetryPolicy};
use crate::{split_name_ext, with_context, Engine};

/// `ceil(total / chunk)`; zero only for an empty stream.
pub(crate) fn num_parts(total_size: u64, chunk_size: u64) -> u64 {
    if total_size == 0 {
        0
    } else {
        total_size.div_ceil(chunk_size)
    }
}

struct MultipartSession {
    plain_index: String,
    cipher: Aes256Ctr,
    total_size: u64,
    chunk_size: u64,
    num_parts: u64,
}

impl MultipartSession {
    fn new(cfg: &Config, total_size: u64) -> Result<Self> {
        let plain_index = generate_index();
        let (key, iv) = generate_file_key(&cfg.mnemonic, &cfg.bucket, &plain_index)?;
        let cipher = new_cipher(&key, &iv);
        let chunk_size = cfg.transfer.chunk_size;

        Ok(Self {
            plain_index,
            cipher,
            total_size,
            chunk_size,
            num_parts: num_parts(total_size, chunk_size),
        })
    }

    /// Read and encrypt all chunks in strict order through the single
    /// cipher instance.
    async fn encrypt_all<R: AsyncRead + Unpin>(&mut self, input: &mut R) -> Result<Vec<Bytes>> {
        let mut chunks = Vec::with_capacity(self.num_parts as usize);
        for part in 0..self.num_parts {
            let len = if part == self.num_parts - 1 {
                self.total_size - part * self.chunk_size
            } else {
                self.chunk_size
            };

            let mut buf = vec![0u8; len as usize];
            input
                .read_exact(&mut buf)
                .await
                .map_err(|e| with_context(e.into(), &format!("failed to read chunk {part}")))?;
            self.cipher.apply_keystream(&mut buf);
            chunks.push(Bytes::from(buf));
        }
        Ok(chunks)
    }
}

impl Engine {
    pub(crate) async fn upload_multipart<R>(
        &self,
        cancel: &CancellationToken,
        folder_uuid: &str,
        file_name: &str,
        mut input: R,
        plain_size: u64,
        mod_time: DateTime<Utc>,
    ) -> Result<MetaFile>
    where
        R: AsyncRead + Send + Unpin,
    {
        let cfg = self.config();
        let mut session = MultipartSession::new(cfg, plain_size)?;
        tracing::debug!(
            file = file_name,
            size = plain_size,
            parts = session.num_parts,
            "starting multipart upload"
        );

        let start = self
            .network()
            .start_upload(
                cancel,
                &cfg.bucket,
                &[UploadPartSpec {
                    index: 0,
                    size: plain_size,
                }],
                session.num_parts,
            )
            .await?;

        if start.uploads.len() != 1 {
            return Err(Error::StartMalformed {
                what: "upload entries",
                expected: 1,
                actual: start.uploads.len(),
            });
        }
        let slot = &start.uploads[0];
        if slot.urls.len() != session.num_parts as usize {
            return Err(Error::StartMalformed {
                what: "presigned urls",
                expected: session.num_parts as usize,
                actual: slot.urls.len(),
            });
        }
        let upload_id = slot.upload_id.clone().ok_or_else(|| Error::UploadStartFailed {
            reason: "multipart start response carries no UploadId".into(),
        })?;
        let uuid = slot.uuid.clone();
        let urls = Arc::new(slot.urls.clone());

        let chunks = session.encrypt_all(&mut input).await?;

        let parts = self.upload_chunks(cancel, urls, &chunks).await?;

        let mut sha = Sha256::new();
        for chunk in &chunks {
            sha.update(chunk);
        }
        let overall_hash = compute_file_hash(&sha.finalize());

        let finish = self
            .network()
            .finish_multipart_upload(
                cancel,
                &cfg.bucket,
                &session.plain_index,
                MultipartShard {
                    uuid,
                    hash: overall_hash,
                    upload_id,
                    parts,
                },
            )
            .await?;

        let (name, ext) = split_name_ext(file_name);
        let req = CreateMetaRequest::new(
            &name,
            &cfg.bucket,
            Some(finish.id),
            folder_uuid,
            &ext,
            plain_size,
            mod_time,
        );
        let meta = self.drive().create_meta(cancel, &req).await?;

        tracing::info!(
            file = file_name,
            uuid = %meta.uuid,
            size = plain_size,
            parts = session.num_parts,
            "uploaded (multipart)"
        );
        Ok(meta)
    }

    /// Upload all encrypted chunks with bounded concurrency, retrying each
    /// chunk independently. Results reassemble by index; the first error
    /// wins, but only after every task has reported in.
    async fn upload_chunks(
        &self,
        cancel: &CancellationToken,
        urls: Arc<Vec<String>>,
        chunks: &[Bytes],
    ) -> Result<Vec<CompletedPart>> {
        let semaphore = Arc::new(Semaphore::new(self.config().transfer.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let chunk = chunk.clone();
            let urls = Arc::clone(&urls);
            let semaphore = Arc::clone(&semaphore);
            let http = self.http().clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, Err(Error::Cancelled)),
                };

                let size = chunk.len() as u64;
                let result = retry(RetryPolicy::TRANSFER, &cancel, |attempt| {
                    let http = http.clone();
                    let url = urls[index].clone();
                    let cancel = cancel.clone();
                    let body = chunk.clone();
                    async move {
                        if attempt > 1 {
                            tracing::debug!(chunk = index, attempt, "retrying chunk transfer");
                        }
                        transfer(&http, &cancel, &url, body, size).await
                    }
                })
                .await;

                (index, result.map(|r| r.etag))
            });
        }

        let mut parts: Vec<Option<CompletedPart>> = vec![None; chunks.len()];
        let mut first_error: Option<(usize, Error)> = None;

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined
                .map_err(|e| Error::Other(anyhow::anyhow!("chunk upload task failed: {e}")))?;
            match result {
                Ok(etag) => {
                    parts[index] = Some(CompletedPart {
                        part_number: index as u32 + 1,
                        etag,
                    });
                }
                Err(err) => {
                    tracing::warn!(chunk = index, error = %err, "chunk upload failed");
                    if first_error.is_none() {
                        first_error = Some((index, err));
                    }
                }
            }
        }

        if let Some((index, err)) = first_error {
            return Err(with_context(err, &format!("failed to upload chunk {index}")));
        }

        parts
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::Other(anyhow::anyhow!("chunk results incomplete")))
    }
}
