//! Download path: shard discovery, range-aligned fetch, streaming decrypt,
//! hash validation.
//!
//! CTR is block-aligned, so a range that starts mid-block is served by
//! fetching from the previous 16-byte boundary, advancing the IV by the
//! aligned block count, and discarding the first `start mod 16` decrypted
//! bytes. Hash validation only makes sense for full downloads — a partial
//! ciphertext can never match the full-blob hash.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::TryStreamExt;
use reqwest::header::RANGE;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use cirrus_core::error::{Error, HttpError, Result};
use cirrus_core::run_cancellable;
use cirrus_crypto::{
    advance_iv, compute_file_hash, generate_file_key, new_cipher, CipherReader, HashReader,
    SharedHasher, StreamCipher, BLOCK_SIZE,
};
use cirrus_network::ShardInfo;

use crate::{with_context, Engine};

type BoxedBody = Box<dyn AsyncRead + Send + Unpin>;

impl Engine {
    /// Download a full file to `dest`, decrypting as it streams.
    ///
    /// Shards are fetched in ascending index through one sequential cipher.
    /// Each shard's ciphertext hash is compared against its server-side
    /// record; on mismatch (or any other failure) the partial destination
    /// file is removed.
    pub async fn download_to_path(
        &self,
        cancel: &CancellationToken,
        file_id: &str,
        dest: &Path,
    ) -> Result<u64> {
        let cfg = self.config();
        let info = self
            .network()
            .get_bucket_file_info(cancel, &cfg.bucket, file_id)
            .await
            .map_err(|e| with_context(e, "failed to get bucket file info"))?;

        if info.shards.is_empty() {
            return Err(Error::NoShards {
                file_id: file_id.to_string(),
            });
        }

        let (key, iv) = generate_file_key(&cfg.mnemonic, &cfg.bucket, &info.index)?;
        let mut shards = info.shards;
        shards.sort_by_key(|s| s.index);

        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            Error::Other(anyhow::anyhow!(
                "failed to create destination file {}: {e}",
                dest.display()
            ))
        })?;

        let mut cipher = new_cipher(&key, &iv);
        let mut total = 0u64;
        for shard in &shards {
            match self
                .stream_shard_to_file(cancel, shard, &mut cipher, &mut file)
                .await
            {
                Ok(written) => total += written,
                Err(err) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(dest).await;
                    return Err(err);
                }
            }
        }

        file.flush().await?;
        tracing::info!(file = file_id, dest = %dest.display(), bytes = total, "downloaded");
        Ok(total)
    }

    async fn stream_shard_to_file(
        &self,
        cancel: &CancellationToken,
        shard: &ShardInfo,
        cipher: &mut cirrus_crypto::Aes256Ctr,
        file: &mut tokio::fs::File,
    ) -> Result<u64> {
        let mut resp = run_cancellable(cancel, async {
            Ok(self.http().get(&shard.url).send().await?)
        })
        .await?;

        if !resp.status().is_success() {
            return Err(Error::Http(
                HttpError::from_response("shard download", resp).await,
            ));
        }

        let mut hasher = Sha256::new();
        let mut written = 0u64;
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                chunk = resp.chunk() => chunk?,
            };
            let Some(chunk) = chunk else { break };

            hasher.update(&chunk);
            let mut buf = chunk.to_vec();
            cipher.apply_keystream(&mut buf);
            file.write_all(&buf).await?;
            written += buf.len() as u64;
        }

        if !self.config().transfer.skip_hash_validation {
            let computed = compute_file_hash(&hasher.finalize());
            if computed != shard.hash {
                return Err(Error::HashMismatch {
                    expected: shard.hash.clone(),
                    actual: computed,
                });
            }
        }

        Ok(written)
    }

    /// Open a decrypting reader over a stored file.
    ///
    /// Without a range the reader spans all shards and, unless disabled,
    /// verifies the ciphertext hash when it reaches end of stream. With a
    /// `bytes=start[-end]` range the request is aligned down to the CTR
    /// block, the keystream is advanced to match, the unwanted prefix is
    /// discarded, and hash validation is off.
    pub async fn download_stream(
        &self,
        cancel: &CancellationToken,
        file_id: &str,
        range: Option<&str>,
    ) -> Result<DownloadStream> {
        let cfg = self.config();
        let info = self
            .network()
            .get_bucket_file_info(cancel, &cfg.bucket, file_id)
            .await
            .map_err(|e| with_context(e, "failed to get bucket file info"))?;

        if info.shards.is_empty() {
            return Err(Error::NoShards {
                file_id: file_id.to_string(),
            });
        }

        let (key, mut iv) = generate_file_key(&cfg.mnemonic, &cfg.bucket, &info.index)?;
        let mut shards = info.shards;
        shards.sort_by_key(|s| s.index);

        let (body, skip, expected_hash) = match range {
            None => {
                // Per-shard validation needs shard boundaries, which a
                // flattened stream no longer has; validate the single-shard
                // shape (the only one uploads produce) and skip otherwise.
                let expected = (!cfg.transfer.skip_hash_validation && shards.len() == 1)
                    .then(|| shards[0].hash.clone());
                (self.chained_shard_body(cancel, shards), 0u64, expected)
            }
            Some(spec) => {
                let (start, end) = parse_range(spec)?;
                let aligned = start - start % BLOCK_SIZE as u64;
                advance_iv(&mut iv, aligned / BLOCK_SIZE as u64);

                let header = match end {
                    Some(end) => format!("bytes={aligned}-{end}"),
                    None => format!("bytes={aligned}-"),
                };
                let body = self
                    .ranged_shard_body(cancel, &shards[0], &header)
                    .await?;
                (body, start - aligned, None)
            }
        };

        let hasher = SharedHasher::new();
        let inner = CipherReader::decrypt(HashReader::new(body, hasher.clone()), &key, &iv);
        let mut stream = DownloadStream {
            inner,
            hasher,
            expected_hash,
            checked: false,
        };

        if skip > 0 {
            let mut sink = tokio::io::sink();
            let discarded = tokio::io::copy(&mut (&mut stream).take(skip), &mut sink)
                .await
                .map_err(|e| Error::Other(anyhow::anyhow!("failed to discard offset bytes: {e}")))?;
            if discarded < skip {
                return Err(Error::Other(anyhow::anyhow!(
                    "failed to discard offset bytes: got {discarded} of {skip}"
                )));
            }
        }

        Ok(stream)
    }

    /// One lazily-issued GET per shard, flattened into a single byte
    /// stream. Requests are only sent as the reader reaches each shard.
    fn chained_shard_body(&self, cancel: &CancellationToken, shards: Vec<ShardInfo>) -> BoxedBody {
        let http = self.http().clone();
        let cancel = cancel.clone();

        let stream = futures::stream::try_unfold(
            (http, cancel, shards.into_iter()),
            |(http, cancel, mut shards)| async move {
                let Some(shard) = shards.next() else {
                    return Ok(None);
                };
                if cancel.is_cancelled() {
                    return Err(io::Error::other(Error::Cancelled));
                }

                let resp = http
                    .get(&shard.url)
                    .send()
                    .await
                    .map_err(|e| io::Error::other(format!("failed to execute download stream request: {e}")))?;
                if !resp.status().is_success() {
                    let status = resp.status().as_u16();
                    return Err(io::Error::other(format!(
                        "shard download failed: status {status}"
                    )));
                }

                let bytes = resp.bytes_stream().map_err(io::Error::other);
                Ok(Some((bytes, (http, cancel, shards))))
            },
        )
        .try_flatten();

        Box::new(StreamReader::new(Box::pin(stream)))
    }

    async fn ranged_shard_body(
        &self,
        cancel: &CancellationToken,
        shard: &ShardInfo,
        range_header: &str,
    ) -> Result<BoxedBody> {
        let resp = run_cancellable(cancel, async {
            Ok(self
                .http()
                .get(&shard.url)
                .header(RANGE, range_header)
                .send()
                .await?)
        })
        .await?;

        if !resp.status().is_success() {
            return Err(Error::Http(
                HttpError::from_response("shard download", resp).await,
            ));
        }

        let stream = resp.bytes_stream().map_err(io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }
}

/// Streaming decrypted download.
///
/// For full downloads the ciphertext hash is checked once the underlying
/// stream is exhausted; a mismatch surfaces as the final read error, so a
/// consumer that reads to EOF cannot miss it.
pub struct DownloadStream {
    inner: CipherReader<HashReader<BoxedBody>>,
    hasher: SharedHasher,
    expected_hash: Option<String>,
    checked: bool,
}

impl std::fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStream")
            .field("expected_hash", &self.expected_hash)
            .field("checked", &self.checked)
            .finish()
    }
}

impl AsyncRead for DownloadStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        ready!(Pin::new(&mut self.inner).poll_read(cx, buf))?;

        if buf.filled().len() == before && !self.checked {
            self.checked = true;
            if let Some(expected) = self.expected_hash.take() {
                let actual = compute_file_hash(&self.hasher.digest());
                if actual != expected {
                    return Poll::Ready(Err(io::Error::other(Error::HashMismatch {
                        expected,
                        actual,
                    })));
                }
            }
        }
        Poll::Ready(Ok(()))
    }
}

/// Parse `bytes=start[-end]`. Multi-range, negative or malformed specs are
/// rejected.
fn parse_range(header: &str) -> Result<(u64, Option<u64>)> {
    let invalid = || Error::InvalidRange(header.to_string());

    let rest = header.strip_prefix("bytes=").ok_or_else(invalid)?;
    if rest.contains(',') {
        return Err(invalid());
    }
    let (start, end) = rest.split_once('-').ok_or_else(invalid)?;
    if start.is_empty() {
        return Err(invalid());
    }
    let start: u64 = start.parse().map_err(|_| invalid())?;
    let end = if end.is_empty() {
        None
    } else {
        let end: u64 = end.parse().map_err(|_| invalid())?;
        if end < start {
            return Err(invalid());
        }
        Some(end)
    };
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_with_end() {
        assert_eq!(parse_range("bytes=100-199").unwrap(), (100, Some(199)));
        assert_eq!(parse_range("bytes=0-99").unwrap(), (0, Some(99)));
    }

    #[test]
    fn range_open_ended() {
        assert_eq!(parse_range("bytes=100-").unwrap(), (100, None));
    }

    #[test]
    fn rejects_malformed() {
        for spec in [
            "100-199",
            "bytes=100",
            "bytes=0-99,200-299",
            "bytes=-200",
            "bytes=abc-199",
            "bytes=100-abc",
            "bytes=50-10",
        ] {
            assert!(
                matches!(parse_range(spec), Err(Error::InvalidRange(_))),
                "spec {spec:?} should be rejected"
            );
        }
    }
}
