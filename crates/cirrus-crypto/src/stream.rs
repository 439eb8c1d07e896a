//! AES-256-CTR stream readers and the ciphertext hash tee.
//!
//! A cipher instance is a sequential keystream position: readers built on it
//! are not restartable and must be consumed in order. One upload session
//! owns one cipher; driving it from more than one task would corrupt the
//! counter ordering.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};

use ctr::cipher::KeyIvInit;
pub use ctr::cipher::StreamCipher;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, ReadBuf};

use crate::kdf::FileKey;
use crate::IV_SIZE;

pub type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Build a CTR cipher positioned at the start of the keystream.
pub fn new_cipher(key: &FileKey, iv: &[u8; IV_SIZE]) -> Aes256Ctr {
    Aes256Ctr::new(key.as_bytes().into(), iv.into())
}

/// Advance a CTR IV by `blocks`, treating the full 16 bytes as a big-endian
/// counter. Adding 1 to a trailing `0xFF` carries into the preceding byte.
pub fn advance_iv(iv: &mut [u8; IV_SIZE], blocks: u64) {
    let mut carry = blocks;
    for i in (0..IV_SIZE).rev() {
        if carry == 0 {
            break;
        }
        let sum = iv[i] as u64 + (carry & 0xff);
        iv[i] = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }
}

/// Applies the CTR keystream to every byte read from the source.
///
/// CTR encryption and decryption are the same operation; the two
/// constructors exist to keep call sites readable.
pub struct CipherReader<R> {
    inner: R,
    cipher: Aes256Ctr,
}

impl<R: AsyncRead + Unpin> CipherReader<R> {
    pub fn encrypt(inner: R, key: &FileKey, iv: &[u8; IV_SIZE]) -> Self {
        Self {
            inner,
            cipher: new_cipher(key, iv),
        }
    }

    pub fn decrypt(inner: R, key: &FileKey, iv: &[u8; IV_SIZE]) -> Self {
        Self::encrypt(inner, key, iv)
    }

    /// Continue an existing keystream over a new source. Used when one
    /// logical ciphertext spans several transport streams.
    pub fn with_cipher(inner: R, cipher: Aes256Ctr) -> Self {
        Self { inner, cipher }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CipherReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = &mut *self;
        let before = buf.filled().len();
        ready!(Pin::new(&mut me.inner).poll_read(cx, buf))?;
        let filled = buf.filled_mut();
        me.cipher.apply_keystream(&mut filled[before..]);
        Poll::Ready(Ok(()))
    }
}

/// A SHA-256 state that outlives the reader feeding it.
///
/// The HTTP client consumes the body reader by value, so the hash state is
/// shared: the uploader keeps one handle and reads the digest after the
/// transfer completes.
#[derive(Clone)]
pub struct SharedHasher {
    inner: Arc<Mutex<Sha256>>,
}

impl SharedHasher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Sha256::new())),
        }
    }

    pub fn update(&self, data: &[u8]) {
        self.inner.lock().expect("hasher lock poisoned").update(data);
    }

    /// Digest of everything fed so far. The state is left untouched.
    pub fn digest(&self) -> [u8; 32] {
        self.inner
            .lock()
            .expect("hasher lock poisoned")
            .clone()
            .finalize()
            .into()
    }
}

impl Default for SharedHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Tee: every byte read from the source also feeds the shared hasher,
/// without buffering.
pub struct HashReader<R> {
    inner: R,
    hasher: SharedHasher,
}

impl<R: AsyncRead + Unpin> HashReader<R> {
    pub fn new(inner: R, hasher: SharedHasher) -> Self {
        Self { inner, hasher }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = &mut *self;
        let before = buf.filled().len();
        ready!(Pin::new(&mut me.inner).poll_read(cx, buf))?;
        me.hasher.update(&buf.filled()[before..]);
        Poll::Ready(Ok(()))
    }
}
