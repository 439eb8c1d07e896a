//! cirrus-crypto: client-side envelope encryption for Cirrus Drive
//!
//! Pipeline: plaintext → AES-256-CTR encrypt → SHA-256 tee → upload;
//! the stored blob's identity is `RIPEMD-160(SHA-256(ciphertext))`.
//!
//! Key hierarchy (bit-identical to the web client — this is the interop
//! contract):
//! ```text
//! Mnemonic (user-held phrase)
//!   └── Seed: PBKDF2-HMAC-SHA512(mnemonic, "mnemonic", 2048) → 64 bytes
//!         └── Bucket key: SHA-512(seed ‖ bucket_id)
//!               └── File key: SHA-512(bucket_key[..32] ‖ index)[..32]
//!                   IV: index[..16]   (index = 32 random bytes per upload)
//! ```

pub mod kdf;
pub mod stream;

pub use kdf::{
    compute_file_hash, deterministic_key, generate_bucket_key, generate_file_key, generate_index,
    mnemonic_to_seed, FileKey,
};
pub use stream::{
    advance_iv, new_cipher, Aes256Ctr, CipherReader, HashReader, SharedHasher, StreamCipher,
};

/// Size of a file key in bytes (AES-256)
pub const FILE_KEY_SIZE: usize = 32;

/// Size of a CTR initial counter block
pub const IV_SIZE: usize = 16;

/// Size of the per-upload random index in bytes
pub const INDEX_SIZE: usize = 32;

/// AES block size; range requests align down to this
pub const BLOCK_SIZE: usize = 16;
