//! Deterministic key derivation: mnemonic → seed → bucket key → file key.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use ripemd::Ripemd160;
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use cirrus_core::error::{Error, Result};

use crate::{FILE_KEY_SIZE, INDEX_SIZE, IV_SIZE};

const SEED_SALT: &[u8] = b"mnemonic";
const SEED_ROUNDS: u32 = 2048;

/// A derived 256-bit file encryption key.
///
/// Zeroized on drop so key material does not linger in memory.
#[derive(Clone)]
pub struct FileKey {
    bytes: [u8; FILE_KEY_SIZE],
}

impl FileKey {
    pub fn from_bytes(bytes: [u8; FILE_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; FILE_KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Stretch a mnemonic phrase into a 64-byte seed.
///
/// Any byte string is accepted as entropy; there is deliberately no
/// wordlist validation, matching the web client.
pub fn mnemonic_to_seed(mnemonic: &str) -> [u8; 64] {
    let mut seed = [0u8; 64];
    pbkdf2_hmac::<Sha512>(mnemonic.as_bytes(), SEED_SALT, SEED_ROUNDS, &mut seed);
    seed
}

/// One link of the deterministic key chain: `SHA-512(key ‖ data)`.
pub fn deterministic_key(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    hasher.update(key);
    hasher.update(data);
    hasher.finalize().into()
}

/// Derive the 64-byte bucket-scoped key from the mnemonic.
pub fn generate_bucket_key(mnemonic: &str, bucket_id_hex: &str) -> Result<[u8; 64]> {
    let bucket = hex::decode(bucket_id_hex).map_err(|source| Error::InvalidHex {
        field: "bucket id",
        source,
    })?;
    let mut seed = mnemonic_to_seed(mnemonic);
    let key = deterministic_key(&seed, &bucket);
    seed.zeroize();
    Ok(key)
}

/// Derive the per-file `(key, iv)` pair from `(mnemonic, bucket, index)`.
///
/// The IV is the first 16 bytes of the decoded index, so the same index
/// always reproduces the same keystream.
pub fn generate_file_key(
    mnemonic: &str,
    bucket_id_hex: &str,
    index_hex: &str,
) -> Result<(FileKey, [u8; IV_SIZE])> {
    let mut bucket_key = generate_bucket_key(mnemonic, bucket_id_hex)?;
    let index = hex::decode(index_hex).map_err(|source| Error::InvalidHex {
        field: "file index",
        source,
    })?;
    if index.len() < IV_SIZE {
        bucket_key.zeroize();
        return Err(Error::IndexTooShort(index.len()));
    }

    let mut derived = deterministic_key(&bucket_key[..FILE_KEY_SIZE], &index);
    bucket_key.zeroize();

    let mut key = [0u8; FILE_KEY_SIZE];
    key.copy_from_slice(&derived[..FILE_KEY_SIZE]);
    derived.zeroize();

    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&index[..IV_SIZE]);

    Ok((FileKey::from_bytes(key), iv))
}

/// Generate a fresh random 32-byte index, hex-encoded.
pub fn generate_index() -> String {
    let mut bytes = [0u8; INDEX_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hex-encode `RIPEMD-160(sha256_digest)` — the on-server identity of a
/// stored blob, computed over its full ciphertext SHA-256.
pub fn compute_file_hash(sha256_digest: &[u8]) -> String {
    hex::encode(Ripemd160::digest(sha256_digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Sha256;

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const TEST_BUCKET_ID: [u8; 10] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x00, 0x00];
    const TEST_INDEX: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn bucket_key_vector() {
        let want = "726a02ad035960f8b6563497557bb8efe15cdb160ffb40541102c92c89262a00";
        let key = generate_bucket_key(TEST_MNEMONIC, &hex::encode(TEST_BUCKET_ID)).unwrap();
        assert_eq!(hex::encode(&key[..32]), want);
    }

    #[test]
    fn deterministic_key_vector() {
        let want = "8eed4cfe5cb8fa1287356b520bb956085aa1926c825289c7d27e989aa74e7a3c9d18ad1308c5eff69e6ff8dc9059cd84afdd665c462ed6f0d6dbf7540a265ccf";
        let got = deterministic_key(&TEST_BUCKET_ID, &TEST_BUCKET_ID);
        assert_eq!(hex::encode(got), want);
    }

    #[test]
    fn file_hash_vector() {
        let want = "30899ccba67493659474c5397a3e860cd45a670c";
        let digest = Sha256::digest(TEST_BUCKET_ID);
        assert_eq!(compute_file_hash(&digest), want);
    }

    #[test]
    fn file_key_vector() {
        let want_key = "ef63ac48f62ae59854f3312576beaee13488fda04897f3da372581686395d662";
        let want_iv = &TEST_INDEX[..32];

        let (key, iv) =
            generate_file_key(TEST_MNEMONIC, &hex::encode(TEST_BUCKET_ID), TEST_INDEX).unwrap();
        assert_eq!(hex::encode(key.as_bytes()), want_key);
        assert_eq!(hex::encode(iv), want_iv);
    }

    #[test]
    fn derivation_is_deterministic() {
        let bucket = hex::encode(TEST_BUCKET_ID);
        let (k1, iv1) = generate_file_key(TEST_MNEMONIC, &bucket, TEST_INDEX).unwrap();
        let (k2, iv2) = generate_file_key(TEST_MNEMONIC, &bucket, TEST_INDEX).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
        assert_eq!(iv1, iv2);
    }

    #[test]
    fn any_mnemonic_accepted() {
        // no wordlist validation: arbitrary strings are valid entropy
        let (key, _) =
            generate_file_key("not a real wordlist", &hex::encode(TEST_BUCKET_ID), TEST_INDEX)
                .unwrap();
        let (other, _) =
            generate_file_key(TEST_MNEMONIC, &hex::encode(TEST_BUCKET_ID), TEST_INDEX).unwrap();
        assert_ne!(key.as_bytes(), other.as_bytes());
    }

    #[test]
    fn invalid_bucket_hex() {
        let err = generate_file_key(TEST_MNEMONIC, "invalid-hex", TEST_INDEX).unwrap_err();
        assert!(matches!(
            err,
            cirrus_core::Error::InvalidHex { field: "bucket id", .. }
        ));
    }

    #[test]
    fn invalid_index_hex() {
        let err = generate_file_key(TEST_MNEMONIC, &hex::encode(TEST_BUCKET_ID), "zzzz")
            .unwrap_err();
        assert!(matches!(
            err,
            cirrus_core::Error::InvalidHex { field: "file index", .. }
        ));
    }

    #[test]
    fn short_index_rejected() {
        let err =
            generate_file_key(TEST_MNEMONIC, &hex::encode(TEST_BUCKET_ID), "00ff").unwrap_err();
        assert!(matches!(err, cirrus_core::Error::IndexTooShort(2)));
    }

    #[test]
    fn generated_index_shape() {
        let a = generate_index();
        let b = generate_index();
        assert_eq!(a.len(), 64);
        assert!(hex::decode(&a).is_ok());
        assert_ne!(a, b);
    }
}
