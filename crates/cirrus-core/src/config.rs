use serde::{Deserialize, Serialize};

/// Encryption scheme tag recorded on every file's metadata.
pub const ENCRYPT_VERSION: &str = "03-aes";

/// Top-level client configuration (loaded from cirrus.toml).
///
/// Credentials (`token`, `basic_auth`, `mnemonic`) come from the login flow,
/// which is outside this library; they are carried here verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL for both tiers; `/drive/*` and `/network/*` hang off it.
    pub base_url: String,
    /// Value of the `internxt-client` header on every request.
    pub client_tag: String,
    /// Bearer token for the Drive (metadata) tier.
    pub token: String,
    /// Pre-computed `Basic …` header for the Network (blob) tier.
    pub basic_auth: String,
    /// User-held mnemonic; feeds key derivation only, never transmitted.
    pub mnemonic: String,
    /// Hex-encoded content bucket id.
    pub bucket: String,
    /// UUID of the account's root folder.
    pub root_folder_uuid: String,
    pub transfer: TransferConfig,
    pub consistency: ConsistencyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Multipart chunk size in bytes (default: 30 MiB)
    pub chunk_size: u64,
    /// Uploads at or above this size go multipart (default: 100 MiB)
    pub multipart_min_size: u64,
    /// Concurrent chunk PUTs per multipart upload (default: 6)
    pub max_concurrency: usize,
    /// Largest image that gets a thumbnail capture (default: 16 MiB)
    pub max_thumbnail_source_size: u64,
    /// Cap on buffering streams of unknown length (default: 1 GiB)
    pub max_unknown_size_buffer: u64,
    /// Skip the end-of-stream hash compare on full downloads
    pub skip_hash_validation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// How long a freshly created folder may be invisible to lookups, in
    /// milliseconds (default: 500)
    pub window_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://gateway.internxt.com".into(),
            client_tag: "cirrus".into(),
            token: String::new(),
            basic_auth: String::new(),
            mnemonic: String::new(),
            bucket: String::new(),
            root_folder_uuid: String::new(),
            transfer: TransferConfig::default(),
            consistency: ConsistencyConfig::default(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 30 * 1024 * 1024,
            multipart_min_size: 100 * 1024 * 1024,
            max_concurrency: 6,
            max_thumbnail_source_size: 16 * 1024 * 1024,
            max_unknown_size_buffer: 1024 * 1024 * 1024,
            skip_hash_validation: false,
        }
    }
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self { window_ms: 500 }
    }
}

impl Config {
    pub fn consistency_window(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.consistency.window_ms)
    }
}
