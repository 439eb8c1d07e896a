//! cirrus-network: the blob-tier HTTP protocol.
//!
//! Three authenticated calls (start-upload, finish-upload, bucket-file-info)
//! plus the unauthenticated presigned-URL PUT. The Drive metadata tier lives
//! in `cirrus-drive`.

pub mod client;
pub mod endpoints;
pub mod protocol;
pub mod transfer;

pub use client::{build_client, compute_basic_auth, DRIVE_VERSION, NETWORK_VERSION};
pub use endpoints::Endpoints;
pub use protocol::{
    BucketFileInfo, CompletedPart, FinishUploadResponse, MultipartShard, NetworkClient, Shard,
    ShardInfo, StartUploadResponse, UploadPartSpec, UploadSlot,
};
pub use transfer::{transfer, TransferResult};
