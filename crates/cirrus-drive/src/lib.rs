//! cirrus-drive: the metadata tier.
//!
//! File records, folder tree and usage live here; the encrypted bytes live
//! on the Network tier (`cirrus-network`). The consistency gate smooths over
//! the window where a freshly created folder is not yet visible to lookups.

pub mod consistency;
pub mod folders;
pub mod meta;
pub mod users;

pub use consistency::ConsistencyTracker;
pub use folders::{Folder, ListOptions};
pub use meta::{
    CreateMetaRequest, CreateThumbnailRequest, ExistenceCheck, ExistenceQuery, MetaFile,
};

use cirrus_network::Endpoints;

/// Authenticated client for the Drive (metadata) tier.
#[derive(Debug, Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    token: String,
    consistency: ConsistencyTracker,
}

impl DriveClient {
    pub fn new(
        http: reqwest::Client,
        endpoints: Endpoints,
        token: String,
        consistency: ConsistencyTracker,
    ) -> Self {
        Self {
            http,
            endpoints,
            token,
            consistency,
        }
    }

    pub fn consistency(&self) -> &ConsistencyTracker {
        &self.consistency
    }

    pub(crate) fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", self.token))
    }
}
