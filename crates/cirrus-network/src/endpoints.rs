//! URL assembly for both tiers over a single base URL.

/// Typed endpoint builder. `/network/*` serves blobs, `/drive/*` metadata.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    // Network tier

    pub fn start_upload(&self, bucket_id: &str) -> String {
        format!("{}/network/v2/buckets/{bucket_id}/files/start", self.base)
    }

    pub fn finish_upload(&self, bucket_id: &str) -> String {
        format!("{}/network/v2/buckets/{bucket_id}/files/finish", self.base)
    }

    pub fn file_info(&self, bucket_id: &str, file_id: &str) -> String {
        format!(
            "{}/network/buckets/{bucket_id}/files/{file_id}/info",
            self.base
        )
    }

    // Drive tier

    pub fn create_file(&self) -> String {
        format!("{}/drive/files", self.base)
    }

    pub fn file(&self, uuid: &str) -> String {
        format!("{}/drive/files/{uuid}", self.base)
    }

    pub fn file_meta(&self, uuid: &str) -> String {
        format!("{}/drive/files/{uuid}/meta", self.base)
    }

    pub fn thumbnail(&self) -> String {
        format!("{}/drive/files/thumbnail", self.base)
    }

    pub fn folders(&self) -> String {
        format!("{}/drive/folders", self.base)
    }

    pub fn folder(&self, uuid: &str) -> String {
        format!("{}/drive/folders/{uuid}", self.base)
    }

    pub fn folder_content_folders(&self, parent_uuid: &str) -> String {
        format!("{}/drive/folders/content/{parent_uuid}/folders", self.base)
    }

    pub fn folder_content_files(&self, parent_uuid: &str) -> String {
        format!("{}/drive/folders/content/{parent_uuid}/files", self.base)
    }

    pub fn files_existence(&self, parent_uuid: &str) -> String {
        format!(
            "{}/drive/folders/content/{parent_uuid}/files/existence",
            self.base
        )
    }

    pub fn usage(&self) -> String {
        format!("{}/drive/users/usage", self.base)
    }

    pub fn limit(&self) -> String {
        format!("{}/drive/users/limit", self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_trimmed() {
        let e = Endpoints::new("https://gateway.example.com/");
        assert_eq!(
            e.start_upload("b1"),
            "https://gateway.example.com/network/v2/buckets/b1/files/start"
        );
    }

    #[test]
    fn network_paths() {
        let e = Endpoints::new("https://gw");
        assert_eq!(
            e.finish_upload("b1"),
            "https://gw/network/v2/buckets/b1/files/finish"
        );
        assert_eq!(
            e.file_info("b1", "f1"),
            "https://gw/network/buckets/b1/files/f1/info"
        );
    }

    #[test]
    fn drive_paths() {
        let e = Endpoints::new("https://gw");
        assert_eq!(e.create_file(), "https://gw/drive/files");
        assert_eq!(e.file_meta("u1"), "https://gw/drive/files/u1/meta");
        assert_eq!(
            e.files_existence("p1"),
            "https://gw/drive/folders/content/p1/files/existence"
        );
        assert_eq!(e.usage(), "https://gw/drive/users/usage");
    }
}
