//! Google Cloud Storage client: media upload and prefix listing.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const STORAGE_API_BASE: &str = "https://storage.googleapis.com/";
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Object storage operations: store raw bytes under a session-scoped object
/// name and list the public URLs under a session prefix.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Upload the bytes and return the object's public URL.
    async fn store(&self, object: &str, content_type: &str, bytes: Vec<u8>) -> Result<String>;
    /// Public URLs of every object whose name starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct GcsClient {
    http: Client,
    base_url: Url,
    auth: Arc<dyn TokenProvider>,
    bucket: String,
}

impl fmt::Debug for GcsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsClient")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectItem>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

impl GcsClient {
    pub fn new(auth: Arc<dyn TokenProvider>, bucket: String) -> Self {
        let base_url = Url::parse(STORAGE_API_BASE).expect("valid default Storage URL");
        Self::with_base_url(auth, bucket, base_url)
    }

    pub fn with_base_url(auth: Arc<dyn TokenProvider>, bucket: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("postpilot/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            auth,
            bucket,
        }
    }

    async fn token(&self) -> Result<String> {
        let token = self
            .auth
            .token(&[STORAGE_SCOPE])
            .await
            .context("failed to obtain Storage access token")?;
        Ok(token.as_str().to_string())
    }
}

#[async_trait]
impl MediaStore for GcsClient {
    async fn store(&self, object: &str, content_type: &str, bytes: Vec<u8>) -> Result<String> {
        let mut url = self
            .base_url
            .join(&format!("upload/storage/v1/b/{}/o", self.bucket))
            .context("invalid Storage base URL")?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object);
        debug!(%url, object, "storage upload");
        let res = self
            .http
            .post(url)
            .bearer_auth(self.token().await?)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .context("failed to reach Storage")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("storage upload error {}: {}", status, body));
        }
        Ok(public_url(&self.bucket, object))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut url = self
            .base_url
            .join(&format!("storage/v1/b/{}/o", self.bucket))
            .context("invalid Storage base URL")?;
        url.query_pairs_mut().append_pair("prefix", prefix);
        debug!(%url, prefix, "storage list");
        let res = self
            .http
            .get(url)
            .bearer_auth(self.token().await?)
            .send()
            .await
            .context("failed to reach Storage")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("storage list error {}: {}", status, body));
        }
        let listing: ListResponse = res.json().await.context("invalid Storage listing")?;
        Ok(listing
            .items
            .into_iter()
            .map(|item| public_url(&self.bucket, &item.name))
            .collect())
    }
}

/// Object name for a session upload, preserving the original filename.
pub fn object_path(session: &str, filename: &str) -> String {
    format!("{session}/{filename}")
}

/// Public URL convention for a bucket object.
pub fn public_url(bucket: &str, object: &str) -> String {
    format!("https://storage.googleapis.com/{bucket}/{object}")
}

/// Content type derived from the file extension; octet-stream otherwise.
pub fn content_type_for(filename: &str) -> &'static str {
    match std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_ascii_lowercase())
    {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "gif" => "image/gif",
        Some(ext) if ext == "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_is_session_scoped() {
        assert_eq!(object_path("conv-1", "photo.jpg"), "conv-1/photo.jpg");
    }

    #[test]
    fn public_url_follows_bucket_convention() {
        assert_eq!(
            public_url("imagesbucket", "conv-1/photo.jpg"),
            "https://storage.googleapis.com/imagesbucket/conv-1/photo.jpg"
        );
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type_for("a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("a.webp"), "image/webp");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
