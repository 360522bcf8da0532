//! WordPress publishing over the `wp/v2` REST API.
//!
//! Credentials arrive per request; nothing is stored. Success is exactly
//! HTTP 201 from the posts endpoint.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BlogCredentials {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

#[async_trait]
pub trait BlogPublisher: Send + Sync {
    /// Publish a post; Ok only when the blog confirms creation.
    async fn publish(&self, creds: &BlogCredentials, title: &str, content: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct WordpressClient {
    http: Client,
}

impl WordpressClient {
    pub fn new() -> Self {
        let http = Client::builder()
            .user_agent("postpilot/0.1")
            .build()
            .expect("reqwest client");
        Self { http }
    }
}

impl Default for WordpressClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlogPublisher for WordpressClient {
    async fn publish(&self, creds: &BlogCredentials, title: &str, content: &str) -> Result<()> {
        let url = posts_endpoint(&creds.base_url);
        debug!(%url, title, "wordpress publish");
        let res = self
            .http
            .post(&url)
            .basic_auth(&creds.username, Some(&creds.password))
            .header("Accept", "application/json")
            .json(&post_payload(title, content))
            .send()
            .await
            .context("failed to reach WordPress")?;
        let status = res.status();
        if !is_publish_success(status) {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("wordpress error {}: {}", status, body));
        }
        Ok(())
    }
}

pub fn posts_endpoint(base_url: &str) -> String {
    format!("{}/wp-json/wp/v2/posts", base_url.trim_end_matches('/'))
}

pub fn post_payload(title: &str, content: &str) -> Value {
    json!({
        "status": "publish",
        "title": title,
        "content": content,
    })
}

/// Only a 201 Created counts as published.
pub fn is_publish_success(status: StatusCode) -> bool {
    status == StatusCode::CREATED
}

/// HTML fragment embedding up to four images, prepended to the post body by
/// the publish flow.
pub fn image_gallery_html(image_urls: &[String]) -> String {
    image_urls
        .iter()
        .take(4)
        .enumerate()
        .map(|(i, url)| format!("<p><img src=\"{}\" alt=\"Image {}\" /></p>\n", url, i + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_handles_trailing_slash() {
        assert_eq!(
            posts_endpoint("https://blog.example.com/"),
            "https://blog.example.com/wp-json/wp/v2/posts"
        );
        assert_eq!(
            posts_endpoint("https://blog.example.com"),
            "https://blog.example.com/wp-json/wp/v2/posts"
        );
    }

    #[test]
    fn payload_publishes_immediately() {
        let payload = post_payload("Title", "<p>Body</p>");
        assert_eq!(payload["status"], "publish");
        assert_eq!(payload["title"], "Title");
        assert_eq!(payload["content"], "<p>Body</p>");
    }

    #[test]
    fn gallery_caps_at_four_images() {
        let urls: Vec<String> = (1..=6).map(|i| format!("https://cdn/{i}.jpg")).collect();
        let html = image_gallery_html(&urls);
        assert_eq!(html.matches("<img").count(), 4);
        assert!(html.contains("alt=\"Image 1\""));
        assert!(html.contains("https://cdn/4.jpg"));
        assert!(!html.contains("https://cdn/5.jpg"));
    }

    #[test]
    fn only_201_is_success() {
        assert!(is_publish_success(StatusCode::CREATED));
        assert!(!is_publish_success(StatusCode::OK));
        assert!(!is_publish_success(StatusCode::UNAUTHORIZED));
        assert!(!is_publish_success(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
