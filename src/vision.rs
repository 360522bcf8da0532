//! Cloud Vision label detection over the `images:annotate` REST endpoint.
//!
//! The image bytes we just received from the client are submitted directly,
//! base64-encoded in the request body; there is no URL round trip.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use gcp_auth::TokenProvider;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const VISION_API_BASE: &str = "https://vision.googleapis.com/";
const VISION_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

#[async_trait]
pub trait LabelDetector: Send + Sync {
    /// Detect labels in the image, most confident first.
    async fn detect_labels(&self, bytes: &[u8]) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct VisionClient {
    http: Client,
    base_url: Url,
    auth: Arc<dyn TokenProvider>,
}

impl fmt::Debug for VisionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl VisionClient {
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        let base_url = Url::parse(VISION_API_BASE).expect("valid default Vision URL");
        Self::with_base_url(auth, base_url)
    }

    pub fn with_base_url(auth: Arc<dyn TokenProvider>, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("postpilot/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            auth,
        }
    }
}

#[async_trait]
impl LabelDetector for VisionClient {
    async fn detect_labels(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let url = self
            .base_url
            .join("v1/images:annotate")
            .context("invalid Vision base URL")?;
        let token = self
            .auth
            .token(&[VISION_SCOPE])
            .await
            .context("failed to obtain Vision access token")?;
        debug!(%url, size = bytes.len(), "vision annotate");
        let res = self
            .http
            .post(url)
            .bearer_auth(token.as_str())
            .json(&annotate_request(bytes))
            .send()
            .await
            .context("failed to reach Vision")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("vision error {}: {}", status, body));
        }
        let body: Value = res.json().await.context("invalid Vision response JSON")?;
        parse_labels(&body)
    }
}

pub fn annotate_request(bytes: &[u8]) -> Value {
    json!({
        "requests": [
            {
                "image": { "content": STANDARD.encode(bytes) },
                "features": [ { "type": "LABEL_DETECTION" } ]
            }
        ]
    })
}

/// Extract label descriptions from an annotate response. An `error` object
/// inside the per-image response is a failure even on HTTP 200.
pub fn parse_labels(body: &Value) -> Result<Vec<String>> {
    let response = &body["responses"][0];
    if let Some(message) = response["error"]["message"].as_str() {
        return Err(anyhow!("label detection error: {message}"));
    }
    Ok(response["labelAnnotations"]
        .as_array()
        .map(|annotations| {
            annotations
                .iter()
                .filter_map(|a| a["description"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotate_request_encodes_bytes() {
        let body = annotate_request(b"fakeimage");
        let request = &body["requests"][0];
        assert_eq!(
            request["image"]["content"].as_str().unwrap(),
            STANDARD.encode(b"fakeimage")
        );
        assert_eq!(request["features"][0]["type"], "LABEL_DETECTION");
    }

    #[test]
    fn parse_labels_collects_descriptions() {
        let body = json!({
            "responses": [
                {
                    "labelAnnotations": [
                        { "description": "Dog", "score": 0.98 },
                        { "description": "Park", "score": 0.75 }
                    ]
                }
            ]
        });
        assert_eq!(parse_labels(&body).unwrap(), vec!["Dog", "Park"]);
    }

    #[test]
    fn parse_labels_propagates_embedded_error() {
        let body = json!({
            "responses": [ { "error": { "message": "quota exceeded" } } ]
        });
        let err = parse_labels(&body).unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn parse_labels_empty_when_no_annotations() {
        let body = json!({ "responses": [ {} ] });
        assert!(parse_labels(&body).unwrap().is_empty());
    }
}
