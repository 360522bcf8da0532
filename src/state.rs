//! Shared application state handed to every handler.
use reqwest::{Client, Url};
use std::sync::Arc;

use crate::firestore::ProfileStore;
use crate::gcs::MediaStore;
use crate::openai::Completions;
use crate::vision::LabelDetector;
use crate::wordpress::BlogPublisher;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProfileStore>,
    pub media: Arc<dyn MediaStore>,
    pub labeler: Arc<dyn LabelDetector>,
    pub llm: Arc<dyn Completions>,
    pub publisher: Arc<dyn BlogPublisher>,
    /// Plain client for scrape-target fetches and the geolocation lookup.
    pub http: Client,
    pub geo_base: Url,
    pub upload_daily_limit: u32,
}
