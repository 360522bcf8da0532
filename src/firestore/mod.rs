//! Firestore REST client and the profile-store trait behind the handlers.
//!
//! All per-session records live under the `users` collection: the profile
//! document itself, plus `labels`, `post_data` and `website-metadata`
//! sub-collections. Request bodies are built by pure functions so the wire
//! shapes stay unit-testable without a network.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::model::{
    LabelBatch, LabelEntry, PostDraft, SubscriptionStatus, SubscriptionTier, UserRecord,
    WebsiteMetadata,
};

pub mod value;

const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/";
const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// Storage operations the handlers need; implemented by [`FirestoreClient`]
/// and by recording fakes in tests.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Create-or-replace the user record.
    async fn put_user(&self, session: &str, user: &UserRecord) -> Result<()>;
    async fn get_user(&self, session: &str) -> Result<Option<UserRecord>>;
    /// Merge-patch of the business description only.
    async fn set_business_info(&self, session: &str, business_info: &str) -> Result<()>;
    /// Merge-patch of the free-form schedule field plus an update timestamp.
    async fn set_schedule(&self, session: &str, schedule: &str) -> Result<()>;
    async fn get_labels(&self, session: &str) -> Result<Option<LabelBatch>>;
    async fn put_labels(&self, session: &str, batch: &LabelBatch) -> Result<()>;
    /// Record one upload against the session's daily quota. With `reset` the
    /// counter restarts at 1 for `date`; otherwise it is incremented through
    /// the store's field-transform primitive.
    async fn record_upload(&self, session: &str, date: &str, reset: bool) -> Result<()>;
    async fn get_draft(&self, session: &str) -> Result<Option<PostDraft>>;
    async fn put_draft(&self, session: &str, draft: &PostDraft) -> Result<()>;
    /// Persist one fresh website-metadata sub-record.
    async fn add_site_metadata(&self, session: &str, meta: &WebsiteMetadata) -> Result<()>;
}

#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    base_url: Url,
    auth: Arc<dyn TokenProvider>,
    project: String,
}

impl fmt::Debug for FirestoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirestoreClient")
            .field("base_url", &self.base_url)
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

impl FirestoreClient {
    pub fn new(auth: Arc<dyn TokenProvider>, project: String) -> Self {
        let base_url = Url::parse(FIRESTORE_API_BASE).expect("valid default Firestore URL");
        Self::with_base_url(auth, project, base_url)
    }

    pub fn with_base_url(auth: Arc<dyn TokenProvider>, project: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("postpilot/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            auth,
            project,
        }
    }

    /// Full resource name of a document, as required by commit writes.
    fn doc_name(&self, path: &str) -> String {
        format!(
            "projects/{}/databases/(default)/documents/{}",
            self.project, path
        )
    }

    fn doc_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("v1/{}", self.doc_name(path)))
            .context("invalid Firestore base URL")
    }

    async fn token(&self) -> Result<String> {
        let token = self
            .auth
            .token(&[FIRESTORE_SCOPE])
            .await
            .context("failed to obtain Firestore access token")?;
        Ok(token.as_str().to_string())
    }

    async fn get_doc(&self, path: &str) -> Result<Option<Value>> {
        let url = self.doc_url(path)?;
        debug!(%url, "firestore get");
        let res = self
            .http
            .get(url)
            .bearer_auth(self.token().await?)
            .send()
            .await
            .context("failed to reach Firestore")?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("firestore error {}: {}", status, body));
        }
        Ok(Some(res.json().await.context("invalid Firestore document")?))
    }

    /// PATCH without an update mask replaces the whole document (creating it
    /// when absent).
    async fn set_doc(&self, path: &str, fields: Value) -> Result<()> {
        let url = self.doc_url(path)?;
        debug!(%url, "firestore set");
        let res = self
            .http
            .patch(url)
            .bearer_auth(self.token().await?)
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .context("failed to reach Firestore")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("firestore error {}: {}", status, body));
        }
        Ok(())
    }

    /// PATCH with an update mask merges only the named fields.
    async fn merge_doc(&self, path: &str, fields: Value, mask: &[&str]) -> Result<()> {
        let mut url = self.doc_url(path)?;
        for field in mask {
            url.query_pairs_mut()
                .append_pair("updateMask.fieldPaths", field);
        }
        debug!(%url, "firestore merge");
        let res = self
            .http
            .patch(url)
            .bearer_auth(self.token().await?)
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .context("failed to reach Firestore")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("firestore error {}: {}", status, body));
        }
        Ok(())
    }

    async fn create_doc(&self, parent: &str, collection: &str, fields: Value) -> Result<()> {
        let mut url = self
            .base_url
            .join(&format!("v1/{}/{}", self.doc_name(parent), collection))
            .context("invalid Firestore base URL")?;
        url.query_pairs_mut()
            .append_pair("documentId", &Uuid::new_v4().to_string());
        debug!(%url, "firestore create");
        let res = self
            .http
            .post(url)
            .bearer_auth(self.token().await?)
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .context("failed to reach Firestore")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("firestore error {}: {}", status, body));
        }
        Ok(())
    }

    async fn commit(&self, body: Value) -> Result<()> {
        let url = self
            .base_url
            .join(&format!(
                "v1/projects/{}/databases/(default)/documents:commit",
                self.project
            ))
            .context("invalid Firestore base URL")?;
        debug!(%url, "firestore commit");
        let res = self
            .http
            .post(url)
            .bearer_auth(self.token().await?)
            .json(&body)
            .send()
            .await
            .context("failed to reach Firestore")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("firestore error {}: {}", status, body));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for FirestoreClient {
    async fn put_user(&self, session: &str, user: &UserRecord) -> Result<()> {
        self.set_doc(&format!("users/{session}"), user_fields(user))
            .await
    }

    async fn get_user(&self, session: &str) -> Result<Option<UserRecord>> {
        let doc = self.get_doc(&format!("users/{session}")).await?;
        Ok(doc.map(|d| decode_user(&d)))
    }

    async fn set_business_info(&self, session: &str, business_info: &str) -> Result<()> {
        let mut fields = Map::new();
        fields.insert("businessInfo".into(), value::string(business_info));
        self.merge_doc(
            &format!("users/{session}"),
            Value::Object(fields),
            &["businessInfo"],
        )
        .await
    }

    async fn set_schedule(&self, session: &str, schedule: &str) -> Result<()> {
        let mut fields = Map::new();
        fields.insert("Schedule".into(), value::string(schedule));
        fields.insert("lastUpdatedDate".into(), value::timestamp(chrono::Utc::now()));
        self.merge_doc(
            &format!("users/{session}"),
            Value::Object(fields),
            &["Schedule", "lastUpdatedDate"],
        )
        .await
    }

    async fn get_labels(&self, session: &str) -> Result<Option<LabelBatch>> {
        let doc = self
            .get_doc(&format!("users/{session}/labels/{session}"))
            .await?;
        Ok(doc.map(|d| decode_batch(&d)))
    }

    async fn put_labels(&self, session: &str, batch: &LabelBatch) -> Result<()> {
        self.set_doc(
            &format!("users/{session}/labels/{session}"),
            batch_fields(batch),
        )
        .await
    }

    async fn record_upload(&self, session: &str, date: &str, reset: bool) -> Result<()> {
        let path = format!("users/{session}");
        if reset {
            let mut fields = Map::new();
            fields.insert("uploadCount".into(), value::integer(1));
            fields.insert("uploadDate".into(), value::string(date));
            self.merge_doc(&path, Value::Object(fields), &["uploadCount", "uploadDate"])
                .await
        } else {
            self.commit(upload_commit_body(&self.doc_name(&path), date))
                .await
        }
    }

    async fn get_draft(&self, session: &str) -> Result<Option<PostDraft>> {
        let doc = self
            .get_doc(&format!("users/{session}/post_data/{session}"))
            .await?;
        Ok(doc.map(|d| decode_draft(&d)))
    }

    async fn put_draft(&self, session: &str, draft: &PostDraft) -> Result<()> {
        self.set_doc(
            &format!("users/{session}/post_data/{session}"),
            draft_fields(draft),
        )
        .await
    }

    async fn add_site_metadata(&self, session: &str, meta: &WebsiteMetadata) -> Result<()> {
        self.create_doc(
            &format!("users/{session}"),
            "website-metadata",
            metadata_fields(meta),
        )
        .await
    }
}

pub fn user_fields(user: &UserRecord) -> Value {
    let mut fields = Map::new();
    fields.insert("userName".into(), value::string(&user.user_name));
    fields.insert("website".into(), value::string(&user.website));
    fields.insert("businessInfo".into(), value::string(&user.business_info));
    fields.insert(
        "subscriptionTier".into(),
        value::string(user.subscription_tier.as_str()),
    );
    fields.insert(
        "subscriptionStatus".into(),
        value::string(user.subscription_status.as_str()),
    );
    fields.insert("limit".into(), value::integer(user.limit));
    fields.insert(
        "freeUsageCount".into(),
        value::integer(user.free_usage_count),
    );
    if let Some(at) = user.last_usage_date {
        fields.insert("lastUsageDate".into(), value::timestamp(at));
    }
    fields.insert("uploadCount".into(), value::integer(user.upload_count));
    if let Some(date) = &user.upload_date {
        fields.insert("uploadDate".into(), value::string(date));
    }
    if let Some(schedule) = &user.schedule {
        fields.insert("Schedule".into(), value::string(schedule));
    }
    if let Some(at) = user.last_updated_date {
        fields.insert("lastUpdatedDate".into(), value::timestamp(at));
    }
    Value::Object(fields)
}

pub fn decode_user(doc: &Value) -> UserRecord {
    let fields = &doc["fields"];
    UserRecord {
        user_name: value::get_string(fields, "userName").unwrap_or_default(),
        website: value::get_string(fields, "website").unwrap_or_default(),
        business_info: value::get_string(fields, "businessInfo").unwrap_or_default(),
        subscription_tier: SubscriptionTier::parse(
            value::get_string(fields, "subscriptionTier")
                .unwrap_or_default()
                .as_str(),
        ),
        subscription_status: SubscriptionStatus::parse(
            value::get_string(fields, "subscriptionStatus")
                .unwrap_or_default()
                .as_str(),
        ),
        limit: value::get_integer(fields, "limit").unwrap_or(0),
        free_usage_count: value::get_integer(fields, "freeUsageCount").unwrap_or(0),
        last_usage_date: value::get_timestamp(fields, "lastUsageDate"),
        upload_count: value::get_integer(fields, "uploadCount").unwrap_or(0),
        upload_date: value::get_string(fields, "uploadDate"),
        schedule: value::get_string(fields, "Schedule"),
        last_updated_date: value::get_timestamp(fields, "lastUpdatedDate"),
    }
}

pub fn batch_fields(batch: &LabelBatch) -> Value {
    let entries = batch
        .entries
        .iter()
        .map(|e| {
            let mut fields = Map::new();
            fields.insert("slot".into(), value::string(&e.slot));
            fields.insert(
                "labels".into(),
                value::array(e.labels.iter().map(|l| value::string(l)).collect()),
            );
            fields.insert("capturedAt".into(), value::timestamp(e.captured_at));
            value::map(fields)
        })
        .collect();
    let mut fields = Map::new();
    fields.insert("entries".into(), value::array(entries));
    fields.insert("counter".into(), value::integer(batch.counter));
    Value::Object(fields)
}

pub fn decode_batch(doc: &Value) -> LabelBatch {
    let fields = &doc["fields"];
    let entries = value::get_array(fields, "entries")
        .iter()
        .map(|entry| {
            let fields = value::map_fields(entry);
            LabelEntry {
                slot: value::get_string(fields, "slot").unwrap_or_default(),
                labels: value::string_items(&value::get_array(fields, "labels")),
                captured_at: value::get_timestamp(fields, "capturedAt")
                    .unwrap_or_else(chrono::Utc::now),
            }
        })
        .collect();
    LabelBatch {
        entries,
        counter: value::get_integer(fields, "counter").unwrap_or(0),
    }
}

pub fn draft_fields(draft: &PostDraft) -> Value {
    let mut fields = Map::new();
    fields.insert("headline".into(), value::string(&draft.headline));
    fields.insert("content".into(), value::string(&draft.content));
    fields.insert("tags".into(), value::string(&draft.tags));
    fields.insert(
        "image_urls".into(),
        value::array(draft.image_urls.iter().map(|u| value::string(u)).collect()),
    );
    fields.insert("image_length".into(), value::integer(draft.image_count));
    Value::Object(fields)
}

pub fn decode_draft(doc: &Value) -> PostDraft {
    let fields = &doc["fields"];
    PostDraft {
        headline: value::get_string(fields, "headline").unwrap_or_default(),
        content: value::get_string(fields, "content").unwrap_or_default(),
        tags: value::get_string(fields, "tags").unwrap_or_default(),
        image_urls: value::string_items(&value::get_array(fields, "image_urls")),
        image_count: value::get_integer(fields, "image_length").unwrap_or(0),
    }
}

pub fn metadata_fields(meta: &WebsiteMetadata) -> Value {
    let mut location = Map::new();
    location.insert("country".into(), value::string(&meta.location.country));
    location.insert("city".into(), value::string(&meta.location.city));
    location.insert(
        "postal_code".into(),
        value::string(&meta.location.postal_code),
    );
    let mut fields = Map::new();
    fields.insert("location".into(), value::map(location));
    fields.insert("summary".into(), value::from_json(&meta.summary));
    Value::Object(fields)
}

/// Commit body incrementing the daily upload counter while stamping the day
/// it belongs to. Both writes apply atomically.
pub fn upload_commit_body(doc_name: &str, date: &str) -> Value {
    json!({
        "writes": [
            {
                "update": {
                    "name": doc_name,
                    "fields": { "uploadDate": { "stringValue": date } }
                },
                "updateMask": { "fieldPaths": ["uploadDate"] }
            },
            {
                "transform": {
                    "document": doc_name,
                    "fieldTransforms": [
                        {
                            "fieldPath": "uploadCount",
                            "increment": { "integerValue": "1" }
                        }
                    ]
                }
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SiteLocation;
    use chrono::Utc;
    use serde_json::json;

    fn sample_user() -> UserRecord {
        let mut user = UserRecord::new(
            "Matt".into(),
            "https://example.com".into(),
            "Handmade candles".into(),
        );
        user.upload_count = 3;
        user.upload_date = Some("2026-08-07".into());
        user
    }

    #[test]
    fn user_fields_round_trip() {
        let user = sample_user();
        let doc = json!({ "fields": user_fields(&user) });
        let decoded = decode_user(&doc);
        assert_eq!(decoded.user_name, "Matt");
        assert_eq!(decoded.business_info, "Handmade candles");
        assert_eq!(decoded.subscription_tier, SubscriptionTier::Free);
        assert_eq!(decoded.limit, 1);
        assert_eq!(decoded.upload_count, 3);
        assert_eq!(decoded.upload_date.as_deref(), Some("2026-08-07"));
    }

    #[test]
    fn decode_user_substitutes_defaults() {
        let doc = json!({ "fields": {} });
        let user = decode_user(&doc);
        assert_eq!(user.user_name, "");
        assert_eq!(user.limit, 0);
        assert_eq!(user.subscription_tier, SubscriptionTier::Free);
        assert_eq!(user.subscription_status, SubscriptionStatus::Active);
        assert!(user.last_usage_date.is_none());
    }

    #[test]
    fn batch_fields_round_trip_preserves_order() {
        let mut batch = LabelBatch::default();
        let at = Utc::now();
        batch.append(vec!["dog".into(), "park".into()], at);
        batch.append(vec!["cake".into()], at);

        let doc = json!({ "fields": batch_fields(&batch) });
        let decoded = decode_batch(&doc);
        assert_eq!(decoded.counter, 2);
        assert_eq!(decoded.entries.len(), 2);
        assert_eq!(decoded.entries[0].slot, "image1");
        assert_eq!(
            decoded.entries[0].labels,
            vec!["dog".to_string(), "park".to_string()]
        );
        assert_eq!(decoded.entries[1].slot, "image2");
    }

    #[test]
    fn draft_fields_round_trip() {
        let draft = PostDraft {
            headline: "Big News".into(),
            content: "Body".into(),
            tags: "#a, #b".into(),
            image_urls: vec!["https://cdn/1.jpg".into(), "https://cdn/2.jpg".into()],
            image_count: 2,
        };
        let doc = json!({ "fields": draft_fields(&draft) });
        let decoded = decode_draft(&doc);
        assert_eq!(decoded, draft);
    }

    #[test]
    fn metadata_fields_encode_location_and_summary() {
        let meta = WebsiteMetadata {
            location: SiteLocation::default(),
            summary: json!({ "niche": "bakery" }),
        };
        let fields = metadata_fields(&meta);
        assert_eq!(
            fields["location"]["mapValue"]["fields"]["country"]["stringValue"],
            "Unknown"
        );
        assert_eq!(
            fields["summary"]["mapValue"]["fields"]["niche"]["stringValue"],
            "bakery"
        );
    }

    #[test]
    fn upload_commit_increments_counter() {
        let body = upload_commit_body(
            "projects/p/databases/(default)/documents/users/abc",
            "2026-08-07",
        );
        let writes = body["writes"].as_array().unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(
            writes[0]["update"]["fields"]["uploadDate"]["stringValue"],
            "2026-08-07"
        );
        let transform = &writes[1]["transform"]["fieldTransforms"][0];
        assert_eq!(transform["fieldPath"], "uploadCount");
        assert_eq!(transform["increment"]["integerValue"], "1");
    }
}
