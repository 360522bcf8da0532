use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubscriptionTier {
    Free,
    Paid,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "Free",
            SubscriptionTier::Paid => "Paid",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Paid" => SubscriptionTier::Paid,
            _ => SubscriptionTier::Free,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "inactive" => SubscriptionStatus::Inactive,
            _ => SubscriptionStatus::Active,
        }
    }
}

/// Per-session user profile, stored in the `users` collection keyed by the
/// session id. Created on first save; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub user_name: String,
    pub website: String,
    pub business_info: String,
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
    pub limit: i64,
    pub free_usage_count: i64,
    pub last_usage_date: Option<DateTime<Utc>>,
    /// Uploads recorded on `upload_date`; resets when the UTC day changes.
    pub upload_count: i64,
    pub upload_date: Option<String>,
    pub schedule: Option<String>,
    pub last_updated_date: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn new(user_name: String, website: String, business_info: String) -> Self {
        UserRecord {
            user_name,
            website,
            business_info,
            subscription_tier: SubscriptionTier::Free,
            subscription_status: SubscriptionStatus::Active,
            limit: 1,
            free_usage_count: 0,
            last_usage_date: Some(Utc::now()),
            upload_count: 0,
            upload_date: None,
            schedule: None,
            last_updated_date: None,
        }
    }

    /// The fixed field projection returned by the user-lookup endpoint, with
    /// defaults substituted for anything absent.
    pub fn projection(&self) -> UserProjection {
        UserProjection {
            business_info: self.business_info.clone(),
            free_usage_count: self.free_usage_count,
            last_image_labels: String::new(),
            last_usage_date: self
                .last_usage_date
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            limit: self.limit,
            subscription_status: self.subscription_status.as_str().to_string(),
            subscription_tier: self.subscription_tier.as_str().to_string(),
            user_name: self.user_name.clone(),
            website: self.website.clone(),
        }
    }
}

/// Wire shape for `Check_Existing_User`; key casing is part of the consumer
/// contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProjection {
    #[serde(rename = "businessInfo")]
    pub business_info: String,
    #[serde(rename = "freeUsageCount")]
    pub free_usage_count: i64,
    #[serde(rename = "lastImageLabels")]
    pub last_image_labels: String,
    #[serde(rename = "lastUsageDate")]
    pub last_usage_date: String,
    #[serde(rename = "Limit")]
    pub limit: i64,
    #[serde(rename = "subscriptionStatus")]
    pub subscription_status: String,
    #[serde(rename = "subscriptionTier")]
    pub subscription_tier: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(rename = "Website")]
    pub website: String,
}

/// One labeled upload: the image slot name, the detected labels, and the
/// capture time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelEntry {
    pub slot: String,
    pub labels: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

/// Accumulated label entries for a session. Append-only: an append never
/// removes or reorders earlier entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LabelBatch {
    pub entries: Vec<LabelEntry>,
    pub counter: i64,
}

impl LabelBatch {
    pub fn next_slot(&self) -> String {
        format!("image{}", self.counter + 1)
    }

    /// Append labels under the next slot name and return that slot name.
    pub fn append(&mut self, labels: Vec<String>, captured_at: DateTime<Utc>) -> String {
        let slot = self.next_slot();
        self.entries.push(LabelEntry {
            slot: slot.clone(),
            labels,
            captured_at,
        });
        self.counter += 1;
        slot
    }

    /// Concatenated labels from the given slots, in slot order.
    pub fn labels_for_slots(&self, slots: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        for slot in slots {
            for entry in self.entries.iter().filter(|e| e.slot == *slot) {
                out.extend(entry.labels.iter().cloned());
            }
        }
        out
    }
}

/// Generated post artifact; overwritten wholesale on each regeneration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostDraft {
    pub headline: String,
    pub content: String,
    /// Comma-joined `#tag` string.
    pub tags: String,
    pub image_urls: Vec<String>,
    pub image_count: i64,
}

/// Geolocation derived from the scraped site's IP; every field falls back to
/// "Unknown" when the lookup cannot provide it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteLocation {
    pub country: String,
    pub city: String,
    pub postal_code: String,
}

impl Default for SiteLocation {
    fn default() -> Self {
        SiteLocation {
            country: "Unknown".into(),
            city: "Unknown".into(),
            postal_code: "Unknown".into(),
        }
    }
}

/// Combined scrape result, persisted as a fresh sub-record per scrape call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebsiteMetadata {
    pub location: SiteLocation,
    pub summary: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_appends_in_slot_order() {
        let mut batch = LabelBatch::default();
        let at = Utc::now();
        assert_eq!(batch.append(vec!["dog".into()], at), "image1");
        assert_eq!(batch.append(vec!["cat".into()], at), "image2");
        assert_eq!(batch.counter, 2);
        assert_eq!(batch.entries[0].labels, vec!["dog".to_string()]);
        assert_eq!(batch.entries[1].slot, "image2");
    }

    #[test]
    fn labels_for_slots_ignores_later_slots() {
        let mut batch = LabelBatch::default();
        let at = Utc::now();
        for labels in [["a"], ["b"], ["c"], ["d"], ["e"]] {
            batch.append(labels.iter().map(|s| s.to_string()).collect(), at);
        }
        let gathered = batch.labels_for_slots(&["image1", "image2", "image3", "image4"]);
        assert_eq!(gathered, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn projection_substitutes_defaults() {
        let mut user = UserRecord::new("Matt".into(), "https://example.com".into(), "".into());
        user.last_usage_date = None;
        let proj = user.projection();
        assert_eq!(proj.last_usage_date, "");
        assert_eq!(proj.last_image_labels, "");
        assert_eq!(proj.subscription_tier, "Free");
        assert_eq!(proj.subscription_status, "active");
        assert_eq!(proj.limit, 1);
    }

    #[test]
    fn tier_and_status_parse_defaults() {
        assert_eq!(SubscriptionTier::parse("Paid"), SubscriptionTier::Paid);
        assert_eq!(SubscriptionTier::parse("garbage"), SubscriptionTier::Free);
        assert_eq!(
            SubscriptionStatus::parse("inactive"),
            SubscriptionStatus::Inactive
        );
        assert_eq!(
            SubscriptionStatus::parse("anything"),
            SubscriptionStatus::Active
        );
    }
}
