//! Website scraping: page head extraction, IP geolocation, LLM summary.
use anyhow::{Context, Result};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::IpAddr;
use tracing::{debug, warn};

use crate::model::{SiteLocation, WebsiteMetadata};
use crate::openai::{strip_code_fences, ChatMessage, Completions};

pub const GEO_API_BASE: &str = "http://ip-api.com/";

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    status: String,
    country: Option<String>,
    city: Option<String>,
    zip: Option<String>,
}

/// Fetch the page, derive location and summary, and assemble the combined
/// metadata record. Only the page fetch itself can fail; location and
/// summary degrade to defaults.
pub async fn scrape_site(
    http: &Client,
    geo_base: &Url,
    llm: &dyn Completions,
    website_url: &str,
) -> Result<WebsiteMetadata> {
    let res = http
        .get(website_url)
        .send()
        .await
        .context("failed to fetch website")?;
    if !res.status().is_success() {
        anyhow::bail!("website returned status {}", res.status());
    }
    let html = res.text().await.context("failed to read website body")?;
    let head = extract_head(&html);

    let location = locate(http, geo_base, website_url).await;
    let summary = summarize(llm, head).await;

    Ok(WebsiteMetadata { location, summary })
}

/// Isolate the `<head>…</head>` markup; the whole document is used when no
/// head section is found.
pub fn extract_head(html: &str) -> &str {
    let lowered = html.to_ascii_lowercase();
    let open = match lowered.find("<head") {
        Some(idx) => idx,
        None => return html,
    };
    let close = match lowered[open..].find("</head>") {
        Some(rel) => open + rel + "</head>".len(),
        None => return html,
    };
    &html[open..close]
}

/// Host portion of a URL, without scheme, path, or port.
pub fn host_of(url: &str) -> Option<&str> {
    let without_scheme = url.rsplit("//").next().unwrap_or(url);
    let host_port = without_scheme.split('/').next()?;
    let host = host_port.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Resolve the URL's host via standard DNS. Failure yields None, not an
/// error.
pub async fn resolve_ip(url: &str) -> Option<IpAddr> {
    let host = host_of(url)?;
    match tokio::net::lookup_host((host, 80)).await {
        Ok(mut addrs) => addrs.next().map(|addr| addr.ip()),
        Err(err) => {
            warn!(host, %err, "dns resolution failed");
            None
        }
    }
}

/// Location for the site's IP, defaulting every field to "Unknown" whenever
/// resolution or the lookup cannot provide it.
pub async fn locate(http: &Client, geo_base: &Url, website_url: &str) -> SiteLocation {
    let ip = match resolve_ip(website_url).await {
        Some(ip) => ip,
        None => return SiteLocation::default(),
    };
    lookup_location(http, geo_base, ip).await
}

async fn lookup_location(http: &Client, geo_base: &Url, ip: IpAddr) -> SiteLocation {
    let url = match geo_base.join(&format!("json/{ip}")) {
        Ok(url) => url,
        Err(_) => return SiteLocation::default(),
    };
    debug!(%url, "geolocation lookup");
    let res = match http.get(url).send().await {
        Ok(res) => res,
        Err(err) => {
            warn!(%err, "geolocation lookup failed");
            return SiteLocation::default();
        }
    };
    match res.json::<GeoResponse>().await {
        Ok(geo) => parse_location(geo),
        Err(err) => {
            warn!(%err, "geolocation response unreadable");
            SiteLocation::default()
        }
    }
}

fn parse_location(geo: GeoResponse) -> SiteLocation {
    if geo.status != "success" {
        return SiteLocation::default();
    }
    let or_unknown = |v: Option<String>| v.unwrap_or_else(|| "Unknown".into());
    SiteLocation {
        country: or_unknown(geo.country),
        city: or_unknown(geo.city),
        postal_code: or_unknown(geo.zip),
    }
}

/// Prompt asking for the fixed-shape site summary.
pub fn summary_prompt(head: &str) -> String {
    format!(
        "Generate a JSON summary from the following text {head} :\n\
         The summary should be in the format: \
         {{\"niche\": \"Industry/Niche\", \"seo_keywords\": [], \
         \"pricing\": {{\"basic\": \"Basic Price\", \"premium\": \"Premium Price\"}}, \
         \"bio\": \"Short biography of key personnel\", \
         \"reviews\": {{\"average_rating\": \"Rating\", \"top_review\": \"Top review\"}}, \
         \"additional_insights\": {{\"awards\": [\"Award 1\", \"Award 2\"], \
         \"notable_blog_post\": \"Title of notable blog post\"}}}}."
    )
}

/// Response schema for the site summary.
pub fn summary_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "niche": { "type": "string" },
            "seo_keywords": { "type": "array", "items": { "type": "string" } },
            "pricing": {
                "type": "object",
                "properties": {
                    "basic": { "type": "string" },
                    "premium": { "type": "string" }
                },
                "required": ["basic", "premium"],
                "additionalProperties": false
            },
            "bio": { "type": "string" },
            "reviews": {
                "type": "object",
                "properties": {
                    "average_rating": { "type": "string" },
                    "top_review": { "type": "string" }
                },
                "required": ["average_rating", "top_review"],
                "additionalProperties": false
            },
            "additional_insights": {
                "type": "object",
                "properties": {
                    "awards": { "type": "array", "items": { "type": "string" } },
                    "notable_blog_post": { "type": "string" }
                },
                "required": ["awards", "notable_blog_post"],
                "additionalProperties": false
            }
        },
        "required": [
            "niche",
            "seo_keywords",
            "pricing",
            "bio",
            "reviews",
            "additional_insights"
        ],
        "additionalProperties": false
    })
}

/// Ask the model to summarize the page head. Any request or parse failure
/// degrades to an empty object.
pub async fn summarize(llm: &dyn Completions, head: &str) -> Value {
    let messages = [ChatMessage::user(summary_prompt(head))];
    let raw = match llm
        .complete_json(&messages, "site_summary", &summary_schema())
        .await
    {
        Ok(raw) => raw,
        Err(err) => {
            warn!(%err, "site summary request failed; using empty summary");
            return json!({});
        }
    };
    match serde_json::from_str(&strip_code_fences(&raw)) {
        Ok(summary) => summary,
        Err(err) => {
            warn!(%err, "site summary parse failed; using empty summary");
            json!({})
        }
    }
}
