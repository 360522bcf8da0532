//! Prompt construction and reply parsing for post generation.
//!
//! The completion request asks for a schema-constrained JSON object. When
//! the reply parses, that wins; otherwise the free-text heuristics take
//! over: headline = first non-empty line, body = everything up to the first
//! blank-line-then-hashtag boundary, tags = every `#word` token anywhere.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::openai::strip_code_fences;

pub const ASSISTANT_PERSONA: &str = "You are a helpful assistant.";

static HASHTAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\w+").expect("hashtag regex"));

#[derive(Debug, Deserialize)]
struct StructuredDraft {
    headline: String,
    body: String,
    #[serde(default)]
    hashtags: Vec<String>,
}

/// The user prompt embedding the business description and the joined labels.
pub fn post_prompt(business_info: &str, labels: &str) -> String {
    format!(
        "Write a social media post for {business_info}. The post should highlight the latest \
         trends related to the following topics: {labels}. Make the content engaging and include \
         a call to action. Also, suggest a catchy headline and relevant tags. Ensure the post \
         mentions contacting for more information."
    )
}

/// Response schema for the post draft.
pub fn draft_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "headline": { "type": "string" },
            "body": { "type": "string" },
            "hashtags": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["headline", "body", "hashtags"],
        "additionalProperties": false
    })
}

/// Split a model reply into (headline, body, comma-joined tags), preferring
/// the structured form and falling back to the text heuristics.
pub fn split_draft(raw: &str) -> (String, String, String) {
    let cleaned = strip_code_fences(raw);
    if let Ok(draft) = serde_json::from_str::<StructuredDraft>(&cleaned) {
        let tags = draft
            .hashtags
            .iter()
            .map(|t| {
                if t.starts_with('#') {
                    t.clone()
                } else {
                    format!("#{t}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        return (draft.headline, draft.body, tags);
    }
    (extract_headline(raw), extract_body(raw), extract_tags(raw))
}

/// First non-empty line of the reply, trimmed.
pub fn extract_headline(content: &str) -> String {
    content
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Text up to the first blank-line-then-hashtag boundary.
pub fn extract_body(content: &str) -> String {
    match content.find("\n\n#") {
        Some(idx) => content[..idx].trim().to_string(),
        None => content.trim().to_string(),
    }
}

/// Every `#word` token anywhere in the reply, comma-joined.
pub fn extract_tags(content: &str) -> String {
    HASHTAG
        .find_iter(content)
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "🔥 Big News\n\nBody...\n\n#tag1 #tag2";

    #[test]
    fn headline_is_first_non_empty_line() {
        assert_eq!(extract_headline(SAMPLE), "🔥 Big News");
        assert_eq!(extract_headline("\n\n  Second try\nrest"), "Second try");
        assert_eq!(extract_headline(""), "");
    }

    #[test]
    fn body_excludes_tag_line() {
        assert_eq!(extract_body(SAMPLE), "🔥 Big News\n\nBody...");
        assert_eq!(extract_body("No tags here"), "No tags here");
    }

    #[test]
    fn tags_are_comma_joined() {
        assert_eq!(extract_tags(SAMPLE), "#tag1, #tag2");
        assert_eq!(extract_tags("no hashtags"), "");
    }

    #[test]
    fn heuristics_are_idempotent_on_sample() {
        let (headline, body, tags) = split_draft(SAMPLE);
        assert_eq!(headline, "🔥 Big News");
        assert_eq!(body, "🔥 Big News\n\nBody...");
        assert_eq!(tags, "#tag1, #tag2");
    }

    #[test]
    fn structured_reply_wins() {
        let raw = r##"{"headline": "Fresh Bread Daily", "body": "Come visit us.", "hashtags": ["bakery", "#bread"]}"##;
        let (headline, body, tags) = split_draft(raw);
        assert_eq!(headline, "Fresh Bread Daily");
        assert_eq!(body, "Come visit us.");
        assert_eq!(tags, "#bakery, #bread");
    }

    #[test]
    fn fenced_structured_reply_parses() {
        let raw = "```json\n{\"headline\": \"H\", \"body\": \"B\", \"hashtags\": []}\n```";
        let (headline, body, tags) = split_draft(raw);
        assert_eq!(headline, "H");
        assert_eq!(body, "B");
        assert_eq!(tags, "");
    }

    #[test]
    fn prompt_embeds_business_and_labels() {
        let prompt = post_prompt("Matt's Candles", "wax, flame");
        assert!(prompt.contains("Matt's Candles"));
        assert!(prompt.contains("wax, flame"));
        assert!(prompt.contains("call to action"));
    }

    #[test]
    fn schema_requires_all_fields() {
        let schema = draft_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["headline", "body", "hashtags"]);
    }
}
