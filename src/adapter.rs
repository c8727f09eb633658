//! Conversion of relay records into the feed model.
//!
//! Missing data never fails a conversion; fallbacks are substituted instead.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::{
    event::{ProfileMetadata, RawRecord},
    identifier::CanonicalAuthorKey,
};

/// Characters of body text used when a record has no `summary` tag.
pub const SUMMARY_FALLBACK_CHARS: usize = 500;
/// Title used when neither a `title` tag nor body text is available.
pub const UNTITLED: &str = "Untitled";
/// Feed description used when the author profile has no `about`.
pub const DEFAULT_FEED_DESCRIPTION: &str = "Long-form content from Nostr author";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedFeed {
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
    pub homepage_link: String,
    pub link: String,
    pub posts: Vec<NormalizedPost>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPost {
    /// `nostr:` URI of the record.
    pub link: String,
    pub title: String,
    /// Cleaned, entity-decoded text without markup.
    pub description: String,
    /// Body exactly as published.
    pub raw_content: String,
    pub image_url: Option<String>,
    /// Unix timestamp in seconds.
    pub published_at: u64,
    pub comments_link: Option<String>,
}

/// Build a feed from the accepted records and the author's profile.
///
/// Posts keep the order of `records`.
pub fn to_feed(
    author: &CanonicalAuthorKey,
    profile: &ProfileMetadata,
    records: &[RawRecord],
    gateway_host: &str,
) -> NormalizedFeed {
    let name = profile
        .display_name()
        .map(clean_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| author.short());
    let description = non_blank(profile.about.as_deref())
        .map(clean_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_FEED_DESCRIPTION.to_string());
    let link = format!("https://{}/{}", gateway_host, author.to_npub());
    NormalizedFeed {
        name,
        description,
        icon: non_blank(profile.picture.as_deref()).map(str::to_string),
        homepage_link: link.clone(),
        link,
        posts: records.iter().map(to_post).collect(),
    }
}

pub fn to_post(record: &RawRecord) -> NormalizedPost {
    let title = non_blank(record.tag_value("title"))
        .map(clean_text)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            record
                .content
                .lines()
                .find(|line| !line.trim().is_empty())
                .map(clean_text)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| UNTITLED.to_string());

    let description = match non_blank(record.tag_value("summary")) {
        Some(summary) => clean_text(summary),
        None => {
            let head: String = record.content.chars().take(SUMMARY_FALLBACK_CHARS).collect();
            clean_text(&head)
        }
    };

    let published_at = record
        .tag_value("published_at")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(record.created_at);

    NormalizedPost {
        link: format!("nostr:{}", record.id),
        title,
        description,
        raw_content: record.content.clone(),
        image_url: non_blank(record.tag_value("image")).map(str::to_string),
        published_at,
        comments_link: None,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Decode HTML entities, drop markup and collapse whitespace.
pub fn clean_text(text: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static SPACE: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"));
    let space = SPACE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

    // Entities first, so encoded markup is stripped as well.
    let decoded = html_escape::decode_html_entities(text);
    let stripped = tags.replace_all(&decoded, " ");
    space.replace_all(stripped.trim(), " ").into_owned()
}
