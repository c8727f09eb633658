//! Nostr event model as received from relays.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Long-form article kind.
pub const KIND_LONG_FORM: u32 = 30023;
/// Profile metadata kind.
pub const KIND_METADATA: u32 = 0;

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// Tags appear as small arrays where the first element denotes the type and the
/// following elements hold data. Long-form articles commonly carry:
///
/// - `title` – article headline
/// - `summary` – short description
/// - `image` – header image URL
/// - `published_at` – first publication time as a decimal Unix timestamp
///
/// Each tag is stored verbatim so uncommon or custom tags are preserved. For
/// example, a `["title", "Hello"]` tag from the protocol is represented as
/// `Tag(vec!["title".into(), "Hello".into()])`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// One record served by a relay.
///
/// Every field defaults to empty/zero when absent. Numeric fields are not
/// trusted: values that are negative, fractional, out of range or of the wrong
/// JSON type are replaced by zero instead of failing the whole record.
///
/// ```json
/// {
///   "id": "aa11",
///   "pubkey": "3bf0c63f...",
///   "kind": 30023,
///   "created_at": 1700000000,
///   "tags": [["title", "Hello"], ["d", "slug"]],
///   "content": "hello",
///   "sig": "deadbeef"
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawRecord {
    /// Event identifier, used for deduplication.
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Unix timestamp of creation as claimed by the relay.
    #[serde(deserialize_with = "lenient_u64")]
    pub created_at: u64,
    /// Kind number, e.g. `0` or `30023`.
    #[serde(deserialize_with = "lenient_u32")]
    pub kind: u32,
    pub tags: Vec<Tag>,
    /// Event content body.
    pub content: String,
    /// Signature, carried through unverified.
    pub sig: String,
}

impl RawRecord {
    /// Value of the first tag named `name`, if it has one.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name() == Some(name))
            .and_then(Tag::value)
    }
}

fn lenient_u64<'de, D>(de: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(de)?.as_u64().unwrap_or(0))
}

fn lenient_u32<'de, D>(de: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(de)?
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0))
}

/// Author metadata carried as JSON in the content of a kind `0` record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProfileMetadata {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub picture: Option<String>,
    pub nip05: Option<String>,
}

impl ProfileMetadata {
    /// Parse the metadata object from a profile record's content.
    pub fn from_record(record: &RawRecord) -> Result<Self, serde_json::Error> {
        serde_json::from_str(&record.content)
    }

    /// Preferred display name: `display_name`, then `name`.
    pub fn display_name(&self) -> Option<&str> {
        [&self.display_name, &self.name]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_default() {
        let rec: RawRecord = serde_json::from_value(json!({"id": "aa"})).unwrap();
        assert_eq!(rec.id, "aa");
        assert_eq!(rec.kind, 0);
        assert_eq!(rec.created_at, 0);
        assert!(rec.tags.is_empty());
        assert!(rec.content.is_empty());
    }

    #[test]
    fn untrusted_numbers_are_zeroed() {
        let rec: RawRecord = serde_json::from_value(json!({
            "id": "aa",
            "created_at": -5,
            "kind": 99999999999u64,
        }))
        .unwrap();
        assert_eq!(rec.created_at, 0);
        assert_eq!(rec.kind, 0);

        let rec: RawRecord =
            serde_json::from_value(json!({"created_at": "1700000000", "kind": 1.5})).unwrap();
        assert_eq!(rec.created_at, 0);
        assert_eq!(rec.kind, 0);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let rec: RawRecord =
            serde_json::from_value(json!({"id": "aa", "kind": 30023, "extra": true})).unwrap();
        assert_eq!(rec.kind, KIND_LONG_FORM);
    }

    #[test]
    fn tag_lookup_uses_first_match() {
        let rec = RawRecord {
            tags: vec![
                Tag(vec!["d".into(), "slug".into()]),
                Tag(vec!["title".into()]),
                Tag(vec!["title".into(), "Second".into()]),
            ],
            ..Default::default()
        };
        assert_eq!(rec.tag_value("d"), Some("slug"));
        // The first `title` tag has no value.
        assert_eq!(rec.tag_value("title"), None);
        assert_eq!(rec.tag_value("image"), None);
    }

    #[test]
    fn profile_display_name_precedence() {
        let rec = RawRecord {
            content: concat!(
                r#"{"name":"alice","display_name":"Alice A.","#,
                r#""picture":"https://p/a.png","lud16":"x"}"#
            )
            .into(),
            ..Default::default()
        };
        let meta = ProfileMetadata::from_record(&rec).unwrap();
        assert_eq!(meta.display_name(), Some("Alice A."));
        assert_eq!(meta.picture.as_deref(), Some("https://p/a.png"));

        let meta = ProfileMetadata {
            name: Some("alice".into()),
            display_name: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(meta.display_name(), Some("alice"));
        assert_eq!(ProfileMetadata::default().display_name(), None);
    }
}
