use serde::{Deserialize, Deserializer, Serialize};
use subbot_core::unescape_html_entities;

/// Fullname prefix for comment things.
pub const COMMENT_FULLNAME_PREFIX: &str = "t1_";
/// Listing `kind` tag for comment things.
pub const COMMENT_KIND: &str = "t1";

const DELETED_AUTHOR: &str = "[deleted]";
const REMOVED_BODY: &str = "[removed]";

/// A comment as delivered by the feed and the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    #[serde(deserialize_with = "null_as_empty")]
    pub author: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub author_fullname: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub body: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub body_html: String,
    pub created_utc: f64,
    #[serde(deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub parent_id: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub permalink: String,
}

impl Comment {
    /// Decodes a feed payload, unescaping `&lt;`, `&gt;` and `&amp;` first.
    pub fn from_feed_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let raw = String::from_utf8_lossy(payload);
        serde_json::from_str(&unescape_html_entities(&raw))
    }

    pub fn is_deleted(&self) -> bool {
        self.author == DELETED_AUTHOR || self.body == REMOVED_BODY
    }

    pub fn is_authored_by(&self, username: &str) -> bool {
        self.author == username
    }

    pub fn has_comment_parent(&self) -> bool {
        is_comment_fullname(&self.parent_id)
    }
}

/// Returns true when `fullname` names a comment (`t1_...`).
pub fn is_comment_fullname(fullname: &str) -> bool {
    fullname.starts_with(COMMENT_FULLNAME_PREFIX)
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
