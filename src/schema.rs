use std::collections::BTreeMap;

use derive_more::{AsRef, Deref, Display, From, Into};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Shortest digit run accepted as a student identifier.
pub const MIN_STUDENT_ID_LEN: usize = 6;

#[derive(
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    From,
    Into,
    AsRef,
    Serialize,
)]
#[serde(transparent)]
#[as_ref(forward)]
pub struct StudentId(String);

/// Accepts both `"123456"` and `123456`.
impl<'de> Deserialize<'de> for StudentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

impl From<&str> for StudentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl StudentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Student id to display name.  Every discovered id has an entry.
#[derive(Clone, Default, PartialEq, Eq, Debug, Deref, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentRoster(BTreeMap<StudentId, String>);

impl StudentRoster {
    pub fn ids(&self) -> impl Iterator<Item = &StudentId> {
        self.0.keys()
    }
}

/// A news article exactly as the portal sent it.
#[derive(Clone, PartialEq, Debug, Deref, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NewsItem(Value);

impl NewsItem {
    /// String or number under `key`, rendered as a string.
    pub fn scalar(&self, key: &str) -> Option<String> {
        scalar(&self.0, key)
    }

    /// Attachment descriptors, found under `files` or `attachments`.
    pub fn attachments(&self) -> &[Value] {
        ["files", "attachments"]
            .iter()
            .find_map(|key| self.0.get(key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

pub(crate) fn scalar(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// One page of `/Home/NewsArticles`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsPage {
    #[serde(default)]
    pub items: Vec<NewsItem>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl NewsPage {
    /// The cursor for the following page; an empty token means there is none.
    pub fn next_page_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// A calendar entry exactly as the portal sent it.
#[derive(Clone, PartialEq, Debug, Deref, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarEvent(Value);
