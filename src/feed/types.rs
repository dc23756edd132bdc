use serde::Serialize;

// ============================================================================
// Extracted Feed Model
// ============================================================================

/// Channel-level metadata and items extracted from an RSS document.
///
/// Every scalar is `Some` only when its element exists and carries
/// non-blank text, so a missing element and an empty one look the same.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedDocument {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    /// Non-blank `<category>` values in document order.
    pub categories: Vec<String>,
    pub last_build_date: Option<String>,
    pub pub_date: Option<String>,
    pub language: Option<String>,
    pub managing_editor: Option<String>,
    /// Items in document order, already cut to the requested limit.
    pub items: Vec<FeedItem>,
}

/// A single `<item>` of the channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedItem {
    pub title: Option<String>,
    pub author: Option<String>,
    pub pub_date: Option<String>,
    pub link: Option<String>,
    pub categories: Vec<String>,
    pub description: Option<String>,
}

/// Selects how a parsed feed is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable report lines.
    #[default]
    Text,
    /// A single pretty-printed JSON document.
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

// ============================================================================
// JSON Output Shape
// ============================================================================

// Field order here is the key order of the serialized document.

#[derive(Debug, Serialize)]
pub(crate) struct JsonFeed<'a> {
    pub title: &'a str,
    pub link: &'a str,
    pub description: &'a str,
    pub items: Vec<JsonItem<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonItem<'a> {
    pub title: &'a str,
    #[serde(rename = "pubDate")]
    pub pub_date: &'a str,
    pub link: &'a str,
    pub description: &'a str,
}
