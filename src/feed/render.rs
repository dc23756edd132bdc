use super::parser::ParseError;
use super::types::{FeedDocument, FeedItem, JsonFeed, JsonItem, OutputFormat};

/// Renders an extracted feed in the requested format.
pub fn render(document: &FeedDocument, format: OutputFormat) -> Result<Vec<String>, ParseError> {
    match format {
        OutputFormat::Text => Ok(render_text(document)),
        OutputFormat::Json => Ok(vec![render_json(document)?]),
    }
}

/// Renders the human-readable report, one string per line.
///
/// Optional channel fields and item fields other than title and description
/// only produce a line when they have a value. Each item block ends with the
/// description framed by blank lines.
pub fn render_text(document: &FeedDocument) -> Vec<String> {
    let mut lines = vec![
        format!("Feed: {}", or_empty(&document.title)),
        format!("Link: {}", or_empty(&document.link)),
    ];

    if !document.categories.is_empty() {
        lines.push(format!("Categories: {}", document.categories.join(", ")));
    }
    push_optional(&mut lines, "Last Build Date", &document.last_build_date);
    push_optional(&mut lines, "Publish Date", &document.pub_date);
    push_optional(&mut lines, "Language", &document.language);
    push_optional(&mut lines, "Editor", &document.managing_editor);
    push_optional(&mut lines, "Description", &document.description);

    for item in &document.items {
        push_item(&mut lines, item);
    }

    lines
}

fn push_item(lines: &mut Vec<String>, item: &FeedItem) {
    lines.push(format!("Title: {}", or_empty(&item.title)));
    push_optional(lines, "Author", &item.author);
    push_optional(lines, "Published", &item.pub_date);
    push_optional(lines, "Link", &item.link);
    if !item.categories.is_empty() {
        lines.push(format!("Categories: {}", item.categories.join(", ")));
    }
    lines.push(String::new());
    lines.push(format!("Description: {}", or_empty(&item.description)));
    lines.push(String::new());
}

/// Serializes the feed as a 2-space indented JSON document.
///
/// Only title, link and description are emitted for the channel, and only
/// title, pubDate, link and description for each item. Absent values become
/// empty strings, never `null`. Non-ASCII text is written as-is.
pub fn render_json(document: &FeedDocument) -> Result<String, serde_json::Error> {
    let feed = JsonFeed {
        title: or_empty(&document.title),
        link: or_empty(&document.link),
        description: or_empty(&document.description),
        items: document
            .items
            .iter()
            .map(|item| JsonItem {
                title: or_empty(&item.title),
                pub_date: or_empty(&item.pub_date),
                link: or_empty(&item.link),
                description: or_empty(&item.description),
            })
            .collect(),
    };

    serde_json::to_string_pretty(&feed)
}

fn push_optional(lines: &mut Vec<String>, label: &str, value: &Option<String>) {
    if let Some(value) = value {
        lines.push(format!("{label}: {value}"));
    }
}

fn or_empty(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}
