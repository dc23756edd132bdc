use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use super::render::render;
use super::types::{FeedDocument, FeedItem, OutputFormat};

/// Maximum element nesting accepted while building the document tree.
/// Real feeds stay a handful of levels deep; this bounds memory and drop recursion.
const MAX_XML_DEPTH: usize = 256;

/// Errors that can occur while turning RSS text into output lines.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The input is not well-formed XML. Carries the reader's diagnostic.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// Element nesting exceeds the safety limit.
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// The root element has no `<channel>` child.
    #[error("Document has no <channel> element under its root")]
    MissingChannel,

    /// Rendering the JSON document failed.
    #[error("Failed to serialize feed as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses an RSS document and renders it as output lines.
///
/// # Arguments
///
/// * `xml` - The raw RSS document
/// * `limit` - Maximum number of items to keep, by position. `None` keeps
///   every item; zero or a negative value keeps none.
/// * `format` - Text report lines or a single JSON document
///
/// # Returns
///
/// For [`OutputFormat::Text`], one string per output line. For
/// [`OutputFormat::Json`], a one-element `Vec` holding the whole document.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not well-formed XML or has no
/// channel. Missing or empty fields never fail; they are omitted from text
/// output and rendered as `""` in JSON.
///
/// # Examples
///
/// ```
/// use rss_reader::feed::{parse, OutputFormat};
///
/// let xml = "<rss><channel><title>T</title><link>L</link><description>D</description></channel></rss>";
/// let lines = parse(xml, None, OutputFormat::Text).unwrap();
/// assert_eq!(lines, vec!["Feed: T", "Link: L", "Description: D"]);
/// ```
pub fn parse(xml: &str, limit: Option<i64>, format: OutputFormat) -> Result<Vec<String>, ParseError> {
    let document = parse_document(xml, limit)?;
    render(&document, format)
}

/// Extracts channel and item fields from an RSS document.
///
/// The returned [`FeedDocument`] already has its items cut to `limit`.
pub fn parse_document(xml: &str, limit: Option<i64>) -> Result<FeedDocument, ParseError> {
    let root = build_tree(xml)?;
    let channel = root.child("channel").ok_or(ParseError::MissingChannel)?;

    let items: Vec<&Element> = channel.children_named("item").collect();
    let total = items.len();
    let kept = limited_len(total, limit);

    let document = FeedDocument {
        title: channel.child_text("title"),
        link: channel.child_text("link"),
        description: channel.child_text("description"),
        categories: channel.categories(),
        last_build_date: channel.child_text("lastBuildDate"),
        pub_date: channel.child_text("pubDate"),
        language: channel.child_text("language"),
        managing_editor: channel.child_text("managingEditor"),
        items: items.into_iter().take(kept).map(extract_item).collect(),
    };

    tracing::debug!(
        title = document.title.as_deref().unwrap_or(""),
        total_items = total,
        kept_items = kept,
        "Parsed RSS channel"
    );

    Ok(document)
}

fn extract_item(item: &Element) -> FeedItem {
    FeedItem {
        title: item.child_text("title"),
        author: item.child_text("author"),
        pub_date: item.child_text("pubDate"),
        link: item.child_text("link"),
        categories: item.categories(),
        description: item.child_text("description"),
    }
}

/// Number of items left after applying `limit` as a prefix slice.
fn limited_len(total: usize, limit: Option<i64>) -> usize {
    match limit {
        None => total,
        Some(n) if n <= 0 => 0,
        Some(n) => usize::try_from(n).map_or(total, |n| n.min(total)),
    }
}

// ============================================================================
// Element Tree
// ============================================================================

/// Minimal owned element tree, enough to answer "first child named X" and
/// "all children named X" queries.
#[derive(Debug, Default)]
struct Element {
    name: String,
    /// Text and CDATA that precede the first child element.
    text: String,
    children: Vec<Element>,
}

impl Element {
    /// Creates an element from its start tag, rejecting malformed attributes
    /// (unquoted values, bare names, duplicates, undefined entities).
    fn new(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Self, ParseError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();

        let mut attributes = start.attributes();
        attributes.with_checks(true);
        for attr in attributes {
            let malformed = |e: &dyn std::fmt::Display| {
                ParseError::Xml(format!(
                    "malformed attribute in <{}>: {} (at byte {})",
                    name,
                    e,
                    reader.buffer_position()
                ))
            };
            let attr = attr.map_err(|e| malformed(&e))?;
            attr.unescape_value().map_err(|e| malformed(&e))?;
        }

        Ok(Self {
            name,
            ..Self::default()
        })
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// The element's text, or `None` when it has none.
    fn text(&self) -> Option<&str> {
        if self.text.is_empty() {
            None
        } else {
            Some(&self.text)
        }
    }

    fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).and_then(Element::text).map(str::to_owned)
    }

    fn categories(&self) -> Vec<String> {
        self.children_named("category")
            .filter_map(Element::text)
            .filter(|text| !text.trim().is_empty())
            .map(str::to_owned)
            .collect()
    }

    fn push_text(&mut self, text: &str) {
        // Text after the first child is a tail, not part of this element's text.
        if self.children.is_empty() {
            self.text.push_str(text);
        }
    }
}

/// Reads the whole document into an [`Element`] tree, rejecting anything that
/// is not well-formed.
///
/// Entity handling relies on quick-xml (0.37) never parsing `<!ENTITY>`
/// declarations: only the five predefined entities and character references
/// are resolved, and any other reference fails `unescape()`.
fn build_tree(xml: &str) -> Result<Element, ParseError> {
    let mut reader = Reader::from_str(xml.strip_prefix('\u{feff}').unwrap_or(xml));
    reader.config_mut().check_end_names = true;

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            ParseError::Xml(format!("{} (at byte {})", e, reader.error_position()))
        })?;

        match event {
            Event::Start(start) => {
                ensure_single_root(&root, &stack, &reader)?;
                if stack.len() >= MAX_XML_DEPTH {
                    return Err(ParseError::MaxDepthExceeded(MAX_XML_DEPTH));
                }
                stack.push(Element::new(&start, &reader)?);
            }
            Event::Empty(start) => {
                ensure_single_root(&root, &stack, &reader)?;
                attach(Element::new(&start, &reader)?, &mut stack, &mut root);
            }
            Event::End(end) => {
                let element = stack.pop().ok_or_else(|| {
                    ParseError::Xml(format!(
                        "unexpected closing tag </{}> (at byte {})",
                        String::from_utf8_lossy(end.name().as_ref()),
                        reader.buffer_position()
                    ))
                })?;
                if element.name.as_bytes() != end.name().as_ref() {
                    return Err(ParseError::Xml(format!(
                        "mismatched tag: expected </{}>, found </{}> (at byte {})",
                        element.name,
                        String::from_utf8_lossy(end.name().as_ref()),
                        reader.buffer_position()
                    )));
                }
                attach(element, &mut stack, &mut root);
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| {
                    ParseError::Xml(format!("{} (at byte {})", e, reader.buffer_position()))
                })?;
                match stack.last_mut() {
                    Some(current) => current.push_text(&text),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(ParseError::Xml(format!(
                            "text outside the document element (at byte {})",
                            reader.buffer_position()
                        )))
                    }
                }
            }
            Event::CData(cdata) => match stack.last_mut() {
                Some(current) => current.push_text(&String::from_utf8_lossy(&cdata)),
                None => {
                    return Err(ParseError::Xml(format!(
                        "CDATA outside the document element (at byte {})",
                        reader.buffer_position()
                    )))
                }
            },
            Event::Eof => break,
            // Declarations, comments, processing instructions and DOCTYPE carry no feed data.
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Xml(format!(
            "unclosed element <{}> at end of document",
            open.name
        )));
    }

    root.ok_or_else(|| ParseError::Xml("no element found".to_string()))
}

fn ensure_single_root(
    root: &Option<Element>,
    stack: &[Element],
    reader: &Reader<&[u8]>,
) -> Result<(), ParseError> {
    if root.is_some() && stack.is_empty() {
        return Err(ParseError::Xml(format!(
            "junk after document element (at byte {})",
            reader.buffer_position()
        )));
    }
    Ok(())
}

fn attach(element: Element, stack: &mut [Element], root: &mut Option<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}
