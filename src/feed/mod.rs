//! RSS feed retrieval, parsing and rendering.
//!
//! - **Parsing**: Build an element tree from RSS XML and extract channel and
//!   item metadata
//! - **Rendering**: Turn the extracted feed into report lines or a JSON document
//! - **Fetching**: Single-request HTTP retrieval with a timeout and body size limit
//!
//! # Example
//!
//! ```
//! use rss_reader::feed::{parse, OutputFormat};
//!
//! let xml = "<rss><channel><title>T</title><link>L</link></channel></rss>";
//! let lines = parse(xml, Some(10), OutputFormat::Text).unwrap();
//! assert_eq!(lines, vec!["Feed: T", "Link: L"]);
//! ```

mod fetcher;
mod parser;
mod render;
mod types;

pub use fetcher::{build_client, fetch_feed, FetchError, FetchOptions};
pub use parser::{parse, parse_document, ParseError};
pub use render::{render, render_json, render_text};
pub use types::{FeedDocument, FeedItem, OutputFormat};
