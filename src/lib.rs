//! Command-line RSS reader.
//!
//! Fetches one RSS 2.0 feed and prints its channel and item metadata either
//! as readable text lines or as a JSON document. The parser in [`feed`] is a
//! pure function over the XML text and can be used without any networking.

pub mod app;
pub mod config;
pub mod feed;
pub mod util;
