//! End-to-end flow: fetch one feed, parse it, hand back the output lines.
//!
//! Everything below this layer reports its own error type. [`run`] folds all
//! of them into a single [`UnhandledError`] so the binary has one failure
//! path and never prints partial output.

use anyhow::Context;
use std::fmt;
use thiserror::Error;

use crate::config::Config;
use crate::feed::{self, FetchOptions, OutputFormat};

/// Catch-all error for anything that stops a run.
///
/// `Display` shows the whole cause chain on one line; `Debug` uses the
/// multi-line `Caused by:` report, which is what `main` prints on exit.
#[derive(Error)]
#[error("{inner:#}")]
pub struct UnhandledError {
    inner: anyhow::Error,
}

impl UnhandledError {
    /// The underlying error, for callers that need to inspect the cause.
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }
}

impl From<anyhow::Error> for UnhandledError {
    fn from(inner: anyhow::Error) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for UnhandledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.inner)
    }
}

/// One invocation: which feed to read and how to render it.
#[derive(Debug, Clone)]
pub struct Request {
    pub source: String,
    pub format: OutputFormat,
    /// Item limit from the command line; falls back to `Config::default_limit`.
    pub limit: Option<i64>,
}

/// Fetches `request.source` and renders it.
///
/// # Errors
///
/// Any failure (invalid URL, network, HTTP status, malformed XML) is
/// returned as an [`UnhandledError`]; no lines are produced in that case.
pub async fn run(config: &Config, request: &Request) -> Result<Vec<String>, UnhandledError> {
    execute(config, request).await.map_err(|e| {
        tracing::debug!(source = %request.source, error = %e, "Run failed");
        UnhandledError::from(e)
    })
}

async fn execute(config: &Config, request: &Request) -> anyhow::Result<Vec<String>> {
    let limit = request.limit.or(config.default_limit);
    if let Some(n) = limit {
        if n < 0 {
            tracing::warn!(limit = n, "Negative limit, no items will be shown");
        }
    }

    let client = feed::build_client(config).context("Failed to create HTTP client")?;
    let xml = feed::fetch_feed(&client, &request.source, &FetchOptions::from_config(config))
        .await
        .with_context(|| format!("Failed to fetch feed: {}", request.source))?;

    let lines = feed::parse(&xml, limit, request.format)
        .with_context(|| format!("Failed to parse feed: {}", request.source))?;

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FetchError, ParseError};

    #[test]
    fn test_unhandled_error_display_includes_chain() {
        let err = UnhandledError::from(
            anyhow::Error::new(ParseError::MissingChannel).context("Failed to parse feed: x"),
        );
        let msg = err.to_string();
        assert!(msg.contains("Failed to parse feed: x"), "{msg}");
        assert!(msg.contains("no <channel>"), "{msg}");
    }

    #[test]
    fn test_unhandled_error_debug_reports_cause() {
        let err = UnhandledError::from(
            anyhow::Error::new(FetchError::HttpStatus(503)).context("Failed to fetch feed: x"),
        );
        let debug = format!("{:?}", err);
        assert!(debug.contains("Caused by"), "{debug}");
        assert!(debug.contains("503"), "{debug}");
    }

    #[test]
    fn test_unhandled_error_keeps_source_type() {
        let err = UnhandledError::from(anyhow::Error::new(ParseError::MissingChannel));
        assert!(err.inner().downcast_ref::<ParseError>().is_some());
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_source() {
        let request = Request {
            source: "not a url".to_string(),
            format: OutputFormat::Text,
            limit: None,
        };
        let err = run(&Config::default(), &request).await.unwrap_err();
        assert!(err.inner().downcast_ref::<FetchError>().is_some());
    }
}
