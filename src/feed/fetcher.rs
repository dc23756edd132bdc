use encoding_rs::{Encoding, UTF_8};
use futures::StreamExt;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::util::{validate_url, UrlPolicy, UrlValidationError};

/// Errors that can occur while retrieving a feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The source is not an acceptable feed URL
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),
    /// Response body exceeded the configured size limit
    #[error("Response too large (limit {0} bytes)")]
    ResponseTooLarge(usize),
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Limits applied to a single feed download.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_size: usize,
    pub url_policy: UrlPolicy,
}

impl FetchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.request_timeout_secs),
            max_size: config.max_feed_size_bytes,
            url_policy: if config.block_private_hosts {
                UrlPolicy::PublicOnly
            } else {
                UrlPolicy::AnyHost
            },
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Builds the HTTP client used for feed requests.
pub fn build_client(config: &Config) -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .build()?;
    Ok(client)
}

/// Downloads a feed document and returns its body as text.
///
/// Issues exactly one GET request. There are no retries; any failure is
/// returned to the caller.
///
/// # Arguments
///
/// * `client` - HTTP client (see [`build_client`])
/// * `url` - Feed URL, must be `http` or `https`
/// * `options` - Timeout, body size limit and URL policy
///
/// # Errors
///
/// - [`FetchError::InvalidUrl`] - URL failed validation
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::Timeout`] - Request exceeded `options.timeout`
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::ResponseTooLarge`] - Body exceeded `options.max_size`
/// - [`FetchError::IncompleteResponse`] - Body shorter than its Content-Length
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    options: &FetchOptions,
) -> Result<String, FetchError> {
    let url = validate_url(url, options.url_policy)?;

    tracing::debug!(url = %url, "Fetching feed");

    let (bytes, charset) =
        tokio::time::timeout(options.timeout, download(client, &url, options.max_size))
            .await
            .map_err(|_| FetchError::Timeout(options.timeout.as_secs()))??;

    tracing::debug!(url = %url, bytes = bytes.len(), "Feed downloaded");

    Ok(decode_body(&bytes, charset.as_deref(), url.as_str()))
}

/// Returns the body and the `charset` parameter of its Content-Type, if any.
async fn download(
    client: &reqwest::Client,
    url: &url::Url,
    max_size: usize,
) -> Result<(Vec<u8>, Option<String>), FetchError> {
    let response = client.get(url.clone()).send().await?;

    // 4xx and 5xx fail immediately; nothing is retried
    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let charset = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(charset_param);

    let bytes = read_limited_bytes(response, max_size).await?;
    Ok((bytes, charset))
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Decodes a response body into text.
///
/// The encoding comes from, in order: a byte-order mark, the `encoding` of
/// the XML declaration, the Content-Type `charset`, then UTF-8. Unknown
/// labels fall through to the next source. Invalid sequences are replaced
/// rather than rejected.
fn decode_body(bytes: &[u8], charset: Option<&str>, url: &str) -> String {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| declared_encoding(bytes))
        .or_else(|| charset.and_then(|label| Encoding::for_label(label.as_bytes())))
        .unwrap_or(UTF_8);

    let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
    if had_errors {
        tracing::warn!(
            url = %url,
            encoding = encoding.name(),
            "Feed body has invalid byte sequences, replaced"
        );
    }
    text.into_owned()
}

/// The encoding named by a leading `<?xml ... encoding="..."?>` declaration.
fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let mut reader = Reader::from_reader(bytes);
    match reader.read_event() {
        Ok(Event::Decl(decl)) => {
            let label = decl.encoding()?.ok()?;
            Encoding::for_label(&label)
        }
        _ => None,
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for completeness check
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test</title>
    <item><title>Test item</title></item>
</channel></rss>"#;

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let body = fetch_feed(
            &client,
            &format!("{}/feed", mock_server.uri()),
            &FetchOptions::default(),
        )
        .await
        .expect("Fetch should succeed");

        assert_eq!(body, VALID_RSS);
    }

    #[tokio::test]
    async fn test_fetch_sends_configured_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "test-agent/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = Config {
            user_agent: "test-agent/1.0".to_string(),
            ..Config::default()
        };
        let client = build_client(&config).unwrap();
        let result = fetch_feed(
            &client,
            &mock_server.uri(),
            &FetchOptions::from_config(&config),
        )
        .await;
        assert!(result.is_ok(), "{:?}", result.err());
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_feed(&client, &mock_server.uri(), &FetchOptions::default()).await;
        match result.unwrap_err() {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_feed(&client, &mock_server.uri(), &FetchOptions::default()).await;
        match result.unwrap_err() {
            FetchError::HttpStatus(500) => {}
            e => panic!("Expected HttpStatus(500), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_response_too_large() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&mock_server)
            .await;

        let options = FetchOptions {
            max_size: 1024,
            ..FetchOptions::default()
        };
        let client = reqwest::Client::new();
        let result = fetch_feed(&client, &mock_server.uri(), &options).await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge(1024))));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let options = FetchOptions {
            timeout: Duration::from_millis(200),
            ..FetchOptions::default()
        };
        let client = reqwest::Client::new();
        let result = fetch_feed(&client, &mock_server.uri(), &options).await;
        assert!(matches!(result, Err(FetchError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_fetch_rejects_unsupported_scheme() {
        let client = reqwest::Client::new();
        let result = fetch_feed(&client, "file:///etc/passwd", &FetchOptions::default()).await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_fetch_public_only_rejects_mock_server() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(0)
            .mount(&mock_server)
            .await;

        let options = FetchOptions {
            url_policy: UrlPolicy::PublicOnly,
            ..FetchOptions::default()
        };
        let client = reqwest::Client::new();
        let result = fetch_feed(&client, &mock_server.uri(), &options).await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }

    const URL: &str = "https://example.com";

    #[test]
    fn test_decode_body_strips_bom() {
        let body = b"\xEF\xBB\xBF<rss/>";
        assert_eq!(decode_body(body, None, URL), "<rss/>");
    }

    #[test]
    fn test_decode_body_replaces_invalid_utf8() {
        let body = b"<rss>\xFF</rss>";
        assert_eq!(decode_body(body, None, URL), "<rss>\u{fffd}</rss>");
    }

    #[test]
    fn test_decode_body_uses_declared_latin1() {
        let body = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\
<rss><channel><title>Caf\xE9</title><link>L</link></channel></rss>";

        let text = decode_body(body, None, URL);
        let lines = crate::feed::parse(&text, None, crate::feed::OutputFormat::Text).unwrap();
        assert_eq!(lines, vec!["Feed: Caf\u{e9}", "Link: L"]);
    }

    #[test]
    fn test_decode_body_declaration_wins_over_charset() {
        let body = b"<?xml version=\"1.0\" encoding=\"windows-1252\"?><rss>\x80</rss>";
        assert!(decode_body(body, Some("utf-8"), URL).contains("<rss>\u{20ac}</rss>"));
    }

    #[test]
    fn test_decode_body_falls_back_to_charset() {
        // "Привет" in windows-1251
        let body = b"<rss>\xCF\xF0\xE8\xE2\xE5\xF2</rss>";
        assert_eq!(decode_body(body, Some("windows-1251"), URL), "<rss>Привет</rss>");
    }

    #[test]
    fn test_decode_body_unknown_label_falls_back_to_utf8() {
        let body = "<?xml version=\"1.0\" encoding=\"x-made-up\"?><rss>é</rss>".as_bytes();
        assert!(decode_body(body, Some("also-bogus"), URL).ends_with("<rss>é</rss>"));
    }

    #[test]
    fn test_charset_param() {
        assert_eq!(
            charset_param("application/rss+xml; charset=ISO-8859-1").as_deref(),
            Some("ISO-8859-1")
        );
        assert_eq!(
            charset_param("text/xml;Charset=\"utf-8\"").as_deref(),
            Some("utf-8")
        );
        assert_eq!(charset_param("application/xml"), None);
    }

    #[tokio::test]
    async fn test_fetch_decodes_content_type_charset() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"<rss><channel><title>\xCF\xF0\xE8\xE2\xE5\xF2</title></channel></rss>".to_vec())
                    .insert_header("Content-Type", "application/rss+xml; charset=windows-1251"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let body = fetch_feed(&client, &mock_server.uri(), &FetchOptions::default())
            .await
            .unwrap();
        assert!(body.contains("<title>Привет</title>"), "{body}");
    }
}
