use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Which hosts a feed URL may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlPolicy {
    /// Any host, including localhost and private networks.
    #[default]
    AnyHost,
    /// Reject localhost, loopback, private, link-local and unspecified addresses.
    PublicOnly,
}

/// Validates a URL string for use as a feed source.
///
/// The scheme must be `http` or `https`. Under [`UrlPolicy::PublicOnly`]
/// the host is also checked against localhost and private IP ranges
/// (RFC 1918, link-local, unique local IPv6).
///
/// # Errors
///
/// Returns [`UrlValidationError`] if:
/// - The URL cannot be parsed ([`UrlValidationError::InvalidUrl`])
/// - The scheme is not `http` or `https` ([`UrlValidationError::UnsupportedScheme`])
/// - The host is localhost ([`UrlValidationError::Localhost`])
/// - The host is a private IP address ([`UrlValidationError::PrivateIp`])
///
/// # Examples
///
/// ```
/// use rss_reader::util::{validate_url, UrlPolicy};
///
/// let url = validate_url("https://example.com/feed.xml", UrlPolicy::PublicOnly).unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("http://localhost/feed", UrlPolicy::AnyHost).is_ok());
/// assert!(validate_url("http://localhost/feed", UrlPolicy::PublicOnly).is_err());
/// assert!(validate_url("file:///etc/passwd", UrlPolicy::AnyHost).is_err());
/// ```
pub fn validate_url(url_str: &str, policy: UrlPolicy) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if policy == UrlPolicy::AnyHost {
        return Ok(url);
    }

    if let Some(host) = url.host_str() {
        if host == "localhost" {
            return Err(UrlValidationError::Localhost);
        }

        // Strip brackets from IPv6 addresses for parsing
        let host_for_parse = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}
