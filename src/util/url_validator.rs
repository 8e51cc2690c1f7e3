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
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// A bearer token would travel over plain HTTP to a remote host.
    #[error("Insecure endpoint: HTTPS required (except localhost for testing)")]
    InsecureEndpoint,
}

/// Validates a feed URL before it is fetched.
///
/// Only `http` and `https` URLs with a host are accepted. Alert feeds are
/// public documents, so no host restrictions apply beyond that.
///
/// # Examples
///
/// ```
/// use alertsync::util::validate_feed_url;
///
/// let url = validate_feed_url("https://www.google.com/alerts/feeds/1/2").unwrap();
/// assert_eq!(url.host_str(), Some("www.google.com"));
///
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// assert!(validate_feed_url("").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;
    check_scheme(&url)?;
    Ok(url)
}

/// Validates the record store endpoint that receives the bearer token.
///
/// SEC-002: HTTPS is mandatory, except for `localhost` and `127.0.0.1`
/// which are allowed over HTTP so tests can point at a local mock server.
pub fn validate_endpoint(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;
    check_scheme(&url)?;

    if url.scheme() == "http" {
        let is_localhost = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"));
        if !is_localhost {
            return Err(UrlValidationError::InsecureEndpoint);
        }
        tracing::warn!(endpoint = %url, "Using non-HTTPS store endpoint (localhost only)");
    }

    Ok(url)
}

fn check_scheme(url: &Url) -> Result<(), UrlValidationError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }
    Ok(())
}
