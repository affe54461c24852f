use crate::UrlResult;
use url::Url;

/// Extracts the authority (host:port) of a URL
///
/// The authority is the unit of politeness: crawl delays, 429 blocks, and
/// parallelism caps are all tracked per authority. Default ports are not
/// included because the parser strips them.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use spiderdb::url::authority;
///
/// let url = Url::parse("https://example.com/path").unwrap();
/// assert_eq!(authority(&url), "example.com");
///
/// let url = Url::parse("http://example.com:8080/").unwrap();
/// assert_eq!(authority(&url), "example.com:8080");
/// ```
pub fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or("").to_lowercase();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}

/// Parses a URL string and returns its authority
pub fn authority_of(url_str: &str) -> UrlResult<String> {
    let url = crate::url::normalize_url(url_str)?;
    Ok(authority(&url))
}
