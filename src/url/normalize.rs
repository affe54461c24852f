use crate::UrlError;
use url::Url;

/// Query parameters stripped during normalization in addition to the
/// `utm_` prefix family
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "msclkid", "mc_eid"];

/// Normalizes a URL into its canonical crawl form
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or non-HTTP(S)
/// 2. Lowercase the scheme and host (the parser does this)
/// 3. Drop default ports (80 for http, 443 for https)
/// 4. Collapse duplicate slashes and resolve dot segments in the path
/// 5. Percent-decode unreserved characters in the path
/// 6. Remove the fragment
/// 7. Strip tracking query parameters (`utm_*`, `fbclid`, `gclid`, ...)
/// 8. Sort remaining query parameters alphabetically
///
/// Normalizing an already-normalized URL is a fixed point.
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
///
/// # Examples
///
/// ```
/// use spiderdb::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM:80//a//b?b=2&a=1#frag").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/a/b?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    // The url crate already lowercases scheme and host and drops default
    // ports on parse. Path cleanup is ours.
    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let filtered_params = filter_and_sort_query_params(&url);

        if filtered_params.is_empty() {
            url.set_query(None);
        } else {
            let query_string = filtered_params
                .iter()
                .map(|(k, v)| {
                    if v.is_empty() {
                        k.clone()
                    } else {
                        format!("{}={}", k, v)
                    }
                })
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query_string));
        }
    }

    Ok(url)
}

/// Produces the SURT (Sort-friendly URL Reordering Transform) key for a URL
///
/// The hostname is reversed and comma-joined, followed by `)` and the path
/// plus query: `https://www.example.com/a?q=1` becomes
/// `com,example,www)/a?q=1`. A non-default port is kept after the host
/// parts. SURT keys sort related hosts together in storage.
pub fn surt_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    let mut parts: Vec<&str> = host.split('.').collect();
    parts.reverse();
    let mut key = parts.join(",");

    if let Some(port) = url.port() {
        key.push_str(&format!(":{}", port));
    }

    key.push(')');
    key.push_str(url.path());

    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }

    key
}

/// Normalizes a URL path: collapses duplicate slashes, resolves dot
/// segments, and percent-decodes unreserved characters
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut segments: Vec<String> = Vec::new();

    for segment in path.split('/') {
        match segment {
            // Empty segments come from duplicate slashes
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(decode_unreserved(segment)),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", segments.join("/"));

    // Preserve a trailing slash on non-root paths
    if path.ends_with('/') && result.len() > 1 {
        result.push('/');
    }

    result
}

/// Percent-decodes `%XX` escapes that encode unreserved characters
/// (ALPHA / DIGIT / "-" / "." / "_" / "~"); all other escapes are kept
fn decode_unreserved(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = String::with_capacity(segment.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = &segment[i + 1..i + 3];
            if let Ok(value) = u8::from_str_radix(hex, 16) {
                if value.is_ascii_alphanumeric() || matches!(value, b'-' | b'.' | b'_' | b'~') {
                    out.push(value as char);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }

    out
}

/// Filters out tracking parameters and sorts the remainder by key
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_scheme_and_host() {
        let result = normalize_url("HTTPS://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_drop_default_port_http() {
        let result = normalize_url("http://example.com:80/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_drop_default_port_https() {
        let result = normalize_url("https://example.com:443/page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_keep_explicit_port() {
        let result = normalize_url("https://example.com:8443/page").unwrap();
        assert_eq!(result.as_str(), "https://example.com:8443/page");
    }

    #[test]
    fn test_collapse_duplicate_slashes() {
        let result = normalize_url("https://example.com///a//b///c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/a/b/c");
    }

    #[test]
    fn test_dot_segments() {
        let result = normalize_url("https://example.com/a/../b/./c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_strip_utm_params() {
        let result =
            normalize_url("https://example.com/page?utm_source=x&utm_campaign=y").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_strip_click_ids() {
        let result = normalize_url("https://example.com/p?fbclid=abc&gclid=def&keep=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/p?keep=1");
    }

    #[test]
    fn test_sort_query_params() {
        let result = normalize_url("https://example.com/page?b=2&a=1&c=3").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page?a=1&b=2&c=3");
    }

    #[test]
    fn test_percent_decode_unreserved() {
        let result = normalize_url("https://example.com/%61%62%63").unwrap();
        assert_eq!(result.as_str(), "https://example.com/abc");
    }

    #[test]
    fn test_percent_reserved_kept() {
        // %2F is an encoded slash and must stay encoded
        let result = normalize_url("https://example.com/a%2Fb").unwrap();
        assert_eq!(result.as_str(), "https://example.com/a%2Fb");
    }

    #[test]
    fn test_trailing_slash_preserved() {
        let result = normalize_url("https://example.com/dir/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/dir/");
    }

    #[test]
    fn test_empty_path_becomes_root() {
        let result = normalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/file");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let cases = [
            "HTTP://WWW.Example.COM:80//a/../b/?z=1&a=2&utm_source=x#frag",
            "https://example.com/%61?b=&a=1",
            "https://example.com:8080/dir/",
        ];

        for case in cases {
            let once = normalize_url(case).unwrap();
            let twice = normalize_url(once.as_str()).unwrap();
            assert_eq!(once.as_str(), twice.as_str(), "not idempotent: {}", case);
        }
    }

    #[test]
    fn test_surt_key_basic() {
        let url = normalize_url("https://www.example.com/a/b?q=1").unwrap();
        assert_eq!(surt_key(&url), "com,example,www)/a/b?q=1");
    }

    #[test]
    fn test_surt_key_no_query() {
        let url = normalize_url("https://example.com/").unwrap();
        assert_eq!(surt_key(&url), "com,example)/");
    }

    #[test]
    fn test_surt_key_with_port() {
        let url = normalize_url("http://example.com:8080/x").unwrap();
        assert_eq!(surt_key(&url), "com,example:8080)/x");
    }
}
