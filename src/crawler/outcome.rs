//! Fetch outcome classification and the error taxonomy

/// Error class recorded with every result row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorKind {
    #[default]
    None,
    NetworkTimeout,
    NetworkDns,
    NetworkConnection,
    NetworkTls,
    HttpClient4xx,
    HttpServer5xx,
    HttpRateLimited,
    RobotsDisallowed,
    ContentTooLarge,
    ContentTypeRejected,
    RedirectLoop,
    ParseError,
    Interrupted,
}

impl ErrorKind {
    /// Converts the error kind to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::NetworkTimeout => "NETWORK_TIMEOUT",
            Self::NetworkDns => "NETWORK_DNS",
            Self::NetworkConnection => "NETWORK_CONNECTION",
            Self::NetworkTls => "NETWORK_TLS",
            Self::HttpClient4xx => "HTTP_CLIENT_4XX",
            Self::HttpServer5xx => "HTTP_SERVER_5XX",
            Self::HttpRateLimited => "HTTP_RATE_LIMITED",
            Self::RobotsDisallowed => "ROBOTS_DISALLOWED",
            Self::ContentTooLarge => "CONTENT_TOO_LARGE",
            Self::ContentTypeRejected => "CONTENT_TYPE_REJECTED",
            Self::RedirectLoop => "REDIRECT_LOOP",
            Self::ParseError => "PARSE_ERROR",
            Self::Interrupted => "INTERRUPTED",
        }
    }

    /// Parses an error kind from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(Self::None),
            "NETWORK_TIMEOUT" => Some(Self::NetworkTimeout),
            "NETWORK_DNS" => Some(Self::NetworkDns),
            "NETWORK_CONNECTION" => Some(Self::NetworkConnection),
            "NETWORK_TLS" => Some(Self::NetworkTls),
            "HTTP_CLIENT_4XX" => Some(Self::HttpClient4xx),
            "HTTP_SERVER_5XX" => Some(Self::HttpServer5xx),
            "HTTP_RATE_LIMITED" => Some(Self::HttpRateLimited),
            "ROBOTS_DISALLOWED" => Some(Self::RobotsDisallowed),
            "CONTENT_TOO_LARGE" => Some(Self::ContentTooLarge),
            "CONTENT_TYPE_REJECTED" => Some(Self::ContentTypeRejected),
            "REDIRECT_LOOP" => Some(Self::RedirectLoop),
            "PARSE_ERROR" => Some(Self::ParseError),
            "INTERRUPTED" => Some(Self::Interrupted),
            _ => None,
        }
    }
}

/// What the scheduler does with a fetch outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Record the response
    Success,

    /// Back off the domain and re-queue the URL
    Retryable,

    /// Record the failure; do not retry
    Permanent,
}

/// Classifies an HTTP (or transport) status
///
/// Retryable: 408, 425, 429, 500-504, and transport-level failures
/// (status <= 0). Success: 2xx and 3xx (redirects already resolved by the
/// transport), including 304. Everything else is permanent.
pub fn classify_status(status: i32) -> Disposition {
    if status <= 0 {
        return Disposition::Retryable;
    }

    match status {
        408 | 425 | 429 => Disposition::Retryable,
        500..=504 => Disposition::Retryable,
        200..=399 => Disposition::Success,
        _ => Disposition::Permanent,
    }
}

/// The error class for an HTTP status, for rows emitted on failure
pub fn error_kind_for_status(status: i32) -> ErrorKind {
    match status {
        429 => ErrorKind::HttpRateLimited,
        s if (400..500).contains(&s) => ErrorKind::HttpClient4xx,
        s if (500..600).contains(&s) => ErrorKind::HttpServer5xx,
        _ => ErrorKind::None,
    }
}

/// Matches a content type against a comma-separated pattern list
///
/// Patterns may end in `/*` to match a whole major type ("text/*"). The
/// content type is compared without its parameters ("; charset=...").
/// An empty list matches nothing.
pub fn content_type_in_list(list: &str, content_type: &str) -> bool {
    let ct = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    list.split(',')
        .map(|p| p.trim().to_ascii_lowercase())
        .filter(|p| !p.is_empty())
        .any(|p| match p.strip_suffix("/*") {
            Some(major) => ct.split('/').next() == Some(major),
            None => ct == p,
        })
}

/// Applies the accept whitelist and reject blacklist to a content type
///
/// An empty accept list accepts everything; the reject list is applied
/// afterwards either way.
pub fn content_type_allowed(accept: &str, reject: &str, content_type: &str) -> bool {
    if !accept.trim().is_empty() && !content_type_in_list(accept, content_type) {
        return false;
    }
    !content_type_in_list(reject, content_type)
}
