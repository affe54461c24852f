//! HTTP transport collaborator
//!
//! The crawler depends on the `Transport` trait; `HttpTransport` is the
//! provided implementation on top of a blocking reqwest client. Redirects
//! are followed manually so the response can report the hop count and so
//! loops are detected. Transport-level failures return `status <= 0` with
//! the error populated; the scheduler treats them as retryable.

use crate::config::CrawlConfig;
use crate::crawler::outcome::ErrorKind;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::collections::HashSet;
use std::io::Read;
use std::time::{Duration, Instant};

/// Maximum redirect hops before giving up
const MAX_REDIRECTS: u32 = 10;

/// A single fetch request
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub timeout: Duration,
    pub max_bytes: u64,
}

/// The transport's answer for one fetch
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    /// HTTP status, or <= 0 for a transport-level failure
    pub status: i32,

    /// Response body, truncated at the byte cap
    pub body: Vec<u8>,

    /// Content-Type header value
    pub content_type: String,

    /// URL that produced the final response
    pub final_url: String,

    /// Redirect hops taken
    pub redirect_count: u32,

    /// Wall-clock fetch time
    pub elapsed_ms: i64,

    /// ETag header value
    pub etag: String,

    /// Last-Modified header value
    pub last_modified: String,

    /// Date header value
    pub server_date: String,

    /// Retry-After header value (from 429/503 responses)
    pub retry_after: String,

    /// Error description for transport-level failures
    pub error: String,

    /// Error class hint for transport-level failures
    pub error_kind: ErrorKind,

    /// True when the body hit the byte cap and was cut off
    pub truncated: bool,
}

impl FetchResponse {
    fn failure(url: &str, error: String, kind: ErrorKind, elapsed_ms: i64) -> Self {
        Self {
            status: 0,
            final_url: url.to_string(),
            elapsed_ms,
            error,
            error_kind: kind,
            ..Default::default()
        }
    }
}

/// HTTP transport contract
pub trait Transport: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> FetchResponse;
}

/// Blocking reqwest-backed transport
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds the transport from the crawl configuration
    pub fn new(config: &CrawlConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            // Redirects are followed manually for hop counting and loop
            // detection
            .redirect(Policy::none())
            .gzip(config.compress)
            .brotli(config.compress)
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, request: &FetchRequest) -> FetchResponse {
        let start = Instant::now();
        let mut current_url = request.url.to_string();
        let mut visited: HashSet<String> = HashSet::new();
        let mut redirect_count: u32 = 0;

        loop {
            if !visited.insert(current_url.clone()) {
                return FetchResponse::failure(
                    &current_url,
                    format!("Redirect loop detected at {}", current_url),
                    ErrorKind::RedirectLoop,
                    elapsed_ms(start),
                );
            }

            if redirect_count > MAX_REDIRECTS {
                return FetchResponse::failure(
                    &current_url,
                    format!("Too many redirects (max {})", MAX_REDIRECTS),
                    ErrorKind::RedirectLoop,
                    elapsed_ms(start),
                );
            }

            let response = match self
                .client
                .get(&current_url)
                .timeout(request.timeout)
                .send()
            {
                Ok(response) => response,
                Err(e) => {
                    let (error, kind) = classify_reqwest_error(&e);
                    return FetchResponse::failure(&current_url, error, kind, elapsed_ms(start));
                }
            };

            let status = response.status();

            if status.is_redirection() {
                match redirect_target(&current_url, &response) {
                    Some(next) => {
                        tracing::debug!("Following redirect {} -> {}", current_url, next);
                        current_url = next;
                        redirect_count += 1;
                        continue;
                    }
                    None => {
                        return FetchResponse::failure(
                            &current_url,
                            "Redirect response without usable Location header".to_string(),
                            ErrorKind::RedirectLoop,
                            elapsed_ms(start),
                        );
                    }
                }
            }

            return read_response(response, request, redirect_count, start);
        }
    }
}

/// Resolves the Location header of a redirect response
fn redirect_target(current_url: &str, response: &reqwest::blocking::Response) -> Option<String> {
    let location = response.headers().get("location")?.to_str().ok()?;
    let base = url::Url::parse(current_url).ok()?;
    let resolved = base.join(location).ok()?;
    Some(resolved.to_string())
}

/// Drains a non-redirect response into a FetchResponse, enforcing the
/// byte cap by truncating the stream
fn read_response(
    response: reqwest::blocking::Response,
    request: &FetchRequest,
    redirect_count: u32,
    start: Instant,
) -> FetchResponse {
    let status = response.status();
    let final_url = response.url().to_string();

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };

    let content_type = header("content-type");
    let etag = header("etag");
    let last_modified = header("last-modified");
    let server_date = header("date");
    let retry_after = header("retry-after");

    // Read at most max_bytes + 1 so truncation is detectable without
    // buffering an unbounded body
    let mut body = Vec::new();
    let mut truncated = false;
    let mut reader = response.take(request.max_bytes + 1);

    if let Err(e) = reader.read_to_end(&mut body) {
        return FetchResponse::failure(
            &final_url,
            format!("Failed to read response body: {}", e),
            ErrorKind::NetworkConnection,
            elapsed_ms(start),
        );
    }

    if body.len() as u64 > request.max_bytes {
        body.truncate(request.max_bytes as usize);
        truncated = true;
    }

    FetchResponse {
        status: status.as_u16() as i32,
        body,
        content_type,
        final_url,
        redirect_count,
        elapsed_ms: elapsed_ms(start),
        etag,
        last_modified,
        server_date,
        retry_after,
        error: String::new(),
        error_kind: ErrorKind::None,
        truncated,
    }
}

fn elapsed_ms(start: Instant) -> i64 {
    start.elapsed().as_millis() as i64
}

/// Maps a reqwest error onto the transport failure taxonomy
fn classify_reqwest_error(e: &reqwest::Error) -> (String, ErrorKind) {
    if e.is_timeout() {
        return ("Request timeout".to_string(), ErrorKind::NetworkTimeout);
    }

    // Inspect the full error chain: reqwest wraps DNS and TLS failures
    // inside connect errors
    let chain = error_chain_text(e);

    if chain.contains("dns") || chain.contains("name or service not known") {
        return (e.to_string(), ErrorKind::NetworkDns);
    }

    if chain.contains("tls") || chain.contains("ssl") || chain.contains("certificate") {
        return (e.to_string(), ErrorKind::NetworkTls);
    }

    if e.is_connect() {
        return (e.to_string(), ErrorKind::NetworkConnection);
    }

    if let Some(status) = e.status() {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return (e.to_string(), ErrorKind::HttpRateLimited);
        }
    }

    (e.to_string(), ErrorKind::NetworkConnection)
}

fn error_chain_text(e: &reqwest::Error) -> String {
    let mut text = e.to_string().to_lowercase();
    let mut source = std::error::Error::source(e);
    while let Some(inner) = source {
        text.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }
    text
}
