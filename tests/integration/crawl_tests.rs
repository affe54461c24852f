//! End-to-end crawl scenarios: politeness, backoff, robots handling,
//! content filters, and idempotence

use crate::helpers::*;
use spiderdb::crawler::ErrorKind;
use spiderdb::Store;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_string(body.to_string())
}

async fn mount_robots(server: &MockServer, content: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(content.to_string()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_basic_crawl_persists_rows() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html("<html><title>Hi</title></html>"))
        .mount(&server)
        .await;

    let store = new_store();
    let seed = format!("{}/page", server.uri());
    let report = run_crawl_urls(test_config(), store.clone(), vec![seed.clone()]).await;

    assert_eq!(report.inserted, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);

    let stored = store.get_result(&normalized(&seed)).unwrap().unwrap();
    assert_eq!(stored.http_status, 200);
    assert!(stored.body.contains("Hi"));
    assert_eq!(stored.error_kind(), Some(ErrorKind::None));
}

// S1: with a robots.txt crawl delay, same-domain fetches are serialized
// and spaced at least the delay apart
#[tokio::test]
async fn test_crawl_delay_spacing() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nCrawl-delay: 1").await;

    let (responder, times) = RecordingResponder::new(
        ResponseTemplate::new(200).insert_header("content-type", "text/html"),
    );
    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d$"))
        .respond_with(responder)
        .mount(&server)
        .await;

    let store = new_store();
    let seeds: Vec<String> = (1..=3).map(|i| format!("{}/p{}", server.uri(), i)).collect();
    let report = run_crawl_urls(test_config(), store, seeds).await;

    assert_eq!(report.completed, 3);

    let times = times.lock().unwrap().clone();
    assert_eq!(times.len(), 3);
    let gap = min_gap(&times).unwrap();
    assert!(
        gap >= Duration::from_millis(900),
        "inter-fetch gap {:?} violates the crawl delay",
        gap
    );
}

// S2: a 429 with Retry-After blocks the whole domain until the window
// passes; a later success lifts the block
#[tokio::test]
async fn test_429_retry_after_blocks_domain() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    let (first, first_times) = RecordingResponder::new(
        ResponseTemplate::new(429).insert_header("retry-after", "1"),
    );
    // Only the first request to /slow fails; wiremock serves mocks in
    // mount order, so mount the single-use 429 first
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(first)
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let (ok, ok_times) = RecordingResponder::new(
        ResponseTemplate::new(200).insert_header("content-type", "text/html"),
    );
    Mock::given(method("GET"))
        .respond_with(ok)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.threads = 1;

    let store = new_store();
    let mut seeds = vec![format!("{}/slow", server.uri())];
    seeds.extend((1..=3).map(|i| format!("{}/p{}", server.uri(), i)));
    let report = run_crawl_urls(config, store, seeds).await;

    assert_eq!(report.completed, 4);
    assert_eq!(report.failed, 0);

    let blocked_at = first_times.lock().unwrap()[0];
    let ok_times = ok_times.lock().unwrap().clone();
    // Every successful page fetch (the robots fetch happened before the
    // 429) must wait out the Retry-After window
    for t in &ok_times {
        assert!(
            *t >= blocked_at + Duration::from_millis(900),
            "request issued {:?} after the 429, inside the block window",
            *t - blocked_at
        );
    }
}

// S3 (accelerated): persistent 500s exhaust the retry budget and emit a
// failed row; the server sees exactly initial + 5 retries
#[tokio::test]
async fn test_retries_exhausted_on_persistent_500() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    let (responder, count) = CountingResponder::new(ResponseTemplate::new(500));
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(responder)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.threads = 1;
    // Collapse the Fibonacci schedule so the test does not sleep; the
    // schedule itself is pinned by unit tests
    config.max_retry_backoff_seconds = 0;

    let store = new_store();
    let seed = format!("{}/broken", server.uri());
    let report = run_crawl_urls(config, store.clone(), vec![seed.clone()]).await;

    assert_eq!(report.failed, 1);
    assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 6);

    let stored = store.get_result(&normalized(&seed)).unwrap().unwrap();
    assert_eq!(stored.http_status, 500);
    assert_eq!(stored.error_kind(), Some(ErrorKind::HttpServer5xx));
}

// A transient failure recovers within the retry budget
#[tokio::test]
async fn test_transient_500_recovers() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    let responder = FailThenSucceed::new(
        2,
        ResponseTemplate::new(503),
        html("<html>recovered</html>"),
    );
    let served = responder.served.clone();
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(responder)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.max_retry_backoff_seconds = 0;

    let store = new_store();
    let seed = format!("{}/flaky", server.uri());
    let report = run_crawl_urls(config, store.clone(), vec![seed.clone()]).await;

    assert_eq!(report.completed, 1);
    assert_eq!(served.load(std::sync::atomic::Ordering::SeqCst), 3);

    let stored = store.get_result(&normalized(&seed)).unwrap().unwrap();
    assert_eq!(stored.http_status, 200);
    assert!(stored.body.contains("recovered"));
}

// S6: a robots-disallowed URL gets a synthetic row when log_skipped is
// set, and none when it is not
#[tokio::test]
async fn test_robots_disallow_log_skipped() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /private").await;
    Mock::given(method("GET"))
        .respond_with(html("<html>should not be fetched</html>"))
        .mount(&server)
        .await;

    let store = new_store();
    let seed = format!("{}/private/x", server.uri());
    let report = run_crawl_urls(test_config(), store.clone(), vec![seed.clone()]).await;

    assert_eq!(report.skipped, 1);
    assert_eq!(report.completed, 0);

    let stored = store.get_result(&normalized(&seed)).unwrap().unwrap();
    assert_eq!(stored.http_status, -1);
    assert_eq!(stored.error_kind(), Some(ErrorKind::RobotsDisallowed));
    assert!(stored.body.is_empty());
}

#[tokio::test]
async fn test_robots_disallow_suppressed_without_log_skipped() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /private").await;

    let mut config = test_config();
    config.log_skipped = false;

    let store = new_store();
    let seed = format!("{}/private/x", server.uri());
    let report = run_crawl_urls(config, store.clone(), vec![seed]).await;

    assert_eq!(report.skipped, 1);
    assert_eq!(store.count_results().unwrap(), 0);
}

#[tokio::test]
async fn test_permanent_404_not_retried() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    let (responder, count) = CountingResponder::new(ResponseTemplate::new(404));
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(responder)
        .mount(&server)
        .await;

    let store = new_store();
    let seed = format!("{}/gone", server.uri());
    let report = run_crawl_urls(test_config(), store.clone(), vec![seed.clone()]).await;

    assert_eq!(report.failed, 1);
    assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);

    let stored = store.get_result(&normalized(&seed)).unwrap().unwrap();
    assert_eq!(stored.http_status, 404);
    assert_eq!(stored.error_kind(), Some(ErrorKind::HttpClient4xx));
}

#[tokio::test]
async fn test_redirects_resolved_with_count() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/b"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("<html>landed</html>"))
        .mount(&server)
        .await;

    let store = new_store();
    let seed = format!("{}/a", server.uri());
    let report = run_crawl_urls(test_config(), store.clone(), vec![seed.clone()]).await;

    assert_eq!(report.completed, 1);
    let stored = store.get_result(&normalized(&seed)).unwrap().unwrap();
    assert_eq!(stored.http_status, 200);
    assert_eq!(stored.redirect_count, 1);
    assert!(stored.final_url.ends_with("/b"));
}

#[tokio::test]
async fn test_oversized_body_discarded() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(html(&"x".repeat(4096)))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.max_response_bytes = 1024;

    let store = new_store();
    let seed = format!("{}/big", server.uri());
    let report = run_crawl_urls(config, store.clone(), vec![seed.clone()]).await;

    assert_eq!(report.failed, 1);
    let stored = store.get_result(&normalized(&seed)).unwrap().unwrap();
    assert_eq!(stored.error_kind(), Some(ErrorKind::ContentTooLarge));
    assert!(stored.body.is_empty());
}

#[tokio::test]
async fn test_content_type_whitelist() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string("{}"),
        )
        .mount(&server)
        .await;

    let mut config = test_config();
    config.accept_content_types = "text/*".to_string();

    let store = new_store();
    let seed = format!("{}/data.json", server.uri());
    let report = run_crawl_urls(config, store.clone(), vec![seed.clone()]).await;

    assert_eq!(report.failed, 1);
    let stored = store.get_result(&normalized(&seed)).unwrap().unwrap();
    assert_eq!(stored.error_kind(), Some(ErrorKind::ContentTypeRejected));
    assert!(stored.body.is_empty());
}

#[tokio::test]
async fn test_meta_noindex_clears_body() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/hidden"))
        .respond_with(html(
            r#"<html><head><meta name="robots" content="noindex"></head><body>secret</body></html>"#,
        ))
        .mount(&server)
        .await;

    let store = new_store();
    let seed = format!("{}/hidden", server.uri());
    let report = run_crawl_urls(test_config(), store.clone(), vec![seed.clone()]).await;

    assert_eq!(report.completed, 1);
    let stored = store.get_result(&normalized(&seed)).unwrap().unwrap();
    assert_eq!(stored.http_status, 200);
    assert!(stored.body.is_empty());
}

#[tokio::test]
async fn test_link_following_same_domain() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><body>
               <a href="/child">in scope</a>
               <a href="https://elsewhere.test/out">out of scope</a>
               </body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/child"))
        .respond_with(html("<html>child</html>"))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.follow_links = true;

    let store = new_store();
    let report = run_crawl_urls(config, store.clone(), vec![format!("{}/", server.uri())]).await;

    assert_eq!(report.completed, 2);
    let child = normalized(&format!("{}/child", server.uri()));
    assert!(store.get_result(&child).unwrap().is_some());
    assert_eq!(store.count_results().unwrap(), 2);
}

#[tokio::test]
async fn test_recrawl_is_idempotent() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html("<html>stable</html>"))
        .mount(&server)
        .await;

    let store = new_store();
    let seeds = vec![format!("{}/page", server.uri())];

    let first = run_crawl_urls(test_config(), store.clone(), seeds.clone()).await;
    assert_eq!(first.inserted, 1);

    let second = run_crawl_urls(test_config(), store.clone(), seeds).await;
    assert_eq!(second.rows_written(), 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(store.count_results().unwrap(), 1);
}
