//! SITES-mode scenarios: sitemap discovery, the URL filter, the
//! discovery cache, and staleness-driven updates

use crate::helpers::*;
use chrono::{Duration as ChronoDuration, Utc};
use spiderdb::url::{normalize_url, surt_key};
use spiderdb::{PageRecord, Store};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_string(body.to_string())
}

fn urlset(entries: &[(String, String, String)]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0"?><urlset>"#);
    for (loc, lastmod, changefreq) in entries {
        xml.push_str("<url><loc>");
        xml.push_str(loc);
        xml.push_str("</loc>");
        if !lastmod.is_empty() {
            xml.push_str(&format!("<lastmod>{}</lastmod>", lastmod));
        }
        if !changefreq.is_empty() {
            xml.push_str(&format!("<changefreq>{}</changefreq>", changefreq));
        }
        xml.push_str("</url>");
    }
    xml.push_str("</urlset>");
    xml
}

async fn mount_pages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/(product|page)/"))
        .respond_with(html("<html>content</html>"))
        .mount(server)
        .await;
}

// S4: discovery through the bruteforce list, with the url_filter
// restricting what gets fetched while the cache keeps everything
#[tokio::test]
async fn test_sitemap_discovery_with_filter() {
    let server = MockServer::start().await;

    let entries: Vec<(String, String, String)> = (1..=10)
        .map(|i| {
            let path = if i <= 4 {
                format!("{}/product/{}", server.uri(), i)
            } else {
                format!("{}/page/{}", server.uri(), i)
            };
            (path, String::new(), String::new())
        })
        .collect();

    // robots.txt 404s, so discovery probes /sitemap.xml
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&entries)))
        .mount(&server)
        .await;
    mount_pages(&server).await;

    let mut config = test_config();
    config.url_filter = "%/product/%".to_string();

    let store = new_store();
    let report = run_crawl_sites(config, store.clone(), vec![server.uri()]).await;

    assert_eq!(report.completed, 4);
    assert_eq!(store.count_results().unwrap(), 4);

    // The cache holds all ten, filter or not
    let authority = spiderdb::url::authority_of(&server.uri()).unwrap();
    let cached = store.cached_sitemap_urls(&authority, 24).unwrap();
    assert_eq!(cached.len(), 10);
}

#[tokio::test]
async fn test_sitemap_from_robots_directive() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "User-agent: *\nAllow: /\nSitemap: {}/custom-map.xml",
            server.uri()
        )))
        .mount(&server)
        .await;

    let entries = vec![(format!("{}/page/1", server.uri()), String::new(), String::new())];
    Mock::given(method("GET"))
        .and(path("/custom-map.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&entries)))
        .mount(&server)
        .await;
    mount_pages(&server).await;

    let store = new_store();
    let report = run_crawl_sites(test_config(), store.clone(), vec![server.uri()]).await;

    assert_eq!(report.completed, 1);
}

#[tokio::test]
async fn test_sitemap_index_expansion() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<?xml version="1.0"?><sitemapindex>
               <sitemap><loc>{0}/maps/a.xml</loc></sitemap>
               <sitemap><loc>{0}/maps/b.xml</loc></sitemap>
               </sitemapindex>"#,
            server.uri()
        )))
        .mount(&server)
        .await;

    let a = vec![(format!("{}/page/a", server.uri()), String::new(), String::new())];
    let b = vec![(format!("{}/page/b", server.uri()), String::new(), String::new())];
    Mock::given(method("GET"))
        .and(path("/maps/a.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&a)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/maps/b.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&b)))
        .mount(&server)
        .await;
    mount_pages(&server).await;

    let store = new_store();
    let report = run_crawl_sites(test_config(), store.clone(), vec![server.uri()]).await;

    assert_eq!(report.completed, 2);
    assert_eq!(store.count_results().unwrap(), 2);
}

#[tokio::test]
async fn test_discovery_cache_skips_refetch() {
    let server = MockServer::start().await;
    mount_pages(&server).await;

    let store = new_store();
    let authority = spiderdb::url::authority_of(&server.uri()).unwrap();

    // Pre-populate the cache; no sitemap mock exists, so a cache miss
    // would discover nothing
    let cached = vec![spiderdb::sitemap::DiscoveredUrl {
        url: format!("{}/page/cached", server.uri()),
        lastmod: String::new(),
        changefreq: String::new(),
        priority: String::new(),
    }];
    store.replace_sitemap_cache(&authority, &cached).unwrap();

    let report = run_crawl_sites(test_config(), store.clone(), vec![server.uri()]).await;

    assert_eq!(report.completed, 1);
}

// S5: a stale row (sitemap lastmod newer than the stored crawl) is
// updated when update_stale is set, and left alone when it is not
#[tokio::test]
async fn test_staleness_update_path() {
    let server = MockServer::start().await;

    let page_url = format!("{}/page/1", server.uri());
    let lastmod = (Utc::now() - ChronoDuration::days(1)).to_rfc3339();
    let entries = vec![(page_url.clone(), lastmod, String::new())];

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&entries)))
        .mount(&server)
        .await;
    mount_pages(&server).await;

    let store = new_store();

    // Existing row crawled two days ago
    let key = normalize_url(&page_url).unwrap();
    let mut existing = PageRecord::new(key.to_string(), surt_key(&key));
    existing.http_status = 200;
    existing.body = "old body".to_string();
    existing.crawled_at = Utc::now() - ChronoDuration::days(2);
    store.write_batch(&[existing]).unwrap();

    // update_stale = false: the row is unchanged
    let report = run_crawl_sites(test_config(), store.clone(), vec![server.uri()]).await;
    assert_eq!(report.rows_written(), 0);
    let stored = store.get_result(key.as_str()).unwrap().unwrap();
    assert_eq!(stored.body, "old body");

    // update_stale = true: the row is re-fetched and updated
    let mut config = test_config();
    config.update_stale = true;
    let report = run_crawl_sites(config, store.clone(), vec![server.uri()]).await;
    assert_eq!(report.updated, 1);
    assert_eq!(report.inserted, 0);

    let stored = store.get_result(key.as_str()).unwrap().unwrap();
    assert_eq!(stored.body, "<html>content</html>");
    assert_eq!(store.count_results().unwrap(), 1);
}

#[tokio::test]
async fn test_fresh_rows_skipped_even_when_updating() {
    let server = MockServer::start().await;

    let page_url = format!("{}/page/1", server.uri());
    // lastmod well before the stored crawl, weekly window not expired
    let lastmod = (Utc::now() - ChronoDuration::days(30)).to_rfc3339();
    let entries = vec![(page_url.clone(), lastmod, "weekly".to_string())];

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&entries)))
        .mount(&server)
        .await;
    mount_pages(&server).await;

    let store = new_store();
    let key = normalize_url(&page_url).unwrap();
    let mut existing = PageRecord::new(key.to_string(), surt_key(&key));
    existing.http_status = 200;
    existing.crawled_at = Utc::now() - ChronoDuration::days(3);
    store.write_batch(&[existing]).unwrap();

    let mut config = test_config();
    config.update_stale = true;

    let report = run_crawl_sites(config, store.clone(), vec![server.uri()]).await;
    assert_eq!(report.rows_written(), 0);
    assert_eq!(report.skipped, 1);
}
