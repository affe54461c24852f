//! Integration tests
//!
//! These tests run the crawler end-to-end against wiremock servers. The
//! crawler itself is synchronous, so each crawl runs inside
//! `spawn_blocking` while the mock server serves from the async runtime.

mod crawl_tests;
mod helpers;
mod sitemap_tests;
