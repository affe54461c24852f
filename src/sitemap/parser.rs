//! Sitemap XML parser
//!
//! The parser is a tolerant tag scanner rather than a strict XML reader:
//! real-world sitemaps are frequently malformed and a bad entry must never
//! abort a crawl. Gzip payloads are detected by magic bytes and
//! decompressed transparently.

use flate2::read::GzDecoder;
use std::io::Read;

/// One `<url>` entry from a sitemap
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SitemapEntry {
    /// The page URL from `<loc>`
    pub loc: String,

    /// Last modification date from `<lastmod>`, empty if absent
    pub lastmod: String,

    /// Change frequency from `<changefreq>`, empty if absent
    pub changefreq: String,

    /// Priority from `<priority>`, empty if absent
    pub priority: String,
}

/// Parsed sitemap content
#[derive(Debug, Clone, Default)]
pub struct SitemapData {
    /// URL entries (populated for a plain url set)
    pub urls: Vec<SitemapEntry>,

    /// Nested sitemap URLs (populated for a sitemap index)
    pub nested: Vec<String>,

    /// True if the document root is `<sitemapindex>`
    pub is_index: bool,
}

impl SitemapData {
    /// True if parsing produced neither URLs nor nested sitemaps
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty() && self.nested.is_empty()
    }
}

/// Parses sitemap bytes into entries or nested sitemap references
///
/// Gzip content (magic bytes `1f 8b`) is decompressed first. A document
/// with a `<sitemapindex>` root yields `nested` URLs; anything else is
/// treated as a url set. Recovery from malformed XML is best-effort.
pub fn parse(bytes: &[u8]) -> SitemapData {
    let text = decode_bytes(bytes);
    parse_text(&text)
}

/// Decompresses gzip content when the magic bytes are present
fn decode_bytes(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::new();
        if decoder.read_to_end(&mut out).is_ok() {
            return String::from_utf8_lossy(&out).into_owned();
        }
        tracing::warn!("Failed to decompress gzip sitemap, treating as empty");
        return String::new();
    }
    String::from_utf8_lossy(bytes).into_owned()
}

fn parse_text(xml: &str) -> SitemapData {
    let mut data = SitemapData::default();

    if find_open_tag(xml, "sitemapindex", 0).is_some() {
        data.is_index = true;
        for block in find_blocks(xml, "sitemap") {
            if let Some(loc) = extract_tag(block, "loc") {
                data.nested.push(loc);
            }
        }
    } else {
        for block in find_blocks(xml, "url") {
            let Some(loc) = extract_tag(block, "loc") else {
                continue;
            };
            data.urls.push(SitemapEntry {
                loc,
                lastmod: extract_tag(block, "lastmod").unwrap_or_default(),
                changefreq: extract_tag(block, "changefreq").unwrap_or_default(),
                priority: extract_tag(block, "priority").unwrap_or_default(),
            });
        }
    }

    data
}

/// Finds an opening `<tag>` (or `<tag ...>` with attributes) at or after
/// `from`, returning the byte offset just past the closing `>`
fn find_open_tag(xml: &str, tag: &str, from: usize) -> Option<usize> {
    let needle = format!("<{}", tag);
    let mut pos = from;

    while let Some(found) = xml[pos..].find(&needle) {
        let start = pos + found;
        let after = start + needle.len();

        // Require the tag name to end here, so "<sitemap" does not match
        // "<sitemapindex"
        match xml[after..].chars().next() {
            Some('>') => return Some(after + 1),
            Some(c) if c.is_whitespace() => {
                return xml[after..].find('>').map(|g| after + g + 1);
            }
            _ => pos = after,
        }
    }

    None
}

/// Yields the content between each `<tag>`/`</tag>` pair
fn find_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let close = format!("</{}>", tag);
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(content_start) = find_open_tag(xml, tag, pos) {
        let Some(end) = xml[content_start..].find(&close) else {
            break;
        };
        blocks.push(&xml[content_start..content_start + end]);
        pos = content_start + end + close.len();
    }

    blocks
}

/// Extracts and trims the text content of the first `<tag>` in a block
fn extract_tag(block: &str, tag: &str) -> Option<String> {
    let close = format!("</{}>", tag);
    let start = find_open_tag(block, tag, 0)?;
    let end = block[start..].find(&close)?;
    let content = block[start..start + end].trim();

    if content.is_empty() {
        None
    } else {
        Some(unescape_xml(content))
    }
}

/// Resolves the XML entities that commonly appear in `<loc>` values
fn unescape_xml(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}
