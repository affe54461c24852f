/// Matches a string against a SQL LIKE pattern
///
/// Supports the two standard metacharacters: `%` matches any run of
/// characters (including none) and `_` matches exactly one character.
/// Matching is case-insensitive for ASCII, like SQLite's LIKE. An empty
/// pattern matches everything, so an unset `url_filter` is a no-op.
///
/// # Examples
///
/// ```
/// use spiderdb::url::like_match;
///
/// assert!(like_match("%/product/%", "https://shop.test/product/42"));
/// assert!(!like_match("%/product/%", "https://shop.test/about"));
/// assert!(like_match("", "anything"));
/// ```
pub fn like_match(pattern: &str, text: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }

    let pattern: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let text: Vec<char> = text.to_ascii_lowercase().chars().collect();

    matches_at(&pattern, &text)
}

fn matches_at(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('%') => {
            // Try consuming zero or more characters of the text
            for skip in 0..=text.len() {
                if matches_at(&pattern[1..], &text[skip..]) {
                    return true;
                }
            }
            false
        }
        Some('_') => !text.is_empty() && matches_at(&pattern[1..], &text[1..]),
        Some(c) => text.first() == Some(c) && matches_at(&pattern[1..], &text[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pattern_matches_all() {
        assert!(like_match("", ""));
        assert!(like_match("", "https://example.com/"));
    }

    #[test]
    fn test_exact_match() {
        assert!(like_match("abc", "abc"));
        assert!(!like_match("abc", "abcd"));
        assert!(!like_match("abc", "ab"));
    }

    #[test]
    fn test_percent_prefix_and_suffix() {
        assert!(like_match("%/product/%", "https://x.test/product/1"));
        assert!(like_match("%.html", "https://x.test/page.html"));
        assert!(like_match("https://%", "https://x.test/"));
    }

    #[test]
    fn test_percent_matches_empty() {
        assert!(like_match("a%b", "ab"));
        assert!(like_match("%", ""));
    }

    #[test]
    fn test_underscore_single_char() {
        assert!(like_match("a_c", "abc"));
        assert!(!like_match("a_c", "ac"));
        assert!(!like_match("a_c", "abbc"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(like_match("%Product%", "https://x.test/PRODUCT/1"));
    }

    #[test]
    fn test_multiple_percents() {
        assert!(like_match("%a%b%", "xxaxxbxx"));
        assert!(!like_match("%a%b%", "xxbxxaxx"));
    }
}
