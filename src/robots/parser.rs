//! Robots.txt parser implementation
//!
//! Parsing rules:
//! - Directive keys are case-insensitive; values are trimmed; `#` starts a
//!   comment that runs to end of line
//! - Consecutive `User-agent:` lines before any rule accumulate into one
//!   group; the first rule directive closes the group
//! - `Crawl-delay:` takes a non-negative decimal; malformed values are
//!   dropped, not rejected
//! - `Request-rate: n/m` (n requests per m seconds) is stored as m/n
//!   seconds per request
//! - `Sitemap:` is global, not tied to the current group

use std::collections::HashMap;

/// Rules for a single user-agent group
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    /// Crawl-delay directive in seconds, if present
    pub crawl_delay: Option<f64>,

    /// Seconds per request derived from a Request-rate directive
    pub request_rate: Option<f64>,

    /// Allow path prefixes
    pub allow: Vec<String>,

    /// Disallow path prefixes
    pub disallow: Vec<String>,
}

impl RobotsRules {
    /// True if the site specified either a crawl delay or a request rate
    pub fn has_crawl_delay(&self) -> bool {
        self.crawl_delay.is_some() || self.request_rate.is_some()
    }

    /// The effective delay in seconds: the stricter (larger) of the
    /// crawl-delay and request-rate values when both are present
    pub fn effective_delay(&self) -> Option<f64> {
        match (self.crawl_delay, self.request_rate) {
            (Some(cd), Some(rr)) => Some(cd.max(rr)),
            (Some(cd), None) => Some(cd),
            (None, Some(rr)) => Some(rr),
            (None, None) => None,
        }
    }

    /// Decides whether a path is allowed under these rules
    ///
    /// The longest matching `Allow` rule wins over any `Disallow`;
    /// otherwise the longest matching `Disallow` denies; otherwise the
    /// path is allowed. A trailing `$` anchors a rule to the exact end of
    /// the path. Empty rule values are ignored.
    pub fn is_allowed(&self, path: &str) -> bool {
        let best_allow = longest_match(&self.allow, path);
        let best_disallow = longest_match(&self.disallow, path);

        match (best_allow, best_disallow) {
            (Some(a), Some(d)) => a >= d,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => true,
        }
    }
}

/// Returns the length of the longest rule matching the path, if any
fn longest_match(rules: &[String], path: &str) -> Option<usize> {
    let mut best: Option<usize> = None;

    for rule in rules {
        if rule.is_empty() {
            continue;
        }

        let (prefix, anchored) = match rule.strip_suffix('$') {
            Some(p) => (p, true),
            None => (rule.as_str(), false),
        };

        let matched = if anchored {
            path == prefix
        } else {
            path.starts_with(prefix)
        };

        if matched && best.map_or(true, |b| prefix.len() > b) {
            best = Some(prefix.len());
        }
    }

    best
}

/// Parsed robots.txt content: rule groups keyed by lowercased user-agent,
/// plus the global list of sitemap URLs
#[derive(Debug, Clone, Default)]
pub struct RobotsData {
    groups: HashMap<String, RobotsRules>,
    /// Sitemap URLs declared anywhere in the file
    pub sitemaps: Vec<String>,
}

impl RobotsData {
    /// Selects the rules for a user-agent
    ///
    /// Selection order: exact match on the lowercased UA string, then the
    /// longest group name that prefixes the UA string, then `*`, then
    /// empty rules (allow all).
    pub fn rules_for(&self, user_agent: &str) -> RobotsRules {
        let ua = user_agent.to_lowercase();

        if let Some(rules) = self.groups.get(&ua) {
            return rules.clone();
        }

        let mut best: Option<(&String, &RobotsRules)> = None;
        for (name, rules) in &self.groups {
            if name != "*" && ua.starts_with(name.as_str()) {
                if best.map_or(true, |(b, _)| name.len() > b.len()) {
                    best = Some((name, rules));
                }
            }
        }
        if let Some((_, rules)) = best {
            return rules.clone();
        }

        if let Some(rules) = self.groups.get("*") {
            return rules.clone();
        }

        RobotsRules::default()
    }

    #[cfg(test)]
    fn group(&self, name: &str) -> Option<&RobotsRules> {
        self.groups.get(name)
    }
}

/// Parses robots.txt content
///
/// Unknown directives and malformed numeric values are ignored; parsing
/// never fails.
pub fn parse(content: &str) -> RobotsData {
    let mut data = RobotsData::default();

    // User-agent names of the group currently being built. `in_group`
    // distinguishes "accumulating UA lines" from "rules seen".
    let mut current_agents: Vec<String> = Vec::new();
    let mut in_group = false;

    for raw_line in content.lines() {
        let line = match raw_line.find('#') {
            Some(pos) => &raw_line[..pos],
            None => raw_line,
        };
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if value.is_empty() {
                    continue;
                }
                if in_group {
                    // A rule closed the previous group; this UA starts a
                    // new one
                    current_agents.clear();
                    in_group = false;
                }
                let ua = value.to_lowercase();
                data.groups.entry(ua.clone()).or_default();
                current_agents.push(ua);
            }
            "crawl-delay" => {
                in_group = true;
                if let Ok(delay) = value.parse::<f64>() {
                    if delay >= 0.0 {
                        for ua in &current_agents {
                            if let Some(rules) = data.groups.get_mut(ua) {
                                rules.crawl_delay = Some(delay);
                            }
                        }
                    }
                }
            }
            "request-rate" => {
                in_group = true;
                if let Some((n, m)) = value.split_once('/') {
                    if let (Ok(n), Ok(m)) = (n.trim().parse::<f64>(), m.trim().parse::<f64>()) {
                        if n > 0.0 && m > 0.0 {
                            for ua in &current_agents {
                                if let Some(rules) = data.groups.get_mut(ua) {
                                    rules.request_rate = Some(m / n);
                                }
                            }
                        }
                    }
                }
            }
            "allow" => {
                in_group = true;
                if !value.is_empty() {
                    for ua in &current_agents {
                        if let Some(rules) = data.groups.get_mut(ua) {
                            rules.allow.push(value.to_string());
                        }
                    }
                }
            }
            "disallow" => {
                in_group = true;
                if !value.is_empty() {
                    for ua in &current_agents {
                        if let Some(rules) = data.groups.get_mut(ua) {
                            rules.disallow.push(value.to_string());
                        }
                    }
                }
            }
            "sitemap" => {
                // Global directive; the value is a URL and may itself
                // contain a colon, which split_once already preserved
                if !value.is_empty() {
                    data.sitemaps.push(value.to_string());
                }
            }
            _ => {}
        }
    }

    data
}
