//! Crawl configuration: the option surface, TOML loading, and validation

mod types;
mod validation;

pub use types::CrawlConfig;
pub use validation::validate;

use crate::ConfigResult;
use std::path::Path;

/// Loads and validates a configuration from a TOML file
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use spiderdb::config::load_config;
///
/// let config = load_config(Path::new("crawl.toml")).unwrap();
/// println!("User agent: {}", config.user_agent);
/// ```
pub fn load_config(path: &Path) -> ConfigResult<CrawlConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config: CrawlConfig = toml::from_str(&content)?;
    validate(&mut config)?;
    Ok(config)
}
