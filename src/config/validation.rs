//! Configuration validation
//!
//! Checks internal consistency and clamps the few options with hard caps.
//! Validation runs before any crawl starts so that a bad option is a
//! configuration error, not a mid-crawl surprise.

use crate::config::types::{CrawlConfig, MAX_THREADS};
use crate::{ConfigError, ConfigResult};

/// Validates a configuration, clamping cap-bounded values in place
///
/// # Errors
///
/// Returns `ConfigError::Validation` for empty user agent, zero worker or
/// connection counts, inverted delay bounds, or a zero byte cap.
pub fn validate(config: &mut CrawlConfig) -> ConfigResult<()> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent is required and may not be empty".to_string(),
        ));
    }

    if config.threads == 0 {
        return Err(ConfigError::Validation(
            "threads must be at least 1".to_string(),
        ));
    }
    if config.threads > MAX_THREADS {
        tracing::warn!(
            "threads = {} exceeds the cap, clamping to {}",
            config.threads,
            MAX_THREADS
        );
        config.threads = MAX_THREADS;
    }

    if config.max_total_connections == 0 {
        return Err(ConfigError::Validation(
            "max_total_connections must be at least 1".to_string(),
        ));
    }

    if config.max_parallel_per_domain == 0 {
        return Err(ConfigError::Validation(
            "max_parallel_per_domain must be at least 1".to_string(),
        ));
    }

    if config.timeout_seconds == 0 {
        return Err(ConfigError::Validation(
            "timeout_seconds must be at least 1".to_string(),
        ));
    }

    if config.min_crawl_delay < 0.0 {
        return Err(ConfigError::Validation(
            "min_crawl_delay may not be negative".to_string(),
        ));
    }

    if config.min_crawl_delay > config.max_crawl_delay {
        return Err(ConfigError::Validation(format!(
            "min_crawl_delay ({}) exceeds max_crawl_delay ({})",
            config.min_crawl_delay, config.max_crawl_delay
        )));
    }

    if config.max_response_bytes == 0 {
        return Err(ConfigError::Validation(
            "max_response_bytes must be at least 1".to_string(),
        ));
    }

    if config.batch_size == 0 {
        return Err(ConfigError::Validation(
            "batch_size must be at least 1".to_string(),
        ));
    }
    if config.batch_size > 100 {
        tracing::warn!(
            "batch_size = {} exceeds the store contract, clamping to 100",
            config.batch_size
        );
        config.batch_size = 100;
    }

    Ok(())
}
