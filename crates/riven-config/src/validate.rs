//! Startup validation for a loaded [`RivenConfig`].
//!
//! Catches the mistakes that would otherwise surface as confusing runtime
//! failures deep inside the dispatcher: zero-sized worker pools, an empty
//! API key, inverted size bounds, a backoff table that isn't monotonic.

use crate::error::ConfigError;
use crate::model::RivenConfig;

fn invalid(section: &str, field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidField {
        section: section.to_string(),
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Validate `config`, returning the first violation found, if any.
///
/// # Errors
///
/// Returns the first entry from [`validate_all`], if non-empty.
pub fn validate(config: &RivenConfig) -> Result<(), ConfigError> {
    validate_all(config).into_iter().next().map_or(Ok(()), Err)
}

/// Validate `config`, collecting every violation instead of stopping at the
/// first one, so an operator can fix a settings file in one pass.
#[must_use]
pub fn validate_all(config: &RivenConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();

    if config.api.api_key.trim().is_empty() {
        errors.push(invalid("api", "api_key", "must not be empty"));
    }
    if config.api.port == 0 {
        errors.push(invalid("api", "port", "must be a nonzero TCP port"));
    }

    if config.store.database_url.trim().is_empty() {
        errors.push(invalid("store", "database_url", "must not be empty"));
    }
    if config.store.max_connections == 0 {
        errors.push(invalid(
                "store",
                "max_connections",
                "must allow at least one connection",
        ));
    }

    let pools = &config.pools;
    for (field, value) in [
        ("indexer", pools.indexer),
        ("scraping", pools.scraping),
        ("downloader", pools.downloader),
        ("symlinker", pools.symlinker),
        ("updater", pools.updater),
        ("post_processor", pools.post_processor),
    ] {
        if value == 0 {
            errors.push(invalid("pools", field, "pool size must be at least 1"));
        }
    }

    if config.retry.max_attempts < 1 {
        errors.push(invalid(
                "retry",
                "max_attempts",
                "must allow at least one attempt",
        ));
    }
    if config.retry.symlink_attempts == 0 {
        errors.push(invalid(
                "retry",
                "symlink_attempts",
                "must allow at least one attempt",
        ));
    }
    let mut saw_catch_all = false;
    let mut previous_bound = 0;
    for tier in &config.retry.scrape_backoff {
        if let Some(bound) = tier.up_to_attempt {
            if bound < previous_bound {
                errors.push(invalid(
                        "retry",
                        "scrape_backoff",
                        "up_to_attempt values must be non-decreasing",
                ));
            }
            previous_bound = bound;
        } else {
            saw_catch_all = true;
        }
    }
    if !config.retry.scrape_backoff.is_empty() && !saw_catch_all {
        errors.push(invalid(
                "retry",
                "scrape_backoff",
                "must include a catch-all tier with up_to_attempt = null",
        ));
    }

    let filters = &config.stream_filters;
    if filters.movie_size_bounds.min_bytes > filters.movie_size_bounds.max_bytes {
        errors.push(invalid(
                "stream_filters",
                "movie_size_bounds",
                "min_bytes must not exceed max_bytes",
        ));
    }
    if filters.episode_size_bounds.min_bytes > filters.episode_size_bounds.max_bytes {
        errors.push(invalid(
                "stream_filters",
                "episode_size_bounds",
                "min_bytes must not exceed max_bytes",
        ));
    }

    if config.session.ttl_seconds <= 0 {
        errors.push(invalid(
                "session",
                "ttl_seconds",
                "must be a positive duration",
        ));
    }

    if config.scheduler.sweep_batch_limit <= 0 {
        errors.push(invalid(
                "scheduler",
                "sweep_batch_limit",
                "must be a positive row limit",
        ));
    }

    for (backend, limiter) in &config.rate_limits {
        if limiter.burst == 0 {
            errors.push(invalid("rate_limits", backend, "burst must be at least 1"));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_invalid_without_an_api_key() {
        let config = RivenConfig::default();
        let errors = validate_all(&config);
        assert!(errors.iter().any(|e| matches!(
                    e,
                    ConfigError::InvalidField { field,.. } if field == "api_key"
        )));
    }

    #[test]
    fn fully_populated_config_validates() {
        let mut config = RivenConfig::default();
        config.api.api_key = "shared-secret".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let mut config = RivenConfig::default();
        config.api.api_key = "shared-secret".to_string();
        config.pools.scraping = 0;
        let errors = validate_all(&config);
        assert!(errors.iter().any(|e| matches!(
                    e,
                    ConfigError::InvalidField { field,.. } if field == "scraping"
        )));
    }

    #[test]
    fn inverted_size_bounds_are_rejected() {
        let mut config = RivenConfig::default();
        config.api.api_key = "shared-secret".to_string();
        config.stream_filters.movie_size_bounds.min_bytes = 100;
        config.stream_filters.movie_size_bounds.max_bytes = 10;
        let errors = validate_all(&config);
        assert!(errors.iter().any(|e| matches!(
                    e,
                    ConfigError::InvalidField { field,.. } if field == "movie_size_bounds"
        )));
    }

    #[test]
    fn backoff_table_without_catch_all_is_rejected() {
        let mut config = RivenConfig::default();
        config.api.api_key = "shared-secret".to_string();
        config.retry.scrape_backoff = vec![crate::model::BackoffTier {
                up_to_attempt: Some(2),
                delay_seconds: 60,
        }];
        let errors = validate_all(&config);
        assert!(errors.iter().any(|e| matches!(
                    e,
                    ConfigError::InvalidField { field,.. } if field == "scrape_backoff"
        )));
    }
}
