#![deny(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Typed configuration model, file/env loading, and startup validation for
//! Riven.
//!
//! Riven's settings are not something the HTTP API edits live; they are a
//! settings file (location configurable), loaded once on startup, layered
//! with `RIVEN_*` environment overrides. [`loader::load`] implements exactly
//! that: a layered `config::Config` read once at process start, with no
//! watcher, LISTEN/NOTIFY, or migration machinery to keep live.

pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::load;
pub use model::{
    ApiConfig, BackoffTier, LibraryConfig, LogFormat, LoggingConfig, PoolSizesConfig,
    RateLimitConfig, RetryConfig, RivenConfig, SchedulerConfig, Seconds, SessionConfig,
    SizeBoundsConfig, StoreConfig, StreamFilterConfig,
};
pub use validate::{validate, validate_all};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_then_validate_roundtrips_defaults_plus_api_key() {
        let mut config = load(None).expect("load defaults");
        config.api.api_key = "test-key".to_string();
        assert!(validate(&config).is_ok());
    }
}
