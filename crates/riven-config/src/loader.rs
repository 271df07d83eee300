//! Loads a [`RivenConfig`] from a settings file plus `RIVEN_*` environment
//! overrides.
//!
//! # Design
//! - File format is TOML, found at a configurable path (default
//! `riven.toml` in the working directory); missing is not an error, the
//! built-in [`RivenConfig::default`] values stand in.
//! - Every field can be overridden by an environment variable named
//! `RIVEN_<SECTION>__<FIELD>` (double underscore nests), following the
//! `config` crate's `Environment` source convention.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::RivenConfig;

const ENV_PREFIX: &str = "RIVEN";
const DEFAULT_SETTINGS_PATH: &str = "riven.toml";

/// Load configuration from `path` (or the default settings file location if
/// `None`), applying `RIVEN_*` environment overrides on top.
///
/// # Errors
///
/// Returns [`ConfigError::Load`] if the file is present but malformed, an
/// environment override can't be coerced to its field's type, or the merged
/// document doesn't deserialize into [`RivenConfig`].
pub fn load(path: Option<&Path>) -> ConfigResult<RivenConfig> {
    let settings_path = path
    .map(Path::to_path_buf)
    .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    debug!(path = %settings_path.display(), "loading riven settings");

    let builder = Config::builder()
    .add_source(
        File::from(settings_path)
        .format(FileFormat::Toml)
        .required(false),
    )
    .add_source(
        Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true),
    );

    let config = builder
    .build()
    .map_err(|source| ConfigError::Load { source })?;

    config
    .try_deserialize::<RivenConfig>()
    .map_err(|source| ConfigError::Load { source })
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_settings_file_yields_defaults() {
        let loaded = load(Some(Path::new("/nonexistent/riven.toml"))).expect("defaults load");
        assert_eq!(loaded.api.port, RivenConfig::default().api.port);
    }

    #[test]
    fn settings_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[api]\nport = 9999\napi_key = \"secret\"").expect("write");
        let loaded = load(Some(file.path())).expect("load");
        assert_eq!(loaded.api.port, 9999);
        assert_eq!(loaded.api.api_key, "secret");
    }

    #[test]
    fn env_override_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[api]\nport = 9999").expect("write");
        // SAFETY: test runs single-threaded w.r.t. this variable and restores it.
        unsafe {
            std::env::set_var("RIVEN_API__PORT", "7777");
        }
        let loaded = load(Some(file.path())).expect("load");
        unsafe {
            std::env::remove_var("RIVEN_API__PORT");
        }
        assert_eq!(loaded.api.port, 7777);
    }
}
