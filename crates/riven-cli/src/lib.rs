#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! CLI entrypoint for the Riven process.
//!
//! This is the process launcher, not an HTTP client — `riven-app` owns the
//! actual wiring; this crate only parses flags and maps the outcome to a
//! stable set of process exit codes.

use std::path::PathBuf;

use clap::Parser;
use riven_app::AppOptions;

/// Command-line flags accepted by the `riven` binary.
#[derive(Debug, Parser)]
#[command(name = "riven", about = "Media-automation event-driven scheduler")]
pub struct Cli {
    /// Path to the settings file (defaults to `riven.toml` in the working
    /// directory).
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Overrides the configured API bind port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Drops and recreates the database's `public` schema before migrations
    /// run, instead of applying them on top of whatever is already there.
    #[arg(long)]
    pub hard_reset_db: bool,
}

impl From<Cli> for AppOptions {
    fn from(cli: Cli) -> Self {
        Self {
            settings_path: cli.settings,
            port_override: cli.port,
            hard_reset_db: cli.hard_reset_db,
        }
    }
}

/// Parse `argv`, run the application, and return the process exit code
/// (0 clean shutdown, 1 fatal config error, 2 DB unreachable, 3 uncaught
/// panic).
///
/// Runs `riven_app::run_app` on its own task so a panic anywhere in the
/// dispatcher or scheduler surfaces as a `JoinError` here instead of
/// unwinding straight through the process's main thread.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let options: riven_app::AppOptions = cli.into();
    match tokio::spawn(riven_app::run_app(options)).await {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            tracing::error!(error = %err, "riven exited with an error");
            err.exit_code()
        }
        Err(join_err) => {
            tracing::error!(error = %join_err, "riven task ended unexpectedly");
            3
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_into_app_options_carries_overrides() {
        let cli = Cli {
            settings: Some(PathBuf::from("/etc/riven.toml")),
            port: Some(9000),
            hard_reset_db: true,
        };
        let options = AppOptions::from(cli);
        assert_eq!(options.settings_path, Some(PathBuf::from("/etc/riven.toml")));
        assert_eq!(options.port_override, Some(9000));
        assert!(options.hard_reset_db);
    }
}
