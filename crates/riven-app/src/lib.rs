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

//! Riven application bootstrap wiring.
//!
//! Loads and validates configuration, connects the Postgres pool, and wires
//! the Store, Service Registry, Stream Registry, Event Queue, Event Bus and
//! Fsops into a [`riven_dispatch::Context`] shared by the Dispatcher (C7)
//! and Scheduler (C9), then runs both to completion or a shutdown signal.

pub mod bootstrap;
pub mod error;

pub use bootstrap::{AppOptions, run_app};
pub use error::{AppError, AppResult};
