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
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Typed contracts for Riven's external collaborators (C4) plus the clock
//! and rate limiter (C1).
//!
//! Concrete scraper/downloader/updater/content-source backends are
//! intentionally not implemented here — only the traits, DTOs, and shared
//! primitives every real adapter would plug into.

pub mod clock;
pub mod error;
pub mod model;
pub mod rate_limit;
pub mod registry;
pub mod service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ServiceError, ServiceResult};
pub use rate_limit::{RateLimitConfig, TokenBucketLimiter};
pub use registry::ServiceRegistry;
pub use service::{
    ContentSource, Downloader, Indexer, PostProcessor, Scraper, ServiceDescriptor, Updater,
};
