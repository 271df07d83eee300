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
#![allow(clippy::multiple_crate_versions)]

//! Event Queue, Dispatcher, Pipeline Handlers, Scheduler and Manual Session
//! Manager (C6-C10): the orchestration core of Riven.
//!
//! [`queue`] is the priority Event Queue (C6). [`context`] is the shared
//! handle every job and handler receives instead of reaching for a
//! singleton. [`pipeline`] holds the per-service handlers (C8).
//! [`dispatcher`] is the worker-pool loop that pops due events, calls the
//! state machine, runs the matching handler, and commits the result (C7).
//! [`scheduler`] runs the periodic jobs that feed the queue (C9).
//! [`session`] is the manual override session manager (C10).

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod fsops;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
pub mod session;
pub mod streams;

pub use context::Context;
pub use dispatcher::{BackoffTier, Dispatcher, PoolSizes, RetryLimits};
pub use error::{DispatchError, DispatchResult};
pub use fsops::Fsops;
pub use pipeline::HandlerOutcome;
pub use queue::EventQueue;
pub use scheduler::Scheduler;
pub use session::{SessionError, SessionManager, SessionResult};
pub use streams::{SizeBounds, StreamFilterConfig, StreamRegistry};
