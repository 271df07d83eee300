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

//! Domain model, pure state machine and stream ranking contracts for Riven.
//!
//! This crate has no IO. It defines the shapes every other crate in the
//! workspace shares (`riven-store`, `riven-dispatch`, `riven-services`) and the
//! pure decision functions (`state_machine::next_action`, `ranker`) that those
//! crates invoke against data they themselves fetch and persist.

pub mod error;
pub mod model;
pub mod ranker;
pub mod retry;
pub mod state_machine;

pub use error::{PipelineError, PipelineResult};
pub use model::{
    BlacklistEntry, BlacklistReason, Event, EventSource, ItemKind, MediaItem, Session,
    SessionState, ShowStatus, State, Stream,
};
pub use ranker::{RankContext, RankDecision, Ranker};
pub use state_machine::{NextAction, ServiceKind, next_action};
