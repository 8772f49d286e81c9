//! peerdist-state: embedded state store for peerdist.
//!
//! Backed by [redb](https://docs.rs/redb), holds prompts, roster and
//! submission snapshots, committed distributions, and the individual
//! review rows those distributions produce.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{prompt_id}:{reviewer_id}:{submission_id}`) enable
//! prefix scans for related records.
//!
//! `commit_distribution` is the only multi-table write: it checks the
//! prompt's completion flag and writes the plan in a single transaction,
//! so a prompt is never distributed twice and never half-distributed.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
