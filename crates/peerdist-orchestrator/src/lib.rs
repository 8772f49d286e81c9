//! peerdist-orchestrator: runs review distribution for due prompts.
//!
//! Finds prompts whose due date has passed and whose distribution is not
//! complete, refreshes each course roster once, then distributes every
//! prompt on its own: a failing prompt is reported and skipped, never
//! allowed to stop the others.
//!
//! # Architecture
//!
//! ```text
//! Distributor
//!   ├── DistributionLedger (due prompts, snapshots, atomic commit)
//!   │     └── StateStore (redb)
//!   ├── RosterSource (course rosters, prompt submissions)
//!   │     └── FileRosterSource (LMS export directory)
//!   └── peerdist-engine (pure assignment)
//! ```
//!
//! Two cycles racing on the same prompt both may compute a plan, but only
//! one commit succeeds; the other sees the completion flag inside its own
//! write transaction and reports the prompt as skipped.

pub mod distributor;
pub mod error;
pub mod report;
pub mod source;

pub use distributor::{Distributor, epoch_secs};
pub use error::{CommitError, OrchestratorError, OrchestratorResult};
pub use report::{CycleReport, FailureStage, PromptOutcome, PromptStatus, SkipReason};
pub use source::{DistributionLedger, FileRosterSource, RosterSource};
