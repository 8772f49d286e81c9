//! peerdist distribution engine: load-balanced peer-review assignment.
//!
//! Given a course roster and the submissions for one prompt, the engine
//! decides which submissions each student reviews. It performs no I/O and
//! keeps no state between calls: the same input always yields the same
//! plan, which the orchestrator then persists.
//!
//! # Components
//!
//! - **`load`**: Ordered reviewer-load table (least-reviewed first)
//! - **`engine`**: Greedy assignment, whole-course and per-section
//! - **`error`**: Engine errors, including per-student shortfalls

pub mod engine;
pub mod error;
pub mod load;

pub use engine::{Distribution, distribute, distribute_by_section};
pub use error::{EngineError, EngineResult, Shortfall};
pub use load::LoadTable;
