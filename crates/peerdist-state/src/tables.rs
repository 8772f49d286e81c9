//! redb table definitions for the peerdist state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Prompts keyed by `{prompt_id}`.
pub const PROMPTS: TableDefinition<&str, &[u8]> = TableDefinition::new("prompts");

/// Course roster snapshots keyed by `{course_id}`.
pub const ROSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("rosters");

/// Submission snapshots keyed by `{prompt_id}`.
pub const SUBMISSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("submissions");

/// Distribution records keyed by `{prompt_id}`.
pub const DISTRIBUTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("distributions");

/// Assigned reviews keyed by `{prompt_id}:{reviewer_id}:{submission_id}`.
pub const REVIEWS: TableDefinition<&str, &[u8]> = TableDefinition::new("reviews");
