//! StateStore: redb-backed state persistence for peerdist.
//!
//! Provides typed operations over prompts, roster snapshots, submission
//! snapshots, distribution records, and review rows. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, info};

use peerdist_core::{CourseId, CourseRoster, Prompt, PromptId, ReviewAssignment, StudentId};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PROMPTS).map_err(map_err!(Table))?;
        txn.open_table(ROSTERS).map_err(map_err!(Table))?;
        txn.open_table(SUBMISSIONS).map_err(map_err!(Table))?;
        txn.open_table(DISTRIBUTIONS).map_err(map_err!(Table))?;
        txn.open_table(REVIEWS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Prompts ────────────────────────────────────────────────────

    /// Insert or update a prompt.
    pub fn put_prompt(&self, prompt: &Prompt) -> StateResult<()> {
        let key = prompt.table_key();
        let value = serde_json::to_vec(prompt).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PROMPTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "prompt stored");
        Ok(())
    }

    /// Get a prompt by ID.
    pub fn get_prompt(&self, prompt_id: PromptId) -> StateResult<Option<Prompt>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PROMPTS).map_err(map_err!(Table))?;
        match table
            .get(prompt_id.to_string().as_str())
            .map_err(map_err!(Read))?
        {
            Some(guard) => {
                let prompt: Prompt =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(prompt))
            }
            None => Ok(None),
        }
    }

    /// List all prompts, ascending by ID.
    pub fn list_prompts(&self) -> StateResult<Vec<Prompt>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PROMPTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let prompt: Prompt =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(prompt);
        }
        // Keys are decimal strings, so table order is not numeric order.
        results.sort_by_key(|p| p.id);
        Ok(results)
    }

    /// Prompts due strictly before `as_of` whose distribution is not complete.
    ///
    /// Both tables are read in one transaction so a concurrent commit is
    /// either fully visible or not at all.
    pub fn list_due_prompts(&self, as_of: u64) -> StateResult<Vec<Prompt>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let prompts = txn.open_table(PROMPTS).map_err(map_err!(Table))?;
        let distributions = txn.open_table(DISTRIBUTIONS).map_err(map_err!(Table))?;

        let mut results = Vec::new();
        for entry in prompts.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let prompt: Prompt =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if !prompt.is_due(as_of) {
                continue;
            }
            let complete = match distributions.get(key.value()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let record: DistributionRecord =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    record.is_complete
                }
                None => false,
            };
            if !complete {
                results.push(prompt);
            }
        }
        results.sort_by_key(|p| p.id);
        Ok(results)
    }

    // ── Rosters ────────────────────────────────────────────────────

    /// Replace the stored roster snapshot of a course.
    pub fn put_roster(&self, roster: &CourseRoster) -> StateResult<()> {
        let key = roster.table_key();
        let value = serde_json::to_vec(roster).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ROSTERS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, students = roster.students.len(), "roster stored");
        Ok(())
    }

    /// Get the stored roster snapshot of a course.
    pub fn get_roster(&self, course_id: CourseId) -> StateResult<Option<CourseRoster>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROSTERS).map_err(map_err!(Table))?;
        match table
            .get(course_id.to_string().as_str())
            .map_err(map_err!(Read))?
        {
            Some(guard) => {
                let roster: CourseRoster =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(roster))
            }
            None => Ok(None),
        }
    }

    // ── Submissions ────────────────────────────────────────────────

    /// Replace the stored submission snapshot of a prompt.
    pub fn put_submissions(&self, set: &SubmissionSet) -> StateResult<()> {
        let key = set.table_key();
        let value = serde_json::to_vec(set).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SUBMISSIONS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, submissions = set.submissions.len(), "submissions stored");
        Ok(())
    }

    /// Get the stored submission snapshot of a prompt.
    pub fn get_submissions(&self, prompt_id: PromptId) -> StateResult<Option<SubmissionSet>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SUBMISSIONS).map_err(map_err!(Table))?;
        match table
            .get(prompt_id.to_string().as_str())
            .map_err(map_err!(Read))?
        {
            Some(guard) => {
                let set: SubmissionSet =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(set))
            }
            None => Ok(None),
        }
    }

    // ── Distributions ──────────────────────────────────────────────

    /// Get the distribution record of a prompt.
    pub fn get_distribution(&self, prompt_id: PromptId) -> StateResult<Option<DistributionRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DISTRIBUTIONS).map_err(map_err!(Table))?;
        match table
            .get(prompt_id.to_string().as_str())
            .map_err(map_err!(Read))?
        {
            Some(guard) => {
                let record: DistributionRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Whether a prompt's distribution has been committed.
    pub fn is_distribution_complete(&self, prompt_id: PromptId) -> StateResult<bool> {
        Ok(self
            .get_distribution(prompt_id)?
            .is_some_and(|record| record.is_complete))
    }

    /// Claim a prompt and write its review plan in one transaction.
    ///
    /// Fails with [`StateError::AlreadyDistributed`] if the prompt was
    /// committed before, in which case nothing is written. Any other error
    /// drops the transaction, leaving neither review rows nor the
    /// completion flag behind.
    pub fn commit_distribution(
        &self,
        prompt_id: PromptId,
        assignment: &ReviewAssignment,
        load: &ReviewLoad,
        completed_at: u64,
    ) -> StateResult<DistributionRecord> {
        let key = prompt_id.to_string();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;

        let already = {
            let table = txn.open_table(DISTRIBUTIONS).map_err(map_err!(Table))?;
            match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let record: DistributionRecord =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    record.is_complete
                }
                None => false,
            }
        };
        if already {
            txn.abort().map_err(map_err!(Transaction))?;
            debug!(prompt_id, "distribution already committed");
            return Err(StateError::AlreadyDistributed(prompt_id));
        }

        let mut total_reviews = 0u32;
        {
            let mut reviews = txn.open_table(REVIEWS).map_err(map_err!(Table))?;
            for (&reviewer_id, submissions) in assignment {
                for &submission_id in submissions {
                    let review = PeerReview {
                        prompt_id,
                        reviewer_id,
                        submission_id,
                        assigned_at: completed_at,
                    };
                    let value = serde_json::to_vec(&review).map_err(map_err!(Serialize))?;
                    reviews
                        .insert(review.table_key().as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    total_reviews += 1;
                }
            }
        }

        let record = DistributionRecord {
            prompt_id,
            is_complete: true,
            distributed_at: completed_at,
            students: assignment.len() as u32,
            total_reviews,
            review_load: load.clone(),
        };
        {
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            let mut table = txn.open_table(DISTRIBUTIONS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;

        info!(prompt_id, total_reviews, "distribution committed");
        Ok(record)
    }

    // ── Reviews ────────────────────────────────────────────────────

    /// All review rows of a prompt.
    pub fn list_reviews_for_prompt(&self, prompt_id: PromptId) -> StateResult<Vec<PeerReview>> {
        self.scan_reviews(&format!("{prompt_id}:"))
    }

    /// Review rows of a prompt assigned to one reviewer.
    pub fn list_reviews_by_reviewer(
        &self,
        prompt_id: PromptId,
        reviewer_id: StudentId,
    ) -> StateResult<Vec<PeerReview>> {
        self.scan_reviews(&format!("{prompt_id}:{reviewer_id}:"))
    }

    /// Number of reviews assigned for a prompt.
    pub fn count_assigned_reviews(&self, prompt_id: PromptId) -> StateResult<usize> {
        Ok(self.list_reviews_for_prompt(prompt_id)?.len())
    }

    fn scan_reviews(&self, prefix: &str) -> StateResult<Vec<PeerReview>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(REVIEWS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let review: PeerReview =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(review);
            }
        }
        results.sort_by_key(|r| (r.reviewer_id, r.submission_id));
        Ok(results)
    }
}
