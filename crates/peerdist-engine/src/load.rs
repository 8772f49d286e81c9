//! Reviewer-load table for distribution.
//!
//! Keeps every submission ordered by `(load, submission id)` so the least
//! reviewed submission is always first, with ties broken by the lower id.
//! Bumping a load re-inserts a single entry instead of re-sorting the table.

use std::collections::{BTreeMap, BTreeSet};

use peerdist_core::{ReviewLoad, StudentId, Submission, SubmissionId};

use crate::error::{EngineError, EngineResult};

/// Index submissions by id, collapsing exact duplicates.
///
/// The same id listed with two different authors is rejected: the
/// self-review check would otherwise depend on which entry came first.
pub fn index_submissions(
    submissions: &[Submission],
) -> EngineResult<BTreeMap<SubmissionId, StudentId>> {
    let mut authors = BTreeMap::new();
    for submission in submissions {
        match authors.insert(submission.id, submission.author_id) {
            Some(previous) if previous != submission.author_id => {
                return Err(EngineError::ConflictingSubmission {
                    submission_id: submission.id,
                    first_author: previous,
                    second_author: submission.author_id,
                });
            }
            _ => {}
        }
    }
    Ok(authors)
}

/// Submissions ordered by current reviewer load.
#[derive(Debug, Clone)]
pub struct LoadTable {
    authors: BTreeMap<SubmissionId, StudentId>,
    loads: ReviewLoad,
    order: BTreeSet<(u32, SubmissionId)>,
}

impl LoadTable {
    /// Build a table with every submission at load zero.
    pub fn new(submissions: &[Submission]) -> EngineResult<Self> {
        let authors = index_submissions(submissions)?;
        let loads: ReviewLoad = authors.keys().map(|&id| (id, 0)).collect();
        let order = authors.keys().map(|&id| (0, id)).collect();
        Ok(Self {
            authors,
            loads,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.loads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loads.is_empty()
    }

    /// Current load of a submission.
    pub fn load(&self, submission_id: SubmissionId) -> Option<u32> {
        self.loads.get(&submission_id).copied()
    }

    /// Least-loaded submission `reviewer` may still take, if any.
    ///
    /// Skips the reviewer's own submissions and anything in `taken`.
    pub fn next_candidate(
        &self,
        reviewer: StudentId,
        taken: &BTreeSet<SubmissionId>,
    ) -> Option<SubmissionId> {
        self.order
            .iter()
            .find(|(_, id)| self.authors.get(id) != Some(&reviewer) && !taken.contains(id))
            .map(|&(_, id)| id)
    }

    /// Pick the next candidate for `reviewer` and charge one review to it.
    pub fn assign_next(
        &mut self,
        reviewer: StudentId,
        taken: &BTreeSet<SubmissionId>,
    ) -> Option<SubmissionId> {
        let id = self.next_candidate(reviewer, taken)?;
        self.bump(id);
        Some(id)
    }

    /// Author of a submission.
    pub fn author_of(&self, submission_id: SubmissionId) -> Option<StudentId> {
        self.authors.get(&submission_id).copied()
    }

    /// `(load, id)` of the least reviewed submission.
    pub fn least_loaded(&self) -> Option<(u32, SubmissionId)> {
        self.order.first().copied()
    }

    /// `(load, id)` of the most reviewed submission.
    pub fn most_loaded(&self) -> Option<(u32, SubmissionId)> {
        self.order.last().copied()
    }

    /// Move one review from `from` to `to`.
    pub fn shift(&mut self, from: SubmissionId, to: SubmissionId) {
        self.adjust(from, |l| l.saturating_sub(1));
        self.adjust(to, |l| l + 1);
    }

    fn bump(&mut self, id: SubmissionId) {
        self.adjust(id, |l| l + 1);
    }

    fn adjust(&mut self, id: SubmissionId, f: impl FnOnce(u32) -> u32) {
        if let Some(load) = self.loads.get_mut(&id) {
            self.order.remove(&(*load, id));
            *load = f(*load);
            self.order.insert((*load, id));
        }
    }

    /// Final per-submission loads.
    pub fn into_load(self) -> ReviewLoad {
        self.loads
    }
}
