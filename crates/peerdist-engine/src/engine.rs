//! Distribution engine: decides who reviews what.
//!
//! Students are visited in ascending id order. Each student repeatedly takes
//! the least-reviewed submission that is not their own and not already on
//! their list, until they hold `n` submissions. Ties on load go to the lower
//! submission id, so the result depends only on the input sets.
//!
//! The greedy pass can strand a late student's own submission below the
//! rest (five students, three reviews each ends at loads 4/3/3/3/2). A
//! rebalancing pass then moves single reviews from the most to the least
//! loaded submission until the spread is at most one.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, warn};

use peerdist_core::{
    ReviewAssignment, ReviewLoad, SectionId, Student, StudentId, Submission, SubmissionId,
};

use crate::error::{EngineError, EngineResult, Shortfall};
use crate::load::{LoadTable, index_submissions};

/// The outcome of one engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Distribution {
    /// Student → submissions that student reviews.
    pub assignment: ReviewAssignment,
    /// Submission → number of students reviewing it.
    pub load: ReviewLoad,
}

impl Distribution {
    /// Number of (reviewer, submission) pairs.
    pub fn total_assigned(&self) -> usize {
        self.assignment.values().map(BTreeSet::len).sum()
    }

    /// Sum of all submission loads. Always equals `total_assigned`.
    pub fn total_load(&self) -> usize {
        self.load.values().map(|&l| l as usize).sum()
    }

    /// Difference between the most and least reviewed submission.
    pub fn load_spread(&self) -> u32 {
        let max = self.load.values().max().copied().unwrap_or(0);
        let min = self.load.values().min().copied().unwrap_or(0);
        max - min
    }

    /// Submissions assigned to one student.
    pub fn reviews_for(&self, student_id: StudentId) -> Option<&BTreeSet<SubmissionId>> {
        self.assignment.get(&student_id)
    }

    fn absorb(&mut self, other: Distribution) {
        self.assignment.extend(other.assignment);
        self.load.extend(other.load);
    }
}

/// Assign `n` submissions to every student.
///
/// Fails with [`EngineError::InsufficientCandidates`] naming every student
/// that could not be given `n` eligible submissions; no partial plan is
/// returned.
pub fn distribute(
    students: &[Student],
    submissions: &[Submission],
    n: u32,
) -> EngineResult<Distribution> {
    if n == 0 {
        return Err(EngineError::InvalidReviewCount(n));
    }

    let mut table = LoadTable::new(submissions)?;
    let reviewers: BTreeSet<StudentId> = students.iter().map(|s| s.id).collect();
    let target = n as usize;

    let mut assignment = ReviewAssignment::new();
    let mut shortfalls = Vec::new();

    for reviewer in reviewers {
        let mut taken = BTreeSet::new();
        while taken.len() < target {
            match table.assign_next(reviewer, &taken) {
                Some(submission_id) => {
                    taken.insert(submission_id);
                }
                None => break,
            }
        }

        if taken.len() < target {
            warn!(
                student = reviewer,
                assigned = taken.len(),
                required = n,
                "ran out of eligible submissions"
            );
            shortfalls.push(Shortfall {
                student_id: reviewer,
                assigned: taken.len() as u32,
                required: n,
            });
        }
        assignment.insert(reviewer, taken);
    }

    if !shortfalls.is_empty() {
        return Err(EngineError::InsufficientCandidates { shortfalls });
    }

    let moves = rebalance(&mut table, &mut assignment);

    let distribution = Distribution {
        assignment,
        load: table.into_load(),
    };
    debug!(
        students = distribution.assignment.len(),
        submissions = distribution.load.len(),
        reviews = distribution.total_assigned(),
        spread = distribution.load_spread(),
        moves,
        "distribution computed"
    );
    Ok(distribution)
}

/// Move reviews from the most to the least loaded submission while the
/// spread exceeds one. Returns the number of moves.
///
/// With `hi - lo >= 2`, at most `lo + 1` reviewers of the busiest submission
/// are blocked from taking the idlest one (they already review it, or wrote
/// it), so some reviewer can always switch. Every move lowers the sum of
/// squared loads, which bounds the loop.
fn rebalance(table: &mut LoadTable, assignment: &mut ReviewAssignment) -> usize {
    let mut moves = 0;
    loop {
        let (Some((hi, busiest)), Some((lo, idlest))) =
            (table.most_loaded(), table.least_loaded())
        else {
            return moves;
        };
        if hi <= lo + 1 {
            return moves;
        }

        let author = table.author_of(idlest);
        let switcher = assignment
            .iter_mut()
            .find(|(reviewer, set)| {
                Some(**reviewer) != author && set.contains(&busiest) && !set.contains(&idlest)
            });
        let Some((reviewer, set)) = switcher else {
            warn!(busiest, idlest, "no reviewer can move between submissions");
            return moves;
        };

        set.remove(&busiest);
        set.insert(idlest);
        table.shift(busiest, idlest);
        moves += 1;
        debug!(reviewer = *reviewer, from = busiest, to = idlest, "review moved");
    }
}

/// Assign reviews within sections only.
///
/// Each student belongs to the group of their lowest section id; students
/// without a section share one group. A submission follows its author, and
/// submissions by authors missing from the roster join the unsectioned group.
/// Groups are distributed independently in ascending order and merged.
pub fn distribute_by_section(
    students: &[Student],
    submissions: &[Submission],
    n: u32,
) -> EngineResult<Distribution> {
    if n == 0 {
        return Err(EngineError::InvalidReviewCount(n));
    }
    // Validate across groups: a conflicting id may span two sections.
    index_submissions(submissions)?;

    let mut group_of: BTreeMap<StudentId, Option<SectionId>> = BTreeMap::new();
    let mut groups: BTreeMap<Option<SectionId>, (Vec<Student>, Vec<Submission>)> =
        BTreeMap::new();

    for student in students {
        if group_of.contains_key(&student.id) {
            continue;
        }
        let group = student.primary_section();
        group_of.insert(student.id, group);
        groups.entry(group).or_default().0.push(student.clone());
    }
    for submission in submissions {
        let group = group_of.get(&submission.author_id).copied().flatten();
        groups.entry(group).or_default().1.push(*submission);
    }

    let mut merged = Distribution::default();
    let mut shortfalls = Vec::new();

    for (section, (members, work)) in groups {
        debug!(
            section = ?section,
            students = members.len(),
            submissions = work.len(),
            "distributing section"
        );
        match distribute(&members, &work, n) {
            Ok(part) => merged.absorb(part),
            Err(EngineError::InsufficientCandidates { shortfalls: missing }) => {
                shortfalls.extend(missing);
            }
            Err(other) => return Err(other),
        }
    }

    if !shortfalls.is_empty() {
        return Err(EngineError::InsufficientCandidates { shortfalls });
    }
    Ok(merged)
}
