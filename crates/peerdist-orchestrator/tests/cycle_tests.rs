//! Distribution cycle tests against an in-memory store and scripted sources.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::watch;

use peerdist_core::{
    CourseId, CourseRoster, Prompt, PromptId, ReviewAssignment, ReviewLoad, Student, Submission,
};
use peerdist_orchestrator::{
    CommitError, DistributionLedger, Distributor, FailureStage, OrchestratorError, PromptStatus,
    RosterSource, SkipReason,
};
use peerdist_state::StateStore;

// ── Fakes ──────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeSource {
    rosters: BTreeMap<CourseId, CourseRoster>,
    submissions: BTreeMap<PromptId, Vec<Submission>>,
    broken_rosters: BTreeSet<CourseId>,
    broken_submissions: BTreeSet<PromptId>,
    roster_calls: Mutex<Vec<CourseId>>,
    /// Request shutdown while fetching this prompt's submissions.
    stop_at: Option<(PromptId, watch::Sender<bool>)>,
}

impl FakeSource {
    fn course(mut self, course_id: CourseId, students: Vec<Student>) -> Self {
        self.rosters.insert(
            course_id,
            CourseRoster {
                course_id,
                sections: Vec::new(),
                students,
                refreshed_at: 1,
            },
        );
        self
    }

    fn submissions(mut self, prompt_id: PromptId, submissions: Vec<Submission>) -> Self {
        self.submissions.insert(prompt_id, submissions);
        self
    }

    fn roster_calls(&self) -> Vec<CourseId> {
        self.roster_calls.lock().unwrap().clone()
    }
}

impl RosterSource for FakeSource {
    fn fetch_roster(&self, course_id: CourseId) -> anyhow::Result<CourseRoster> {
        self.roster_calls.lock().unwrap().push(course_id);
        if self.broken_rosters.contains(&course_id) {
            return Err(anyhow!("LMS unavailable"));
        }
        self.rosters
            .get(&course_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown course {course_id}"))
    }

    fn fetch_submissions(&self, prompt: &Prompt) -> anyhow::Result<Vec<Submission>> {
        if let Some((stop_id, tx)) = &self.stop_at
            && *stop_id == prompt.id
        {
            tx.send_replace(true);
        }
        if self.broken_submissions.contains(&prompt.id) {
            return Err(anyhow!("submissions endpoint timed out"));
        }
        Ok(self.submissions.get(&prompt.id).cloned().unwrap_or_default())
    }
}

/// Delegates to a store but fails to commit selected prompts.
struct FailingCommits {
    inner: StateStore,
    fail: BTreeSet<PromptId>,
}

impl DistributionLedger for FailingCommits {
    fn due_prompts(&self, as_of: u64) -> anyhow::Result<Vec<Prompt>> {
        self.inner.due_prompts(as_of)
    }

    fn record_roster(&self, roster: &CourseRoster) -> anyhow::Result<()> {
        self.inner.record_roster(roster)
    }

    fn record_submissions(
        &self,
        prompt_id: PromptId,
        submissions: &[Submission],
        refreshed_at: u64,
    ) -> anyhow::Result<()> {
        self.inner
            .record_submissions(prompt_id, submissions, refreshed_at)
    }

    fn commit_distribution(
        &self,
        prompt_id: PromptId,
        assignment: &ReviewAssignment,
        load: &ReviewLoad,
        completed_at: u64,
    ) -> Result<(), CommitError> {
        if self.fail.contains(&prompt_id) {
            return Err(CommitError::Failed("write transaction aborted".into()));
        }
        DistributionLedger::commit_distribution(&self.inner, prompt_id, assignment, load, completed_at)
    }
}

/// Another cycle commits every prompt just before this one does.
struct RacingLedger {
    inner: StateStore,
}

impl DistributionLedger for RacingLedger {
    fn due_prompts(&self, as_of: u64) -> anyhow::Result<Vec<Prompt>> {
        self.inner.due_prompts(as_of)
    }

    fn record_roster(&self, roster: &CourseRoster) -> anyhow::Result<()> {
        self.inner.record_roster(roster)
    }

    fn record_submissions(
        &self,
        prompt_id: PromptId,
        submissions: &[Submission],
        refreshed_at: u64,
    ) -> anyhow::Result<()> {
        self.inner
            .record_submissions(prompt_id, submissions, refreshed_at)
    }

    fn commit_distribution(
        &self,
        prompt_id: PromptId,
        assignment: &ReviewAssignment,
        load: &ReviewLoad,
        completed_at: u64,
    ) -> Result<(), CommitError> {
        DistributionLedger::commit_distribution(&self.inner, prompt_id, assignment, load, completed_at)?;
        DistributionLedger::commit_distribution(&self.inner, prompt_id, assignment, load, completed_at)
    }
}

struct BrokenLedger;

impl DistributionLedger for BrokenLedger {
    fn due_prompts(&self, _as_of: u64) -> anyhow::Result<Vec<Prompt>> {
        Err(anyhow!("database locked"))
    }

    fn record_roster(&self, _roster: &CourseRoster) -> anyhow::Result<()> {
        Ok(())
    }

    fn record_submissions(&self, _: PromptId, _: &[Submission], _: u64) -> anyhow::Result<()> {
        Ok(())
    }

    fn commit_distribution(
        &self,
        _: PromptId,
        _: &ReviewAssignment,
        _: &ReviewLoad,
        _: u64,
    ) -> Result<(), CommitError> {
        Ok(())
    }
}

// ── Helpers ────────────────────────────────────────────────────────

const NOW: u64 = 1_000;

fn prompt(id: PromptId, course_id: CourseId, due: u64) -> Prompt {
    Prompt {
        id,
        course_id,
        title: format!("Essay {id}"),
        due_date: Some(due),
        reviews_per_student: None,
        distribute_by_section: false,
    }
}

fn students(ids: impl IntoIterator<Item = u64>) -> Vec<Student> {
    ids.into_iter().map(Student::new).collect()
}

/// One submission per student, id `base + student`.
fn one_each(base: u64, ids: impl IntoIterator<Item = u64>) -> Vec<Submission> {
    ids.into_iter()
        .map(|s| Submission::new(base + s, s))
        .collect()
}

fn store_with(prompts: &[Prompt]) -> StateStore {
    let store = StateStore::open_in_memory().unwrap();
    for p in prompts {
        store.put_prompt(p).unwrap();
    }
    store
}

fn distributor(source: FakeSource, store: &StateStore) -> (Distributor, Arc<FakeSource>) {
    let source = Arc::new(source);
    let d = Distributor::new(source.clone(), Arc::new(store.clone()), 3);
    (d, source)
}

// ── Tests ──────────────────────────────────────────────────────────

#[test]
fn nothing_due_is_a_noop() {
    let store = store_with(&[prompt(1, 1, NOW + 10)]);
    let (d, source) = distributor(FakeSource::default().course(1, students(1..=5)), &store);

    let report = d.run_cycle(NOW).unwrap();
    assert!(report.is_noop());
    assert!(source.roster_calls().is_empty());
    assert_eq!(store.count_assigned_reviews(1).unwrap(), 0);
}

#[test]
fn due_prompt_is_distributed() {
    let store = store_with(&[prompt(1, 1, NOW - 10)]);
    let source = FakeSource::default()
        .course(1, students(1..=5))
        .submissions(1, one_each(100, 1..=5));
    let (d, _) = distributor(source, &store);

    let report = d.run_cycle(NOW).unwrap();
    assert_eq!(report.distributed(), 1);
    assert_eq!(
        report.outcome(1).unwrap().status,
        PromptStatus::Distributed {
            students: 5,
            reviews: 15
        }
    );

    let record = store.get_distribution(1).unwrap().unwrap();
    assert!(record.is_complete);
    assert_eq!(record.distributed_at, NOW);
    assert!(record.review_load.values().all(|&l| l == 3));

    let reviews = store.list_reviews_for_prompt(1).unwrap();
    assert_eq!(reviews.len(), 15);
    assert!(reviews.iter().all(|r| r.submission_id != 100 + r.reviewer_id));

    assert_eq!(store.get_roster(1).unwrap().unwrap().students.len(), 5);
    assert_eq!(store.get_submissions(1).unwrap().unwrap().submissions.len(), 5);
}

#[test]
fn due_date_equal_to_now_waits() {
    let store = store_with(&[prompt(1, 1, NOW)]);
    let (d, _) = distributor(FakeSource::default().course(1, students(1..=5)), &store);
    assert!(d.run_cycle(NOW).unwrap().is_noop());
}

#[test]
fn second_cycle_is_a_noop() {
    let store = store_with(&[prompt(1, 1, NOW - 10)]);
    let source = FakeSource::default()
        .course(1, students(1..=5))
        .submissions(1, one_each(100, 1..=5));
    let (d, _) = distributor(source, &store);

    assert_eq!(d.run_cycle(NOW).unwrap().distributed(), 1);
    let before = store.list_reviews_for_prompt(1).unwrap();

    let again = d.run_cycle(NOW + 60).unwrap();
    assert!(again.is_noop());
    assert_eq!(store.list_reviews_for_prompt(1).unwrap(), before);
}

#[test]
fn engine_failure_does_not_stop_other_prompts() {
    // Course 2 has two authors, too few for three reviews each.
    let store = store_with(&[prompt(1, 1, NOW - 10), prompt(2, 2, NOW - 10)]);
    let source = FakeSource::default()
        .course(1, students(1..=5))
        .course(2, students([6, 7]))
        .submissions(1, one_each(100, 1..=5))
        .submissions(2, one_each(200, [6, 7]));
    let (d, _) = distributor(source, &store);

    let report = d.run_cycle(NOW).unwrap();
    assert_eq!(report.distributed(), 1);
    assert_eq!(report.failed(), 1);
    match &report.outcome(2).unwrap().status {
        PromptStatus::Failed { stage, reason } => {
            assert_eq!(*stage, FailureStage::Engine);
            assert!(reason.contains('6') && reason.contains('7'), "{reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }

    assert!(store.is_distribution_complete(1).unwrap());
    assert!(!store.is_distribution_complete(2).unwrap());
    assert_eq!(store.count_assigned_reviews(2).unwrap(), 0);

    // The failed prompt is picked up again next time.
    let due: Vec<_> = store.list_due_prompts(NOW).unwrap().iter().map(|p| p.id).collect();
    assert_eq!(due, vec![2]);
}

#[test]
fn submission_fetch_failure_is_isolated() {
    let store = store_with(&[prompt(1, 1, NOW - 10), prompt(2, 1, NOW - 10)]);
    let mut source = FakeSource::default()
        .course(1, students(1..=5))
        .submissions(2, one_each(200, 1..=5));
    source.broken_submissions.insert(1);
    let (d, _) = distributor(source, &store);

    let report = d.run_cycle(NOW).unwrap();
    assert!(matches!(
        report.outcome(1).unwrap().status,
        PromptStatus::Failed {
            stage: FailureStage::Submissions,
            ..
        }
    ));
    assert!(matches!(
        report.outcome(2).unwrap().status,
        PromptStatus::Distributed { .. }
    ));
    assert!(store.get_submissions(1).unwrap().is_none());
}

#[test]
fn roster_is_fetched_once_per_course() {
    let store = store_with(&[
        prompt(3, 2, NOW - 10),
        prompt(1, 1, NOW - 10),
        prompt(2, 1, NOW - 10),
    ]);
    let source = FakeSource::default()
        .course(1, students(1..=4))
        .course(2, students(1..=4))
        .submissions(1, one_each(100, 1..=4))
        .submissions(2, one_each(200, 1..=4))
        .submissions(3, one_each(300, 1..=4));
    let (d, source) = distributor(source, &store);

    let report = d.run_cycle(NOW).unwrap();
    assert_eq!(report.distributed(), 3);
    assert_eq!(source.roster_calls(), vec![1, 2]);

    let order: Vec<_> = report.outcomes.iter().map(|o| o.prompt_id).collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn roster_failure_is_scoped_to_its_course() {
    let store = store_with(&[
        prompt(1, 1, NOW - 10),
        prompt(2, 1, NOW - 10),
        prompt(3, 2, NOW - 10),
    ]);
    let mut source = FakeSource::default()
        .course(2, students(1..=4))
        .submissions(3, one_each(300, 1..=4));
    source.broken_rosters.insert(1);
    let (d, source) = distributor(source, &store);

    let report = d.run_cycle(NOW).unwrap();
    for id in [1, 2] {
        match &report.outcome(id).unwrap().status {
            PromptStatus::Failed { stage, reason } => {
                assert_eq!(*stage, FailureStage::Roster);
                assert!(reason.contains("LMS unavailable"), "{reason}");
            }
            other => panic!("expected roster failure, got {other:?}"),
        }
    }
    assert!(store.is_distribution_complete(3).unwrap());
    // A failed course is not retried within the cycle.
    assert_eq!(source.roster_calls(), vec![1, 2]);
}

#[test]
fn persistence_failure_leaves_no_reviews() {
    let store = store_with(&[prompt(1, 1, NOW - 10), prompt(2, 1, NOW - 10)]);
    let source = Arc::new(
        FakeSource::default()
            .course(1, students(1..=5))
            .submissions(1, one_each(100, 1..=5))
            .submissions(2, one_each(200, 1..=5)),
    );
    let ledger = FailingCommits {
        inner: store.clone(),
        fail: [1].into_iter().collect(),
    };
    let d = Distributor::new(source, Arc::new(ledger), 3);

    let report = d.run_cycle(NOW).unwrap();
    match &report.outcome(1).unwrap().status {
        PromptStatus::Failed { stage, reason } => {
            assert_eq!(*stage, FailureStage::Persist);
            assert!(reason.contains("aborted"));
        }
        other => panic!("expected persist failure, got {other:?}"),
    }
    assert_eq!(store.count_assigned_reviews(1).unwrap(), 0);
    assert!(!store.is_distribution_complete(1).unwrap());
    assert!(store.is_distribution_complete(2).unwrap());
}

#[test]
fn losing_a_commit_race_is_a_skip() {
    let store = store_with(&[prompt(1, 1, NOW - 10)]);
    let source = Arc::new(
        FakeSource::default()
            .course(1, students(1..=5))
            .submissions(1, one_each(100, 1..=5)),
    );
    let d = Distributor::new(source, Arc::new(RacingLedger { inner: store.clone() }), 3);

    let report = d.run_cycle(NOW).unwrap();
    assert_eq!(report.failed(), 0);
    assert_eq!(
        report.outcome(1).unwrap().status,
        PromptStatus::Skipped {
            reason: SkipReason::AlreadyDistributed
        }
    );
    // Only the winner's rows exist.
    assert_eq!(store.count_assigned_reviews(1).unwrap(), 15);
}

#[test]
fn listing_failure_aborts_the_cycle() {
    let d = Distributor::new(Arc::new(FakeSource::default()), Arc::new(BrokenLedger), 3);
    let err = d.run_cycle(NOW).unwrap_err();
    assert!(matches!(err, OrchestratorError::DuePrompts(_)));
    assert!(err.to_string().contains("database locked"));
}

#[test]
fn shutdown_stops_between_prompts() {
    let store = store_with(&[
        prompt(1, 1, NOW - 10),
        prompt(2, 1, NOW - 10),
        prompt(3, 1, NOW - 10),
    ]);
    let (tx, rx) = watch::channel(false);
    let mut source = FakeSource::default()
        .course(1, students(1..=4))
        .submissions(1, one_each(100, 1..=4))
        .submissions(2, one_each(200, 1..=4))
        .submissions(3, one_each(300, 1..=4));
    source.stop_at = Some((2, tx));
    let (d, _) = distributor(source, &store);

    let report = d.run_cycle_until(NOW, &rx).unwrap();
    assert!(report.cancelled);
    // The prompt in flight finishes; the next one is left alone.
    assert_eq!(report.distributed(), 2);
    assert!(report.outcome(3).is_none());
    assert!(store.is_distribution_complete(2).unwrap());
    assert!(!store.is_distribution_complete(3).unwrap());
}

#[test]
fn prompt_review_count_overrides_default() {
    let mut p = prompt(1, 1, NOW - 10);
    p.reviews_per_student = Some(2);
    let store = store_with(&[p]);
    let source = FakeSource::default()
        .course(1, students(1..=4))
        .submissions(1, one_each(100, 1..=4));
    let (d, _) = distributor(source, &store);

    let report = d.run_cycle(NOW).unwrap();
    assert_eq!(
        report.outcome(1).unwrap().status,
        PromptStatus::Distributed {
            students: 4,
            reviews: 8
        }
    );
    for reviewer in 1..=4 {
        assert_eq!(store.list_reviews_by_reviewer(1, reviewer).unwrap().len(), 2);
    }
}

#[test]
fn sectioned_prompt_keeps_reviews_in_section() {
    let mut p = prompt(1, 1, NOW - 10);
    p.distribute_by_section = true;
    p.reviews_per_student = Some(2);
    let store = store_with(&[p]);

    let roster: Vec<Student> = (1..=6)
        .map(|s| Student::in_sections(s, [if s <= 3 { 10 } else { 20 }]))
        .collect();
    let source = FakeSource::default()
        .course(1, roster)
        .submissions(1, one_each(100, 1..=6));
    let (d, _) = distributor(source, &store);

    let report = d.run_cycle(NOW).unwrap();
    assert_eq!(report.distributed(), 1);
    for review in store.list_reviews_for_prompt(1).unwrap() {
        let author = review.submission_id - 100;
        assert_eq!(review.reviewer_id <= 3, author <= 3, "{review:?}");
        assert_ne!(review.reviewer_id, author);
    }
}

#[tokio::test]
async fn run_loop_distributes_until_shutdown() {
    let store = store_with(&[prompt(1, 1, 1)]);
    let source = FakeSource::default()
        .course(1, students(1..=5))
        .submissions(1, one_each(100, 1..=5));
    let (d, _) = distributor(source, &store);
    let d = Arc::new(d);

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(d.run(Duration::from_millis(10), rx));

    let mut done = false;
    for _ in 0..200 {
        if store.is_distribution_complete(1).unwrap() {
            done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(done, "run loop never distributed the due prompt");

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(store.count_assigned_reviews(1).unwrap(), 15);
}
