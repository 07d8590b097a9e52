//! Fan-in of progress and completion reports from a fixed set of runs.
//!
//! Both aggregators are built for an a-priori-known number of runs. Every
//! reporting run takes the group lock, records its latest value, and the
//! downstream sink is invoked while that lock is still held, so the sequence
//! of combined values observed downstream is strictly ordered. The flip side
//! is that downstream sinks must not re-enter the same aggregator: the lock
//! is not reentrant.
//!
//! Known tradeoffs, inherited deliberately:
//!
//! - Combined progress divides by the full expected count from the first
//!   report on, so it is understated until every run has reported at least
//!   once.
//! - If fewer than the expected number of distinct runs ever report
//!   completion, the downstream completion sink never fires. There is no
//!   timeout.

use crate::runner::{DoneFn, ProgressFn, RunId};
use crate::step::Outcome;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Downstream sink for combined progress: `(runs seen so far, combined)`.
pub type GroupProgressFn = Arc<dyn Fn(&BTreeSet<RunId>, f64) + Send + Sync>;

/// Downstream sink for combined completion: `(all runs, their outcomes)`.
pub type GroupDoneFn<T> = Arc<dyn Fn(&BTreeSet<RunId>, Vec<Outcome<T>>) + Send + Sync>;

/// Combines progress reports from a fixed number of runs into one metric.
///
/// Cheap to clone; clones share the same group state.
pub struct ProgressAggregator {
    inner: Arc<ProgressInner>,
}

struct ProgressInner {
    expected: usize,
    downstream: GroupProgressFn,
    latest: Mutex<BTreeMap<RunId, u8>>,
}

impl ProgressAggregator {
    /// Create a group expecting `expected` reporting runs.
    ///
    /// `expected` must be non-zero; a zero-sized group has no defined
    /// combined progress.
    #[must_use]
    pub fn new(
        downstream: impl Fn(&BTreeSet<RunId>, f64) + Send + Sync + 'static,
        expected: usize,
    ) -> Self {
        debug_assert!(expected > 0, "progress group needs at least one run");
        Self {
            inner: Arc::new(ProgressInner {
                expected,
                downstream: Arc::new(downstream),
                latest: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Record `percent` as `source`'s latest progress and fire downstream.
    ///
    /// Inserts or overwrites under the group lock, computes the sum of all
    /// recorded percentages divided by the expected count, and invokes the
    /// downstream sink with the set of runs seen so far and the combined
    /// value, still under the lock.
    pub fn report(&self, source: RunId, percent: u8) {
        let mut latest = self
            .inner
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        latest.insert(source, percent);
        let combined =
            latest.values().map(|p| f64::from(*p)).sum::<f64>() / self.inner.expected as f64;
        let seen: BTreeSet<RunId> = latest.keys().copied().collect();
        (self.inner.downstream)(&seen, combined);
    }

    /// Progress callback that reports into this group, for wiring into a
    /// run's [`RunCallbacks`](crate::runner::RunCallbacks).
    #[must_use]
    pub fn callback(&self) -> ProgressFn {
        let group = self.clone();
        Arc::new(move |run, percent| group.report(run, percent))
    }
}

impl Clone for ProgressAggregator {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Combines completion reports from a fixed number of runs into one
/// downstream notification.
///
/// The downstream sink fires exactly when the group's map reaches the
/// expected size after an insertion, and never again: a duplicate report
/// from the same run overwrites its previous outcome instead of counting
/// twice. Cheap to clone; clones share the same group state.
pub struct CompletionAggregator<T> {
    inner: Arc<CompletionInner<T>>,
}

struct CompletionInner<T> {
    expected: usize,
    downstream: GroupDoneFn<T>,
    finished: Mutex<BTreeMap<RunId, Outcome<T>>>,
}

impl<T> CompletionAggregator<T> {
    /// Create a group expecting `expected` reporting runs.
    #[must_use]
    pub fn new(
        downstream: impl Fn(&BTreeSet<RunId>, Vec<Outcome<T>>) + Send + Sync + 'static,
        expected: usize,
    ) -> Self {
        debug_assert!(expected > 0, "completion group needs at least one run");
        Self {
            inner: Arc::new(CompletionInner {
                expected,
                downstream: Arc::new(downstream),
                finished: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Record `source`'s outcome; fire downstream iff the group is complete.
    ///
    /// The downstream sink receives the outcomes in run-id order and is
    /// invoked under the group lock. If fewer than the expected number of
    /// distinct runs ever report, it never fires.
    pub fn report(&self, source: RunId, outcome: Outcome<T>)
    where
        T: Clone,
    {
        let mut finished = self
            .inner
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        finished.insert(source, outcome);
        if finished.len() == self.inner.expected {
            let seen: BTreeSet<RunId> = finished.keys().copied().collect();
            let outcomes: Vec<Outcome<T>> = finished.values().cloned().collect();
            debug!(runs = seen.len(), "completion group finished");
            (self.inner.downstream)(&seen, outcomes);
        }
    }

    /// Done callback that reports into this group, for wiring into a run's
    /// [`RunCallbacks`](crate::runner::RunCallbacks).
    #[must_use]
    pub fn callback(&self) -> DoneFn<T>
    where
        T: Clone + Send + 'static,
    {
        let group = self.clone();
        Arc::new(move |run, outcome| group.report(run, outcome))
    }
}

impl<T> Clone for CompletionAggregator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::MutexGuard;

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[test]
    fn combined_progress_climbs_as_sources_report() {
        let observed: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        let group = ProgressAggregator::new(
            move |_, combined| lock(&sink).push(combined),
            3,
        );

        let (a, b, c) = (RunId::new(), RunId::new(), RunId::new());
        group.report(a, 0);
        group.report(b, 0);
        group.report(c, 0);
        group.report(a, 100);
        group.report(b, 100);
        group.report(c, 100);

        let observed = lock(&observed);
        let expected = [0.0, 0.0, 0.0, 33.33, 66.67, 100.0];
        assert_eq!(observed.len(), expected.len());
        for (got, want) in observed.iter().zip(expected) {
            assert!((got - want).abs() < 0.01, "expected {want}, got {got}");
        }
    }

    #[test]
    fn progress_reports_carry_the_set_of_runs_seen_so_far() {
        let sizes: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sizes);
        let group = ProgressAggregator::new(move |seen, _| lock(&sink).push(seen.len()), 2);

        let (a, b) = (RunId::new(), RunId::new());
        group.report(a, 10);
        group.report(a, 20);
        group.report(b, 10);

        assert_eq!(*lock(&sizes), vec![1, 1, 2]);
    }

    #[test]
    fn completion_holds_fire_until_every_run_reports() {
        let fired: Arc<Mutex<Vec<Vec<Outcome<i32>>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let group =
            CompletionAggregator::new(move |_, outcomes| lock(&sink).push(outcomes), 2);

        let (a, b) = (RunId::new(), RunId::new());
        group.report(a, Outcome::One(5));
        assert!(lock(&fired).is_empty());

        group.report(b, Outcome::One(7));
        let fired = lock(&fired);
        assert_eq!(fired.len(), 1);
        let mut values: Vec<i32> = fired[0]
            .iter()
            .cloned()
            .flat_map(Outcome::into_vec)
            .collect();
        values.sort_unstable();
        assert_eq!(values, vec![5, 7]);
    }

    #[test]
    fn duplicate_reports_overwrite_instead_of_double_counting() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let group =
            CompletionAggregator::new(move |_, outcomes| lock(&sink).push(outcomes), 2);

        let (a, b) = (RunId::new(), RunId::new());
        group.report(a, Outcome::One(1));
        group.report(a, Outcome::One(2));
        assert!(lock(&fired).is_empty(), "one distinct run must not complete a group of two");

        group.report(b, Outcome::Many(vec![]));
        let fired = lock(&fired);
        assert_eq!(fired.len(), 1);
        assert!(fired[0].contains(&Outcome::One(2)), "latest duplicate report wins");
        assert!(!fired[0].contains(&Outcome::One(1)));
    }

    #[test]
    fn undersubscribed_group_never_fires() {
        let fired = Arc::new(Mutex::new(Vec::<Vec<Outcome<i32>>>::new()));
        let sink = Arc::clone(&fired);
        let group =
            CompletionAggregator::new(move |_, outcomes| lock(&sink).push(outcomes), 3);

        group.report(RunId::new(), Outcome::One(1));
        group.report(RunId::new(), Outcome::One(2));

        // Two of three reported; the downstream sink stays silent for good.
        assert!(lock(&fired).is_empty());
    }
}
