//! Batch orchestration: run a group of computations wired to shared
//! aggregators.
//!
//! A [`Computation`] is a named factory for step sources, parameterized by
//! JSON arguments. [`run_all`] validates a batch of work entries, builds one
//! [`ProgressAggregator`] and one [`CompletionAggregator`] sized to the
//! batch, injects them into every run's callbacks, and launches each entry
//! through its own adapter.

use crate::aggregate::{CompletionAggregator, GroupDoneFn, GroupProgressFn, ProgressAggregator};
use crate::runner::{
    run_blocking, spawn_inline, spawn_thread, InlineConfig, RunCallbacks, StepIter,
};
use crate::step::{BoxStepSource, Outcome};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::debug;

/// Errors produced by batch orchestration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    /// A work entry was not one of the accepted shapes: a computation,
    /// optionally followed by positional args, optionally followed by named
    /// args.
    #[error("invalid work entry at index {index}: expected computation, optional positional args, optional named args ({len} parts given)")]
    InvalidWorkItem {
        /// Position of the malformed entry in the batch, in input order.
        index: usize,
        /// Number of parts the entry carried.
        len: usize,
    },
    /// The batch had no entries; a zero-sized aggregation group can never
    /// fire its completion callback.
    #[error("work batch is empty")]
    EmptyBatch,
    /// A run panicked, or its task was aborted, before completing.
    #[error("run panicked or was aborted before completing")]
    JoinFailed,
    /// `join_blocking` was called on an event-loop run handle, which can
    /// only be awaited.
    #[error("inline run handles must be awaited, not joined from blocking code")]
    BlockingJoinOnInline,
}

/// Positional and named arguments for one computation invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    /// Positional arguments, in order.
    pub positional: Vec<Value>,
    /// Named arguments.
    pub named: Map<String, Value>,
}

impl CallArgs {
    /// No arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional arguments only.
    #[must_use]
    pub fn positional(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: Map::new(),
        }
    }
}

/// A named, reusable step-emitting computation.
///
/// The factory is invoked once per run with that run's arguments and must
/// return a fresh step source; re-launching a computation always starts from
/// scratch. This is the explicit composition seam every adapter hangs off:
/// one `Computation` can be run blocking, iterated, or scheduled inline or
/// on a worker thread.
pub struct Computation<T> {
    name: Arc<str>,
    factory: Arc<dyn Fn(CallArgs) -> BoxStepSource<T> + Send + Sync>,
}

impl<T> Computation<T> {
    /// Wrap a step-source factory under a diagnostic name.
    pub fn new(
        name: impl Into<Arc<str>>,
        factory: impl Fn(CallArgs) -> BoxStepSource<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// Diagnostic name of this computation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self, args: CallArgs) -> BoxStepSource<T> {
        (self.factory)(args)
    }
}

impl<T> Computation<T>
where
    T: Clone + Send + 'static,
{
    /// Run to completion on the calling thread. See
    /// [`run_blocking`](crate::runner::run_blocking).
    pub fn run_blocking(&self, args: CallArgs, callbacks: &RunCallbacks<T>) -> Outcome<T> {
        run_blocking(self.instantiate(args), callbacks)
    }

    /// Consume lazily, one step per pulled element. See
    /// [`StepIter`](crate::runner::StepIter).
    pub fn iterate(&self, args: CallArgs, callbacks: &RunCallbacks<T>) -> StepIter<BoxStepSource<T>> {
        StepIter::new(self.instantiate(args), callbacks)
    }

    /// Schedule onto the current thread's `LocalSet`. See
    /// [`spawn_inline`](crate::runner::spawn_inline).
    pub fn spawn_inline(
        &self,
        args: CallArgs,
        callbacks: RunCallbacks<T>,
        config: InlineConfig,
    ) -> tokio::task::JoinHandle<Outcome<T>> {
        spawn_inline(self.instantiate(args), callbacks, config)
    }

    /// Launch on a dedicated worker thread. See
    /// [`spawn_thread`](crate::runner::spawn_thread).
    pub fn spawn_thread(
        &self,
        args: CallArgs,
        callbacks: RunCallbacks<T>,
    ) -> thread::JoinHandle<Outcome<T>> {
        spawn_thread(self.instantiate(args), callbacks)
    }
}

impl<T> Clone for Computation<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            factory: Arc::clone(&self.factory),
        }
    }
}

/// How a work entry is launched by [`run_all`].
#[derive(Debug, Clone, Copy, Default)]
pub enum LaunchMode {
    /// Dedicated worker thread per entry.
    #[default]
    Threaded,
    /// Current thread's `LocalSet`; `run_all` must then be called from
    /// within one.
    Inline(InlineConfig),
}

/// One element of a work entry's part list.
pub enum WorkPart<T> {
    /// The computation itself; always the first part.
    Computation(Computation<T>),
    /// Positional arguments; second part, if present.
    Positional(Vec<Value>),
    /// Named arguments; third part, if present.
    Named(Map<String, Value>),
}

/// One entry of a [`run_all`] batch: a 1, 2 or 3 part list in
/// computation / positional / named order, plus a launch mode.
///
/// The shape is validated by [`run_all`] before anything launches; building
/// an entry from raw parts is how dynamically assembled batches surface a
/// malformed item as [`BatchError::InvalidWorkItem`] instead of a panic.
pub struct WorkEntry<T> {
    parts: Vec<WorkPart<T>>,
    mode: LaunchMode,
}

impl<T> WorkEntry<T> {
    /// Entry with no arguments.
    #[must_use]
    pub fn bare(computation: Computation<T>) -> Self {
        Self::from_parts(vec![WorkPart::Computation(computation)])
    }

    /// Entry with positional arguments.
    #[must_use]
    pub fn with_args(computation: Computation<T>, positional: Vec<Value>) -> Self {
        Self::from_parts(vec![
            WorkPart::Computation(computation),
            WorkPart::Positional(positional),
        ])
    }

    /// Entry with positional and named arguments.
    #[must_use]
    pub fn with_named_args(
        computation: Computation<T>,
        positional: Vec<Value>,
        named: Map<String, Value>,
    ) -> Self {
        Self::from_parts(vec![
            WorkPart::Computation(computation),
            WorkPart::Positional(positional),
            WorkPart::Named(named),
        ])
    }

    /// Entry from a raw part list, validated later by [`run_all`].
    #[must_use]
    pub fn from_parts(parts: Vec<WorkPart<T>>) -> Self {
        Self {
            parts,
            mode: LaunchMode::default(),
        }
    }

    /// Override the launch mode (threaded by default).
    #[must_use]
    pub fn mode(mut self, mode: LaunchMode) -> Self {
        self.mode = mode;
        self
    }

    fn prepare(self, index: usize) -> Result<PreparedEntry<T>, BatchError> {
        let len = self.parts.len();
        let mut parts = self.parts.into_iter();
        let (computation, args) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(WorkPart::Computation(c)), None, None, None) => (c, CallArgs::new()),
            (Some(WorkPart::Computation(c)), Some(WorkPart::Positional(positional)), None, None) => {
                (c, CallArgs::positional(positional))
            }
            (
                Some(WorkPart::Computation(c)),
                Some(WorkPart::Positional(positional)),
                Some(WorkPart::Named(named)),
                None,
            ) => (c, CallArgs { positional, named }),
            _ => return Err(BatchError::InvalidWorkItem { index, len }),
        };
        Ok(PreparedEntry {
            computation,
            args,
            mode: self.mode,
        })
    }
}

struct PreparedEntry<T> {
    computation: Computation<T>,
    args: CallArgs,
    mode: LaunchMode,
}

/// Group-level callback wiring for [`run_all`].
///
/// Unset sinks default internally to a no-op; the aggregators are always
/// constructed either way.
pub struct GroupConfig<T> {
    /// Combined-progress sink, fired on every report from any run.
    pub progress: Option<GroupProgressFn>,
    /// Combined-completion sink, fired once when every run has reported.
    pub done: Option<GroupDoneFn<T>>,
}

impl<T> GroupConfig<T> {
    /// No sinks wired.
    #[must_use]
    pub fn new() -> Self {
        Self {
            progress: None,
            done: None,
        }
    }

    /// Set the combined-progress sink.
    #[must_use]
    pub fn with_progress(
        mut self,
        progress: impl Fn(&std::collections::BTreeSet<crate::runner::RunId>, f64)
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Set the combined-completion sink.
    #[must_use]
    pub fn with_done(
        mut self,
        done: impl Fn(&std::collections::BTreeSet<crate::runner::RunId>, Vec<Outcome<T>>)
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.done = Some(Arc::new(done));
        self
    }
}

impl<T> Default for GroupConfig<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one launched run, returned by [`run_all`] in input order.
pub enum RunHandle<T> {
    /// Worker-thread run.
    Thread(thread::JoinHandle<Outcome<T>>),
    /// Event-loop run.
    Local(tokio::task::JoinHandle<Outcome<T>>),
}

impl<T> RunHandle<T> {
    /// Block the calling thread until the run finishes.
    ///
    /// # Errors
    ///
    /// [`BatchError::JoinFailed`] if the run panicked, and
    /// [`BatchError::BlockingJoinOnInline`] for event-loop handles, which
    /// must be awaited via [`RunHandle::join`] instead.
    pub fn join_blocking(self) -> Result<Outcome<T>, BatchError> {
        match self {
            Self::Thread(handle) => handle.join().map_err(|_| BatchError::JoinFailed),
            Self::Local(_) => Err(BatchError::BlockingJoinOnInline),
        }
    }

    /// Wait for the run to finish without blocking the event loop.
    ///
    /// # Errors
    ///
    /// [`BatchError::JoinFailed`] if the run panicked or its task was
    /// aborted.
    pub async fn join(self) -> Result<Outcome<T>, BatchError>
    where
        T: Send + 'static,
    {
        match self {
            Self::Thread(handle) => {
                match tokio::task::spawn_blocking(move || handle.join()).await {
                    Ok(Ok(outcome)) => Ok(outcome),
                    Ok(Err(_)) | Err(_) => Err(BatchError::JoinFailed),
                }
            }
            Self::Local(handle) => handle.await.map_err(|_| BatchError::JoinFailed),
        }
    }
}

/// Launch every entry of a batch with shared progress and completion
/// aggregation.
///
/// All entries are validated first; a malformed entry fails the whole call
/// at the first offender in input order, before any adapter is invoked. On
/// success, one [`ProgressAggregator`] and one [`CompletionAggregator`] are
/// built, both sized to the batch, wired into every run's callbacks, and
/// each entry is launched in input order under its own launch mode. The
/// aggregated sinks fire asynchronously relative to this call's return; join
/// the returned handles to wait for completion.
///
/// # Errors
///
/// [`BatchError::EmptyBatch`] for a zero-entry batch and
/// [`BatchError::InvalidWorkItem`] for the first malformed entry.
pub fn run_all<T>(
    entries: Vec<WorkEntry<T>>,
    config: GroupConfig<T>,
) -> Result<Vec<RunHandle<T>>, BatchError>
where
    T: Clone + Send + 'static,
{
    if entries.is_empty() {
        return Err(BatchError::EmptyBatch);
    }

    let mut prepared = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        prepared.push(entry.prepare(index)?);
    }

    let progress_sink: GroupProgressFn = config.progress.unwrap_or_else(|| Arc::new(|_, _| {}));
    let done_sink: GroupDoneFn<T> = config.done.unwrap_or_else(|| Arc::new(|_, _| {}));
    let progress = ProgressAggregator::new(move |seen, combined| progress_sink(seen, combined), prepared.len());
    let done = CompletionAggregator::new(move |seen, outcomes| done_sink(seen, outcomes), prepared.len());
    debug!(runs = prepared.len(), "launching work batch");

    let handles = prepared
        .into_iter()
        .map(|entry| {
            let callbacks = RunCallbacks {
                progress: Some(progress.callback()),
                done: Some(done.callback()),
            };
            debug!(computation = entry.computation.name(), "launching run");
            match entry.mode {
                LaunchMode::Threaded => {
                    RunHandle::Thread(entry.computation.spawn_thread(entry.args, callbacks))
                }
                LaunchMode::Inline(inline) => {
                    RunHandle::Local(entry.computation.spawn_inline(entry.args, callbacks, inline))
                }
            }
        })
        .collect();
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::Step;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_computation(instantiated: &Arc<AtomicUsize>) -> Computation<Value> {
        let counter = Arc::clone(instantiated);
        Computation::new("counting", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(vec![Step::value(100, json!(1))].into_iter())
        })
    }

    #[test]
    fn malformed_entry_fails_before_any_launch() {
        let instantiated = Arc::new(AtomicUsize::new(0));
        let good = counting_computation(&instantiated);
        let entries = vec![
            WorkEntry::bare(good.clone()),
            WorkEntry::from_parts(vec![
                WorkPart::Computation(good.clone()),
                WorkPart::Positional(vec![]),
                WorkPart::Named(Map::new()),
                WorkPart::Positional(vec![]),
            ]),
            WorkEntry::bare(good),
        ];

        let result = run_all(entries, GroupConfig::new());

        assert_eq!(
            result.err(),
            Some(BatchError::InvalidWorkItem { index: 1, len: 4 })
        );
        assert_eq!(instantiated.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn parts_out_of_order_are_rejected() {
        let instantiated = Arc::new(AtomicUsize::new(0));
        let good = counting_computation(&instantiated);
        let entries = vec![WorkEntry::from_parts(vec![
            WorkPart::Positional(vec![]),
            WorkPart::Computation(good),
        ])];

        let result = run_all(entries, GroupConfig::new());

        assert_eq!(
            result.err(),
            Some(BatchError::InvalidWorkItem { index: 0, len: 2 })
        );
        assert_eq!(instantiated.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let result = run_all(Vec::<WorkEntry<Value>>::new(), GroupConfig::new());
        assert_eq!(result.err(), Some(BatchError::EmptyBatch));
    }

    #[test]
    fn arguments_reach_the_factory() {
        let computation = Computation::new("wants_args", |args: CallArgs| {
            let base = args.positional.first().and_then(Value::as_i64).unwrap_or(0);
            let bonus = args.named.get("bonus").and_then(Value::as_i64).unwrap_or(0);
            Box::new(vec![Step::value(100, base + bonus)].into_iter())
        });

        let mut named = Map::new();
        named.insert("bonus".to_string(), json!(2));
        let outcome = computation.run_blocking(
            CallArgs {
                positional: vec![json!(40)],
                named,
            },
            &RunCallbacks::new(),
        );

        assert_eq!(outcome, Outcome::One(42));
    }
}
