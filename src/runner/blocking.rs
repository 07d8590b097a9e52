//! Synchronous adapters: full-run blocking execution and lazy iteration.

use crate::runner::{ProgressFn, RunCallbacks, RunId};
use crate::step::{Outcome, Step, StepPayload, StepSource};
use tracing::{debug, trace};

/// Run a step source to completion on the calling thread.
///
/// The progress callback fires once per step, in order, including the final
/// step. Blocking waits inside the source block the caller; that is the
/// point of this mode. Returns the accumulated outcome.
pub fn run_blocking<T, S>(source: S, callbacks: &RunCallbacks<T>) -> Outcome<T>
where
    S: StepSource<T>,
{
    let run = RunId::new();
    debug!(%run, "blocking run started");
    let outcome = drive(source, run, callbacks);
    debug!(%run, values = outcome.len(), "blocking run finished");
    outcome
}

/// Shared stepping loop for the blocking and threaded adapters.
pub(crate) fn drive<T, S>(source: S, run: RunId, callbacks: &RunCallbacks<T>) -> Outcome<T>
where
    S: StepSource<T>,
{
    let mut values = Vec::new();
    for step in source {
        trace!(%run, percent = step.percent, "step");
        callbacks.emit_progress(run, step.percent);
        if let StepPayload::Value(value) = step.payload {
            values.push(value);
        }
    }
    Outcome::from_values(values)
}

/// Lazy adapter yielding each non-empty payload as the caller pulls it.
///
/// Every pulled element drives the underlying source forward until its next
/// `Value` step, firing the progress callback for each step driven along the
/// way (empty ones included). Steps beyond the last pulled element are never
/// executed. A fresh `StepIter` starts a fresh source; the sequence is not
/// restartable.
pub struct StepIter<S> {
    run: RunId,
    source: S,
    progress: Option<ProgressFn>,
}

impl<S> StepIter<S> {
    /// Wrap a step source for lazy consumption.
    ///
    /// Only the progress callback from `callbacks` is used; the outcome is
    /// delivered element by element rather than through `done`.
    pub fn new<T>(source: S, callbacks: &RunCallbacks<T>) -> Self
    where
        S: StepSource<T>,
    {
        let run = RunId::new();
        debug!(%run, "iterating run started");
        Self {
            run,
            source,
            progress: callbacks.progress.clone(),
        }
    }

    /// Identity of this run, as seen by its progress callback.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run
    }
}

impl<T, S> Iterator for StepIter<S>
where
    S: Iterator<Item = Step<T>>,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            let step = self.source.next()?;
            trace!(run = %self.run, percent = step.percent, "step");
            if let Some(progress) = &self.progress {
                progress(self.run, step.percent);
            }
            if let StepPayload::Value(value) = step.payload {
                return Some(value);
            }
        }
    }
}
