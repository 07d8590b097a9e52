//! Worker-thread adapter.

use crate::runner::blocking::drive;
use crate::runner::{RunCallbacks, RunId};
use crate::step::{Outcome, StepSource};
use std::thread;
use tracing::debug;

/// Launch a run on a dedicated worker thread.
///
/// The thread runs the full blocking stepping logic, invokes the done
/// callback with the accumulated outcome from the worker thread, then
/// finishes with that same outcome, so joining the returned handle always
/// observes a run whose completion callback has already fired. Runs launched
/// this way proceed in true parallel; the only state they share is whatever
/// aggregation group their callbacks are wired into.
///
/// A panic inside the source terminates the worker thread and surfaces as an
/// error from `join`; there is no error channel, per the source contract.
pub fn spawn_thread<T, S>(source: S, callbacks: RunCallbacks<T>) -> thread::JoinHandle<Outcome<T>>
where
    T: Clone + Send + 'static,
    S: StepSource<T> + Send + 'static,
{
    thread::spawn(move || {
        let run = RunId::new();
        debug!(%run, "worker run started");
        let outcome = drive(source, run, &callbacks);
        callbacks.emit_done(run, outcome.clone());
        debug!(%run, values = outcome.len(), "worker run finished");
        outcome
    })
}
