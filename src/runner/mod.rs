//! Execution-mode adapters for step sources.
//!
//! Four shapes for driving one [`crate::step::StepSource`]:
//!
//! - [`run_blocking`]: caller's thread, start to finish.
//! - [`StepIter`]: lazy, one underlying step per pulled element.
//! - [`spawn_inline`]: cooperative stepping on the current thread's tokio
//!   [`LocalSet`](tokio::task::LocalSet).
//! - [`spawn_thread`]: a dedicated worker thread.
//!
//! All four report per-step progress through the same callback contract and
//! reduce payloads with the same [`Outcome`](crate::step::Outcome) collapse
//! rule.

pub mod blocking;
pub mod inline;
pub mod threaded;

pub use blocking::{run_blocking, StepIter};
pub use inline::{spawn_inline, InlineConfig};
pub use threaded::spawn_thread;

use crate::step::Outcome;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of one run: one invocation of one adapter over one step source.
///
/// Minted fresh per invocation and passed to every callback fired on behalf
/// of that run; aggregation groups key their state by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(Uuid);

impl RunId {
    /// Mint a fresh run identity.
    ///
    /// Adapters do this internally; call it yourself only when reporting to
    /// an aggregator from a hand-rolled run loop.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-step progress callback: `(run, percent)`.
///
/// Invoked synchronously from whichever thread is driving the step, possibly
/// many times per run. Must not panic.
pub type ProgressFn = Arc<dyn Fn(RunId, u8) + Send + Sync>;

/// Completion callback: `(run, outcome)`.
///
/// Invoked exactly once per run by the scheduled adapters. Must not panic.
pub type DoneFn<T> = Arc<dyn Fn(RunId, Outcome<T>) + Send + Sync>;

/// Callback wiring for a single run.
///
/// Unset callbacks default internally to a no-op. The synchronous adapters
/// ([`run_blocking`], [`StepIter`]) return the outcome directly and never use
/// `done`; only the scheduled adapters deliver completion callbacks.
pub struct RunCallbacks<T> {
    /// Invoked once per step, including the final one.
    pub progress: Option<ProgressFn>,
    /// Invoked once with the accumulated outcome (scheduled modes only).
    pub done: Option<DoneFn<T>>,
}

impl<T> RunCallbacks<T> {
    /// No callbacks wired.
    #[must_use]
    pub fn new() -> Self {
        Self {
            progress: None,
            done: None,
        }
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress(mut self, progress: impl Fn(RunId, u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Set the completion callback.
    #[must_use]
    pub fn with_done(
        mut self,
        done: impl Fn(RunId, Outcome<T>) + Send + Sync + 'static,
    ) -> Self {
        self.done = Some(Arc::new(done));
        self
    }

    pub(crate) fn emit_progress(&self, run: RunId, percent: u8) {
        if let Some(progress) = &self.progress {
            progress(run, percent);
        }
    }

    pub(crate) fn emit_done(&self, run: RunId, outcome: Outcome<T>) {
        if let Some(done) = &self.done {
            done(run, outcome);
        }
    }
}

impl<T> Default for RunCallbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for RunCallbacks<T> {
    fn clone(&self) -> Self {
        Self {
            progress: self.progress.clone(),
            done: self.done.clone(),
        }
    }
}
