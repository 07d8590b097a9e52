#![deny(missing_docs)]
//! Multi-mode execution of step-emitting computations.
//!
//! A long-running operation is expressed as an ordered sequence of
//! [`Step`]s, each carrying a progress percentage and an optional result
//! contribution. The same sequence can then be driven blocking on the
//! calling thread, consumed lazily step by step, scheduled cooperatively on
//! the tokio event loop, or run on a dedicated worker thread, with per-step
//! progress and final-outcome callbacks shared across all modes. Several
//! runs can be aggregated into one combined progress metric and one
//! combined completion notification, and [`run_all`] launches a whole batch
//! wired that way.
//!
//! # Example
//!
//! ```
//! use stepflow::{run_blocking, Outcome, RunCallbacks, Step};
//!
//! let steps = vec![Step::empty(0), Step::empty(50), Step::value(100, 20)];
//! let callbacks = RunCallbacks::new()
//!     .with_progress(|run, percent| println!("{run}: {percent}%"));
//!
//! let outcome = run_blocking(steps.into_iter(), &callbacks);
//! assert_eq!(outcome, Outcome::One(20));
//! ```

/// Fan-in aggregation of progress and completion across runs.
pub mod aggregate;
/// Computations, work entries, and batch orchestration.
pub mod batch;
/// Execution-mode adapters.
pub mod runner;
/// Step emission primitives.
pub mod step;

pub use aggregate::{CompletionAggregator, GroupDoneFn, GroupProgressFn, ProgressAggregator};
pub use batch::{
    run_all, BatchError, CallArgs, Computation, GroupConfig, LaunchMode, RunHandle, WorkEntry,
    WorkPart,
};
pub use runner::{
    run_blocking, spawn_inline, spawn_thread, DoneFn, InlineConfig, ProgressFn, RunCallbacks,
    RunId, StepIter,
};
pub use step::{BoxStepSource, Outcome, Step, StepPayload, StepSource};
