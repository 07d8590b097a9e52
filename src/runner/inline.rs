//! Event-loop adapter: cooperative stepping on the current thread's task set.

use crate::runner::{RunCallbacks, RunId};
use crate::step::{Outcome, StepPayload, StepSource};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Timing configuration for the inline adapter.
#[derive(Debug, Clone, Copy)]
pub struct InlineConfig {
    /// Delay between consecutive steps, including before the first one.
    /// Zero yields to the scheduler without waiting.
    pub step_delay: Duration,
}

impl InlineConfig {
    /// Zero inter-step delay.
    #[must_use]
    pub fn new() -> Self {
        Self {
            step_delay: Duration::ZERO,
        }
    }

    /// Override the inter-step delay.
    #[must_use]
    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }
}

impl Default for InlineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Schedule a run onto the current thread's [`LocalSet`](tokio::task::LocalSet).
///
/// Control returns to the caller immediately with the task handle. Steps
/// execute strictly in sequence order, each on a later scheduler turn than
/// the previous one, so inline runs interleave with other loop activity but
/// never run in parallel with it. The progress callback fires once per step
/// from the loop thread. After the final step the done callback is delivered
/// on a further turn with the accumulated outcome, and the handle then
/// resolves to the same outcome.
///
/// Sources used here must not block the loop thread; blocking waits belong
/// in [`run_blocking`](crate::runner::run_blocking) or
/// [`spawn_thread`](crate::runner::spawn_thread) runs.
///
/// # Panics
///
/// Calling this outside a `LocalSet` context panics in `spawn_local`. A
/// panic inside the source propagates through the task; the source contract
/// forbids failing and there is no error channel.
pub fn spawn_inline<T, S>(
    mut source: S,
    callbacks: RunCallbacks<T>,
    config: InlineConfig,
) -> JoinHandle<Outcome<T>>
where
    T: Clone + 'static,
    S: StepSource<T> + 'static,
{
    tokio::task::spawn_local(async move {
        let run = RunId::new();
        debug!(%run, delay = ?config.step_delay, "inline run started");
        let mut values = Vec::new();
        loop {
            pause_between_steps(config.step_delay).await;
            let Some(step) = source.next() else { break };
            trace!(%run, percent = step.percent, "step");
            callbacks.emit_progress(run, step.percent);
            if let StepPayload::Value(value) = step.payload {
                values.push(value);
            }
        }
        let outcome = Outcome::from_values(values);
        // Completion is delivered on a later turn, like every step before it.
        tokio::task::yield_now().await;
        callbacks.emit_done(run, outcome.clone());
        debug!(%run, values = outcome.len(), "inline run finished");
        outcome
    })
}

async fn pause_between_steps(delay: Duration) {
    if delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}
