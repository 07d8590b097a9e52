//! Step emission primitives shared by every execution mode.
//!
//! A long-running computation is expressed as an ordered, finite sequence of
//! [`Step`]s. Each step carries a progress percentage and an optional result
//! contribution. The adapters in [`crate::runner`] drive such sequences and
//! reduce their contributions into an [`Outcome`].

use serde::{Deserialize, Serialize};

/// One progress/payload unit emitted by a step source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step<T> {
    /// Progress percentage in `0..=100`. Non-decreasing across a sequence by
    /// convention; not enforced.
    pub percent: u8,
    /// Result contribution of this step, if any.
    pub payload: StepPayload<T>,
}

impl<T> Step<T> {
    /// Step carrying a result contribution.
    #[must_use]
    pub fn value(percent: u8, value: T) -> Self {
        Self {
            percent,
            payload: StepPayload::Value(value),
        }
    }

    /// Step reporting progress only.
    #[must_use]
    pub fn empty(percent: u8) -> Self {
        Self {
            percent,
            payload: StepPayload::Empty,
        }
    }
}

/// Result contribution of a single step.
///
/// `Empty` means "no result contribution yet" and is distinct from every
/// legitimate payload value, including unit or null-like ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepPayload<T> {
    /// A value to accumulate into the run's outcome.
    Value(T),
    /// Progress only, nothing to accumulate.
    Empty,
}

/// Ordered, finite producer of steps, ending in exactly one final step.
///
/// Any iterator over [`Step`]s qualifies. The contract is that the sequence
/// terminates and never fails; there is no error channel. Sources driven by
/// the inline adapter must not block the event-loop thread.
pub trait StepSource<T>: Iterator<Item = Step<T>> {}

impl<T, I> StepSource<T> for I where I: Iterator<Item = Step<T>> {}

/// Boxed step source, the form stored inside a [`crate::batch::Computation`].
pub type BoxStepSource<T> = Box<dyn StepSource<T> + Send>;

/// Accumulated result of one run.
///
/// All non-empty payloads of a run, collapsed to the single value when
/// exactly one occurred and kept as a list otherwise (including the empty
/// list). Every adapter shares this reduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome<T> {
    /// Exactly one payload occurred.
    One(T),
    /// Zero, or more than one, payloads occurred, in step order.
    Many(Vec<T>),
}

impl<T> Outcome<T> {
    /// Collapse accumulated payloads into an outcome.
    #[must_use]
    pub fn from_values(mut values: Vec<T>) -> Self {
        if values.len() == 1 {
            if let Some(value) = values.pop() {
                return Self::One(value);
            }
        }
        Self::Many(values)
    }

    /// Number of accumulated payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(values) => values.len(),
        }
    }

    /// True when no payload was accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Uncollapsed payload list, in step order.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_value_collapses() {
        assert_eq!(Outcome::from_values(vec![20]), Outcome::One(20));
    }

    #[test]
    fn several_values_stay_a_list() {
        assert_eq!(
            Outcome::from_values(vec![1, 2, 3]),
            Outcome::Many(vec![1, 2, 3])
        );
    }

    #[test]
    fn no_values_stay_an_empty_list() {
        assert_eq!(Outcome::<i32>::from_values(vec![]), Outcome::Many(vec![]));
    }

    #[test]
    fn into_vec_round_trips_both_shapes() {
        assert_eq!(Outcome::One(7).into_vec(), vec![7]);
        assert_eq!(Outcome::Many(vec![1, 2]).into_vec(), vec![1, 2]);
        assert!(Outcome::<u8>::Many(vec![]).is_empty());
    }
}
