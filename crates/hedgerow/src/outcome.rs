// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use recoverable::{Recovery, RecoveryInfo};

/// The result of a single hedged attempt.
///
/// An attempt either runs to completion and yields the operation's output, or
/// it is abandoned because its cancellation token fired before the operation
/// finished. Cancellation is a value, never a panic: when the caller's token
/// triggers mid-call, [`Hedging::execute`][crate::Hedging::execute] returns
/// `Outcome::Cancelled`.
///
/// The output type `Out` is the operation's *complete* result. Fallible
/// operations typically use a `Result`, and the configured classifier decides
/// which completed outcomes are transient enough to race against.
///
/// # Examples
///
/// ```
/// use hedgerow::Outcome;
///
/// let outcome: Outcome<Result<u32, String>> = Outcome::Completed(Ok(42));
/// assert!(!outcome.is_cancelled());
/// assert_eq!(outcome.into_completed(), Some(Ok(42)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<Out> {
    /// The attempt ran to completion and produced a value.
    Completed(Out),

    /// The attempt was abandoned before producing a value.
    Cancelled,
}

impl<Out> Outcome<Out> {
    /// Returns `true` if the attempt was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns a reference to the completed value, if any.
    #[must_use]
    pub fn as_completed(&self) -> Option<&Out> {
        match self {
            Self::Completed(out) => Some(out),
            Self::Cancelled => None,
        }
    }

    /// Consumes the outcome and returns the completed value, if any.
    #[must_use]
    pub fn into_completed(self) -> Option<Out> {
        match self {
            Self::Completed(out) => Some(out),
            Self::Cancelled => None,
        }
    }
}

impl<Out: Recovery> Recovery for Outcome<Out> {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::Completed(out) => out.recovery(),
            // A cancelled attempt is terminal; the caller no longer wants the
            // operation, so racing another copy of it helps nobody.
            Self::Cancelled => RecoveryInfo::never(),
        }
    }
}
