// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tick::Clock;

use crate::attempt::Attempt;
use crate::callbacks::ActionFactory;
use crate::context::ResilienceContext;
use crate::outcome::Outcome;

/// A boxed future produced by a hedged operation or an action generator.
pub type HedgedTask<Out> = Pin<Box<dyn Future<Output = Out> + Send>>;

/// Arguments for the [`should_handle_with`][crate::HedgingBuilder::should_handle_with]
/// classifier.
#[derive(Debug)]
pub struct ShouldHandleArgs<'a> {
    pub(crate) clock: &'a Clock,
}

impl ShouldHandleArgs<'_> {
    /// Returns the clock used for time-related operations.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        self.clock
    }
}

/// Arguments passed to the [`generator`][crate::HedgingBuilder::generator]
/// when a secondary attempt is about to be created.
///
/// The generator owns the attempt's child context and may mutate it before
/// the attempt starts; those mutations survive the call only if this attempt
/// is ultimately accepted. Returning `None` declines the attempt and stops
/// further hedging.
pub struct HedgingActionArgs<Out> {
    pub(crate) context: ResilienceContext,
    pub(crate) attempt: Attempt,
    pub(crate) callback: ActionFactory<Out>,
}

impl<Out> HedgingActionArgs<Out> {
    /// Returns the child context the attempt will run under.
    #[must_use]
    pub fn context(&self) -> &ResilienceContext {
        &self.context
    }

    /// Returns the attempt this generator call is for.
    ///
    /// The first hedge is attempt 1; the primary (attempt 0) never consults
    /// the generator.
    #[must_use]
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    /// Starts the original operation against this attempt's child context.
    ///
    /// This is the default behavior when no generator is configured; custom
    /// generators call it to hedge with the unmodified operation, typically
    /// after adjusting the child context.
    #[must_use]
    pub fn invoke_callback(&self) -> HedgedTask<Out> {
        self.callback.call(self.context.clone())
    }
}

impl<Out> Debug for HedgingActionArgs<Out> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HedgingActionArgs")
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// Arguments for the [`on_hedging`][crate::HedgingBuilder::on_hedging]
/// callback.
///
/// The callback observes either a handled outcome that keeps the race going
/// (`outcome` is `Some`, `duration` is how long the attempt slot took), or an
/// elapsed hedging delay about to launch the next attempt (`outcome` is
/// `None`, `duration` is the delay that elapsed).
pub struct OnHedgingArgs<'a, Out> {
    pub(crate) context: &'a ResilienceContext,
    pub(crate) outcome: Option<&'a Outcome<Out>>,
    pub(crate) attempt: Attempt,
    pub(crate) duration: Duration,
}

impl<'a, Out> OnHedgingArgs<'a, Out> {
    /// Returns the caller's resilience context.
    #[must_use]
    pub fn context(&self) -> &'a ResilienceContext {
        self.context
    }

    /// Returns the handled outcome that triggered this notification, if any.
    #[must_use]
    pub fn outcome(&self) -> Option<&'a Outcome<Out>> {
        self.outcome
    }

    /// Returns the attempt slot this notification belongs to.
    #[must_use]
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    /// Returns the elapsed delay or the observed attempt duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl<Out> Debug for OnHedgingArgs<'_, Out> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnHedgingArgs")
            .field("attempt", &self.attempt)
            .field("duration", &self.duration)
            .field("has_outcome", &self.outcome.is_some())
            .finish_non_exhaustive()
    }
}

/// Arguments for the [`delay_generator`][crate::HedgingBuilder::delay_generator]
/// callback.
#[derive(Debug)]
pub struct HedgingDelayArgs {
    pub(crate) attempt: u32,
}

impl HedgingDelayArgs {
    /// Returns the number of attempts already loaded when the next gap is
    /// being decided: 1 before the first hedge, 2 before the second, and so
    /// on.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
