// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use recoverable::{Recovery, RecoveryInfo};
use tick::Clock;

use crate::args::{HedgedTask, HedgingActionArgs, HedgingDelayArgs, OnHedgingArgs, ShouldHandleArgs};
use crate::callbacks::{ActionGenerator, DelayGenerator, HedgingHandler, OnHedging, ShouldHandle};
use crate::constants::{DEFAULT_HEDGING_DELAY, DEFAULT_MAX_HEDGED_ATTEMPTS};
use crate::controller::HedgingController;
use crate::options::HedgingOptions;
use crate::outcome::Outcome;
use crate::strategy::{Hedging, HedgingShared};
use crate::utils::TelemetryHelper;

/// A flag indicating that the required property is set.
#[non_exhaustive]
#[derive(Debug)]
#[doc(hidden)]
pub struct Set;

/// A flag indicating that the required property has not been set.
#[non_exhaustive]
#[derive(Debug)]
#[doc(hidden)]
pub struct NotSet;

/// Builder for a [`Hedging`] strategy.
///
/// Created by [`Hedging::builder`]. The builder uses the type-state pattern
/// to enforce that the outcome classifier is configured before the strategy
/// can be built: [`build`][HedgingBuilder::build] only exists once
/// [`should_handle_with`][HedgingBuilder::should_handle_with] (or
/// [`should_handle`][HedgingBuilder::should_handle]) has been called.
///
/// Each strategy requires an identifier for telemetry purposes; use
/// `snake_case` naming to keep telemetry dimensions consistent.
///
/// For comprehensive examples, see the [crate documentation][crate].
#[derive(Debug)]
pub struct HedgingBuilder<Out, S = Set> {
    clock: Clock,
    telemetry: TelemetryHelper,
    max_hedged_attempts: u32,
    hedging_delay: Duration,
    delay_generator: Option<DelayGenerator>,
    should_handle: Option<ShouldHandle<Out>>,
    generator: Option<ActionGenerator<Out>>,
    on_hedging: Option<OnHedging<Out>>,
    handle_unavailable: bool,
    _state: PhantomData<fn(S) -> Out>,
}

impl<Out> HedgingBuilder<Out, NotSet> {
    pub(crate) fn new(name: Cow<'static, str>, options: &HedgingOptions) -> Self {
        Self {
            clock: options.clock().clone(),
            telemetry: options.create_telemetry(name),
            max_hedged_attempts: DEFAULT_MAX_HEDGED_ATTEMPTS,
            hedging_delay: DEFAULT_HEDGING_DELAY,
            delay_generator: None,
            should_handle: None,
            generator: None,
            on_hedging: None,
            handle_unavailable: false,
            _state: PhantomData,
        }
    }
}

impl<Out, S> HedgingBuilder<Out, S> {
    /// Sets the maximum number of additional hedged attempts.
    ///
    /// This is the number of hedges beyond the original call: with
    /// `max_hedged_attempts(2)` the operation runs up to 3 times total.
    /// With 0 the strategy degenerates to running exactly the primary.
    ///
    /// **Default**: 1 hedged attempt (2 total)
    #[must_use]
    pub fn max_hedged_attempts(mut self, count: u32) -> Self {
        self.max_hedged_attempts = count;
        self
    }

    /// Sets the fixed delay between launching hedged attempts.
    ///
    /// [`Duration::ZERO`] launches the next hedge after a single poll of the
    /// in-flight set; [`INFINITE_HEDGING_DELAY`][crate::INFINITE_HEDGING_DELAY]
    /// never launches another hedge.
    ///
    /// **Default**: 2 seconds
    #[must_use]
    pub fn hedging_delay(mut self, delay: Duration) -> Self {
        self.hedging_delay = delay;
        self
    }

    /// Computes the delay dynamically before each hedge.
    ///
    /// The callback receives the number of attempts already loaded and
    /// overrides the fixed [`hedging_delay`][HedgingBuilder::hedging_delay].
    /// Returning [`INFINITE_HEDGING_DELAY`][crate::INFINITE_HEDGING_DELAY]
    /// stops launching further hedges.
    #[must_use]
    pub fn delay_generator(mut self, delay_fn: impl Fn(HedgingDelayArgs) -> Duration + Send + Sync + 'static) -> Self {
        self.delay_generator = Some(DelayGenerator::new(delay_fn));
        self
    }

    /// Sets the generator that produces secondary attempts.
    ///
    /// Called once per hedge with the attempt's child context; return a
    /// future for the hedge, or `None` to stop hedging. Without a generator,
    /// hedges re-run the original operation.
    #[must_use]
    pub fn generator(
        mut self,
        generator_fn: impl Fn(HedgingActionArgs<Out>) -> Option<HedgedTask<Out>> + Send + Sync + 'static,
    ) -> Self {
        self.generator = Some(ActionGenerator::new(generator_fn));
        self
    }

    /// Configures a callback observing hedging events.
    ///
    /// Invoked when a hedging delay elapses (a hedge is about to launch) and
    /// when a handled outcome keeps the race going. Purely observational.
    ///
    /// **Default**: None
    #[must_use]
    pub fn on_hedging(mut self, hedging_fn: impl Fn(OnHedgingArgs<'_, Out>) + Send + Sync + 'static) -> Self {
        self.on_hedging = Some(OnHedging::new(hedging_fn));
        self
    }

    /// Configures whether unavailable classifications count as transient.
    ///
    /// When enabled, [`RecoveryInfo::unavailable()`] outcomes keep the race
    /// going; when disabled (the default) they are returned immediately.
    ///
    /// **Default**: false
    #[must_use]
    pub fn handle_unavailable(mut self, enable: bool) -> Self {
        self.handle_unavailable = enable;
        self
    }

    /// Sets the outcome classifier.
    ///
    /// The classifier examines each attempt outcome and returns a
    /// [`RecoveryInfo`]:
    ///
    /// - [`RecoveryInfo::never()`]: the outcome is acceptable — return it
    /// - [`RecoveryInfo::retry()`]: the outcome is transient — keep racing
    /// - [`RecoveryInfo::unavailable()`]: returned immediately unless
    ///   [`handle_unavailable(true)`][HedgingBuilder::handle_unavailable]
    #[must_use]
    pub fn should_handle_with(
        mut self,
        handle_fn: impl Fn(&Outcome<Out>, ShouldHandleArgs<'_>) -> RecoveryInfo + Send + Sync + 'static,
    ) -> HedgingBuilder<Out, Set> {
        self.should_handle = Some(ShouldHandle::new(handle_fn));
        self.into_state::<Set>()
    }

    /// Wires the classifier automatically for outputs implementing
    /// [`Recovery`].
    ///
    /// Equivalent to `should_handle_with(|outcome, _| outcome.recovery())`;
    /// cancelled outcomes classify as `never`.
    #[must_use]
    pub fn should_handle(self) -> HedgingBuilder<Out, Set>
    where
        Out: Recovery,
    {
        self.should_handle_with(|outcome, _args| outcome.recovery())
    }

    fn into_state<T>(self) -> HedgingBuilder<Out, T> {
        HedgingBuilder {
            clock: self.clock,
            telemetry: self.telemetry,
            max_hedged_attempts: self.max_hedged_attempts,
            hedging_delay: self.hedging_delay,
            delay_generator: self.delay_generator,
            should_handle: self.should_handle,
            generator: self.generator,
            on_hedging: self.on_hedging,
            handle_unavailable: self.handle_unavailable,
            _state: PhantomData,
        }
    }
}

impl<Out: Send + 'static> HedgingBuilder<Out, Set> {
    /// Builds the strategy.
    #[must_use]
    pub fn build(self) -> Hedging<Out> {
        let handler = HedgingHandler {
            should_handle: self.should_handle.expect("should_handle must be set in the Set state"),
            generator: self.generator,
            handle_unavailable: self.handle_unavailable,
        };
        let max_attempts = self.max_hedged_attempts.saturating_add(1);
        let controller = HedgingController::new(self.clock.clone(), handler, max_attempts);

        Hedging::from_shared(Arc::new(HedgingShared {
            clock: self.clock,
            max_hedged_attempts: self.max_hedged_attempts,
            hedging_delay: self.hedging_delay,
            delay_generator: self.delay_generator,
            on_hedging: self.on_hedging,
            controller,
            telemetry: self.telemetry,
        }))
    }
}
