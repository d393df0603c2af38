// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tick::{Clock, Stopwatch};

use crate::args::OnHedgingArgs;
use crate::attempt::Attempt;
use crate::builder::{HedgingBuilder, NotSet};
use crate::callbacks::{ActionFactory, DelayGenerator, OnHedging};
use crate::constants::{INFINITE_HEDGING_DELAY, ON_HEDGING_EVENT};
use crate::context::ResilienceContext;
use crate::controller::HedgingController;
use crate::execution::{HedgingExecutionContext, WaitResult};
use crate::options::HedgingOptions;
use crate::outcome::Outcome;
use crate::properties::{EventSeverity, ResilienceEvent};
use crate::utils::TelemetryHelper;

/// Hedged execution strategy for tail-latency reduction.
///
/// `Hedging` runs a user operation and, whenever the in-flight attempts look
/// too slow or produce transient outcomes, launches additional concurrent
/// attempts on a delay schedule. The first outcome the classifier accepts is
/// returned; the losing attempts are cancelled, drained, and recycled.
///
/// Strategies are configured through [`Hedging::builder`] and are cheap to
/// clone; clones share the same configuration and pools.
///
/// For comprehensive examples, see the [crate documentation][crate].
#[derive(Debug)]
pub struct Hedging<Out> {
    shared: Arc<HedgingShared<Out>>,
}

impl<Out> Clone for Hedging<Out> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Shared configuration for a [`Hedging`] strategy, wrapped in an `Arc` to
/// enable cheap cloning.
pub(crate) struct HedgingShared<Out> {
    pub(crate) clock: Clock,
    pub(crate) max_hedged_attempts: u32,
    pub(crate) hedging_delay: Duration,
    pub(crate) delay_generator: Option<DelayGenerator>,
    pub(crate) on_hedging: Option<OnHedging<Out>>,
    pub(crate) controller: HedgingController<Out>,
    pub(crate) telemetry: TelemetryHelper,
}

impl<Out> std::fmt::Debug for HedgingShared<Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HedgingShared")
            .field("max_hedged_attempts", &self.max_hedged_attempts)
            .field("hedging_delay", &self.hedging_delay)
            .finish_non_exhaustive()
    }
}

impl<Out: Send + 'static> Hedging<Out> {
    /// Starts configuring a hedging strategy.
    ///
    /// The `name` identifies the strategy in telemetry; use `snake_case`.
    pub fn builder(name: impl Into<Cow<'static, str>>, options: &HedgingOptions) -> HedgingBuilder<Out, NotSet> {
        HedgingBuilder::new(name.into(), options)
    }

    pub(crate) fn from_shared(shared: Arc<HedgingShared<Out>>) -> Self {
        Self { shared }
    }

    /// Executes `operation` under this strategy.
    ///
    /// The operation is invoked once per attempt with a forked child context:
    /// an isolated view of the caller's property bag and event log under a
    /// cancellation token linked to the caller's. The caller's `context` is
    /// left exactly as it was, except that the accepted attempt's mutations
    /// are merged back and one Warning event is logged per hedging
    /// notification.
    ///
    /// Returns the first accepted outcome, or
    /// [`Outcome::Cancelled`] when the context's token fires first.
    pub async fn execute<F, Fut>(&self, context: &ResilienceContext, operation: F) -> Outcome<Out>
    where
        F: Fn(ResilienceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Out> + Send + 'static,
    {
        let callback = ActionFactory::new(move |child| -> crate::args::HedgedTask<Out> { Box::pin(operation(child)) });

        let mut execution = self.shared.controller.get_context(context);
        let outcome = self.shared.run(&mut execution, context, &callback).await;

        // Completion always runs, success or not: losers drain, the caller's
        // property bag is restored, and the rented state returns to the pools.
        execution.complete().await;
        self.shared.controller.return_context(execution);

        outcome
    }

    /// Installs hooks observing context and attempt recycling.
    ///
    /// Test instrumentation only; hooks apply to contexts rented after the
    /// call.
    #[cfg(any(feature = "test-util", test))]
    pub fn set_reset_hooks(
        &self,
        on_context_reset: impl Fn() + Send + Sync + 'static,
        on_task_reset: impl Fn() + Send + Sync + 'static,
    ) {
        use crate::callbacks::OnResetHook;
        self.shared
            .controller
            .set_reset_hooks(OnResetHook::new(on_context_reset), OnResetHook::new(on_task_reset));
    }
}

impl<Out: Send + 'static> HedgingShared<Out> {
    fn total_attempts(&self) -> u32 {
        self.max_hedged_attempts.saturating_add(1)
    }

    #[cfg_attr(test, mutants::skip)] // mutated loop control never terminates
    async fn run(
        &self,
        execution: &mut HedgingExecutionContext<Out>,
        context: &ResilienceContext,
        callback: &ActionFactory<Out>,
    ) -> Outcome<Out> {
        // Captured once; the loop observes this token for its whole life,
        // even if the caller swaps state on the context concurrently.
        let cancellation = context.cancellation_token();
        let mut attempt: u32 = 0;

        loop {
            let stopwatch = Stopwatch::new(&self.clock);
            if cancellation.is_cancelled() {
                return Outcome::Cancelled;
            }

            let info = execution.load_execution(callback);
            if let Some(outcome) = info.outcome {
                // Nothing further could be loaded and a sibling already
                // finished; its outcome short-circuits the race.
                return outcome;
            }

            let delay = self.next_delay(info.loaded, execution.loaded_tasks());
            match execution.try_wait_for_completed(delay).await {
                WaitResult::Cancelled => return Outcome::Cancelled,
                WaitResult::TimedOut => {
                    // The delay is finite only while capacity remains, so a
                    // timeout always heralds another hedge.
                    self.report_hedging(context, None, attempt, delay, execution.loaded_tasks());
                }
                WaitResult::Completed(index) => {
                    if !execution.is_handled(index) {
                        return execution.accept(index);
                    }
                    if execution.loaded_tasks() < self.total_attempts() {
                        self.report_hedging(context, Some(execution.outcome_of(index)), attempt, stopwatch.elapsed(), execution.loaded_tasks());
                    }
                    // The handled winner stays in the task list, unaccepted;
                    // completion resets it with the other losers.
                }
            }

            attempt = attempt.saturating_add(1);
        }
    }

    /// Picks the wait bound for this iteration. When nothing further can
    /// launch (capacity exhausted or the generator declined), the wait is
    /// unbounded: only a completion or cancellation can end the call.
    fn next_delay(&self, loaded: bool, loaded_tasks: u32) -> Duration {
        if !loaded || loaded_tasks >= self.total_attempts() {
            return INFINITE_HEDGING_DELAY;
        }

        match &self.delay_generator {
            Some(generator) => generator.call(crate::args::HedgingDelayArgs { attempt: loaded_tasks }),
            None => self.hedging_delay,
        }
    }

    fn report_hedging(
        &self,
        context: &ResilienceContext,
        outcome: Option<&Outcome<Out>>,
        attempt: u32,
        duration: Duration,
        loaded_tasks: u32,
    ) {
        let attempt = Attempt::new(attempt, loaded_tasks.saturating_add(1) >= self.total_attempts());

        if let Some(on_hedging) = &self.on_hedging {
            on_hedging.call(OnHedgingArgs {
                context,
                outcome,
                attempt,
                duration,
            });
        }

        context.add_event(ResilienceEvent::new(EventSeverity::Warning, ON_HEDGING_EVENT));
        self.emit_telemetry(attempt, outcome.is_some(), duration);
    }

    #[cfg_attr(
        not(any(feature = "logs", feature = "metrics", test)),
        expect(unused_variables, clippy::unused_self, reason = "unused when telemetry is disabled")
    )]
    fn emit_telemetry(&self, attempt: Attempt, has_outcome: bool, duration: Duration) {
        #[cfg(any(feature = "logs", test))]
        if self.telemetry.logs_enabled {
            tracing::event!(
                name: "hedgerow.on_hedging",
                tracing::Level::WARN,
                pipeline.name = %self.telemetry.pipeline_name,
                strategy.name = %self.telemetry.strategy_name,
                resilience.attempt.index = attempt.index(),
                resilience.attempt.is_last = attempt.is_last(),
                resilience.outcome.present = has_outcome,
                resilience.duration = ?duration,
            );
        }

        #[cfg(any(feature = "metrics", test))]
        if self.telemetry.metrics_enabled() {
            use crate::utils::{ATTEMPT_INDEX, ATTEMPT_IS_LAST, EVENT_NAME, PIPELINE_NAME, STRATEGY_NAME};

            self.telemetry.report_metrics(&[
                opentelemetry::KeyValue::new(PIPELINE_NAME, self.telemetry.pipeline_name.clone()),
                opentelemetry::KeyValue::new(STRATEGY_NAME, self.telemetry.strategy_name.clone()),
                opentelemetry::KeyValue::new(EVENT_NAME, ON_HEDGING_EVENT),
                opentelemetry::KeyValue::new(ATTEMPT_INDEX, i64::from(attempt.index())),
                opentelemetry::KeyValue::new(ATTEMPT_IS_LAST, attempt.is_last()),
            ]);
        }
    }
}
