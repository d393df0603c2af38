// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tick::{Clock, Delay};
use tokio_util::sync::WaitForCancellationFutureOwned;

use crate::callbacks::{ActionFactory, HedgingHandler};
#[cfg(any(feature = "test-util", test))]
use crate::callbacks::OnResetHook;
use crate::context::{ContextSnapshot, ResilienceContext};
use crate::outcome::Outcome;
use crate::pool::Pool;
use crate::task::TaskExecution;

/// Result of one `load_execution` dispatch.
///
/// When nothing could be loaded but a sibling already finished, that
/// sibling's outcome is surfaced (and accepted) so the caller can
/// short-circuit.
pub(crate) struct ExecutionInfo<Out> {
    pub(crate) loaded: bool,
    pub(crate) outcome: Option<Outcome<Out>>,
}

/// Result of waiting for the live attempt set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitResult {
    /// The task at this position newly completed; lowest attempt wins ties.
    Completed(usize),
    /// The hedging delay elapsed with nothing new to observe.
    TimedOut,
    /// The parent cancellation token fired.
    Cancelled,
}

/// Per-call coordinator for one hedged execution.
///
/// Owns the ordered set of live attempts (position 0 is always the primary),
/// the snapshot of the caller's context, and the wait primitive that races
/// attempt completion against the hedging delay and the parent cancellation.
/// Instances are pooled by the controller; `initialize` and `complete`
/// bracket each call.
pub(crate) struct HedgingExecutionContext<Out> {
    clock: Clock,
    handler: HedgingHandler<Out>,
    execution_pool: Arc<Pool<TaskExecution<Out>>>,
    max_attempts: u32,
    snapshot: Option<ContextSnapshot>,
    tasks: Vec<TaskExecution<Out>>,
    #[cfg(any(feature = "test-util", test))]
    on_reset: Option<OnResetHook>,
    #[cfg(any(feature = "test-util", test))]
    on_task_reset: Option<OnResetHook>,
}

impl<Out: Send + 'static> HedgingExecutionContext<Out> {
    pub(crate) fn new(
        clock: Clock,
        handler: HedgingHandler<Out>,
        execution_pool: Arc<Pool<TaskExecution<Out>>>,
        max_attempts: u32,
    ) -> Self {
        Self {
            clock,
            handler,
            execution_pool,
            max_attempts,
            snapshot: None,
            tasks: Vec::new(),
            #[cfg(any(feature = "test-util", test))]
            on_reset: None,
            #[cfg(any(feature = "test-util", test))]
            on_task_reset: None,
        }
    }

    pub(crate) fn initialize(&mut self, parent: &ResilienceContext) {
        debug_assert!(self.tasks.is_empty(), "initializing a context that was not completed");
        self.snapshot = Some(ContextSnapshot::capture(parent));
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.snapshot.is_some()
    }

    pub(crate) fn loaded_tasks(&self) -> u32 {
        self.tasks.len() as u32
    }

    #[cfg(any(feature = "test-util", test))]
    pub(crate) fn set_reset_hooks(&mut self, on_reset: Option<OnResetHook>, on_task_reset: Option<OnResetHook>) {
        self.on_reset = on_reset;
        self.on_task_reset = on_task_reset;
    }

    /// Loads the next attempt: the primary on the first call, a
    /// generator-driven secondary afterwards.
    ///
    /// # Panics
    ///
    /// Panics when the context was configured with `max_attempts == 0` or
    /// used before `initialize` — both programmer errors, unreachable
    /// through the public builder.
    pub(crate) fn load_execution(&mut self, callback: &ActionFactory<Out>) -> ExecutionInfo<Out> {
        assert!(self.max_attempts > 0, "hedging requires at least one attempt");
        assert!(self.snapshot.is_some(), "loading into a context that is not initialized");

        if self.loaded_tasks() == self.max_attempts {
            return self.info_without_execution();
        }

        let attempt_number = self.tasks.len() as u32;
        let is_last = attempt_number.saturating_add(1) == self.max_attempts;

        let mut execution = self.execution_pool.rent();
        #[cfg(any(feature = "test-util", test))]
        if let Some(hook) = &self.on_task_reset {
            execution.set_on_reset(hook.clone());
        }

        // The primary never consults the generator; it always runs the
        // caller's operation.
        let generator = if attempt_number == 0 { None } else { self.handler.generator.as_ref() };
        let snapshot = self.snapshot.as_ref().expect("checked above");

        if execution.initialize(snapshot, attempt_number, is_last, callback, generator) {
            self.tasks.push(execution);
            ExecutionInfo {
                loaded: true,
                outcome: None,
            }
        } else {
            execution.reset();
            self.execution_pool.ret(execution);
            self.info_without_execution()
        }
    }

    /// Nothing could be loaded; if a sibling already finished, accept it and
    /// surface its outcome so the strategy can return it directly.
    fn info_without_execution(&mut self) -> ExecutionInfo<Out> {
        let completed = self.tasks.iter_mut().find(|task| task.is_completed());
        ExecutionInfo {
            loaded: false,
            outcome: completed.map(TaskExecution::accept_outcome),
        }
    }

    /// Waits up to `delay` for any attempt to complete.
    ///
    /// The returned future drives every in-flight attempt, so attempts make
    /// progress exactly while someone is waiting on them; ties are broken
    /// towards the lowest attempt number, and each completion is observed at
    /// most once. `Duration::ZERO` polls the set once; `Duration::MAX` waits
    /// with no timer. When the parent token fires, a cancelled outcome is
    /// materialized in the primary slot and cancellation is reported.
    pub(crate) fn try_wait_for_completed(&mut self, delay: Duration) -> WaitForCompleted<'_, Out> {
        let delay = Delay::new(&self.clock, delay);
        let cancellation = self
            .snapshot
            .as_ref()
            .expect("waiting on a context that is not initialized")
            .cancellation_token()
            .clone()
            .cancelled_owned();

        WaitForCompleted {
            execution: self,
            delay,
            cancellation: Box::pin(cancellation),
        }
    }

    /// Polls every running attempt, classifying fresh completions, then
    /// reports the earliest unobserved completed attempt.
    fn poll_attempts(&mut self, cx: &mut Context<'_>) -> Option<usize> {
        for task in &mut self.tasks {
            if task.poll_progress(cx) {
                let handled = self
                    .handler
                    .is_handled(task.outcome().expect("just completed"), &self.clock);
                task.set_handled(handled);
            }
        }

        let position = self
            .tasks
            .iter()
            .position(|task| task.is_completed() && !task.is_observed())?;
        self.tasks[position].mark_observed();
        Some(position)
    }

    fn record_cancellation(&mut self) {
        if let Some(primary) = self.tasks.first_mut() {
            primary.record_cancelled();
        }
    }

    pub(crate) fn is_handled(&self, index: usize) -> bool {
        self.tasks[index].is_handled()
    }

    pub(crate) fn outcome_of(&self, index: usize) -> &Outcome<Out> {
        self.tasks[index].outcome().expect("observed attempt has an outcome")
    }

    pub(crate) fn accept(&mut self, index: usize) -> Outcome<Out> {
        self.tasks[index].accept_outcome()
    }

    /// Tears down the call: restores the caller's property bag (merging the
    /// winner's mutations), cancels and drains every loser, resets all
    /// rented slots back into the pool, and leaves the context reusable.
    ///
    /// Completing a context that was never initialized is a no-op.
    pub(crate) async fn complete(&mut self) {
        let Some(snapshot) = self.snapshot.take() else {
            return;
        };

        // Multiple accepted attempts would be a programmer error; the last
        // writer wins, mirroring acceptance order.
        let winner = self.tasks.iter().rposition(TaskExecution::is_accepted);
        let winner_context = winner.and_then(|index| self.tasks[index].context());
        snapshot.restore_and_merge(winner_context);

        for task in &mut self.tasks {
            if !task.is_accepted() {
                task.cancel();
            }
            task.drain().await;
            task.reset();
        }
        for task in self.tasks.drain(..) {
            self.execution_pool.ret(task);
        }

        #[cfg(any(feature = "test-util", test))]
        if let Some(hook) = &self.on_reset {
            hook.call();
        }
    }
}

/// Future returned by
/// [`try_wait_for_completed`][HedgingExecutionContext::try_wait_for_completed].
///
/// One poll checks the parent cancellation first (the attempts' child tokens
/// are linked to it, so once it fires nothing useful can complete anymore),
/// then drives the attempts (completions are observed in attempt order even
/// when several finish together), then the delay timer.
pub(crate) struct WaitForCompleted<'a, Out> {
    execution: &'a mut HedgingExecutionContext<Out>,
    delay: Delay,
    cancellation: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl<Out: Send + 'static> Future for WaitForCompleted<'_, Out> {
    type Output = WaitResult;

    #[cfg_attr(test, mutants::skip)] // reordered polls can hang the wait
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.cancellation.as_mut().poll(cx).is_ready() {
            this.execution.record_cancellation();
            return Poll::Ready(WaitResult::Cancelled);
        }

        if let Some(index) = this.execution.poll_attempts(cx) {
            return Poll::Ready(WaitResult::Completed(index));
        }

        if Pin::new(&mut this.delay).poll(cx).is_ready() {
            return Poll::Ready(WaitResult::TimedOut);
        }

        Poll::Pending
    }
}
