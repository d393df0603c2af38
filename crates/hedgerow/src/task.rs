// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::future::Future;
use std::pin::{Pin, pin};
use std::task::{Context, Poll};

use futures_util::future::{Either, select};
use tokio_util::sync::CancellationToken;

use crate::args::HedgingActionArgs;
use crate::attempt::Attempt;
use crate::callbacks::{ActionFactory, ActionGenerator};
#[cfg(any(feature = "test-util", test))]
use crate::callbacks::OnResetHook;
use crate::context::{ContextSnapshot, ResilienceContext};
use crate::outcome::Outcome;

/// Whether an attempt is the caller's original operation or a hedge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum AttemptKind {
    #[default]
    Primary,
    Secondary,
}

type ExecutionFuture<Out> = Pin<Box<dyn Future<Output = Outcome<Out>> + Send>>;

/// A reusable slot for one racing attempt.
///
/// The slot owns the attempt's forked child context, the child cancellation
/// token, and the in-flight future. The stored future races the user's
/// operation against the child token, so it resolves to a cancelled outcome
/// as soon as the token fires even when the operation ignores cancellation;
/// dropping the inner future is what actually stops the work.
///
/// Lifecycle: rented → initialized → driven to completion (or cancelled) →
/// accepted or drained → reset → returned to the pool.
pub(crate) struct TaskExecution<Out> {
    kind: AttemptKind,
    attempt_number: u32,
    task: Option<ExecutionFuture<Out>>,
    outcome: Option<Outcome<Out>>,
    handled: bool,
    accepted: bool,
    observed: bool,
    context: Option<ResilienceContext>,
    cancellation: Option<CancellationToken>,
    #[cfg(any(feature = "test-util", test))]
    on_reset: Option<OnResetHook>,
}

impl<Out> TaskExecution<Out> {
    pub(crate) fn new() -> Self {
        Self {
            kind: AttemptKind::Primary,
            attempt_number: 0,
            task: None,
            outcome: None,
            handled: false,
            accepted: false,
            observed: false,
            context: None,
            cancellation: None,
            #[cfg(any(feature = "test-util", test))]
            on_reset: None,
        }
    }

    pub(crate) fn kind(&self) -> AttemptKind {
        self.kind
    }

    pub(crate) fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.outcome.is_some()
    }

    pub(crate) fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub(crate) fn is_handled(&self) -> bool {
        self.handled
    }

    pub(crate) fn set_handled(&mut self, handled: bool) {
        self.handled = handled;
    }

    pub(crate) fn is_observed(&self) -> bool {
        self.observed
    }

    pub(crate) fn mark_observed(&mut self) {
        self.observed = true;
    }

    pub(crate) fn outcome(&self) -> Option<&Outcome<Out>> {
        self.outcome.as_ref()
    }

    pub(crate) fn context(&self) -> Option<&ResilienceContext> {
        self.context.as_ref()
    }

    /// True when the slot carries no call state and can be pooled.
    pub(crate) fn is_clear(&self) -> bool {
        self.task.is_none() && self.outcome.is_none() && self.context.is_none() && self.cancellation.is_none()
    }

    #[cfg(any(feature = "test-util", test))]
    pub(crate) fn set_on_reset(&mut self, hook: OnResetHook) {
        self.on_reset = Some(hook);
    }

    /// Marks this attempt as the winner and yields its outcome.
    ///
    /// The slot keeps its child context so the winner's mutations can be
    /// merged back during completion.
    pub(crate) fn accept_outcome(&mut self) -> Outcome<Out> {
        self.accepted = true;
        self.outcome.take().expect("accepting an attempt that has not completed")
    }

    /// Triggers the attempt's child cancellation token.
    pub(crate) fn cancel(&self) {
        if let Some(cancellation) = &self.cancellation {
            cancellation.cancel();
        }
    }

    /// Records an externally observed cancellation without driving the
    /// future: the in-flight work is dropped and the slot completes with a
    /// cancelled outcome.
    pub(crate) fn record_cancelled(&mut self) {
        if self.task.take().is_some() {
            self.cancel();
            self.outcome = Some(Outcome::Cancelled);
            self.handled = false;
            self.observed = true;
        }
    }

    /// Polls the in-flight future once. Returns `true` when the attempt
    /// newly completed on this poll; the caller classifies the outcome.
    pub(crate) fn poll_progress(&mut self, cx: &mut Context<'_>) -> bool {
        let Some(task) = self.task.as_mut() else {
            return false;
        };

        match task.as_mut().poll(cx) {
            Poll::Ready(outcome) => {
                self.task = None;
                self.outcome = Some(outcome);
                true
            }
            Poll::Pending => false,
        }
    }

    /// Cancels and awaits the in-flight future, if any. A loser's outcome is
    /// never observed; quiescence is all that matters here.
    pub(crate) async fn drain(&mut self) {
        if let Some(task) = self.task.take() {
            self.cancel();
            let _ = task.await;
        }
    }

    /// Clears all per-call state, firing the reset hook first.
    ///
    /// The slot must be quiescent: either never initialized, drained, or
    /// completed.
    pub(crate) fn reset(&mut self) {
        #[cfg(any(feature = "test-util", test))]
        if let Some(hook) = &self.on_reset {
            hook.call();
        }

        debug_assert!(self.task.is_none(), "resetting an attempt that is still in flight");

        self.kind = AttemptKind::Primary;
        self.attempt_number = 0;
        self.outcome = None;
        self.handled = false;
        self.accepted = false;
        self.observed = false;
        self.context = None;
        self.cancellation = None;
    }
}

impl<Out: Send + 'static> TaskExecution<Out> {
    /// Loads the slot with one attempt.
    ///
    /// Attempt 0 starts the caller's operation directly. Later attempts ask
    /// the generator for a future; when the generator declines (`None`) the
    /// slot is left untouched and `false` is returned, which the execution
    /// context reports as "cannot load". Without a generator, hedges re-run
    /// the original operation.
    pub(crate) fn initialize(
        &mut self,
        snapshot: &ContextSnapshot,
        attempt_number: u32,
        is_last: bool,
        callback: &ActionFactory<Out>,
        generator: Option<&ActionGenerator<Out>>,
    ) -> bool {
        debug_assert!(self.is_clear(), "initializing a slot that was not reset");

        let (context, cancellation) = snapshot.fork();
        let kind = if attempt_number == 0 {
            AttemptKind::Primary
        } else {
            AttemptKind::Secondary
        };

        let task = match kind {
            AttemptKind::Primary => callback.call(context.clone()),
            AttemptKind::Secondary => {
                let args = HedgingActionArgs {
                    context: context.clone(),
                    attempt: Attempt::new(attempt_number, is_last),
                    callback: callback.clone(),
                };
                match generator {
                    Some(generator) => match generator.call(args) {
                        Some(task) => task,
                        None => return false,
                    },
                    None => callback.call(context.clone()),
                }
            }
        };

        let cancelled = cancellation.clone().cancelled_owned();
        self.task = Some(Box::pin(async move {
            let task = pin!(task);
            let cancelled = pin!(cancelled);
            match select(task, cancelled).await {
                Either::Left((out, _)) => Outcome::Completed(out),
                Either::Right(((), _)) => Outcome::Cancelled,
            }
        }));
        self.kind = kind;
        self.attempt_number = attempt_number;
        self.context = Some(context);
        self.cancellation = Some(cancellation);
        true
    }
}
