// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use recoverable::{RecoveryInfo, RecoveryKind};
use tick::Clock;

use crate::args::{HedgedTask, HedgingActionArgs, HedgingDelayArgs, OnHedgingArgs, ShouldHandleArgs};
use crate::context::ResilienceContext;
use crate::outcome::Outcome;
use crate::utils::define_fn_wrapper;

define_fn_wrapper!(ShouldHandle<Out>(Fn(&Outcome<Out>, ShouldHandleArgs<'_>) -> RecoveryInfo));
define_fn_wrapper!(ActionFactory<Out>(Fn(ResilienceContext) -> HedgedTask<Out>));
define_fn_wrapper!(ActionGenerator<Out>(Fn(HedgingActionArgs<Out>) -> Option<HedgedTask<Out>>));
define_fn_wrapper!(OnHedging<Out>(Fn(OnHedgingArgs<'_, Out>)));
define_fn_wrapper!(DelayGenerator(Fn(HedgingDelayArgs) -> Duration));

/// Bundles the user callbacks that shape one hedging strategy: the outcome
/// classifier, the optional secondary-action generator, and the flag deciding
/// whether unavailability counts as transient.
pub(crate) struct HedgingHandler<Out> {
    pub(crate) should_handle: ShouldHandle<Out>,
    pub(crate) generator: Option<ActionGenerator<Out>>,
    pub(crate) handle_unavailable: bool,
}

impl<Out> HedgingHandler<Out> {
    /// Classifies an attempt outcome: a handled outcome keeps the race going,
    /// an unhandled one terminates it.
    pub(crate) fn is_handled(&self, outcome: &Outcome<Out>, clock: &Clock) -> bool {
        let recovery = self.should_handle.call(outcome, ShouldHandleArgs { clock });

        match recovery.kind() {
            RecoveryKind::Retry => true,
            RecoveryKind::Unavailable => self.handle_unavailable,
            // Wildcard required because RecoveryKind is #[non_exhaustive].
            // New variants default to non-recoverable; update when adding variants.
            RecoveryKind::Never | RecoveryKind::Unknown | _ => false,
        }
    }
}

impl<Out> Clone for HedgingHandler<Out> {
    fn clone(&self) -> Self {
        Self {
            should_handle: self.should_handle.clone(),
            generator: self.generator.clone(),
            handle_unavailable: self.handle_unavailable,
        }
    }
}

impl<Out> std::fmt::Debug for HedgingHandler<Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HedgingHandler")
            .field("has_generator", &self.generator.is_some())
            .field("handle_unavailable", &self.handle_unavailable)
            .finish()
    }
}

/// Observes attempt and context recycling; installed by tests to verify that
/// everything rented during a call drains back into the pools.
#[cfg(any(feature = "test-util", test))]
#[derive(Clone)]
pub(crate) struct OnResetHook(std::sync::Arc<dyn Fn() + Send + Sync>);

#[cfg(any(feature = "test-util", test))]
impl OnResetHook {
    pub(crate) fn new(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self(std::sync::Arc::new(hook))
    }

    pub(crate) fn call(&self) {
        (self.0)();
    }
}

#[cfg(any(feature = "test-util", test))]
impl std::fmt::Debug for OnResetHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnResetHook").finish()
    }
}
