// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use tick::Clock;

use crate::callbacks::HedgingHandler;
#[cfg(any(feature = "test-util", test))]
use crate::callbacks::OnResetHook;
use crate::constants::{CONTEXT_POOL_CAPACITY, EXECUTION_POOL_CAPACITY};
use crate::context::ResilienceContext;
use crate::execution::HedgingExecutionContext;
use crate::pool::Pool;
use crate::task::TaskExecution;

/// Per-strategy owner of the pooled per-call state.
///
/// The controller keeps one pool of [`HedgingExecutionContext`]s and one pool
/// of [`TaskExecution`] slots (shared into every context by handle), so a hot
/// strategy stops allocating once the pools warm up. Renting a context
/// initializes it against the caller's resilience context; it returns to the
/// pool once the call has completed it.
pub(crate) struct HedgingController<Out> {
    context_pool: Pool<HedgingExecutionContext<Out>>,
    #[cfg(any(feature = "test-util", test))]
    hooks: parking_lot::Mutex<ResetHooks>,
}

#[cfg(any(feature = "test-util", test))]
#[derive(Default)]
struct ResetHooks {
    on_context_reset: Option<OnResetHook>,
    on_task_reset: Option<OnResetHook>,
}

impl<Out: Send + 'static> HedgingController<Out> {
    pub(crate) fn new(clock: Clock, handler: HedgingHandler<Out>, max_attempts: u32) -> Self {
        let execution_pool = Arc::new(Pool::with_return_check(
            EXECUTION_POOL_CAPACITY,
            TaskExecution::new,
            TaskExecution::is_clear,
        ));

        let context_pool = Pool::new(CONTEXT_POOL_CAPACITY, move || {
            HedgingExecutionContext::new(clock.clone(), handler.clone(), Arc::clone(&execution_pool), max_attempts)
        });

        Self {
            context_pool,
            #[cfg(any(feature = "test-util", test))]
            hooks: parking_lot::Mutex::new(ResetHooks::default()),
        }
    }

    pub(crate) fn get_context(&self, parent: &ResilienceContext) -> HedgingExecutionContext<Out> {
        let mut context = self.context_pool.rent();

        #[cfg(any(feature = "test-util", test))]
        {
            let hooks = self.hooks.lock();
            context.set_reset_hooks(hooks.on_context_reset.clone(), hooks.on_task_reset.clone());
        }

        context.initialize(parent);
        context
    }

    pub(crate) fn return_context(&self, context: HedgingExecutionContext<Out>) {
        debug_assert!(!context.is_initialized(), "returning a context that was not completed");
        self.context_pool.ret(context);
    }

    #[cfg(any(feature = "test-util", test))]
    pub(crate) fn set_reset_hooks(&self, on_context_reset: OnResetHook, on_task_reset: OnResetHook) {
        let mut hooks = self.hooks.lock();
        hooks.on_context_reset = Some(on_context_reset);
        hooks.on_task_reset = Some(on_task_reset);
    }
}

impl<Out> std::fmt::Debug for HedgingController<Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HedgingController")
            .field("context_pool", &self.context_pool)
            .finish_non_exhaustive()
    }
}
