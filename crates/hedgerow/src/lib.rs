// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Hedged execution for async operations.
//!
//! # Quick Start
//!
//! Race a slow operation against delayed speculative copies of itself and
//! keep the first acceptable result:
//!
//! ```rust
//! # use std::time::Duration;
//! # use tick::Clock;
//! use hedgerow::{Hedging, HedgingOptions, Outcome, RecoveryInfo, ResilienceContext};
//!
//! # futures::executor::block_on(async {
//! # let clock = Clock::new_frozen();
//! let options = HedgingOptions::new(&clock).pipeline_name("lookup");
//!
//! let hedging: Hedging<Result<String, String>> = Hedging::builder("lookup_hedge", &options)
//!     .should_handle_with(|outcome, _| match outcome.as_completed() {
//!         Some(Ok(_)) => RecoveryInfo::never(),
//!         _ => RecoveryInfo::retry(),
//!     })
//!     .hedging_delay(Duration::from_millis(200))
//!     .max_hedged_attempts(2)
//!     .build();
//!
//! let context = ResilienceContext::new();
//! let outcome = hedging.execute(&context, |_context| async { Ok("value".to_string()) }).await;
//! assert_eq!(outcome, Outcome::Completed(Ok("value".to_string())));
//! # });
//! ```
//!
//! # How It Works
//!
//! The strategy launches the caller's operation immediately (the *primary*,
//! attempt 0). Whenever the configured hedging delay elapses without an
//! acceptable outcome, one more concurrent attempt launches, up to
//! `max_hedged_attempts` hedges. Each completed outcome is classified:
//!
//! - an **unhandled** outcome (success or permanent failure) terminates the
//!   race and is returned;
//! - a **handled** outcome (transient failure) keeps the race going;
//! - cancelling the context's token ends the call with
//!   [`Outcome::Cancelled`].
//!
//! Losing attempts are cancelled through child tokens linked to the caller's
//! and drained before the call returns; nothing keeps running behind the
//! caller's back.
//!
//! # Context Isolation
//!
//! Every attempt runs under a forked [`ResilienceContext`]: a clone of the
//! caller's property bag and event log under its own child token. Sibling
//! attempts never observe each other's mutations, and only the accepted
//! attempt's changes are merged back into the caller's context when the call
//! completes. Generators can mutate their attempt's context before it starts
//! (for example to target a different replica); those mutations follow the
//! same rule.
//!
//! # Configuration
//!
//! [`Hedging::builder`] uses a type-state pattern: the outcome classifier is
//! required before `build` is available. Everything else has defaults:
//!
//! | Parameter | Default | Configured By |
//! |-----------|---------|---------------|
//! | Max hedged attempts | `1` (2 total) | [`max_hedged_attempts`][HedgingBuilder::max_hedged_attempts] |
//! | Hedging delay | 2s | [`hedging_delay`][HedgingBuilder::hedging_delay], [`delay_generator`][HedgingBuilder::delay_generator] |
//! | Secondary attempts | re-run the operation | [`generator`][HedgingBuilder::generator] |
//! | Handle unavailable | `false` | [`handle_unavailable`][HedgingBuilder::handle_unavailable] |
//!
//! A delay of [`Duration::ZERO`][std::time::Duration::ZERO] hedges
//! immediately after a poll; [`INFINITE_HEDGING_DELAY`] never hedges and the
//! strategy degenerates to awaiting the primary.
//!
//! # Telemetry
//!
//! One event is reported per hedging notification (a delay elapsing, or a
//! handled outcome keeping the race going):
//!
//! - a `tracing` event at WARN level (`logs` feature),
//! - a `resilience.event` counter increment carrying pipeline, strategy,
//!   event and attempt attributes (`metrics` feature),
//! - a Warning [`ResilienceEvent`] in the caller context's event log.
//!
//! # Thread Safety
//!
//! [`Hedging`] is `Send + Sync` and cheap to clone; clones share the same
//! configuration and object pools. The strategy never spawns: attempts are
//! driven by the `execute` future itself, so the crate works on any async
//! runtime that can drive a [`tick::Clock`].

pub use recoverable::{Recovery, RecoveryInfo, RecoveryKind};

mod args;
mod attempt;
mod builder;
mod callbacks;
mod constants;
mod context;
mod controller;
mod execution;
#[cfg(any(feature = "metrics", test))]
mod metrics;
mod options;
mod outcome;
mod pool;
mod properties;
mod strategy;
mod task;
#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
pub(crate) mod testing;
mod utils;

pub use args::{HedgedTask, HedgingActionArgs, HedgingDelayArgs, OnHedgingArgs, ShouldHandleArgs};
pub use attempt::Attempt;
pub use builder::{HedgingBuilder, NotSet, Set};
pub use constants::INFINITE_HEDGING_DELAY;
pub use context::{PropertiesGuard, ResilienceContext};
pub use options::HedgingOptions;
pub use outcome::Outcome;
pub use properties::{EventSeverity, ResilienceEvent, ResilienceKey, ResilienceProperties};
pub use strategy::Hedging;
