// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "This is a test module")]

//! Integration tests for the hedging strategy using only the public API.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hedgerow::{
    Hedging, HedgingOptions, INFINITE_HEDGING_DELAY, Outcome, RecoveryInfo, ResilienceContext, ResilienceKey,
    ShouldHandleArgs,
};
use rstest::rstest;
use tick::{Clock, ClockControl};
use tokio_util::sync::CancellationToken;

type Output = Result<String, String>;

const MARKER: ResilienceKey<&'static str> = ResilienceKey::new("marker");

/// Ok terminates the race; errors starting with "transient" keep it going.
fn classify(outcome: &Outcome<Output>, _args: ShouldHandleArgs<'_>) -> RecoveryInfo {
    match outcome.as_completed() {
        Some(Ok(_)) => RecoveryInfo::never(),
        Some(Err(error)) if error.starts_with("transient") => RecoveryInfo::retry(),
        Some(Err(_)) | None => RecoveryInfo::never(),
    }
}

fn auto_clock() -> Clock {
    ClockControl::new().auto_advance_timers(true).to_clock()
}

/// Collects `(attempt, has_outcome, duration)` per hedging notification.
#[derive(Clone, Default)]
struct HedgeLog(Arc<Mutex<Vec<(u32, bool, Duration)>>>);

impl HedgeLog {
    fn entries(&self) -> Vec<(u32, bool, Duration)> {
        self.0.lock().unwrap().clone()
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

fn strategy_with_log(options: &HedgingOptions, log: &HedgeLog) -> hedgerow::HedgingBuilder<Output> {
    let log = log.clone();
    Hedging::builder("test_hedging", options)
        .should_handle_with(classify)
        .on_hedging(move |args| {
            log.0
                .lock()
                .unwrap()
                .push((args.attempt().index(), args.outcome().is_some(), args.duration()));
        })
}

#[tokio::test]
async fn primary_succeeds_before_the_delay() {
    let clock = Clock::new_frozen();
    let options = HedgingOptions::new(&clock);
    let log = HedgeLog::default();
    let hedging = strategy_with_log(&options, &log).hedging_delay(Duration::from_secs(1)).build();

    let calls = Arc::new(AtomicU32::new(0));
    let calls_op = Arc::clone(&calls);
    let outcome = hedging
        .execute(&ResilienceContext::new(), move |_context| {
            calls_op.fetch_add(1, Ordering::SeqCst);
            async move { Ok("primary".to_string()) }
        })
        .await;

    assert_eq!(outcome, Outcome::Completed(Ok("primary".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(log.len(), 0);
}

#[tokio::test]
async fn slow_primary_is_beaten_by_a_hedge() {
    let clock = auto_clock();
    let options = HedgingOptions::new(&clock);
    let log = HedgeLog::default();
    let hedging = strategy_with_log(&options, &log)
        .hedging_delay(Duration::from_millis(500))
        .max_hedged_attempts(1)
        .build();

    let calls = Arc::new(AtomicU32::new(0));
    let calls_op = Arc::clone(&calls);
    let outcome = hedging
        .execute(&ResilienceContext::new(), move |_context| {
            let call = calls_op.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    // The primary never completes; the hedge must win.
                    std::future::pending().await
                } else {
                    Ok("hedged".to_string())
                }
            }
        })
        .await;

    assert_eq!(outcome, Outcome::Completed(Ok("hedged".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // One notification: the elapsed delay that launched the hedge.
    assert_eq!(log.entries(), vec![(0, false, Duration::from_millis(500))]);
}

#[tokio::test]
async fn handled_outcomes_keep_racing_until_an_unhandled_one() {
    let clock = auto_clock();
    let options = HedgingOptions::new(&clock);
    let log = HedgeLog::default();
    let hedging = strategy_with_log(&options, &log)
        .hedging_delay(Duration::ZERO)
        .max_hedged_attempts(2)
        .build();

    let calls = Arc::new(AtomicU32::new(0));
    let calls_op = Arc::clone(&calls);
    let outcome = hedging
        .execute(&ResilienceContext::new(), move |_context| {
            let call = calls_op.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(format!("transient_{call}"))
                } else {
                    Err("fatal".to_string())
                }
            }
        })
        .await;

    assert_eq!(outcome, Outcome::Completed(Err("fatal".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Two notifications, in ascending attempt order, each with an outcome.
    let entries = log.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!((entries[0].0, entries[0].1), (0, true));
    assert_eq!((entries[1].0, entries[1].1), (1, true));
}

#[tokio::test]
async fn cancellation_mid_flight_returns_cancelled_and_restores_the_context() {
    let clock = Clock::new_frozen();
    let options = HedgingOptions::new(&clock);
    let log = HedgeLog::default();
    let hedging = strategy_with_log(&options, &log)
        .hedging_delay(Duration::ZERO)
        .max_hedged_attempts(1)
        .build();

    let token = CancellationToken::new();
    let context = ResilienceContext::with_cancellation(token.clone());
    context.properties().set(MARKER, "original");

    let calls = Arc::new(AtomicU32::new(0));
    let calls_op = Arc::clone(&calls);
    let execute = hedging.execute(&context, move |attempt_context: ResilienceContext| {
        calls_op.fetch_add(1, Ordering::SeqCst);
        attempt_context.properties().set(MARKER, "attempt");
        std::future::pending::<Output>()
    });

    let cancel = async {
        // Let both attempts launch, then pull the plug.
        tokio::task::yield_now().await;
        token.cancel();
    };
    let (outcome, ()) = tokio::join!(execute, cancel);

    assert_eq!(outcome, Outcome::Cancelled);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Attempt mutations were discarded along with the losers.
    assert_eq!(context.properties().get(MARKER), Some("original"));
}

#[tokio::test]
async fn generator_exhaustion_waits_on_the_live_attempts() {
    let clock = auto_clock();
    let options = HedgingOptions::new(&clock);
    let log = HedgeLog::default();

    let (primary_go, primary_gate) = tokio::sync::oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(primary_gate)));

    let hedging = strategy_with_log(&options, &log)
        .hedging_delay(Duration::from_millis(50))
        .max_hedged_attempts(3)
        // The first hedge re-runs the operation; afterwards the generator is
        // exhausted and the race is down to the attempts already in flight.
        .generator(|args| if args.attempt().index() < 2 { Some(args.invoke_callback()) } else { None })
        .build();

    let context = ResilienceContext::new();
    let execute = hedging.execute(&context, move |_context| {
        let gate = gate.lock().unwrap().take();
        async move {
            match gate {
                Some(gate) => {
                    let _ = gate.await;
                    Ok("primary".to_string())
                }
                None => std::future::pending().await,
            }
        }
    });

    let log_for_driver = log.clone();
    let driver = async {
        // Release the primary only after the generator has been exhausted,
        // which happens after the second delay notification.
        while log_for_driver.len() < 2 {
            tokio::task::yield_now().await;
        }
        let _ = primary_go.send(());
    };

    let (outcome, ()) = tokio::join!(execute, driver);

    assert_eq!(outcome, Outcome::Completed(Ok("primary".to_string())));
    // No notifications after the generator declined.
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn dynamic_delays_schedule_each_hedge_independently() {
    let clock = auto_clock();
    let options = HedgingOptions::new(&clock);
    let log = HedgeLog::default();

    let (primary_go, primary_gate) = tokio::sync::oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(primary_gate)));

    let hedging = strategy_with_log(&options, &log)
        .max_hedged_attempts(5)
        .delay_generator(|args| match args.attempt() {
            1 => Duration::from_millis(100),
            2 => Duration::from_millis(50),
            _ => INFINITE_HEDGING_DELAY,
        })
        .build();

    let calls = Arc::new(AtomicU32::new(0));
    let calls_op = Arc::clone(&calls);
    let context = ResilienceContext::new();
    let execute = hedging.execute(&context, move |_context| {
        let call = calls_op.fetch_add(1, Ordering::SeqCst);
        let gate = if call == 0 { gate.lock().unwrap().take() } else { None };
        async move {
            match gate {
                Some(gate) => {
                    let _ = gate.await;
                    Ok("primary".to_string())
                }
                None => std::future::pending().await,
            }
        }
    });

    let log_for_driver = log.clone();
    let driver = async {
        // Both dynamic delays fire, the third gap is infinite; then the
        // primary is allowed to finish.
        while log_for_driver.len() < 2 {
            tokio::task::yield_now().await;
        }
        let _ = primary_go.send(());
    };

    let (outcome, ()) = tokio::join!(execute, driver);

    assert_eq!(outcome, Outcome::Completed(Ok("primary".to_string())));
    // No fourth attempt was ever launched.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        log.entries(),
        vec![(0, false, Duration::from_millis(100)), (1, false, Duration::from_millis(50))]
    );
}

#[tokio::test]
async fn infinite_delay_degenerates_to_awaiting_the_primary() {
    let clock = Clock::new_frozen();
    let options = HedgingOptions::new(&clock);
    let log = HedgeLog::default();
    let hedging = strategy_with_log(&options, &log)
        .hedging_delay(INFINITE_HEDGING_DELAY)
        .max_hedged_attempts(4)
        .build();

    let calls = Arc::new(AtomicU32::new(0));
    let calls_op = Arc::clone(&calls);
    let outcome = hedging
        .execute(&ResilienceContext::new(), move |_context| {
            calls_op.fetch_add(1, Ordering::SeqCst);
            async move { Ok("primary".to_string()) }
        })
        .await;

    assert_eq!(outcome, Outcome::Completed(Ok("primary".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(log.len(), 0);
}

#[tokio::test]
async fn zero_hedged_attempts_returns_a_handled_outcome_anyway() {
    let clock = Clock::new_frozen();
    let options = HedgingOptions::new(&clock);
    let log = HedgeLog::default();
    let hedging = strategy_with_log(&options, &log).max_hedged_attempts(0).build();

    let calls = Arc::new(AtomicU32::new(0));
    let calls_op = Arc::clone(&calls);
    let outcome = hedging
        .execute(&ResilienceContext::new(), move |_context| {
            calls_op.fetch_add(1, Ordering::SeqCst);
            async move { Err("transient_but_no_fallback".to_string()) }
        })
        .await;

    // Handled, but there is nothing to race against.
    assert_eq!(outcome, Outcome::Completed(Err("transient_but_no_fallback".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(log.len(), 0);
}

#[tokio::test]
async fn generator_declining_immediately_awaits_the_primary() {
    let clock = auto_clock();
    let options = HedgingOptions::new(&clock);
    let log = HedgeLog::default();

    let (primary_go, primary_gate) = tokio::sync::oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(primary_gate)));

    let hedging = strategy_with_log(&options, &log)
        .hedging_delay(Duration::from_millis(10))
        .max_hedged_attempts(2)
        .generator(|_args| None)
        .build();

    let calls = Arc::new(AtomicU32::new(0));
    let calls_op = Arc::clone(&calls);
    let context = ResilienceContext::new();
    let execute = hedging.execute(&context, move |_context| {
        calls_op.fetch_add(1, Ordering::SeqCst);
        let gate = gate.lock().unwrap().take();
        async move {
            match gate {
                Some(gate) => {
                    let _ = gate.await;
                    Ok("primary".to_string())
                }
                None => std::future::pending().await,
            }
        }
    });

    let log_for_driver = log.clone();
    let driver = async {
        // The delay elapses once; the generator then declines and the
        // strategy settles in to wait for the primary.
        while log_for_driver.len() < 1 {
            tokio::task::yield_now().await;
        }
        let _ = primary_go.send(());
    };

    let (outcome, ()) = tokio::join!(execute, driver);

    assert_eq!(outcome, Outcome::Completed(Ok("primary".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_attempts_surface_the_earliest_handled_outcome() {
    let clock = auto_clock();
    let options = HedgingOptions::new(&clock);
    let log = HedgeLog::default();
    let hedging = strategy_with_log(&options, &log)
        .hedging_delay(Duration::ZERO)
        .max_hedged_attempts(2)
        .build();

    let calls = Arc::new(AtomicU32::new(0));
    let calls_op = Arc::clone(&calls);
    let outcome = hedging
        .execute(&ResilienceContext::new(), move |_context| {
            let call = calls_op.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("transient_{call}")) }
        })
        .await;

    // Every attempt was handled; with nothing left to load, the earliest
    // completed outcome is returned.
    assert_eq!(outcome, Outcome::Completed(Err("transient_0".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // Notifications stay below the total attempt count.
    assert_eq!(log.len(), 2);
}

#[rstest]
#[case::zero(Duration::ZERO)]
#[case::short(Duration::from_millis(5))]
#[case::infinite(INFINITE_HEDGING_DELAY)]
#[tokio::test]
async fn unhandled_outcomes_return_immediately_for_any_delay(#[case] delay: Duration) {
    let clock = auto_clock();
    let options = HedgingOptions::new(&clock);
    let hedging: Hedging<Output> = Hedging::builder("test_hedging", &options)
        .should_handle_with(classify)
        .hedging_delay(delay)
        .max_hedged_attempts(2)
        .build();

    let outcome = hedging
        .execute(&ResilienceContext::new(), |_context| async { Err("fatal".to_string()) })
        .await;

    assert_eq!(outcome, Outcome::Completed(Err("fatal".to_string())));
}

#[tokio::test]
async fn pre_cancelled_token_short_circuits_without_running_the_operation() {
    let clock = Clock::new_frozen();
    let options = HedgingOptions::new(&clock);
    let hedging: Hedging<Output> = Hedging::builder("test_hedging", &options)
        .should_handle_with(classify)
        .build();

    let token = CancellationToken::new();
    token.cancel();
    let context = ResilienceContext::with_cancellation(token);

    let calls = Arc::new(AtomicU32::new(0));
    let calls_op = Arc::clone(&calls);
    let outcome = hedging
        .execute(&context, move |_context| {
            calls_op.fetch_add(1, Ordering::SeqCst);
            async move { Ok("never".to_string()) }
        })
        .await;

    assert_eq!(outcome, Outcome::Cancelled);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unavailable_outcomes_follow_the_handle_unavailable_flag() {
    let clock = auto_clock();
    let options = HedgingOptions::new(&clock);

    let classify_unavailable = |outcome: &Outcome<Output>, _args: ShouldHandleArgs<'_>| match outcome.as_completed() {
        Some(Ok(_)) => RecoveryInfo::never(),
        _ => RecoveryInfo::unavailable(),
    };

    // Disabled: the unavailable outcome is returned immediately.
    let hedging: Hedging<Output> = Hedging::builder("test_hedging", &options)
        .should_handle_with(classify_unavailable)
        .hedging_delay(Duration::ZERO)
        .build();
    let outcome = hedging
        .execute(&ResilienceContext::new(), |_context| async { Err("unavailable".to_string()) })
        .await;
    assert_eq!(outcome, Outcome::Completed(Err("unavailable".to_string())));

    // Enabled: the race continues and the healthy hedge wins.
    let hedging: Hedging<Output> = Hedging::builder("test_hedging", &options)
        .should_handle_with(classify_unavailable)
        .hedging_delay(Duration::ZERO)
        .handle_unavailable(true)
        .build();

    let calls = Arc::new(AtomicU32::new(0));
    let calls_op = Arc::clone(&calls);
    let outcome = hedging
        .execute(&ResilienceContext::new(), move |_context| {
            let call = calls_op.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Err("unavailable".to_string())
                } else {
                    Ok("recovered".to_string())
                }
            }
        })
        .await;
    assert_eq!(outcome, Outcome::Completed(Ok("recovered".to_string())));
}
