// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Hedging example demonstrating how a slow primary request is hedged with a
//! faster secondary request that completes first.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use hedgerow::{Hedging, HedgingOptions, RecoveryInfo, ResilienceContext};
use tick::Clock;

static CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[tokio::main]
async fn main() {
    let clock = Clock::new_tokio();
    let options = HedgingOptions::new(&clock).pipeline_name("example");

    // If the original request hasn't produced an acceptable result after
    // 200ms, launch a hedge. The first acceptable response wins.
    let hedging: Hedging<String> = Hedging::builder("my_hedge", &options)
        .should_handle_with(|_outcome, _args| RecoveryInfo::never())
        .hedging_delay(Duration::from_millis(200))
        .on_hedging(|args| {
            println!(
                "[hedge] launching attempt {} (last: {})",
                args.attempt().index() + 1,
                args.attempt().is_last()
            );
        })
        .build();

    println!("[main] sending request...");
    let start = std::time::Instant::now();

    let context = ResilienceContext::new();
    let outcome = hedging.execute(&context, |_context| slow_then_fast_operation()).await;

    println!("[main] result: {outcome:?} (took {:?})", start.elapsed());
}

/// Simulates a service where the first call is slow (500ms) and the second
/// call (the hedge) is fast (50ms). The hedge completes before the original,
/// demonstrating how hedging reduces tail latency.
async fn slow_then_fast_operation() -> String {
    let call = CALL_COUNT.fetch_add(1, Ordering::Relaxed);

    if call == 0 {
        println!("[service] attempt 0: slow path (500ms)");
        tokio::time::sleep(Duration::from_millis(500)).await;
        "slow response".to_string()
    } else {
        println!("[service] attempt {call}: fast path (50ms)");
        tokio::time::sleep(Duration::from_millis(50)).await;
        "fast response".to_string()
    }
}
