// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Hedging with a custom action generator: each hedge is routed to a
//! different replica by mutating the attempt's child context, and only the
//! winning attempt's routing decision survives into the caller's context.

use std::time::Duration;

use hedgerow::{Hedging, HedgingOptions, Outcome, RecoveryInfo, ResilienceContext, ResilienceKey};
use tick::Clock;

const REPLICA: ResilienceKey<String> = ResilienceKey::new("replica");

#[tokio::main]
async fn main() {
    let clock = Clock::new_tokio();
    let options = HedgingOptions::new(&clock).pipeline_name("replicated_read");

    let hedging: Hedging<Result<String, String>> = Hedging::builder("replica_hedge", &options)
        .should_handle_with(|outcome, _args| match outcome.as_completed() {
            Some(Ok(_)) => RecoveryInfo::never(),
            _ => RecoveryInfo::retry(),
        })
        .hedging_delay(Duration::from_millis(100))
        .max_hedged_attempts(2)
        .generator(|args| {
            // Each hedge targets the next replica.
            let replica = format!("replica-{}", args.attempt().index());
            println!("[generator] routing attempt {} to {replica}", args.attempt().index());
            args.context().properties().set(REPLICA, replica);
            Some(args.invoke_callback())
        })
        .build();

    let context = ResilienceContext::new();
    context.properties().set(REPLICA, "replica-0".to_string());

    let outcome = hedging.execute(&context, |attempt_context| read(attempt_context)).await;

    match outcome {
        Outcome::Completed(Ok(value)) => {
            let replica = context.properties().get(REPLICA).unwrap_or_default();
            println!("[main] got {value:?} from {replica}");
        }
        other => println!("[main] read failed: {other:?}"),
    }
}

/// Reads from whichever replica the attempt context names. Replica 0 is
/// down; the others answer after a short delay.
async fn read(context: ResilienceContext) -> Result<String, String> {
    let replica = context.properties().get(REPLICA).unwrap_or_default();

    if replica == "replica-0" {
        Err("replica-0 is down".to_string())
    } else {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(format!("row from {replica}"))
    }
}
