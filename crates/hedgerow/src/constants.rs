// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default maximum hedged attempts: 1.
///
/// One additional hedged attempt beyond the original request, resulting in 2
/// total concurrent attempts. This provides basic speculative execution
/// benefits while limiting resource overhead.
pub(crate) const DEFAULT_MAX_HEDGED_ATTEMPTS: u32 = 1;

/// Default delay between launching hedged requests: 2 seconds.
///
/// A 2-second delay provides enough time for the original request to complete
/// in most scenarios while still launching hedges quickly enough to reduce
/// tail latency.
pub(crate) const DEFAULT_HEDGING_DELAY: Duration = Duration::from_secs(2);

/// Sentinel delay meaning "do not launch another hedge".
///
/// When the configured hedging delay, or a value returned by the delay
/// generator, equals this constant, the strategy launches no further attempts
/// and instead waits for the in-flight set to produce an outcome. The
/// underlying timer treats `Duration::MAX` as a delay that never elapses, so
/// the sentinel composes with ordinary waits.
pub const INFINITE_HEDGING_DELAY: Duration = Duration::MAX;

/// Name of the event reported for every hedging notification, both in the
/// context event log and in telemetry.
pub(crate) const ON_HEDGING_EVENT: &str = "on_hedging";

/// Bound on idle per-call execution contexts kept by one strategy instance.
pub(crate) const CONTEXT_POOL_CAPACITY: usize = 16;

/// Bound on idle attempt slots kept by one strategy instance.
pub(crate) const EXECUTION_POOL_CAPACITY: usize = 64;
