// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Key used to annotate the name of a resilience pipeline.
///
/// Values reported under this dimension should be short and concise,
/// preferably in `snake_case`. Examples: `user_auth`, `data_processing`.
pub(crate) const PIPELINE_NAME: &str = "resilience.pipeline.name";

/// Key used to annotate the name of a resilience strategy.
pub(crate) const STRATEGY_NAME: &str = "resilience.strategy.name";

/// Key used to annotate the specific resilience event being emitted.
pub(crate) const EVENT_NAME: &str = "resilience.event.name";

/// Attribute key for the hedging attempt index.
pub(crate) const ATTEMPT_INDEX: &str = "resilience.attempt.index";

/// Attribute key indicating whether this is the last hedging attempt.
pub(crate) const ATTEMPT_IS_LAST: &str = "resilience.attempt.is_last";
