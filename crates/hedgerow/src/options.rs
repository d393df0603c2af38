// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;

use tick::Clock;

use crate::utils::TelemetryHelper;

pub(crate) const DEFAULT_PIPELINE_NAME: &str = "default";

/// Shared options for hedging strategies.
///
/// `HedgingOptions` bundles a clock and telemetry configuration (pipeline
/// name, OpenTelemetry meter, structured logs) that every strategy built from
/// it uses to measure time and report hedging events. Reuse one instance for
/// all the strategies of a logical pipeline so their telemetry carries the
/// same pipeline attribute.
///
/// # Examples
///
/// ```
/// # use hedgerow::HedgingOptions;
/// # use tick::Clock;
/// # fn example(clock: Clock) {
/// let options = HedgingOptions::new(&clock).pipeline_name("user_auth");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HedgingOptions {
    clock: Clock,
    pipeline_name: Cow<'static, str>,
    #[cfg(any(feature = "metrics", test))]
    meter: Option<opentelemetry::metrics::Meter>,
    logs_enabled: bool,
}

impl HedgingOptions {
    /// Creates options with a clock.
    ///
    /// Initializes with `pipeline_name = "default"`. Enable metrics via
    /// [`enable_metrics`](Self::enable_metrics) and logs via
    /// [`enable_logs`](Self::enable_logs) if needed.
    pub fn new(clock: impl AsRef<Clock>) -> Self {
        Self {
            clock: clock.as_ref().clone(),
            pipeline_name: Cow::Borrowed(DEFAULT_PIPELINE_NAME),
            #[cfg(any(feature = "metrics", test))]
            meter: None,
            logs_enabled: false,
        }
    }

    /// Sets the logical pipeline name used to correlate telemetry.
    ///
    /// Prefer `snake_case`, e.g., `user_auth`, `data_ingest`.
    #[must_use]
    pub fn pipeline_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.pipeline_name = name.into();
        self
    }

    /// Enables metrics reporting with a custom meter provider.
    ///
    /// Metrics are disabled by default.
    #[must_use]
    #[cfg(any(feature = "metrics", test))]
    pub fn enable_metrics(self, provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        Self {
            meter: Some(crate::metrics::create_meter(provider)),
            ..self
        }
    }

    /// Enables structured logging for hedging events.
    ///
    /// Logs are disabled by default.
    #[must_use]
    #[cfg(any(feature = "logs", test))]
    pub fn enable_logs(self) -> Self {
        Self {
            logs_enabled: true,
            ..self
        }
    }

    pub(crate) fn clock(&self) -> &Clock {
        &self.clock
    }

    #[cfg_attr(
        not(any(feature = "metrics", feature = "logs", test)),
        expect(unused_variables, reason = "unused when neither logs nor metrics are used")
    )]
    pub(crate) fn create_telemetry(&self, strategy_name: Cow<'static, str>) -> TelemetryHelper {
        TelemetryHelper {
            #[cfg(any(feature = "metrics", test))]
            event_reporter: self.meter.as_ref().map(crate::metrics::create_resilience_event_counter),
            #[cfg(any(feature = "metrics", feature = "logs", test))]
            pipeline_name: self.pipeline_name.clone(),
            #[cfg(any(feature = "metrics", feature = "logs", test))]
            strategy_name,
            #[cfg(any(feature = "logs", test))]
            logs_enabled: self.logs_enabled,
        }
    }
}
