/*!
 * Hypercall Tracing
 * Structured tracing for hypercalls using the tracing crate
 *
 * Features:
 * - One span per hypercall, tagged with a monotonically increasing sequence number
 * - JSON-formatted logs for structured parsing
 * - `log` records from table-level code routed into the same subscriber
 * - Slow-call warnings
 */

use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
    EnvFilter,
};

/// Hypercalls slower than this are reported at warn level
const SLOW_HYPERCALL: Duration = Duration::from_millis(10);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - GUEST_BRIDGE_TRACE_JSON: Enable JSON output (default: false)
///
/// Fails instead of panicking when a global subscriber is already installed,
/// since the bridge is usually embedded in a larger VMM.
pub fn init_tracing() -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("GUEST_BRIDGE_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
        info!("Structured tracing initialized");
    }
    Ok(())
}

/// Span covering one hypercall from decode to response
pub struct HypercallSpan {
    span: tracing::Span,
    start: Instant,
    call: &'static str,
    seq: u64,
}

impl HypercallSpan {
    pub fn new(call: &'static str, seq: u64) -> Self {
        let span = span!(
            Level::DEBUG,
            "hypercall",
            seq = seq,
            call = call,
            retval = tracing::field::Empty,
            error = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            call,
            seq,
        }
    }

    /// Record the response fields
    pub fn record_response(&self, retval: i64, error: i64) {
        self.span.record("retval", retval);
        self.span.record("error", error);
    }

    /// Enter the span context
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for HypercallSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        if duration > SLOW_HYPERCALL {
            warn!(
                seq = self.seq,
                call = self.call,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow hypercall detected"
            );
        } else {
            debug!(
                seq = self.seq,
                call = self.call,
                duration_us = duration.as_micros() as u64,
                "hypercall completed"
            );
        }
    }
}
