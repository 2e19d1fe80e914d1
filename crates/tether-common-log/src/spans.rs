//! Spans for the loop phases.

use std::future::Future;
use tracing::{info_span, Instrument, Span};

/// Span covering one pass of the loop.
pub fn iteration_span(run_id: &str, index: u32) -> Span {
    info_span!("iteration", run = %run_id, index)
}

/// Span covering a single phase (`extract`, `locate`, `assign`, ...).
pub fn phase_span(phase: &str) -> Span {
    info_span!("phase", name = %phase)
}

/// Span for one batch sent to the generative service.
pub fn batch_span(stage: &str, batch: usize, claims: usize) -> Span {
    info_span!("batch", stage = %stage, batch, claims)
}

/// Instrument a future with a span.
pub fn instrument_future<F: Future>(future: F, span: Span) -> impl Future<Output = F::Output> {
    future.instrument(span)
}

/// Timing utility for operations.
pub struct Timer {
    start: std::time::Instant,
    operation: &'static str,
}

impl Timer {
    /// Start a new timer.
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: std::time::Instant::now(),
            operation,
        }
    }

    /// Milliseconds since the timer started.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Complete the timer and record duration.
    pub fn finish(self) -> u64 {
        let duration_ms = self.elapsed_ms();
        tracing::debug!(
            operation = %self.operation,
            duration_ms,
            "operation completed"
        );
        duration_ms
    }
}

/// Macro for timing a block of code.
#[macro_export]
macro_rules! timed {
    ($name:expr, $body:expr) => {{
        let _timer = $crate::spans::Timer::start($name);
        let result = $body;
        _timer.finish();
        result
    }};
}
