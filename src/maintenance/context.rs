use crate::clock::{Clock, SystemClock};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// Context threaded through a maintenance run.
///
/// Carries the cancellation token checked between tasks, the local clock used
/// to detect skew against the repository, and the tracing span that all log
/// records of the run attach to.
#[derive(Clone)]
pub struct MaintenanceContext {
    /// Token to check for cancellation requests.
    pub cancellation_token: CancellationToken,

    local_clock: Arc<dyn Clock>,
    span: Span,
}

impl MaintenanceContext {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            local_clock: Arc::new(SystemClock),
            span: Span::current(),
        }
    }

    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self::new(CancellationToken::new())
    }

    pub fn with_local_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.local_clock = clock;
        self
    }

    /// Same token and clock, records attached to `span` from now on.
    pub fn with_span(&self, span: Span) -> Self {
        Self {
            cancellation_token: self.cancellation_token.clone(),
            local_clock: self.local_clock.clone(),
            span,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn local_clock(&self) -> &dyn Clock {
        self.local_clock.as_ref()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl std::fmt::Debug for MaintenanceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceContext")
            .field("cancelled", &self.is_cancelled())
            .field("span", &self.span)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_child_context_shares_cancellation_and_clock() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ctx = MaintenanceContext::background().with_local_clock(Arc::new(ManualClock::new(t)));
        let child = ctx.with_span(tracing::info_span!("child"));
        assert!(!child.is_cancelled());
        assert_eq!(child.local_clock().now(), t);

        ctx.cancellation_token.cancel();
        assert!(child.is_cancelled());
    }
}
