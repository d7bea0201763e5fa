//! Per-request context: correlation id, cancellation and deadline.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use strata_core::{Result, StrataError};

/// Carried from the request boundary into every service call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: Uuid,
    cancel: CancellationToken,
    timeout: Duration,
}

impl RequestContext {
    pub fn new(timeout: Duration) -> Self {
        Self::with_cancel(CancellationToken::new(), timeout)
    }

    pub fn with_cancel(cancel: CancellationToken, timeout: Duration) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            cancel,
            timeout,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drive `work` until it finishes, the token fires, or the deadline passes.
    ///
    /// Cancellation and timeout drop `work` mid-flight, which rolls back any
    /// open store transaction, and surface as `Cancelled`.
    pub async fn run<T, F>(&self, op: &'static str, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let span = tracing::info_span!("op", op, correlation_id = %self.correlation_id);
        let work = tokio::time::timeout(self.timeout, work).instrument(span);

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StrataError::Cancelled(format!("{op} was cancelled"))),
            outcome = work => match outcome {
                Ok(result) => result,
                Err(_) => Err(StrataError::Cancelled(format!(
                    "{op} timed out after {:?}",
                    self.timeout
                ))),
            },
        };

        if let Err(e) = &result {
            tracing::warn!(
                op,
                correlation_id = %self.correlation_id,
                kind = %e.kind(),
                error = %e,
                "Operation failed"
            );
        }
        result
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use strata_core::ErrorKind;

    use super::*;

    #[tokio::test]
    async fn passes_results_through() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.run("noop", async { Ok(7) }).await.unwrap(), 7);

        let err = ctx
            .run("fail", async { Err::<(), _>(StrataError::UnknownNode("X".into())) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownNode);
    }

    #[tokio::test]
    async fn cancelled_token_wins() {
        let ctx = RequestContext::default();
        ctx.cancel_token().cancel();
        let err = ctx
            .run("slow", futures::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn cancellation_mid_flight() {
        let ctx = RequestContext::default();
        let token = ctx.cancel_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let err = ctx
            .run("slow", futures::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn deadline_becomes_cancelled() {
        let ctx = RequestContext::new(Duration::from_millis(10));
        let err = ctx
            .run("slow", futures::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(err.to_string().contains("timed out"));
    }
}
