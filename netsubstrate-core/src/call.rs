use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

/// Cancellation and deadline applied to every remote call of an invocation.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Runs a remote call, failing it with [`ClientError::Cancelled`] once the
    /// token fires or with [`ClientError::Timeout`] once the deadline passes.
    pub async fn run<T, F>(&self, call: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        if self.cancellation.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        if self
            .deadline
            .is_some_and(|deadline| deadline <= Instant::now())
        {
            return Err(ClientError::Timeout);
        }

        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, call)
                    .await
                    .unwrap_or(Err(ClientError::Timeout)),
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(ClientError::Cancelled),
            result = bounded => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::error::ClientError;

    use super::CallContext;

    #[tokio::test]
    async fn passes_results_through() {
        let context = CallContext::default();

        assert_eq!(context.run(async { Ok::<_, ClientError>(7) }).await, Ok(7));
    }

    #[tokio::test]
    async fn cancelled_token_fails_the_call() {
        let token = CancellationToken::new();
        let context = CallContext::new(token.clone());
        token.cancel();

        let result = context.run(async { Ok::<_, ClientError>(()) }).await;

        assert_eq!(result, Err(ClientError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_times_the_call_out() {
        let context = CallContext::default().with_timeout(Duration::from_secs(5));

        let result = context
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, ClientError>(())
            })
            .await;

        assert_eq!(result, Err(ClientError::Timeout));
    }
}
