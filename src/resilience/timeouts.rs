//! Timeout enforcement.
//!
//! Every wrapped action races a deadline. Elapsed deadlines surface as
//! [`GatewayError::Timeout`] so they stay distinguishable from application
//! failures. Dropping the inner future is the only cancellation.

use std::future::Future;
use std::time::Duration;

use crate::gateway::types::{GatewayError, GatewayResult};

/// Await `fut`, failing with a timeout error once `deadline` has elapsed.
pub async fn with_deadline<T, Fut>(deadline: Duration, fut: Fut) -> GatewayResult<T>
where
    Fut: Future<Output = GatewayResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(deadline.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slow_future_times_out() {
        let result: GatewayResult<()> = with_deadline(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(GatewayError::Timeout(50)));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: GatewayResult<()> =
            with_deadline(Duration::from_secs(1), async { Err(GatewayError::NotFound) }).await;
        assert_eq!(result, Err(GatewayError::NotFound));
    }
}
