use std::future::Future;
use std::time::Duration;

use crate::error::{ErrorClass, RequestError};

/// Controls how a failed operation is repeated by the caller
///
/// Equipment exceptions and invalid requests are never repeated since the answer would
/// not change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    /// Number of additional attempts after the first failure
    pub count: u16,
    /// Delay between two attempts
    pub sleep: Duration,
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self::default()
    }

    /// Create a policy from its fields
    pub fn new(count: u16, sleep: Duration) -> Self {
        Self { count, sleep }
    }

    pub(crate) fn should_retry(err: &RequestError) -> bool {
        matches!(err.class(), ErrorClass::Transport | ErrorClass::Protocol)
    }

    pub(crate) async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let mut remaining = self.count;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if remaining > 0 && Self::should_retry(&err) => {
                    remaining -= 1;
                    tracing::warn!("{}, {} attempt(s) left", err, remaining + 1);
                    if !self.sleep.is_zero() {
                        tokio::time::sleep(self.sleep).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}
