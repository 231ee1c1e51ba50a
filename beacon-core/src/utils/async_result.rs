//! One-shot, multi-waiter result of an asynchronous chain operation.
//!
//! An [`AsyncResult`] starts pending and is settled exactly once, either with
//! a value ([`fulfill`](AsyncResult::fulfill)) or an error
//! ([`fail`](AsyncResult::fail)). Any number of clones may
//! [`wait`](AsyncResult::wait) on it and all of them observe the same outcome.
//! There is no timeout; callers that need one race `wait` against their own
//! cancellation signal.

use crate::error::BeaconError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Settling an already settled result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AsyncResultError {
    #[error("async result already settled")]
    AlreadySettled,
}

type Outcome<T> = Option<Result<T, BeaconError>>;

/// A pending or settled outcome, cheap to clone and safe to share across tasks.
pub struct AsyncResult<T> {
    tx: Arc<watch::Sender<Outcome<T>>>,
}

impl<T: Clone> AsyncResult<T> {
    /// Create a pending result.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Create a result that is already fulfilled with `value`.
    pub fn fulfilled(value: T) -> Self {
        let (tx, _) = watch::channel(Some(Ok(value)));
        Self { tx: Arc::new(tx) }
    }

    /// Create a result that has already failed with `error`.
    pub fn failed(error: BeaconError) -> Self {
        let (tx, _) = watch::channel(Some(Err(error)));
        Self { tx: Arc::new(tx) }
    }

    /// Settle the result with a value and wake every waiter.
    pub fn fulfill(&self, value: T) -> Result<(), AsyncResultError> {
        self.settle(Ok(value))
    }

    /// Settle the result with an error and wake every waiter.
    pub fn fail(&self, error: BeaconError) -> Result<(), AsyncResultError> {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: Result<T, BeaconError>) -> Result<(), AsyncResultError> {
        let settled = self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });
        if settled {
            Ok(())
        } else {
            Err(AsyncResultError::AlreadySettled)
        }
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The outcome, if the result has settled.
    pub fn try_outcome(&self) -> Option<Result<T, BeaconError>> {
        self.tx.borrow().clone()
    }

    /// Suspend until the result settles and return its outcome.
    pub async fn wait(&self) -> Result<T, BeaconError> {
        let mut rx = self.tx.subscribe();
        let outcome = {
            // The sender lives as long as `self`, so the channel cannot close here.
            let slot = rx
                .wait_for(Option::is_some)
                .await
                .map_err(|_| BeaconError::Cancelled)?;
            (*slot).clone()
        };
        outcome.unwrap_or(Err(BeaconError::Cancelled))
    }
}

impl<T: Clone> Default for AsyncResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for AsyncResult<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> fmt::Debug for AsyncResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResult")
            .field("settled", &self.tx.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fulfill_then_wait() {
        let result = AsyncResult::new();
        assert!(!result.is_settled());
        result.fulfill(42u64).unwrap();
        assert!(result.is_settled());
        assert_eq!(result.wait().await, Ok(42));
        assert_eq!(result.try_outcome(), Some(Ok(42)));
    }

    #[tokio::test]
    async fn test_second_settlement_is_rejected() {
        let result = AsyncResult::new();
        result.fulfill(1u64).unwrap();
        assert_eq!(result.fulfill(2), Err(AsyncResultError::AlreadySettled));
        assert_eq!(
            result.fail(BeaconError::Cancelled),
            Err(AsyncResultError::AlreadySettled)
        );
        assert_eq!(result.wait().await, Ok(1));
    }

    #[tokio::test]
    async fn test_all_waiters_observe_failure() {
        let result: AsyncResult<u64> = AsyncResult::new();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let result = result.clone();
                tokio::spawn(async move { result.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        result
            .fail(BeaconError::ChainUnavailable("rpc down".to_string()))
            .unwrap();

        for waiter in waiters {
            assert_eq!(
                waiter.await.unwrap(),
                Err(BeaconError::ChainUnavailable("rpc down".to_string()))
            );
        }
    }

    #[tokio::test]
    async fn test_presettled_constructors() {
        assert_eq!(AsyncResult::fulfilled("ok").wait().await, Ok("ok"));
        assert_eq!(
            AsyncResult::<()>::failed(BeaconError::Cancelled).wait().await,
            Err(BeaconError::Cancelled)
        );
    }
}
