//! Execution context handed to every pipeline stage.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Cancellation and deadline scope for one pipeline run.
///
/// Cloning is cheap and clones observe the same cancellation. Deriving with
/// [`ExecutionContext::with_timeout`] creates a child: cancelling the parent
/// cancels the child, never the other way around.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl ExecutionContext {
    /// A root context with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context driven by an existing cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
            timeout: None,
        }
    }

    /// Derive a child context that additionally expires after `timeout`.
    ///
    /// The child keeps the earlier of its own and the parent's deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let (deadline, timeout) = match (self.deadline, self.timeout) {
            (Some(parent), Some(parent_timeout)) if parent <= deadline => (parent, parent_timeout),
            _ => (deadline, timeout),
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
            timeout: Some(timeout),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel this context and all contexts derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the context was cancelled or its deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Drive `fut` to completion unless the context ends first.
    ///
    /// Yields [`Error::Cancelled`] on cancellation and [`Error::Timeout`] when
    /// the deadline passes. The future is dropped in both cases.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match self.deadline {
            Some(deadline) => {
                let timeout = self.timeout.unwrap_or_default();
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(Error::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => Err(Error::Timeout(timeout)),
                    result = fut => result,
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(Error::Cancelled),
                    result = fut => result,
                }
            }
        }
    }
}
