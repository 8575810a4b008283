//! Mail poller contract and the code-retrieval decision.
//!
//! The actual mailbox access lives in the host application; the flow only
//! consumes this contract. A poller must ignore messages older than `since`
//! and return as soon as a code is found rather than waiting out the timeout.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::clock::Clock;

#[async_trait]
pub trait MailPoller: Send + Sync {
    /// Poll for a verification code delivered at or after `since`.
    ///
    /// Returns `Ok(None)` when no code arrived within `timeout`.
    async fn poll_for_code(
        &self,
        timeout: Duration,
        interval: Duration,
        since: DateTime<Utc>,
    ) -> Result<Option<String>>;
}

/// Result of the poll → resend-once → poll-again sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeOutcome {
    Code { value: String, after_resend: bool },
    /// First poll timed out and no resend action was available.
    TimedOut,
    /// Resend was clicked but the second poll timed out too.
    TimedOutAfterResend,
}

/// Poll for a code; on timeout, trigger the resend action once and poll
/// again. There is never a third poll. The floor timestamp for the second
/// poll is re-recorded *before* the resend action runs, so a code delivered
/// in response to the original request is not mistaken for the resent one.
///
/// `resend` returns whether a resend control was found and clicked.
pub async fn poll_with_single_resend<'a>(
    poller: &dyn MailPoller,
    timeout: Duration,
    interval: Duration,
    clock: &dyn Clock,
    first_since: DateTime<Utc>,
    resend: impl FnOnce() -> BoxFuture<'a, Result<bool>>,
) -> Result<CodeOutcome> {
    if let Some(value) = poller.poll_for_code(timeout, interval, first_since).await? {
        return Ok(CodeOutcome::Code {
            value,
            after_resend: false,
        });
    }

    let resend_since = clock.now();
    if !resend().await? {
        return Ok(CodeOutcome::TimedOut);
    }

    match poller.poll_for_code(timeout, interval, resend_since).await? {
        Some(value) => Ok(CodeOutcome::Code {
            value,
            after_resend: true,
        }),
        None => Ok(CodeOutcome::TimedOutAfterResend),
    }
}
