//! Bounded polling primitive.
//!
//! Every waiting stage in the login flow (code input appearing, business
//! params materializing, UI probes) is a bounded poll with an explicit
//! interval, never a single long block, so a stuck page cannot hang the
//! caller and intermediate log lines stay useful.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Poll `probe` every `interval` until it yields a value or `timeout`
/// elapses. The probe runs at least once even with a zero timeout.
pub async fn poll_until<T, F, Fut>(timeout: Duration, interval: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        if Instant::now() + interval > deadline {
            return None;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_early_once_probe_succeeds() {
        let calls = AtomicU32::new(0);
        let result = poll_until(Duration::from_secs(5), Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { (n == 3).then_some(n) }
        })
        .await;

        assert_eq!(result, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_timeout() {
        let result: Option<()> =
            poll_until(Duration::from_millis(20), Duration::from_millis(5), || async { None })
                .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn zero_timeout_still_probes_once() {
        let calls = AtomicU32::new(0);
        let result = poll_until(Duration::ZERO, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Some(()) }
        })
        .await;
        assert_eq!(result, Some(()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
