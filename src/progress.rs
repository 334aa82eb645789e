//! Observer trait for individual fetch attempts.
//!
//! The Retrying Fetcher returns only the final outcome to its caller, but
//! every attempt is reported here as it happens. Inject an
//! [`Arc<dyn FetchObserver>`] into an orchestrator (or pass one straight to
//! [`crate::pipeline::fetch::fetch_with_retry`]) to drive a spinner, write
//! an audit log, or count attempts in a test.
//!
//! # Example
//!
//! ```rust
//! use dwani_client::FetchObserver;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! #[derive(Default)]
//! struct CountingObserver {
//!     attempts: AtomicU32,
//! }
//!
//! impl FetchObserver for CountingObserver {
//!     fn on_attempt_start(&self, _endpoint: &str, _attempt: u32, _max_attempts: u32) {
//!         self.attempts.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let observer = CountingObserver::default();
//! observer.on_attempt_start("/v1/user-captures/", 1, 4);
//! assert_eq!(observer.attempts.load(Ordering::SeqCst), 1);
//! ```

use std::sync::Arc;
use std::time::Duration;

/// Called by the Retrying Fetcher around each attempt.
///
/// All methods default to no-ops so implementors only override what they
/// care about. Implementations must be `Send + Sync`: fetches run on tokio
/// tasks and may report from any worker thread.
pub trait FetchObserver: Send + Sync {
    /// Called immediately before an attempt is sent.
    ///
    /// # Arguments
    /// * `endpoint`    : request path, e.g. `/v1/indic-custom-prompt-pdf-all`
    /// * `attempt`     : 1-indexed attempt number
    /// * `max_attempts`: attempts allowed by the policy
    fn on_attempt_start(&self, endpoint: &str, attempt: u32, max_attempts: u32) {
        let _ = (endpoint, attempt, max_attempts);
    }

    /// Called when an attempt fails, before any retry wait.
    ///
    /// # Arguments
    /// * `status`: HTTP status, or `None` for transport-level failures
    /// * `error` : response body text or transport error message
    fn on_attempt_failed(&self, endpoint: &str, attempt: u32, status: Option<u16>, error: &str) {
        let _ = (endpoint, attempt, status, error);
    }

    /// Called when a retry has been scheduled `delay` from now.
    fn on_retry_scheduled(&self, endpoint: &str, next_attempt: u32, delay: Duration) {
        let _ = (endpoint, next_attempt, delay);
    }

    /// Called once with the final outcome.
    ///
    /// # Arguments
    /// * `attempts`: attempts actually made
    /// * `success` : whether the last attempt succeeded
    fn on_complete(&self, endpoint: &str, attempts: u32, success: bool) {
        let _ = (endpoint, attempts, success);
    }
}

/// A no-op observer for callers that don't need attempt events.
pub struct NoopFetchObserver;

impl FetchObserver for NoopFetchObserver {}

/// Convenience alias for the shared observer handle.
pub type SharedObserver = Arc<dyn FetchObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingObserver {
        starts: AtomicU32,
        failures: AtomicU32,
        retries: Mutex<Vec<Duration>>,
        completed: Mutex<Option<(u32, bool)>>,
    }

    impl FetchObserver for TrackingObserver {
        fn on_attempt_start(&self, _endpoint: &str, _attempt: u32, _max: u32) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_attempt_failed(&self, _e: &str, _a: u32, _s: Option<u16>, _err: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }

        fn on_retry_scheduled(&self, _e: &str, _next: u32, delay: Duration) {
            self.retries.lock().unwrap().push(delay);
        }

        fn on_complete(&self, _e: &str, attempts: u32, success: bool) {
            *self.completed.lock().unwrap() = Some((attempts, success));
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopFetchObserver;
        o.on_attempt_start("/x", 1, 3);
        o.on_attempt_failed("/x", 1, Some(500), "boom");
        o.on_retry_scheduled("/x", 2, Duration::from_millis(10));
        o.on_complete("/x", 2, true);
    }

    #[test]
    fn tracking_observer_receives_events() {
        let o = TrackingObserver::default();
        o.on_attempt_start("/x", 1, 2);
        o.on_attempt_failed("/x", 1, None, "refused");
        o.on_retry_scheduled("/x", 2, Duration::from_millis(1500));
        o.on_attempt_start("/x", 2, 2);
        o.on_complete("/x", 2, true);

        assert_eq!(o.starts.load(Ordering::SeqCst), 2);
        assert_eq!(o.failures.load(Ordering::SeqCst), 1);
        assert_eq!(*o.retries.lock().unwrap(), vec![Duration::from_millis(1500)]);
        assert_eq!(*o.completed.lock().unwrap(), Some((2, true)));
    }

    #[test]
    fn arc_dyn_observer_works() {
        let o: SharedObserver = Arc::new(NoopFetchObserver);
        o.on_attempt_start("/y", 1, 1);
        o.on_complete("/y", 1, false);
    }
}
