//! # Watchdog
//!
//! Restartable one-shot timer used to detect stalled reads and writes.
//!
//! Every [`Watchdog::arm`] starts a new *cycle*. The cycle number and a
//! "fired" bit share one atomic word, so firing is a single compare-and-set
//! from `(cycle, not fired)` to `(cycle, fired)`:
//! - a timer that expires after `disarm`/`arm` sees a newer cycle and does nothing,
//! - any number of concurrent expiries of one cycle run the handler exactly once.
//!
//! Cancellation is therefore either effective (the handler never runs) or a
//! no-op (the handler already won the compare-and-set).
//!
//! The handler runs on the timer task itself. Aborting that task from inside
//! the handler is harmless as long as the handler does not await, so handlers
//! hand any async follow-up to a fresh task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

const FIRED: u64 = 1;

type TimeoutHandler = Box<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct Watchdog {
    inner: Arc<Inner>,
}

struct Inner {
    name: &'static str,
    /// `(cycle << 1) | fired`
    state: AtomicU64,
    timer: Mutex<Option<JoinHandle<()>>>,
    runtime: Handle,
    on_timeout: TimeoutHandler,
}

impl Watchdog {
    pub fn new<F>(name: &'static str, runtime: Handle, on_timeout: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                name,
                state: AtomicU64::new(0),
                timer: Mutex::new(None),
                runtime,
                on_timeout: Box::new(on_timeout),
            }),
        }
    }

    /// Start a new cycle that expires after `deadline`, replacing any pending one.
    ///
    /// Returns the cycle number.
    pub fn arm(&self, deadline: Duration) -> u64 {
        let cycle = self.inner.next_cycle();
        let inner = Arc::clone(&self.inner);
        let task = self.inner.runtime.spawn(async move {
            tokio::time::sleep(deadline).await;
            inner.expire(cycle);
        });
        if let Some(previous) = self.inner.timer().replace(task) {
            previous.abort();
        }
        trace!(watchdog = self.inner.name, cycle, ?deadline, "armed");
        cycle
    }

    /// Invalidate the current cycle and stop its timer.
    pub fn disarm(&self) {
        self.inner.next_cycle();
        if let Some(task) = self.inner.timer().take() {
            task.abort();
        }
        trace!(watchdog = self.inner.name, "disarmed");
    }

    /// Fire `cycle` now. Returns `true` only for the call that ran the handler.
    pub fn expire(&self, cycle: u64) -> bool {
        self.inner.expire(cycle)
    }

    /// Cycle started by the most recent `arm` or `disarm`.
    pub fn cycle(&self) -> u64 {
        self.inner.state.load(Ordering::Acquire) >> 1
    }

    /// Whether the current cycle has already fired.
    pub fn has_fired(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) & FIRED == FIRED
    }

    pub fn is_armed(&self) -> bool {
        !self.has_fired()
            && self
                .inner
                .timer()
                .as_ref()
                .is_some_and(|task| !task.is_finished())
    }
}

impl Inner {
    fn timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_cycle(&self) -> u64 {
        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                Some(((s >> 1) + 1) << 1)
            })
            .unwrap_or_else(|s| s);
        (previous >> 1) + 1
    }

    fn expire(&self, cycle: u64) -> bool {
        let armed = cycle << 1;
        if self
            .state
            .compare_exchange(armed, armed | FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!(watchdog = self.name, cycle, "stale or repeated expiry ignored");
            return false;
        }
        (self.on_timeout)();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(runtime: Handle) -> (Watchdog, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let watchdog = Watchdog::new("test", runtime, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (watchdog, fired)
    }

    #[tokio::test]
    async fn fires_after_deadline() {
        let (watchdog, fired) = counting(Handle::current());
        watchdog.arm(Duration::from_millis(20));
        assert!(watchdog.is_armed());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(watchdog.has_fired());
        assert!(!watchdog.is_armed());
    }

    #[tokio::test]
    async fn disarm_prevents_firing() {
        let (watchdog, fired) = counting(Handle::current());
        watchdog.arm(Duration::from_millis(20));
        watchdog.disarm();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rearm_restarts_the_deadline() {
        let (watchdog, fired) = counting(Handle::current());
        watchdog.arm(Duration::from_millis(80));
        tokio::time::sleep(Duration::from_millis(40)).await;
        watchdog.arm(Duration::from_millis(80));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_cycle_is_ignored() {
        let (watchdog, fired) = counting(Handle::current());
        let first = watchdog.arm(Duration::from_secs(60));
        let second = watchdog.arm(Duration::from_secs(60));
        assert!(second > first);
        assert!(!watchdog.expire(first));
        assert!(watchdog.expire(second));
        assert!(!watchdog.expire(second));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
