//! Busy/loading signal shared by every blocking engine operation.
//!
//! A nesting counter: each blocking operation enters once and leaves once, and
//! the UI collaborator is told about both edges so it can show a loading
//! indicator. The counter never goes below zero.

use std::sync::{Arc, Mutex};

/// UI collaborator notified on begin/end of blocking work.
pub trait LoadingObserver: Send + Sync {
    fn start_loading(&self);
    fn stop_loading(&self);
}

/// Observer that ignores every notification.
pub struct NullObserver;

impl LoadingObserver for NullObserver {
    fn start_loading(&self) {}
    fn stop_loading(&self) {}
}

#[derive(Clone)]
pub struct BusySignal {
    count: Arc<Mutex<u32>>,
    observer: Arc<dyn LoadingObserver>,
}

impl Default for BusySignal {
    fn default() -> Self {
        Self::new(Arc::new(NullObserver))
    }
}

impl BusySignal {
    pub fn new(observer: Arc<dyn LoadingObserver>) -> Self {
        Self {
            count: Arc::new(Mutex::new(0)),
            observer,
        }
    }

    pub fn begin(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count = count.saturating_add(1);
        self.observer.start_loading();
    }

    /// Leave one level of nesting. At zero the counter stays at zero, but the
    /// observer is still told so it can clear a stale indicator.
    pub fn end(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count = count.saturating_sub(1);
        self.observer.stop_loading();
    }

    /// Enter a busy section that ends when the returned guard is dropped,
    /// including on early returns and unwinding.
    pub fn enter(&self) -> BusyGuard<'_> {
        self.begin();
        BusyGuard { signal: self }
    }

    pub fn count(&self) -> u32 {
        *self.count.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_busy(&self) -> bool {
        self.count() > 0
    }
}

#[must_use = "the busy section ends as soon as the guard is dropped"]
pub struct BusyGuard<'a> {
    signal: &'a BusySignal,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.signal.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Observer that counts notifications, for assertions.
    #[derive(Default)]
    struct CountingObserver {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl LoadingObserver for CountingObserver {
        fn start_loading(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn stop_loading(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn three_begins_two_ends_leaves_one() {
        let busy = BusySignal::default();
        busy.begin();
        busy.begin();
        busy.begin();
        busy.end();
        busy.end();
        assert_eq!(busy.count(), 1);
        assert!(busy.is_busy());
    }

    #[test]
    fn end_never_goes_negative() {
        let busy = BusySignal::default();
        busy.end();
        busy.end();
        assert_eq!(busy.count(), 0);
        busy.begin();
        assert_eq!(busy.count(), 1);
    }

    #[test]
    fn balanced_nesting_returns_to_start() {
        let busy = BusySignal::default();
        busy.begin();
        let before = busy.count();
        {
            let _outer = busy.enter();
            {
                let _inner = busy.enter();
                assert_eq!(busy.count(), before + 2);
            }
            assert_eq!(busy.count(), before + 1);
        }
        assert_eq!(busy.count(), before);
    }

    #[test]
    fn guard_releases_on_early_return() {
        fn fails(busy: &BusySignal) -> Result<(), String> {
            let _busy = busy.enter();
            Err("boom".to_string())
        }
        let busy = BusySignal::default();
        assert!(fails(&busy).is_err());
        assert_eq!(busy.count(), 0);
    }

    #[test]
    fn observer_sees_every_edge() {
        let observer = Arc::new(CountingObserver::default());
        let busy = BusySignal::new(observer.clone());
        {
            let _a = busy.enter();
            let _b = busy.enter();
        }
        busy.end();
        assert_eq!(observer.starts.load(Ordering::SeqCst), 2);
        assert_eq!(observer.stops.load(Ordering::SeqCst), 3);
    }
}
