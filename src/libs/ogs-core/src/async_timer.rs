//! Async Timer Manager for NF Event Loops
//!
//! A polled, one-shot timer service owned by a single task. The owning task
//! arms timers with [`AsyncTimerMgr::timer_setup`], sleeps until
//! [`AsyncTimerMgr::next_expiration`], then drains
//! [`AsyncTimerMgr::process_expired`] into its own state machine. Timers
//! therefore only ever fire into the task that requested them.
//!
//! The manager can run on the system clock or on a manual clock that tests
//! advance explicitly, so retransmission schedules can be replayed without
//! sleeping.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

// ============================================================================
// Timer Types
// ============================================================================

/// A timer entry stored in the async timer manager
#[derive(Debug, Clone)]
pub struct AsyncTimerEntry<T: Clone + fmt::Debug> {
    /// Unique timer handle ID
    pub id: u64,
    /// Owner-specific timer type (e.g. a retransmission or cleanup tag)
    pub timer_type: T,
    /// Absolute expiration time
    pub expires_at: Instant,
    /// Timer duration
    pub duration: Duration,
}

/// Time source of a timer manager
#[derive(Debug)]
enum Clock {
    System,
    Manual(Mutex<Instant>),
}

impl Clock {
    fn now(&self) -> Instant {
        match self {
            Clock::System => Instant::now(),
            Clock::Manual(now) => now.lock().map(|t| *t).unwrap_or_else(|e| *e.into_inner()),
        }
    }
}

// ============================================================================
// Async Timer Manager
// ============================================================================

/// Generic one-shot timer manager keyed by `u64` handles.
///
/// `T` is the owner-specific timer tag carried back on expiry.
///
/// ```ignore
/// use ogs_core::async_timer::AsyncTimerMgr;
///
/// let mgr = AsyncTimerMgr::<MyTimer>::new();
/// let id = mgr.timer_setup(1, 0, MyTimer::Retry);
///
/// for entry in mgr.process_expired() {
///     // dispatch entry.id / entry.timer_type
/// }
/// mgr.timer_remove(id);
/// ```
pub struct AsyncTimerMgr<T: Clone + fmt::Debug + Send + Sync + 'static> {
    /// Armed timers indexed by handle ID
    timers: RwLock<HashMap<u64, AsyncTimerEntry<T>>>,
    /// Monotonically increasing timer handle counter
    next_id: AtomicU64,
    clock: Clock,
}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> AsyncTimerMgr<T> {
    /// Create a timer manager on the system clock
    pub fn new() -> Self {
        Self {
            timers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            clock: Clock::System,
        }
    }

    /// Create a timer manager whose clock only moves through [`advance`](Self::advance)
    pub fn with_manual_clock() -> Self {
        Self {
            timers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            clock: Clock::Manual(Mutex::new(Instant::now())),
        }
    }

    /// Current time as seen by this manager
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Move a manual clock forward. No-op on the system clock.
    pub fn advance(&self, by: Duration) {
        if let Clock::Manual(now) = &self.clock {
            match now.lock() {
                Ok(mut t) => *t += by,
                Err(e) => *e.into_inner() += by,
            }
        }
    }

    /// Arm a one-shot timer and return its handle ID
    pub fn start(&self, timer_type: T, duration: Duration) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let entry = AsyncTimerEntry {
            id,
            timer_type: timer_type.clone(),
            expires_at: self.now() + duration,
            duration,
        };

        if let Ok(mut timers) = self.timers.write() {
            timers.insert(id, entry);
        }

        log::trace!("AsyncTimer started: id={id} type={timer_type:?} duration={duration:?}");
        id
    }

    /// Arm a one-shot timer from a seconds/microseconds pair
    pub fn timer_setup(&self, interval_sec: u64, interval_usec: u32, timer_type: T) -> u64 {
        let duration = Duration::from_secs(interval_sec) + Duration::from_micros(interval_usec as u64);
        self.start(timer_type, duration)
    }

    /// Disarm a timer. Returns true if it was still armed.
    pub fn timer_remove(&self, id: u64) -> bool {
        if let Ok(mut timers) = self.timers.write() {
            if let Some(entry) = timers.remove(&id) {
                log::trace!("AsyncTimer removed: id={} type={:?}", id, entry.timer_type);
                return true;
            }
        }
        false
    }

    /// Remove and return every timer whose deadline has passed.
    ///
    /// Entries come back ordered by deadline, then by arming order.
    pub fn process_expired(&self) -> Vec<AsyncTimerEntry<T>> {
        let now = self.now();
        let mut expired = Vec::new();

        if let Ok(mut timers) = self.timers.write() {
            let due: Vec<u64> = timers
                .values()
                .filter(|e| now >= e.expires_at)
                .map(|e| e.id)
                .collect();
            for id in due {
                if let Some(entry) = timers.remove(&id) {
                    expired.push(entry);
                }
            }
        }

        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then(a.id.cmp(&b.id)));
        expired
    }

    /// Time until the next deadline, `None` with no armed timers,
    /// `Some(Duration::ZERO)` when something is already due.
    pub fn next_expiration(&self) -> Option<Duration> {
        let now = self.now();
        self.timers.read().ok().and_then(|timers| {
            timers
                .values()
                .map(|e| e.expires_at.saturating_duration_since(now))
                .min()
        })
    }

    /// Number of armed timers
    pub fn count(&self) -> usize {
        self.timers.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Check if a timer is still armed
    pub fn exists(&self, id: u64) -> bool {
        self.timers
            .read()
            .map(|t| t.contains_key(&id))
            .unwrap_or(false)
    }

    /// Disarm everything
    pub fn clear(&self) {
        if let Ok(mut timers) = self.timers.write() {
            timers.clear();
        }
        log::debug!("AsyncTimer: all timers cleared");
    }
}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> Default for AsyncTimerMgr<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> fmt::Debug for AsyncTimerMgr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTimerMgr")
            .field("armed", &self.count())
            .finish()
    }
}

// ============================================================================
// Helper: compute sleep duration for event loop tick
// ============================================================================

/// Sleep duration for the next event loop iteration: the time until the
/// next timer, capped at `max_interval`, never zero.
pub fn compute_poll_interval<T: Clone + fmt::Debug + Send + Sync + 'static>(
    mgr: &AsyncTimerMgr<T>,
    max_interval: Duration,
) -> Duration {
    match mgr.next_expiration() {
        Some(next) if next < max_interval => {
            if next.is_zero() {
                Duration::from_millis(1)
            } else {
                next
            }
        }
        _ => max_interval,
    }
}

// ============================================================================
// Tests
// ============================================================================
