use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// Monotonic millisecond time source.
///
/// Timestamps are `u64`, so wraparound is not reachable during the life of
/// a device and no wraparound handling exists anywhere in this crate.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Milliseconds since the clock was created. Copies share the same origin.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(now_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Relaxed)
    }
}

/// Side effect bound to a [`Timer`].
pub trait Action {
    /// Called from [`Timer::expired`] on every poll that finds the timer
    /// expired.
    fn execute(&mut self);

    /// Called from [`Timer::reset`] before the timer is re-armed.
    fn reset(&mut self);
}

/// Restartable countdown.
///
/// A freshly built timer has an expiry of zero and therefore reports
/// expired until it is first [`reset`](Timer::reset).
///
/// The bound action is level-triggered: `expired()` runs it on every call
/// made while the timer is expired, not only on the first one. An action
/// that must fire once has to latch that itself.
pub struct Timer<C> {
    timeout_ms: u64,
    expiry_ms: u64,
    clock: C,
    action: Option<Box<dyn Action + Send>>,
}

impl<C: Clock> Timer<C> {
    pub fn new(timeout_ms: u64, clock: C) -> Self {
        Self {
            timeout_ms,
            expiry_ms: 0,
            clock,
            action: None,
        }
    }

    pub fn with_action(timeout_ms: u64, clock: C, action: Box<dyn Action + Send>) -> Self {
        Self {
            action: Some(action),
            ..Self::new(timeout_ms, clock)
        }
    }

    pub fn reset(&mut self) {
        if let Some(action) = self.action.as_mut() {
            action.reset();
        }
        self.expiry_ms = self.clock.now_ms().saturating_add(self.timeout_ms);
    }

    pub fn expired(&mut self) -> bool {
        if self.clock.now_ms() < self.expiry_ms {
            return false;
        }
        if let Some(action) = self.action.as_mut() {
            action.execute();
        }
        true
    }

    pub fn is_running(&mut self) -> bool {
        !self.expired()
    }

    /// Takes effect on the next [`reset`](Timer::reset).
    pub fn set_timeout(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

impl<C> std::fmt::Debug for Timer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("timeout_ms", &self.timeout_ms)
            .field("expiry_ms", &self.expiry_ms)
            .field("has_action", &self.action.is_some())
            .finish()
    }
}
