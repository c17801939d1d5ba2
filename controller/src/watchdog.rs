use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use tracing::error;

use setpoint_common::{Action, Clock, Timer};

/// Software stand-in for the board's hardware watchdog. The control loop
/// feeds it; a monitor polls it. Once tripped it stays tripped, and the
/// process is expected to restart.
#[derive(Clone)]
pub struct Watchdog<C> {
    timer: Arc<Mutex<Timer<C>>>,
    tripped: Arc<AtomicBool>,
}

struct Trip {
    tripped: Arc<AtomicBool>,
    timeout_ms: u64,
    reported: bool,
}

impl Action for Trip {
    fn execute(&mut self) {
        // Polled repeatedly once expired; only the first poll reports.
        if !self.reported {
            error!(
                "control loop missed its watchdog deadline ({} ms)",
                self.timeout_ms
            );
            self.reported = true;
        }
        self.tripped.store(true, Ordering::SeqCst);
    }

    fn reset(&mut self) {
        self.reported = false;
    }
}

impl<C: Clock> Watchdog<C> {
    pub fn new(timeout_ms: u64, clock: C) -> Self {
        let tripped = Arc::new(AtomicBool::new(false));
        let mut timer = Timer::with_action(
            timeout_ms,
            clock,
            Box::new(Trip {
                tripped: tripped.clone(),
                timeout_ms,
                reported: false,
            }),
        );
        timer.reset();

        Self {
            timer: Arc::new(Mutex::new(timer)),
            tripped,
        }
    }

    pub fn feed(&self) {
        if let Ok(mut timer) = self.timer.lock() {
            timer.reset();
        }
    }

    /// Returns `true` once the watchdog has tripped.
    pub fn check(&self) -> bool {
        if let Ok(mut timer) = self.timer.lock() {
            timer.expired();
        }
        self.is_tripped()
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}
