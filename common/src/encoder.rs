use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

/// Rotary position source, in raw encoder counts.
pub trait Encoder {
    fn position(&self) -> i64;
    fn set_position(&mut self, count: i64);
}

/// Encoder count held in an atomic so a pulse-counter task (or a test)
/// can move it while a controller owns another handle.
#[derive(Debug, Clone, Default)]
pub struct SharedEncoder {
    count: Arc<AtomicI64>,
}

impl SharedEncoder {
    pub fn new(count: i64) -> Self {
        Self {
            count: Arc::new(AtomicI64::new(count)),
        }
    }

    /// Simulates turning the knob by `delta` detents.
    pub fn adjust(&self, delta: i64) -> i64 {
        self.count.fetch_add(delta, Ordering::Relaxed) + delta
    }
}

impl Encoder for SharedEncoder {
    fn position(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    fn set_position(&mut self, count: i64) {
        self.count.store(count, Ordering::Relaxed);
    }
}
