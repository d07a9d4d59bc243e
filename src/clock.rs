use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock source injected into the rate estimator so tests can
/// drive it deterministically instead of depending on real time.
pub trait Clock: Send + Sync {
    fn now_micros(&self) -> u64;
}

/// Default clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_micros() as u64
    }
}
