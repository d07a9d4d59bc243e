/// Either a finite number of seconds or "no target" (never shed
/// eagerly, promote only on demand).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RamDuration {
    Infinite,
    Finite(f64),
}

/// Message-count equivalent of a `RamDuration`, derived from measured
/// rates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetRam {
    Infinite,
    Finite(u64),
}

impl TargetRam {
    /// True if `self` is a strictly lower bound than `other` — the
    /// condition that triggers the phase-change engine in
    /// `set_ram_duration_target`.
    pub fn is_strictly_lower_than(self, other: TargetRam) -> bool {
        match (self, other) {
            (TargetRam::Finite(a), TargetRam::Finite(b)) => a < b,
            (TargetRam::Finite(_), TargetRam::Infinite) => true,
            (TargetRam::Infinite, _) => false,
        }
    }

    pub fn saturating_sub_count(self, count: u64) -> u64 {
        match self {
            TargetRam::Infinite => 0,
            TargetRam::Finite(t) => count.saturating_sub(t),
        }
    }

    pub fn is_zero(self) -> bool {
        matches!(self, TargetRam::Finite(0))
    }
}

#[derive(Debug, Clone, Copy)]
struct Direction {
    window_start_micros: u64,
    count: u64,
    prev_count: u64,
}

impl Direction {
    fn new(now_micros: u64, initial_count: u64) -> Self {
        Direction {
            window_start_micros: now_micros,
            count: 0,
            prev_count: initial_count,
        }
    }

    fn record(&mut self, n: u64) {
        self.count += n;
    }

    /// Rolls the window forward, returning the average rate in
    /// messages per second for the window just closed.
    fn roll(&mut self, now_micros: u64) -> f64 {
        let elapsed = now_micros.saturating_sub(self.window_start_micros).max(1);
        let avg = (self.count + self.prev_count) as f64 * 1_000_000.0 / elapsed as f64;
        self.prev_count = self.count;
        self.count = 0;
        self.window_start_micros = now_micros;
        avg
    }
}

/// Exponential-ish averaging of ingress and egress over wallclock
/// windows, converting a caller-supplied RAM-duration target into a
/// message-count target.
///
/// Ingress is primed at construction with the queue's initial backlog
/// (so the very first `ram_duration` result is biased high); this is
/// preserved deliberately (see `DESIGN.md`) and the first result
/// should be treated as advisory only.
#[derive(Debug)]
pub struct RateEstimator {
    ingress: Direction,
    egress: Direction,
    ram_msg_count_prev: u64,
    last_rate_in: f64,
    last_rate_out: f64,
}

impl RateEstimator {
    pub fn new(now_micros: u64, initial_ram_msg_count: u64) -> Self {
        RateEstimator {
            ingress: Direction::new(now_micros, initial_ram_msg_count),
            egress: Direction::new(now_micros, 0),
            ram_msg_count_prev: initial_ram_msg_count,
            last_rate_in: 0.0,
            last_rate_out: 0.0,
        }
    }

    pub fn record_publish(&mut self, n: u64) {
        self.ingress.record(n);
    }

    pub fn record_fetch(&mut self, n: u64) {
        self.egress.record(n);
    }

    /// `ram_duration(state) → (duration, state')`: samples
    /// wall clock, rolls both direction windows, and derives a
    /// duration target from the smoothed rates.
    pub fn ram_duration(&mut self, now_micros: u64, ram_msg_count: u64) -> RamDuration {
        let avg_in = self.ingress.roll(now_micros);
        let avg_out = self.egress.roll(now_micros);
        self.last_rate_in = avg_in;
        self.last_rate_out = avg_out;
        let prev = self.ram_msg_count_prev;
        self.ram_msg_count_prev = ram_msg_count;
        if avg_in == 0.0 && avg_out == 0.0 {
            RamDuration::Infinite
        } else {
            RamDuration::Finite((prev + ram_msg_count) as f64 / (2.0 * (avg_in + avg_out)))
        }
    }

    /// `set_ram_duration_target(target, state)`: converts a
    /// duration target into a message-count target using the rates
    /// most recently observed by `ram_duration`.
    pub fn target_ram_msg_count(&self, target: RamDuration) -> TargetRam {
        match target {
            RamDuration::Infinite => TargetRam::Infinite,
            RamDuration::Finite(seconds) => {
                let total_rate = self.last_rate_in + self.last_rate_out;
                TargetRam::Finite((seconds * total_rate).floor().max(0.0) as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_estimator_with_no_backlog_reports_infinite_ram_duration() {
        let mut est = RateEstimator::new(0, 0);
        assert_eq!(est.ram_duration(1_000_000, 0), RamDuration::Infinite);
        assert_eq!(est.target_ram_msg_count(RamDuration::Finite(30.0)), TargetRam::Finite(0));
    }

    #[test]
    fn initial_backlog_biases_the_first_ram_duration_high() {
        // A queue started with a backlog reports a non-infinite, large
        // duration on the very first call even with no observed
        // publish/fetch activity yet — the documented advisory bias.
        let mut est = RateEstimator::new(0, 500);
        match est.ram_duration(1_000_000, 500) {
            RamDuration::Finite(seconds) => assert!(seconds > 0.0),
            RamDuration::Infinite => panic!("primed backlog must not report Infinite on the first call"),
        }
    }

    #[test]
    fn infinite_target_duration_passes_through_to_infinite_target_count() {
        let est = RateEstimator::new(0, 0);
        assert_eq!(est.target_ram_msg_count(RamDuration::Infinite), TargetRam::Infinite);
    }

    #[test]
    fn steady_publish_rate_yields_finite_ram_duration() {
        let mut est = RateEstimator::new(0, 0);
        // 100 messages/sec sustained ingress, no egress.
        let mut duration = RamDuration::Infinite;
        for t in 1..=10 {
            est.record_publish(10);
            duration = est.ram_duration(t * 1_000_000, 10 * t);
        }
        match duration {
            RamDuration::Finite(seconds) => assert!(seconds > 0.0 && seconds.is_finite()),
            RamDuration::Infinite => panic!("sustained non-zero rate must not report Infinite"),
        }
    }

    #[test]
    fn target_ram_msg_count_scales_with_observed_rate() {
        let mut est = RateEstimator::new(0, 0);
        for t in 1..=10 {
            est.record_publish(10);
            let _ = est.ram_duration(t * 1_000_000, 10 * t);
        }
        let small = est.target_ram_msg_count(RamDuration::Finite(1.0));
        let large = est.target_ram_msg_count(RamDuration::Finite(10.0));
        match (small, large) {
            (TargetRam::Finite(a), TargetRam::Finite(b)) => assert!(b >= a),
            other => panic!("expected finite targets, got {other:?}"),
        }
    }

    #[test]
    fn record_fetch_feeds_egress_rate() {
        let mut est = RateEstimator::new(0, 1000);
        let mut duration = RamDuration::Infinite;
        for t in 1..=10 {
            est.record_fetch(20);
            duration = est.ram_duration(t * 1_000_000, 1000 - 20 * t);
        }
        assert!(matches!(duration, RamDuration::Finite(s) if s > 0.0));
    }
}
