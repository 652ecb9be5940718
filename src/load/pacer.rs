//! Converts a request rate into per-tick batch sizes

use std::time::Duration;

/// Tick length of the open-loop request generator
pub const TICK: Duration = Duration::from_millis(100);

/// Spreads `rate` requests per second over fixed ticks
///
/// Fractions of a request are carried to the next tick, so after `n`
/// ticks the total handed out is within one of `rate × n × tick`.
#[derive(Debug, Clone)]
pub struct Pacer {
    per_tick: f64,
    carry: f64,
    emitted: u64,
}

impl Pacer {
    pub fn new(rate_per_sec: f64, tick: Duration) -> Self {
        let per_tick = if rate_per_sec.is_finite() && rate_per_sec > 0.0 {
            rate_per_sec * tick.as_secs_f64()
        } else {
            0.0
        };
        Self {
            per_tick,
            carry: 0.0,
            emitted: 0,
        }
    }

    /// Requests to start on this tick
    pub fn next_batch(&mut self) -> u64 {
        let due = self.per_tick + self.carry;
        let batch = due.floor();
        self.carry = due - batch;
        self.emitted += batch as u64;
        batch as u64
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fractional_rate_is_carried() {
        // 5 rps at 100 ms ticks is half a request per tick
        let mut pacer = Pacer::new(5.0, TICK);
        let batches: Vec<u64> = (0..6).map(|_| pacer.next_batch()).collect();
        assert_eq!(batches, vec![0, 1, 0, 1, 0, 1]);
        assert_eq!(pacer.emitted(), 3);
    }

    #[test]
    fn test_whole_rate() {
        let mut pacer = Pacer::new(50.0, TICK);
        assert_eq!(pacer.next_batch(), 5);
        assert_eq!(pacer.next_batch(), 5);
    }

    #[test]
    fn test_invalid_rate_emits_nothing() {
        let mut pacer = Pacer::new(-3.0, TICK);
        assert_eq!(pacer.next_batch(), 0);
        let mut pacer = Pacer::new(f64::NAN, TICK);
        assert_eq!(pacer.next_batch(), 0);
    }

    proptest! {
        #[test]
        fn emitted_tracks_rate_times_elapsed(rate in 0.1f64..2000.0, ticks in 1usize..500) {
            let mut pacer = Pacer::new(rate, TICK);
            for _ in 0..ticks {
                pacer.next_batch();
            }
            let expected = rate * TICK.as_secs_f64() * ticks as f64;
            prop_assert!((pacer.emitted() as f64 - expected).abs() <= 1.0);
        }
    }
}
