//! Exponential backoff with jitter, shared by the BLE scanner's adapter
//! reconnect loop and the MQTT publisher's broker reconnect loop (§4.3,
//! §4.5, §7).

use std::time::Duration;

use rand::Rng as _;

const DEFAULT_BASE: Duration = Duration::from_secs(1);
const DEFAULT_CAP: Duration = Duration::from_secs(30);
const JITTER_FRACTION: f64 = 0.2;

/// Doubling backoff, capped, with up to ±20% jitter applied to each delay.
///
/// `reset()` returns the sequence to its first delay — callers invoke it
/// after a successful reconnect.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_CAP)
    }
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap, attempt: 0 }
    }

    /// The delay to wait before the next retry, then advance the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(u32::BITS - 1);
        self.attempt = self.attempt.saturating_add(1);

        let unjittered = self.base.saturating_mul(1 << exponent).min(self.cap);
        jitter(unjittered)
    }

    /// Reset the sequence after a successful reconnect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

fn jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(1.0 - JITTER_FRACTION..=1.0 + JITTER_FRACTION);
    delay.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_start_near_base_delay() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_millis(800) && delay <= Duration::from_millis(1200));
    }

    #[test]
    fn should_double_each_attempt_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        for _ in 0..10 {
            let delay = backoff.next_delay();
            assert!(delay <= Duration::from_millis(36_000));
        }
    }

    #[test]
    fn should_cap_delay_after_enough_attempts() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        for _ in 0..20 {
            backoff.next_delay();
        }
        let delay = backoff.next_delay();
        assert!(delay <= Duration::from_millis(36_000));
    }

    #[test]
    fn should_restart_sequence_after_reset() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_millis(800) && delay <= Duration::from_millis(1200));
    }
}
