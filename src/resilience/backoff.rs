//! # Reconnect Backoff
//!
//! Exponential backoff schedule for broker reconnection. Delays double from
//! the initial value up to the cap and reset after a successful connection,
//! so a server that loses its broker stays up and keeps retrying at a bounded
//! rate until an operator stops it.

use std::time::Duration;

/// Exponential backoff state for one reconnect cycle.
///
/// `next_delay()` yields 1, 2, 4, 8, 16, 30, 30, ... seconds with the default
/// configuration; `reset()` returns the schedule to the initial delay.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    cap: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            initial,
            cap: cap.max(initial),
            current: initial,
        }
    }

    /// The delay to sleep before the next attempt. Doubles the following
    /// delay, saturating at the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        delay
    }

    /// Return to the initial delay after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// The delay the next `next_delay()` call would return.
    pub fn peek(&self) -> Duration {
        self.current
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(backoff: &mut ReconnectBackoff, n: usize) -> Vec<u64> {
        (0..n).map(|_| backoff.next_delay().as_secs()).collect()
    }

    #[test]
    fn test_default_schedule_doubles_to_cap() {
        let mut backoff = ReconnectBackoff::default();
        assert_eq!(secs(&mut backoff, 8), vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn test_schedule_is_monotonically_non_decreasing() {
        let mut backoff = ReconnectBackoff::default();
        let delays = secs(&mut backoff, 12);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|&d| d <= 30));
    }

    #[test]
    fn test_reset_returns_to_initial() {
        let mut backoff = ReconnectBackoff::default();
        for _ in 0..6 {
            backoff.next_delay();
        }
        assert_eq!(backoff.peek().as_secs(), 30);

        backoff.reset();
        assert_eq!(backoff.next_delay().as_secs(), 1);
        assert_eq!(backoff.next_delay().as_secs(), 2);
    }

    #[test]
    fn test_custom_bounds() {
        let mut backoff =
            ReconnectBackoff::new(Duration::from_millis(250), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_cap_never_below_initial() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.next_delay().as_secs(), 5);
        assert_eq!(backoff.next_delay().as_secs(), 5);
    }
}
