// Periodic execution hook
use std::time::Duration;

/// Something driven by a fixed-rate scheduler
///
/// `execute` runs once per period and must return well within it: no
/// blocking, no awaiting.
pub trait Schedulable {
    fn execute(&mut self);
}

/// Period of a loop running at `hz` (at least 1 Hz)
pub fn period_for_hz(hz: u64) -> Duration {
    Duration::from_micros(1_000_000 / hz.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_for_hz() {
        assert_eq!(period_for_hz(50), Duration::from_millis(20));
        assert_eq!(period_for_hz(200), Duration::from_millis(5));
        assert_eq!(period_for_hz(0), Duration::from_secs(1));
    }
}
