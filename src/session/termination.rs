use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::accumulator::StopReason;

/// Non-blocking stop request, polled between frames.
pub trait CancellationSignal {
    fn is_cancelled(&self) -> bool;
}

impl CancellationSignal for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

pub trait Clock {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// When a session stops, apart from the source running dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationPolicy {
    Timed { budget: Duration },
    ExhaustionOnly,
}

impl TerminationPolicy {
    pub fn timed(budget: Duration) -> Self {
        TerminationPolicy::Timed { budget }
    }

    /// Cancellation is checked before the time budget, so an explicit stop is
    /// reported as such even when the budget has also run out.
    pub fn check(&self, elapsed: Duration, cancelled: bool) -> Option<StopReason> {
        if cancelled {
            return Some(StopReason::UserCancelled);
        }
        match self {
            TerminationPolicy::Timed { budget } if elapsed > *budget => {
                Some(StopReason::TimeBudgetExpired)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_stops_only_after_budget_is_exceeded() {
        let policy = TerminationPolicy::timed(Duration::from_secs(10));
        assert_eq!(policy.check(Duration::from_secs(9), false), None);
        assert_eq!(policy.check(Duration::from_secs(10), false), None);
        assert_eq!(
            policy.check(Duration::from_millis(10_001), false),
            Some(StopReason::TimeBudgetExpired)
        );
    }

    #[test]
    fn cancellation_wins_over_expired_budget() {
        let policy = TerminationPolicy::timed(Duration::from_secs(1));
        assert_eq!(
            policy.check(Duration::from_secs(60), true),
            Some(StopReason::UserCancelled)
        );
    }

    #[test]
    fn exhaustion_only_ignores_elapsed_time() {
        let policy = TerminationPolicy::ExhaustionOnly;
        assert_eq!(policy.check(Duration::from_secs(86_400), false), None);
        assert_eq!(
            policy.check(Duration::ZERO, true),
            Some(StopReason::UserCancelled)
        );
    }

    #[test]
    fn atomic_flag_is_a_cancellation_signal() {
        let flag = AtomicBool::new(false);
        assert!(!flag.is_cancelled());
        flag.store(true, Ordering::Relaxed);
        assert!(flag.is_cancelled());
    }
}
