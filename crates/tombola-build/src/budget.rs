use std::time::{Duration, Instant};

use crate::errors::ExhaustionReason;

/// Run-wide swap counter plus wall-clock deadline.
#[derive(Debug, Clone)]
pub struct Budget {
    limit: u64,
    used: u64,
    started: Instant,
    deadline: Option<Instant>,
}

impl Budget {
    pub fn new(limit: u64, timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            limit,
            used: 0,
            started,
            deadline: started.checked_add(timeout),
        }
    }

    /// Count one swap attempt, successful or not.
    pub fn consume(&mut self) {
        self.used = self.used.saturating_add(1);
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    pub fn timed_out(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run-wide exhaustion, checked before every attempt.
    pub fn exhausted(&self) -> Option<ExhaustionReason> {
        if self.remaining() == 0 {
            Some(ExhaustionReason::SwapBudget)
        } else if self.timed_out() {
            Some(ExhaustionReason::Timeout)
        } else {
            None
        }
    }

    /// Attempts one stall may spend: `max(limit / 16, 512)`, capped by what is left.
    pub fn stall_share(&self) -> u64 {
        (self.limit / 16).max(512).min(self.remaining())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
