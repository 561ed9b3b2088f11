//! One-shot timers
//!
//! Expiry is delivered back to the central as
//! `CentralEvent::TimerExpired(id)`. Ids are never reused by
//! [`SimulatedTimers`], but callers must still compare an expired id with
//! the one they armed before acting on it.

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u32);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

pub trait TimerService {
    fn arm(&mut self, duration: Duration) -> TimerId;

    fn cancel(&mut self, id: TimerId);
}

/// A timer service driven by an explicit clock.
///
/// Nothing fires on its own: the owner calls [`SimulatedTimers::advance`]
/// and feeds the returned ids back as timer events.
#[derive(Debug, Default)]
pub struct SimulatedTimers {
    now: Duration,
    next_id: u32,
    pending: Vec<(TimerId, Duration)>,
}

impl SimulatedTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.pending.iter().any(|(armed, _)| *armed == id)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Move the clock forward and return every timer that expired, earliest
    /// deadline first.
    pub fn advance(&mut self, by: Duration) -> Vec<TimerId> {
        self.now += by;
        let now = self.now;
        let mut expired: Vec<(TimerId, Duration)> = Vec::new();
        self.pending.retain(|&(id, deadline)| {
            if deadline <= now {
                expired.push((id, deadline));
                false
            } else {
                true
            }
        });
        expired.sort_by_key(|&(id, deadline)| (deadline, id));
        expired.into_iter().map(|(id, _)| id).collect()
    }
}

impl TimerService for SimulatedTimers {
    fn arm(&mut self, duration: Duration) -> TimerId {
        self.next_id = self.next_id.wrapping_add(1);
        let id = TimerId(self.next_id);
        self.pending.push((id, self.now + duration));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.pending.retain(|(armed, _)| *armed != id);
    }
}
