//! Frame admission policy
//!
//! Sampling, not queueing: a frame is either admitted for extraction right
//! away or dropped.

use std::time::Duration;
use tokio::time::Instant;

/// What to do with an arriving frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Start an extraction for this frame
    Admit,
    /// Too soon after the last extraction start
    Cooldown,
    /// An extraction is still running
    Busy,
}

/// Decide the fate of a frame arriving at `now`
pub fn decide(
    now: Instant,
    last_started: Option<Instant>,
    in_flight: bool,
    interval: Duration,
) -> Admission {
    if let Some(last) = last_started {
        if now.saturating_duration_since(last) < interval {
            return Admission::Cooldown;
        }
    }
    if in_flight {
        return Admission::Busy;
    }
    Admission::Admit
}

/// The `(lastProcessedTime, inFlight)` pair of one pipeline
#[derive(Debug, Default)]
pub struct ThrottleState {
    last_started: Option<Instant>,
    in_flight: bool,
}

impl ThrottleState {
    /// Apply [`decide`]; on `Admit` the frame is marked in flight
    pub fn try_admit(&mut self, now: Instant, interval: Duration) -> Admission {
        let admission = decide(now, self.last_started, self.in_flight, interval);
        if admission == Admission::Admit {
            self.in_flight = true;
            self.last_started = Some(now);
        }
        admission
    }

    /// Clear the in-flight flag once an extraction completes
    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn last_started(&self) -> Option<Instant> {
        self.last_started
    }
}
