//! Oscillation guard for scale-up/scale-down thrashing.
//!
//! Every confirmed resize shifts one bit into a 16-bit history (1 = up,
//! 0 = down). Alternating patterns engage a scale-up lock whose cooldown
//! escalates by one second per consecutive lock, up to ten seconds. Two
//! identical decisions in a row confirm a trend and reset the escalation.
//!
//! The cooldown is a deadline checked against a monotonic clock at
//! decision time; nothing sleeps.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use pacer_core::ScaleDirection;

/// Upper bound of the escalation counter (and of the cooldown, in seconds).
pub const MAX_ESCALATION: u32 = 10;

/// Effect of recording one resize in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Thrashing detected; scale-ups are locked for `cooldown`.
    Locked { escalation: u32, cooldown: Duration },
    /// Two identical decisions in a row; escalation reset.
    TrendConfirmed,
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct HysteresisGuard {
    history: u16,
    escalation: u32,
    locked_until: Option<Instant>,
}

impl HysteresisGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recent decisions, newest in the lowest bit.
    pub fn history(&self) -> u16 {
        self.history
    }

    pub fn escalation(&self) -> u32 {
        self.escalation
    }

    /// Record a confirmed resize observed at `now`.
    pub fn record_at(&mut self, direction: ScaleDirection, now: Instant) -> GuardOutcome {
        self.history <<= 1;
        if direction == ScaleDirection::Up {
            self.history |= 1;
        }

        if is_thrashing(self.history) {
            self.escalation = (self.escalation + 1).min(MAX_ESCALATION);
            let cooldown = Duration::from_secs(u64::from(self.escalation));
            // Re-arming replaces any deadline still pending.
            self.locked_until = Some(now + cooldown);
            info!(
                history = format_args!("{:016b}", self.history),
                cooldown_secs = cooldown.as_secs(),
                "scale-up locked"
            );
            GuardOutcome::Locked {
                escalation: self.escalation,
                cooldown,
            }
        } else if matches!(self.history & 0b11, 0b11 | 0b00) {
            self.escalation = 0;
            GuardOutcome::TrendConfirmed
        } else {
            GuardOutcome::Unchanged
        }
    }

    /// Whether scale-ups are suppressed at `now`.
    pub fn is_locked_at(&self, now: Instant) -> bool {
        matches!(self.locked_until, Some(deadline) if now < deadline)
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked_at(Instant::now())
    }

    /// Like `is_locked_at`, but drops an expired deadline.
    pub fn check_at(&mut self, now: Instant) -> bool {
        match self.locked_until {
            Some(deadline) if now < deadline => true,
            Some(_) => {
                self.locked_until = None;
                debug!("scale-up unlocked");
                false
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn is_thrashing(history: u16) -> bool {
    history & 0xF == 0b1010 || matches!(history & 0xFF, 0b1001_1001 | 0b1100_1100)
}
